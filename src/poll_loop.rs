use crate::autobid::BatchReport;
use anyhow::Result;
use log::{error, info};
use std::future::Future;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{self, Duration};

/// pause between one cycle ending and the next starting
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// run `cycle` until told to stop, sleeping `interval` after every cycle whether it worked or not.
/// a cycle that has started always finishes; shutdown is only noticed between cycles.
/// a closed shutdown channel counts as a shutdown. returns how many cycles ran.
pub async fn run<F, Fut>(
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut cycle: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BatchReport>>,
{
    let mut cycles = 0u64;
    loop {
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        cycles += 1;
        match cycle().await {
            Ok(report) => info!("cycle {} done, {}", cycles, report.summary()),
            Err(e) => error!("cycle {} failed: {:#}", cycles, e),
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = time::sleep(interval) => {}
        }
    }
    info!("poll loop stopped after {} cycles", cycles);
    cycles
}
