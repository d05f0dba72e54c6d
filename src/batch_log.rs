use crate::autobid::{BatchReport, DealFate};
use crate::types::{ChainEpoch, DealID};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize, Debug)]
struct PlacedDeal<'a> {
    deal_id: DealID,
    task_uuid: &'a str,
    miner_fid: &'a str,
    deal_cid: Option<&'a str>,
    start_epoch: Option<ChainEpoch>,
    reported_to_swan: bool,
}

#[derive(Serialize, Debug)]
struct BatchRecord<'a> {
    written_at: DateTime<Utc>,
    deals: Vec<PlacedDeal<'a>>,
}

/// drop a json file in the output dir listing every deal this cycle put on chain.
/// cycles that placed nothing don't leave a file.
pub async fn record(output_dir: &Path, report: &BatchReport) -> Result<Option<PathBuf>> {
    let deals: Vec<PlacedDeal> = report
        .placed()
        .map(|(deal, update)| PlacedDeal {
            deal_id: deal.deal_id,
            task_uuid: &deal.task_uuid,
            miner_fid: &deal.miner_fid,
            deal_cid: update.deal_cid.as_deref(),
            start_epoch: update.start_epoch,
            reported_to_swan: matches!(deal.fate, DealFate::Created(_)),
        })
        .collect();
    if deals.is_empty() {
        return Ok(None);
    }

    let written_at = Utc::now();
    let path = output_dir.join(format!(
        "autobid-{}.json",
        written_at.format("%Y-%m-%dT%H-%M-%S%.3fZ")
    ));
    let body = serde_json::to_vec_pretty(&BatchRecord { written_at, deals })?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("couldn't write batch record to {}", path.display()))?;
    info!("batch record written to {}", path.display());
    Ok(Some(path))
}
