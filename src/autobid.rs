use crate::deal_sender::{DealSender, Submission};
use crate::talk_to_swan::Coordinator;
use crate::types::{DealID, DealStatus, StatusUpdate};
use anyhow::{Context, Result};
use log::{error, info};

/// how one assigned deal fared in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DealFate {
    /// on chain and swan knows about it
    Created(StatusUpdate),
    AlreadySubmitted,
    /// never made it on chain this cycle. swan still has it as assigned, so next cycle tries again.
    Failed(String),
    /// on chain, but swan didn't take the update
    UpdateFailed { update: StatusUpdate, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealReport {
    pub deal_id: DealID,
    pub task_uuid: String,
    pub miner_fid: String,
    pub fate: DealFate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub deals: Vec<DealReport>,
}

impl BatchReport {
    /// deals that made it on chain this cycle, whether or not swan heard about it
    pub fn placed(&self) -> impl Iterator<Item = (&DealReport, &StatusUpdate)> {
        self.deals.iter().filter_map(|report| match &report.fate {
            DealFate::Created(update) | DealFate::UpdateFailed { update, .. } => {
                Some((report, update))
            }
            _ => None,
        })
    }

    pub fn summary(&self) -> String {
        let count = |pred: fn(&DealFate) -> bool| {
            self.deals.iter().filter(|report| pred(&report.fate)).count()
        };
        format!(
            "{} deals: {} created, {} already submitted, {} failed, {} not reported to swan",
            self.deals.len(),
            count(|fate| matches!(fate, DealFate::Created(_))),
            count(|fate| matches!(fate, DealFate::AlreadySubmitted)),
            count(|fate| matches!(fate, DealFate::Failed(_))),
            count(|fate| matches!(fate, DealFate::UpdateFailed { .. })),
        )
    }
}

/// one poll cycle: everything swan has assigned to us, one deal at a time.
/// a deal going wrong is logged and skipped, only losing swan itself fails the batch.
pub async fn process_batch(
    coordinator: &dyn Coordinator,
    sender: &DealSender<'_>,
) -> Result<BatchReport> {
    let assigned = coordinator
        .list_deals(DealStatus::Assigned)
        .await
        .context("failed to fetch assigned offline deals from swan")?;

    let mut report = BatchReport::default();
    if assigned.is_empty() {
        info!("no offline deals to be sent");
        return Ok(report);
    }
    info!("{} assigned offline deals to send", assigned.len());

    for deal in assigned {
        let fate = match sender.send_deal(&deal).await {
            Ok(Submission::AlreadySubmitted) => DealFate::AlreadySubmitted,
            Ok(Submission::Created(started)) => {
                let update = StatusUpdate::created(deal.id, &started);
                match coordinator.update_deal(&update).await {
                    Ok(()) => DealFate::Created(update),
                    Err(e) => {
                        error!(
                            "task:{}, deal:{} is on chain as {} but swan wasn't updated: {:#}",
                            deal.task_uuid, deal.id, started.deal_cid, e
                        );
                        DealFate::UpdateFailed {
                            update,
                            reason: format!("{:#}", e),
                        }
                    }
                }
            }
            Err(e) => {
                error!(
                    "task:{}, deal:{} skipped this cycle: {}",
                    deal.task_uuid, deal.id, e
                );
                DealFate::Failed(e.to_string())
            }
        };
        report.deals.push(DealReport {
            deal_id: deal.id,
            task_uuid: deal.task_uuid,
            miner_fid: deal.miner_fid,
            fate,
        });
    }

    Ok(report)
}
