use crate::deal_config::{self, AutobidTerms, ConfigRejection, DealConfig};
use crate::piece_math::{self, DealEconomics};
use crate::settings::{LotusSettings, SenderSettings};
use crate::talk_to_lotus::{ChainConnector, ChainError, DealProposal, StartDealResponse};
use crate::types::{AssignedDeal, ChainEpoch, DealID, StartedDeal};
use cid::Cid;
use log::{debug, error, info, warn};
use thiserror::Error;

/// how many times one deal is proposed before it's left for the next cycle
pub const MAX_ATTEMPTS: u32 = 60;

/// what happened to a deal that didn't fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Created(StartedDeal),
    /// swan already has a deal cid for it, nothing to do
    AlreadySubmitted,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid input for deal {deal_id}: {reason}")]
    InvalidInput { deal_id: DealID, reason: String },
    #[error("no lotus client for deal {deal_id}: {source}")]
    ClientUnavailable {
        deal_id: DealID,
        #[source]
        source: ChainError,
    },
    #[error("lotus rejected deal {deal_id} on attempt {attempt}: {source}")]
    Rejected {
        deal_id: DealID,
        attempt: u32,
        #[source]
        source: ChainError,
    },
    #[error("failed to send deal {deal_id} after {attempts} attempts")]
    Exhausted { deal_id: DealID, attempts: u32 },
}

/// why an attempt is worth repeating
#[derive(Debug)]
enum RetryReason {
    Validation(ConfigRejection),
    AlreadyTracking(String),
    NoDealCid,
}

/// where one attempt leaves the loop
#[derive(Debug)]
enum Verdict {
    Retry(RetryReason),
    Placed(StartedDeal),
    Fatal(SubmitError),
}

/// sort a start-deal result into retry, success or give up
fn classify(
    deal_id: DealID,
    attempt: u32,
    result: Result<StartDealResponse, ChainError>,
) -> Verdict {
    match result {
        Err(ChainError::AlreadyTracking(message)) => {
            Verdict::Retry(RetryReason::AlreadyTracking(message))
        }
        Err(source) => Verdict::Fatal(SubmitError::Rejected {
            deal_id,
            attempt,
            source,
        }),
        Ok(StartDealResponse {
            deal_cid: Some(deal_cid),
            start_epoch: Some(start_epoch),
        }) => Verdict::Placed(StartedDeal {
            deal_cid,
            start_epoch,
        }),
        Ok(_) => Verdict::Retry(RetryReason::NoDealCid),
    }
}

/// everything about a deal that holds for all of its attempts
struct PreparedDeal<'d> {
    deal: &'d AssignedDeal,
    payload_cid: Cid,
    piece_cid: Cid,
    economics: DealEconomics,
    terms: AutobidTerms,
}

/// places one assigned deal on chain, retrying the failures that can clear up on their own
pub struct DealSender<'a> {
    lotus: &'a LotusSettings,
    sender: &'a SenderSettings,
    connector: &'a dyn ChainConnector,
    clock: fn() -> ChainEpoch,
}

impl<'a> DealSender<'a> {
    pub fn new(
        lotus: &'a LotusSettings,
        sender: &'a SenderSettings,
        connector: &'a dyn ChainConnector,
    ) -> Self {
        Self {
            lotus,
            sender,
            connector,
            clock: piece_math::current_epoch,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> ChainEpoch) -> Self {
        self.clock = clock;
        self
    }

    pub async fn send_deal(&self, deal: &AssignedDeal) -> Result<Submission, SubmitError> {
        if let Some(existing) = deal.existing_deal_cid() {
            info!(
                "task:{}, deal:{} already has deal cid {}, skipping",
                deal.task_uuid, deal.id, existing
            );
            return Ok(Submission::AlreadySubmitted);
        }

        let prepared = self.prepare(deal).map_err(|reason| {
            error!(
                "task:{}, deal:{} can't be sent: {}",
                deal.task_uuid, deal.id, reason
            );
            SubmitError::InvalidInput {
                deal_id: deal.id,
                reason,
            }
        })?;
        debug!(
            "task:{}, deal:{}, piece size:{}, sector size:{}, cost:{}",
            deal.task_uuid,
            deal.id,
            prepared.economics.piece_size.0,
            prepared.economics.sector_size.0,
            prepared.economics.cost
        );

        for attempt in 0..MAX_ATTEMPTS {
            info!(
                "send deal for task:{}, deal:{}, attempt {}/{}",
                deal.task_uuid,
                deal.id,
                attempt + 1,
                MAX_ATTEMPTS
            );
            match self.attempt(&prepared, attempt).await {
                Verdict::Placed(started) => {
                    info!(
                        "task:{}, deal CID:{}, start epoch:{}, deal sent to {} successfully",
                        deal.task_uuid,
                        started.deal_cid,
                        started.start_epoch,
                        prepared.terms.miner_fid
                    );
                    return Ok(Submission::Created(started));
                }
                Verdict::Retry(reason) => {
                    warn!(
                        "task:{}, deal:{}, tried {} times: {:?}",
                        deal.task_uuid,
                        deal.id,
                        attempt + 1,
                        reason
                    );
                }
                Verdict::Fatal(err) => {
                    error!("task:{}, {}", deal.task_uuid, err);
                    return Err(err);
                }
            }
        }

        error!(
            "task:{}, deal:{}, failed to send deal after {} attempts",
            deal.task_uuid, deal.id, MAX_ATTEMPTS
        );
        Err(SubmitError::Exhausted {
            deal_id: deal.id,
            attempts: MAX_ATTEMPTS,
        })
    }

    /// checks that only need doing once. an Err here means no attempt will ever work.
    fn prepare<'d>(&self, deal: &'d AssignedDeal) -> Result<PreparedDeal<'d>, String> {
        let payload_cid: Cid = deal
            .payload_cid
            .trim()
            .parse()
            .map_err(|e| format!("payload cid {:?}: {}", deal.payload_cid, e))?;
        let piece_cid: Cid = deal
            .piece_cid
            .trim()
            .parse()
            .map_err(|e| format!("piece cid {:?}: {}", deal.piece_cid, e))?;
        let economics = piece_math::deal_economics(&deal.file_size, self.sender.price)
            .map_err(|e| e.to_string())?;
        let terms = AutobidTerms::for_deal(self.sender, deal, (self.clock)());
        Ok(PreparedDeal {
            deal,
            payload_cid,
            piece_cid,
            economics,
            terms,
        })
    }

    async fn attempt(&self, prepared: &PreparedDeal<'_>, attempt: u32) -> Verdict {
        let deal_id = prepared.deal.id;
        let config = DealConfig::build(self.sender, &prepared.terms);
        if let Err(rejection) = deal_config::check(self.sender, &config, (self.clock)()) {
            return Verdict::Retry(RetryReason::Validation(rejection));
        }

        let client = match self
            .connector
            .connect(&self.lotus.client_api_url, &self.lotus.client_access_token)
            .await
        {
            Ok(client) => client,
            Err(source) => {
                return Verdict::Fatal(SubmitError::ClientUnavailable { deal_id, source })
            }
        };

        let proposal = DealProposal {
            payload_cid: &prepared.payload_cid,
            piece_cid: &prepared.piece_cid,
            cost: prepared.economics.cost,
            piece_size: prepared.economics.piece_size,
            config: &config,
        };
        classify(deal_id, attempt, client.start_deal(&proposal, attempt).await)
    }
}
