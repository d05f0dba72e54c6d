//! in-memory stand-ins for lotus and swan, plus fixtures

use crate::settings::{LotusSettings, SenderSettings};
use crate::talk_to_lotus::{
    ChainClient, ChainConnector, ChainError, DealProposal, StartDealResponse,
};
use crate::talk_to_swan::Coordinator;
use crate::types::{AssignedDeal, ChainEpoch, DealID, DealStatus, StatusUpdate};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cid::multihash::Multihash;
use cid::Cid;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_EPOCH: ChainEpoch = ChainEpoch(3_000_000);

pub fn test_clock() -> ChainEpoch {
    TEST_EPOCH
}

/// a v1 raw cid with a fake sha2-256 digest filled with `seed`
pub fn test_cid(seed: u8) -> String {
    let digest = Multihash::<64>::wrap(0x12, &[seed; 32]).unwrap();
    Cid::new_v1(0x55, digest).to_string()
}

pub fn assigned_deal(id: u64) -> AssignedDeal {
    AssignedDeal {
        id: DealID(id),
        task_uuid: format!("task-{id}"),
        payload_cid: test_cid(id as u8),
        piece_cid: test_cid(id as u8 + 100),
        file_size: "1073741824".into(),
        miner_fid: "f01234".into(),
        deal_cid: None,
    }
}

pub fn lotus_settings() -> LotusSettings {
    LotusSettings {
        client_api_url: "http://127.0.0.1:1234/rpc/v0".into(),
        client_access_token: "lotus-token".into(),
        request_timeout_secs: 5,
    }
}

pub fn sender_settings() -> SenderSettings {
    SenderSettings {
        output_dir: PathBuf::from("/tmp/autobid-test"),
        wallet: "f3sender".into(),
        verified_deal: false,
        fast_retrieval: true,
        skip_confirmation: true,
        price: Decimal::ZERO,
        max_price: Decimal::from_str("0.0005").unwrap(),
        start_epoch_hours: 96,
        duration: 1_512_000,
    }
}

type Responder =
    dyn Fn(&DealProposal<'_>, u32) -> Result<StartDealResponse, ChainError> + Send + Sync;

/// one record per start_deal call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCall {
    pub payload_cid: String,
    pub attempt: u32,
}

#[derive(Default)]
struct ChainLog {
    connects: AtomicU32,
    starts: Mutex<Vec<StartCall>>,
}

/// a lotus that answers with whatever the test scripts
pub struct FakeChain {
    responder: Arc<Responder>,
    /// 0-based connect calls that should fail
    failing_connects: Vec<u32>,
    log: Arc<ChainLog>,
}

impl FakeChain {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&DealProposal<'_>, u32) -> Result<StartDealResponse, ChainError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Arc::new(responder),
            failing_connects: Vec::new(),
            log: Arc::default(),
        }
    }

    /// accepts everything on the first try
    pub fn accepting() -> Self {
        Self::new(|proposal, attempt| Ok(placed(proposal, attempt)))
    }

    pub fn failing_connects(mut self, calls: &[u32]) -> Self {
        self.failing_connects = calls.to_vec();
        self
    }

    pub fn connects(&self) -> u32 {
        self.log.connects.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> Vec<StartCall> {
        self.log.starts.lock().unwrap().clone()
    }
}

/// what a happy lotus returns
pub fn placed(proposal: &DealProposal<'_>, attempt: u32) -> StartDealResponse {
    StartDealResponse {
        deal_cid: Some(test_cid(200).parse().unwrap()),
        start_epoch: Some(proposal.config.start_epoch - ChainEpoch(i64::from(attempt))),
    }
}

pub fn already_tracking() -> ChainError {
    ChainError::AlreadyTracking("already tracking identifier: deal proposal".into())
}

struct FakeChainClient {
    responder: Arc<Responder>,
    log: Arc<ChainLog>,
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn start_deal(
        &self,
        proposal: &DealProposal<'_>,
        attempt: u32,
    ) -> Result<StartDealResponse, ChainError> {
        self.log.starts.lock().unwrap().push(StartCall {
            payload_cid: proposal.payload_cid.to_string(),
            attempt,
        });
        (self.responder)(proposal, attempt)
    }
}

#[async_trait]
impl ChainConnector for FakeChain {
    async fn connect(
        &self,
        api_url: &str,
        _access_token: &str,
    ) -> Result<Box<dyn ChainClient>, ChainError> {
        let call = self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing_connects.contains(&call) {
            return Err(ChainError::Unreachable {
                url: api_url.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(FakeChainClient {
            responder: self.responder.clone(),
            log: self.log.clone(),
        }))
    }
}

/// a swan with a fixed list of assigned deals
#[derive(Default)]
pub struct FakeSwan {
    pub deals: Vec<AssignedDeal>,
    pub list_fails: bool,
    pub failing_updates: Vec<DealID>,
    pub update_calls: Mutex<Vec<StatusUpdate>>,
}

impl FakeSwan {
    pub fn with_deals(deals: Vec<AssignedDeal>) -> Self {
        Self {
            deals,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.update_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Coordinator for FakeSwan {
    async fn list_deals(&self, status: DealStatus) -> Result<Vec<AssignedDeal>> {
        if self.list_fails {
            return Err(anyhow!("swan is down"));
        }
        assert_eq!(status, DealStatus::Assigned);
        Ok(self.deals.clone())
    }

    async fn update_deal(&self, update: &StatusUpdate) -> Result<()> {
        self.update_calls.lock().unwrap().push(update.clone());
        if self.failing_updates.contains(&update.deal_id) {
            return Err(anyhow!("swan rejected update for {}", update.deal_id));
        }
        Ok(())
    }
}
