use cid::Cid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// the coordinator's id for an offline deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct DealID(pub u64);

impl fmt::Display for DealID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// filecoin epochs are signed on chain, so we keep them signed too
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChainEpoch(pub i64);

impl Add for ChainEpoch {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        ChainEpoch(self.0 + other.0)
    }
}

impl Sub for ChainEpoch {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        ChainEpoch(self.0 - other.0)
    }
}

impl fmt::Display for ChainEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// unpadded piece size in bytes, what lotus wants in the proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PieceSize(pub u64);

/// padded (power of two) sector size in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SectorSize(pub u64);

/// offline deal statuses we read from or write to swan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealStatus {
    Assigned,
    Created,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Assigned => "Assigned",
            DealStatus::Created => "Created",
        }
    }
}

/// a deal swan has matched to our miner and wants us to propose on chain.
/// owned by swan, we only hold it for the duration of one cycle.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssignedDeal {
    pub id: DealID,
    pub task_uuid: String,
    pub payload_cid: String,
    pub piece_cid: String,
    /// decimal string, straight from swan
    pub file_size: String,
    pub miner_fid: String,
    #[serde(default)]
    pub deal_cid: Option<String>,
}

impl AssignedDeal {
    /// the deal cid swan already has for this deal, if any. whitespace doesn't count.
    pub fn existing_deal_cid(&self) -> Option<&str> {
        self.deal_cid
            .as_deref()
            .map(str::trim)
            .filter(|cid| !cid.is_empty())
    }
}

/// what lotus handed back once it accepted a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedDeal {
    pub deal_cid: Cid,
    pub start_epoch: ChainEpoch,
}

/// body of the swan offline deal update
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub deal_id: DealID,
    pub deal_cid: Option<String>,
    pub start_epoch: Option<ChainEpoch>,
    pub status: DealStatus,
}

impl StatusUpdate {
    pub fn created(deal_id: DealID, started: &StartedDeal) -> Self {
        Self {
            deal_id,
            deal_cid: Some(started.deal_cid.to_string()),
            start_epoch: Some(started.start_epoch),
            status: DealStatus::Created,
        }
    }
}
