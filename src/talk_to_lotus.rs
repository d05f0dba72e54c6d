use crate::deal_config::DealConfig;
use crate::types::{ChainEpoch, PieceSize};
use async_trait::async_trait;
use cid::Cid;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const JSON_RPC_ID: u64 = 7878;
const ATTO_FIL_PER_FIL: u64 = 1_000_000_000_000_000_000;
/// what lotus says when it already has a proposal with the same identity in flight
const ALREADY_TRACKING: &str = "already tracking identifier";

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("lotus node at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("lotus is already tracking this deal: {0}")]
    AlreadyTracking(String),
    #[error("lotus rpc error, code:{code}, message:{message}")]
    Rpc { code: i64, message: String },
    #[error("http error talking to lotus")]
    Transport(#[from] reqwest::Error),
    #[error("lotus sent something we can't read: {0}")]
    MalformedResponse(String),
    #[error("can't build a proposal: {0}")]
    InvalidProposal(String),
}

impl ChainError {
    /// lotus only tells us about duplicate proposals in the message text,
    /// so sort that out here once
    fn from_rpc(err: RpcError) -> Self {
        if err.message.contains(ALREADY_TRACKING) {
            ChainError::AlreadyTracking(err.message)
        } else {
            ChainError::Rpc {
                code: err.code,
                message: err.message,
            }
        }
    }
}

/// everything one ClientStartDeal call needs besides the attempt number
#[derive(Debug, Clone)]
pub struct DealProposal<'a> {
    pub payload_cid: &'a Cid,
    pub piece_cid: &'a Cid,
    /// FIL, from the piece math
    pub cost: Decimal,
    pub piece_size: PieceSize,
    pub config: &'a DealConfig,
}

/// lotus can accept a proposal and still not hand back a deal cid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartDealResponse {
    pub deal_cid: Option<Cid>,
    pub start_epoch: Option<ChainEpoch>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `attempt` makes each retry a distinct proposal on chain
    async fn start_deal(
        &self,
        proposal: &DealProposal<'_>,
        attempt: u32,
    ) -> Result<StartDealResponse, ChainError>;
}

#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(
        &self,
        api_url: &str,
        access_token: &str,
    ) -> Result<Box<dyn ChainClient>, ChainError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct CidLink {
    #[serde(rename = "/")]
    cid: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
struct DataRef {
    transfer_type: &'static str,
    root: CidLink,
    piece_cid: CidLink,
    piece_size: u64,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
struct StartDealParams {
    data: DataRef,
    wallet: String,
    miner: String,
    epoch_price: String,
    min_blocks_duration: i64,
    deal_start_epoch: i64,
    fast_retrieval: bool,
    verified_deal: bool,
}

/// lotus wants the price in attoFIL, as an integer string
fn epoch_price(cost: Decimal) -> Result<String, ChainError> {
    let atto = cost
        .checked_mul(Decimal::from(ATTO_FIL_PER_FIL))
        .ok_or_else(|| ChainError::InvalidProposal(format!("cost {cost} overflows attoFIL")))?;
    Ok(atto.trunc().normalize().to_string())
}

/// each attempt moves the start epoch back by one so lotus sees a fresh proposal
fn start_deal_params(
    proposal: &DealProposal<'_>,
    attempt: u32,
) -> Result<StartDealParams, ChainError> {
    let config = proposal.config;
    let deal_start_epoch = config.start_epoch - ChainEpoch(i64::from(attempt));
    Ok(StartDealParams {
        data: DataRef {
            transfer_type: "manual",
            root: CidLink {
                cid: proposal.payload_cid.to_string(),
            },
            piece_cid: CidLink {
                cid: proposal.piece_cid.to_string(),
            },
            piece_size: proposal.piece_size.0,
        },
        wallet: config.sender_wallet.clone(),
        miner: config.miner_fid.clone(),
        epoch_price: epoch_price(proposal.cost)?,
        min_blocks_duration: config.duration,
        deal_start_epoch: deal_start_epoch.0,
        fast_retrieval: config.fast_retrieval,
        verified_deal: config.verified_deal,
    })
}

pub struct LotusClient {
    http: reqwest::Client,
    api_url: reqwest::Url,
    access_token: String,
}

impl LotusClient {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: JSON_RPC_ID,
        };
        let mut builder = self.http.post(self.api_url.clone()).json(&request);
        if !self.access_token.is_empty() {
            builder = builder.bearer_auth(&self.access_token);
        }
        let response: RpcResponse<T> = builder.send().await?.error_for_status()?.json().await?;
        match response.error {
            Some(err) => Err(ChainError::from_rpc(err)),
            None => Ok(response.result),
        }
    }
}

#[async_trait]
impl ChainClient for LotusClient {
    async fn start_deal(
        &self,
        proposal: &DealProposal<'_>,
        attempt: u32,
    ) -> Result<StartDealResponse, ChainError> {
        let params = start_deal_params(proposal, attempt)?;
        let start_epoch = ChainEpoch(params.deal_start_epoch);
        let result: Option<CidLink> = self
            .call("Filecoin.ClientStartDeal", json!([params]))
            .await?;
        let Some(link) = result else {
            return Ok(StartDealResponse::default());
        };
        let deal_cid: Cid = link
            .cid
            .parse()
            .map_err(|e| ChainError::MalformedResponse(format!("deal cid {:?}: {e}", link.cid)))?;
        Ok(StartDealResponse {
            deal_cid: Some(deal_cid),
            start_epoch: Some(start_epoch),
        })
    }
}

/// hands out lotus clients that have answered a version request
pub struct LotusConnector {
    timeout: Duration,
}

impl LotusConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ChainConnector for LotusConnector {
    async fn connect(
        &self,
        api_url: &str,
        access_token: &str,
    ) -> Result<Box<dyn ChainClient>, ChainError> {
        let unreachable = |reason: String| ChainError::Unreachable {
            url: api_url.to_string(),
            reason,
        };
        let api_url = reqwest::Url::parse(api_url).map_err(|e| unreachable(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| unreachable(e.to_string()))?;
        let client = LotusClient {
            http,
            api_url,
            access_token: access_token.to_string(),
        };
        let version: Option<Value> = client
            .call("Filecoin.Version", json!([]))
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if version.is_none() {
            return Err(unreachable("empty version response".into()));
        }
        Ok(Box::new(client))
    }
}
