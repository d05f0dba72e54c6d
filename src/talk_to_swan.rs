use crate::settings::SwanSettings;
use crate::types::{AssignedDeal, DealStatus, StatusUpdate};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SWAN_SUCCESS: &str = "success";

/// the swan side of things: who wants what deal, and what happened to it
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn list_deals(&self, status: DealStatus) -> Result<Vec<AssignedDeal>>;
    async fn update_deal(&self, update: &StatusUpdate) -> Result<()>;
}

/// every swan response comes wrapped like this
#[derive(Deserialize, Debug)]
struct SwanResponse<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> SwanResponse<T> {
    fn into_data(self, what: &str) -> Result<Option<T>> {
        if self.status != SWAN_SUCCESS {
            return Err(anyhow!(
                "swan refused to {}: {}",
                what,
                self.message.unwrap_or(self.status)
            ));
        }
        Ok(self.data)
    }
}

#[derive(Deserialize, Debug)]
struct DealList {
    #[serde(default)]
    deal: Option<Vec<AssignedDeal>>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    apikey: &'a str,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct LoginData {
    jwt: String,
}

pub struct SwanClient {
    http: reqwest::Client,
    api_url: String,
    jwt: String,
}

impl SwanClient {
    /// use the configured jwt if there is one, otherwise trade the api key for one
    pub async fn login(settings: &SwanSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("couldn't build the swan http client")?;
        let api_url = settings.api_url.trim_end_matches('/').to_string();
        let jwt = match settings.jwt.as_deref().filter(|jwt| !jwt.is_empty()) {
            Some(jwt) => jwt.to_string(),
            None => {
                let response: SwanResponse<LoginData> = http
                    .post(format!("{}/user/api_keys/jwt", api_url))
                    .json(&LoginRequest {
                        apikey: &settings.api_key,
                        access_token: &settings.access_token,
                    })
                    .send()
                    .await
                    .context("couldn't reach swan to log in")?
                    .json()
                    .await
                    .context("swan login response was unreadable")?;
                response
                    .into_data("log in")?
                    .ok_or_else(|| anyhow!("swan login returned no jwt"))?
                    .jwt
            }
        };
        Ok(Self { http, api_url, jwt })
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Option<T>> {
        let response: SwanResponse<T> = request
            .bearer_auth(&self.jwt)
            .send()
            .await
            .with_context(|| format!("couldn't reach swan to {}", what))?
            .json()
            .await
            .with_context(|| format!("unreadable swan response to {}", what))?;
        response.into_data(what)
    }
}

#[async_trait]
impl Coordinator for SwanClient {
    async fn list_deals(&self, status: DealStatus) -> Result<Vec<AssignedDeal>> {
        let request = self
            .http
            .get(format!("{}/offline_deals/get_by_status", self.api_url))
            .query(&[("deal_status", status.as_str())]);
        let deals = self
            .read::<DealList>(request, "list deals")
            .await?
            .and_then(|list| list.deal)
            .unwrap_or_default();
        debug!("swan has {} {} deals", deals.len(), status.as_str());
        Ok(deals)
    }

    async fn update_deal(&self, update: &StatusUpdate) -> Result<()> {
        let request = self
            .http
            .put(format!("{}/offline_deals/{}", self.api_url, update.deal_id))
            .json(update);
        self.read::<serde_json::Value>(request, "update deal").await?;
        Ok(())
    }
}
