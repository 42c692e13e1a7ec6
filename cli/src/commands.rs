//! CLI Commands

use orakel_core::{AccAddress, Denom, ExchangeRate, Period, ValAddress};
use orakel_oracle::{
    MsgDelegateFeedConsent, MsgExchangeRatePrevote, MsgExchangeRateVote, OracleMsg, SignedMsg,
    MAX_SALT_LEN,
};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// API Client for interacting with an ORAKEL node
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp: ApiResponse<T> = self.client.get(self.url(path)).send().await?.json().await?;
        resp.into_result()
    }

    /// Get node status
    pub async fn status(&self) -> Result<NodeStatus, ApiError> {
        self.get("/status").await
    }

    /// Submit a signed oracle message
    pub async fn submit(&self, tx: &SignedMsg) -> Result<TransactionResponse, ApiError> {
        let resp: ApiResponse<TransactionResponse> = self
            .client
            .post(self.url("/tx"))
            .json(tx)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result()
    }

    /// Get transaction status
    pub async fn get_transaction(&self, tx_id: &str) -> Result<TransactionResponse, ApiError> {
        self.get(&format!("/tx/{}", tx_id)).await
    }

    pub async fn get_rate(&self, denom: &str) -> Result<RateInfo, ApiError> {
        self.get(&format!("/oracle/rates/{}", denom)).await
    }

    pub async fn get_rates(&self) -> Result<BTreeMap<String, RateEntry>, ApiError> {
        self.get("/oracle/rates").await
    }

    pub async fn get_feeder(&self, validator: &str) -> Result<FeederInfo, ApiError> {
        self.get(&format!("/oracle/feeder/{}", validator)).await
    }

    pub async fn get_misses(
        &self,
        validator: &str,
        window: Option<u64>,
    ) -> Result<MissesInfo, ApiError> {
        let path = match window {
            Some(w) => format!("/oracle/misses/{}?window={}", validator, w),
            None => format!("/oracle/misses/{}", validator),
        };
        self.get(&path).await
    }
}

/// API response wrapper
#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ApiError> {
        if self.success {
            self.data.ok_or(ApiError::EmptyResponse)
        } else {
            Err(ApiError::Server(self.error.unwrap_or_default()))
        }
    }
}

/// Node status
#[derive(Debug, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub chain_id: String,
    pub height: u64,
    pub period: u64,
    pub last_tallied_period: Option<u64>,
    pub state_version: u64,
    pub state_root: String,
    pub mempool_size: usize,
    pub validator_count: usize,
    pub total_power: u128,
}

/// Published rate of a denom
#[derive(Debug, Deserialize)]
pub struct RateEntry {
    pub exchange_rate: ExchangeRate,
    pub period: Option<Period>,
}

#[derive(Debug, Deserialize)]
pub struct RateInfo {
    pub denom: String,
    pub exchange_rate: ExchangeRate,
    pub period: Option<Period>,
}

#[derive(Debug, Deserialize)]
pub struct FeederInfo {
    pub validator: String,
    pub feeder: String,
}

#[derive(Debug, Deserialize)]
pub struct MissesInfo {
    pub validator: String,
    pub window: u64,
    pub misses: u64,
}

/// Transaction response
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub tx_id: String,
    pub status: String,
    pub receipt: Option<serde_json::Value>,
}

/// API Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Empty response")]
    EmptyResponse,
}

/// Random hex salt of the maximum accepted length
pub fn generate_salt() -> String {
    let bytes: [u8; MAX_SALT_LEN / 2] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// The reveal a feeder must keep until the next period
pub fn build_vote(
    rate: ExchangeRate,
    salt: &str,
    denom: &str,
    feeder: Option<&str>,
    validator: &str,
) -> MsgExchangeRateVote {
    let validator = ValAddress::new(validator);
    let feeder = feeder
        .map(AccAddress::new)
        .unwrap_or_else(|| validator.to_account());
    MsgExchangeRateVote::new(rate, salt, Denom::new(denom), feeder, validator)
}

pub fn prevote_tx(vote: &MsgExchangeRateVote) -> SignedMsg {
    SignedMsg::by_expected(OracleMsg::Prevote(MsgExchangeRatePrevote::for_vote(vote)))
}

pub fn vote_tx(vote: MsgExchangeRateVote) -> SignedMsg {
    SignedMsg::by_expected(OracleMsg::Vote(vote))
}

pub fn delegate_tx(validator: &str, delegate: &str) -> SignedMsg {
    SignedMsg::by_expected(OracleMsg::DelegateFeedConsent(MsgDelegateFeedConsent::new(
        ValAddress::new(validator),
        AccAddress::new(delegate),
    )))
}
