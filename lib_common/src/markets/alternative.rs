//! alternative.me Fear & Greed index client.

use crate::markets::UpstreamError;
use crate::retrieve::{ApiClient, FetchError};
use crate::validation::{validate, FearGreedResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.alternative.me/";

pub struct AlternativeMe {
    api: ApiClient,
}

impl AlternativeMe {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    /// `GET fng/`. The newest reading is `data[0]`.
    pub async fn fear_greed(&self) -> Result<FearGreedResponse, UpstreamError> {
        let raw = self.api.get_json("fng/", &[]).await?;
        Ok(validate::<FearGreedResponse>(&raw)?)
    }
}
