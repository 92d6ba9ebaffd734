//! Bybit long/short account ratio client.

use crate::markets::UpstreamError;
use crate::retrieve::{ApiClient, FetchError};
use crate::validation::{validate, BybitRatioResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com/";
/// Bucket size requested from the ratio endpoint.
pub const RATIO_PERIOD: &str = "5min";

pub struct Bybit {
    api: ApiClient,
}

impl Bybit {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    /// `GET v5/market/account-ratio` for a linear perpetual.
    ///
    /// Returns the validated envelope as is; `retCode` and list emptiness are
    /// judged by the caller.
    pub async fn account_ratio(&self, symbol: &str) -> Result<BybitRatioResponse, UpstreamError> {
        let raw = self
            .api
            .get_json(
                "v5/market/account-ratio",
                &[("category", "linear"), ("symbol", symbol), ("period", RATIO_PERIOD)],
            )
            .await?;
        Ok(validate::<BybitRatioResponse>(&raw)?)
    }
}
