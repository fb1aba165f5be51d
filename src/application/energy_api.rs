use crate::application::token_manager::TokenManager;
use crate::domain::models::{
    EnergyHistory, EnergySiteProduct, LiveStatus, PowerHistory, Product, SelfConsumptionHistory,
    Site, SiteStatus, TimePeriod, Token, Vehicle,
};
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::http::{HttpRequest, HttpTransport};
use crate::infrastructure::session_store::SessionStore;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const POWER_KIND: &str = "power";
const ENERGY_KIND: &str = "energy";
const SELF_CONSUMPTION_KIND: &str = "self_consumption";

/// Typed access to the vendor's energy-site endpoints. Every call is routed
/// through the bearer pipeline: authorise, perform, and retry exactly once
/// after a forced refresh when the first attempt comes back 401.
pub struct EnergyApi {
    config: ApiConfig,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenManager>,
    session: Arc<SessionStore>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct ProductsEnvelope {
    response: Vec<serde_json::Value>,
    count: usize,
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(payload).map_err(|error| ApiError::Decoding(error.to_string()))
}

fn decode_product(value: serde_json::Value) -> Result<Product, ApiError> {
    if value.get("vehicle_id").is_some() {
        serde_json::from_value::<Vehicle>(value)
            .map(Product::Vehicle)
            .map_err(|error| ApiError::Decoding(error.to_string()))
    } else if value.get("energy_site_id").is_some() {
        serde_json::from_value::<EnergySiteProduct>(value)
            .map(Product::EnergySite)
            .map_err(|error| ApiError::Decoding(error.to_string()))
    } else {
        Err(ApiError::Decoding("unsupported product type".to_string()))
    }
}

impl EnergyApi {
    pub fn new(
        config: ApiConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenManager>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
            session,
        }
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        let url = self.endpoint(&["api", "1", "products"])?;
        let payload = self.authenticate_and_perform(HttpRequest::get(url)).await?;
        let envelope: ProductsEnvelope = decode(&payload)?;
        debug!(count = envelope.count, "fetched product list");
        envelope.response.into_iter().map(decode_product).collect()
    }

    pub async fn live_status(&self, site_id: i64) -> Result<LiveStatus, ApiError> {
        let url = self.site_endpoint(site_id, "live_status")?;
        let payload = self.authenticate_and_perform(HttpRequest::get(url)).await?;
        let envelope: Envelope<LiveStatus> = decode(&payload)?;
        Ok(envelope.response)
    }

    pub async fn site_status(&self, site_id: i64) -> Result<SiteStatus, ApiError> {
        let url = self.site_endpoint(site_id, "site_status")?;
        let payload = self.authenticate_and_perform(HttpRequest::get(url)).await?;
        let envelope: Envelope<SiteStatus> = decode(&payload)?;
        Ok(envelope.response)
    }

    pub async fn power_history(
        &self,
        site_id: i64,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<PowerHistory, ApiError> {
        let payload = self
            .calendar_history(site_id, POWER_KIND, None, end_date)
            .await?;
        let envelope: Envelope<PowerHistory> = decode(&payload)?;
        let mut history = envelope.response;
        history.time_series.sort_by_key(|sample| sample.timestamp);
        Ok(history)
    }

    pub async fn energy_history(
        &self,
        site_id: i64,
        period: TimePeriod,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<EnergyHistory, ApiError> {
        let payload = self
            .calendar_history(site_id, ENERGY_KIND, Some(period), end_date)
            .await?;
        let envelope: Envelope<EnergyHistory> = decode(&payload)?;
        Ok(envelope.response)
    }

    pub async fn self_consumption_history(
        &self,
        site_id: i64,
        period: TimePeriod,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<SelfConsumptionHistory, ApiError> {
        let payload = self
            .calendar_history(site_id, SELF_CONSUMPTION_KIND, Some(period), end_date)
            .await?;
        let envelope: Envelope<SelfConsumptionHistory> = decode(&payload)?;
        Ok(envelope.response)
    }

    /// The site all status/history calls are scoped to. Cached in the
    /// session store for the rest of the session; a logout clears it.
    pub async fn resolve_site(&self) -> Result<Site, ApiError> {
        if let Some(site) = self.session.site() {
            return Ok(site);
        }

        let products = self.list_products().await?;
        let site = products
            .into_iter()
            .find_map(|product| match product {
                Product::EnergySite(product) => Some(Site {
                    id: product.energy_site_id,
                    name: product.site_name,
                }),
                Product::Vehicle(_) => None,
            })
            .ok_or_else(|| {
                ApiError::Decoding("product list contains no energy site".to_string())
            })?;
        self.session.set_site(Some(site.clone()))?;
        Ok(site)
    }

    /// Attaches bearer authorisation, performs the call, and on a 401 only:
    /// forces one token refresh and retries exactly once. A second 401 is
    /// surfaced to the caller so the UI can force a logout.
    async fn authenticate_and_perform(&self, request: HttpRequest) -> Result<Vec<u8>, ApiError> {
        let token = self.tokens.access_token(false).await?;
        match self.perform(request.clone(), &token).await {
            Err(ApiError::HttpUnauthorised) => {
                debug!("request was unauthorised, retrying once after a forced refresh");
                let token = self.tokens.access_token(true).await?;
                self.perform(request, &token).await
            }
            other => other,
        }
    }

    async fn perform(&self, request: HttpRequest, token: &Token) -> Result<Vec<u8>, ApiError> {
        self.transport
            .execute(request.with_bearer(&token.auth))
            .await?
            .into_body()
    }

    async fn calendar_history(
        &self,
        site_id: i64,
        kind: &str,
        period: Option<TimePeriod>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>, ApiError> {
        let mut url = self.site_endpoint(site_id, "calendar_history")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("kind", kind);
            if let Some(period) = period {
                pairs.append_pair("period", period.as_str());
            }
            if let Some(end_date) = end_date {
                pairs.append_pair(
                    "end_date",
                    &end_date.to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            }
        }
        self.authenticate_and_perform(HttpRequest::get(url)).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.config.api_base_url()?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Config("api base url cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn site_endpoint(&self, site_id: i64, leaf: &str) -> Result<Url, ApiError> {
        self.endpoint(&["api", "1", "energy_sites", &site_id.to_string(), leaf])
    }
}
