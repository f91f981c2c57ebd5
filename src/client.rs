use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{AppError, BoxError, Endpoint, Result};
use crate::geo::RegionQuery;
use crate::heatmap::SightingFilter;
use crate::record::{
    Checklist, ChecklistPayload, ChecklistsEnvelope, Contributor, DataEnvelope, LoginStatus,
    Sighting, SightingsEnvelope, SpeciesEntry, TrendPoint,
};

const MAX_BACKOFF_MS: u64 = 60_000;

/// The Bird-Watcher backend, one method per endpoint.
pub trait BirdApi: Send + Sync {
    fn check_login(&self) -> impl Future<Output = Result<bool>> + Send;

    fn species(&self, region: &RegionQuery)
    -> impl Future<Output = Result<Vec<SpeciesEntry>>> + Send;

    fn trends(
        &self,
        region: &RegionQuery,
        species: &str,
    ) -> impl Future<Output = Result<Vec<TrendPoint>>> + Send;

    fn contributors(
        &self,
        region: &RegionQuery,
    ) -> impl Future<Output = Result<Vec<Contributor>>> + Send;

    fn sightings(
        &self,
        filter: &SightingFilter,
    ) -> impl Future<Output = Result<Vec<Sighting>>> + Send;

    /// A single checklist, as loaded by the edit form.
    fn checklist(&self, id: &str) -> impl Future<Output = Result<Checklist>> + Send;

    /// All checklists of the logged-in user.
    fn my_checklists(&self) -> impl Future<Output = Result<Vec<Checklist>>> + Send;

    fn submit(&self, payload: &ChecklistPayload) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// [`BirdApi`] over HTTP.
///
/// GET requests are retried with exponential backoff and jitter on rate
/// limiting, server errors and transport failures. POST and DELETE are sent
/// exactly once.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    config: Config,
}

impl HttpApi {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.config.endpoint_url(endpoint);
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let base_ms = self.config.base_delay.as_millis() as u64;
                let backoff_delay = Duration::from_millis(
                    backoff_ms(base_ms, attempt)
                        .saturating_add(rand::rng().random_range(0..base_ms.max(1))),
                );
                info!(
                    "Retrying {endpoint} (attempt {}) after {}ms delay",
                    attempt + 1,
                    backoff_delay.as_millis()
                );
                sleep(backoff_delay).await;
            }

            debug!("GET {url} {query:?}");
            let failure: BoxError = match self.client.get(&url).query(query).send().await {
                Ok(response) => match response.status() {
                    status if status.is_success() => {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| AppError::network(endpoint, e));
                    }
                    status if is_retryable(status) => format!("HTTP {status}").into(),
                    status => {
                        return Err(AppError::network(endpoint, format!("HTTP {status}")));
                    }
                },
                Err(e) => e.into(),
            };

            if attempt >= max_retries {
                return Err(AppError::Network {
                    endpoint,
                    source: failure,
                });
            }
            warn!("Request to {endpoint} failed, retrying...: {failure}");
            attempt += 1;
        }
    }

    fn delete_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint_url(Endpoint::Delete))
            .map_err(|e| AppError::network(Endpoint::Delete, e))?;
        url.path_segments_mut()
            .map_err(|()| AppError::network(Endpoint::Delete, "base URL cannot take a path"))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}

/// Exponential backoff before retry `attempt`, capped at [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2_u64
        .checked_pow(attempt)
        .map_or(u64::MAX, |factor| factor.saturating_mul(base_ms))
        .min(MAX_BACKOFF_MS)
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl BirdApi for HttpApi {
    async fn check_login(&self) -> Result<bool> {
        let status: LoginStatus = self.get_json(Endpoint::CheckLogin, &[]).await?;
        Ok(status.logged_in)
    }

    async fn species(&self, region: &RegionQuery) -> Result<Vec<SpeciesEntry>> {
        let envelope: DataEnvelope<SpeciesEntry> =
            self.get_json(Endpoint::Species, &region.params()).await?;
        Ok(envelope.into_rows())
    }

    async fn trends(&self, region: &RegionQuery, species: &str) -> Result<Vec<TrendPoint>> {
        let mut query = region.params();
        query.push(("species_name", species.to_string()));
        let envelope: DataEnvelope<TrendPoint> = self.get_json(Endpoint::Trends, &query).await?;
        Ok(envelope.into_rows())
    }

    async fn contributors(&self, region: &RegionQuery) -> Result<Vec<Contributor>> {
        let envelope: DataEnvelope<Contributor> =
            self.get_json(Endpoint::Contributors, &region.params()).await?;
        Ok(envelope.into_rows())
    }

    async fn sightings(&self, filter: &SightingFilter) -> Result<Vec<Sighting>> {
        let envelope: SightingsEnvelope =
            self.get_json(Endpoint::Sightings, &filter.params()).await?;
        Ok(envelope.sightings)
    }

    async fn checklist(&self, id: &str) -> Result<Checklist> {
        let envelope: ChecklistsEnvelope = self
            .get_json(Endpoint::Checklists, &[("edit_id", id.to_string())])
            .await?;
        envelope
            .checklists
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ChecklistNotFound(id.to_string()))
    }

    async fn my_checklists(&self) -> Result<Vec<Checklist>> {
        let envelope: ChecklistsEnvelope = self.get_json(Endpoint::Checklists, &[]).await?;
        Ok(envelope.checklists)
    }

    async fn submit(&self, payload: &ChecklistPayload) -> Result<()> {
        let url = self.config.endpoint_url(Endpoint::Submit);
        debug!("POST {url}");
        self.client
            .post(&url)
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::network(Endpoint::Submit, e))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.delete_url(id)?;
        debug!("DELETE {url}");
        self.client
            .delete(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::network(Endpoint::Delete, e))?;
        Ok(())
    }
}
