use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::token::AccessToken;
use crate::config::ResourceConfig;
use crate::error::RecordError;
use crate::http_client::{HttpClient, HttpResponse};

pub mod labels;
pub mod models;
pub mod query;

pub use labels::CaseMetrics;
pub use models::{AccountRef, Case, ContactRef, Record, RecordFilter, RecordKind, SalesOrder};

use models::{ODataCollection, ODataErrorBody};

/// Longest slice of an unparseable error body kept in the error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Client for the Dynamics Web API.
///
/// Holds the resource settings and the single current bearer token. Nothing
/// is sent until both are installed.
pub struct RecordApiClient {
    http: Arc<dyn HttpClient>,
    resource: RwLock<Option<ResourceConfig>>,
    token: RwLock<Option<AccessToken>>,
}

impl RecordApiClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            resource: RwLock::new(None),
            token: RwLock::new(None),
        }
    }

    /// Point the client at a Web API root
    pub async fn initialize(&self, resource: ResourceConfig) {
        info!(base_url = %resource.base_url, "Record API client initialized");
        *self.resource.write().await = Some(resource);
    }

    /// Install the bearer token, replacing any previous one
    pub async fn set_access_token(&self, token: AccessToken) -> Result<(), RecordError> {
        if token.is_blank() {
            warn!("Refusing to install an empty access token");
            return Err(RecordError::InvalidToken);
        }
        debug!(expires_on = ?token.expires_on(), "Access token installed");
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// Drop the current token
    pub async fn clear_token(&self) {
        self.token.write().await.take();
    }

    /// Drop the token and the resource settings
    pub async fn clear(&self) {
        self.token.write().await.take();
        self.resource.write().await.take();
        debug!("Record API client cleared");
    }

    /// True when a token is installed and not yet expired
    pub async fn has_valid_token(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }

    pub async fn is_initialized(&self) -> bool {
        self.resource.read().await.is_some()
    }

    /// List records of the given kind, newest first
    pub async fn fetch_records(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, RecordError> {
        Ok(match kind {
            RecordKind::Cases => self
                .fetch_cases(filter)
                .await?
                .into_iter()
                .map(Record::Case)
                .collect(),
            RecordKind::SalesOrders => self
                .fetch_sales_orders(filter)
                .await?
                .into_iter()
                .map(Record::SalesOrder)
                .collect(),
        })
    }

    pub async fn fetch_cases(&self, filter: &RecordFilter) -> Result<Vec<Case>, RecordError> {
        self.fetch_collection(RecordKind::Cases, filter).await
    }

    pub async fn fetch_sales_orders(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<SalesOrder>, RecordError> {
        self.fetch_collection(RecordKind::SalesOrders, filter).await
    }

    /// Look up one case; `None` when it does not exist
    pub async fn fetch_case(&self, id: Uuid) -> Result<Option<Case>, RecordError> {
        let (base_url, headers) = self.request_context().await?;
        let url = query::record_url(&base_url, RecordKind::Cases, id);

        let response = self.send(&url, headers).await?;
        if response.status() == 404 {
            debug!(case_id = %id, "Case not found");
            return Ok(None);
        }
        Self::decode(&response).map(Some)
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> Result<Vec<T>, RecordError> {
        let (base_url, headers) = self.request_context().await?;
        let url = query::collection_url(&base_url, kind, filter);

        let response = self.send(&url, headers).await?;
        let collection: ODataCollection<T> = Self::decode(&response)?;

        debug!(
            entity_set = kind.entity_set(),
            count = collection.value.len(),
            "Fetched records"
        );
        Ok(collection.value)
    }

    /// Base URL and headers for a request, failing before any I/O when
    /// the client is not ready
    async fn request_context(&self) -> Result<(String, HashMap<String, String>), RecordError> {
        let base_url = self
            .resource
            .read()
            .await
            .as_ref()
            .map(|r| r.base_url.clone())
            .ok_or(RecordError::NotInitialized {
                missing: "resource base URL",
            })?;

        let token = self.token.read().await.clone().ok_or(RecordError::NotInitialized {
            missing: "access token",
        })?;
        if token.is_expired() {
            return Err(RecordError::TokenExpired);
        }

        let headers = HashMap::from([
            ("Authorization".to_string(), format!("Bearer {}", token.secret())),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            ("OData-MaxVersion".to_string(), "4.0".to_string()),
            ("OData-Version".to_string(), "4.0".to_string()),
            (
                "Prefer".to_string(),
                "odata.include-annotations=\"*\"".to_string(),
            ),
        ]);

        Ok((base_url, headers))
    }

    async fn send(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<HttpResponse, RecordError> {
        self.http.get(url, headers).await.map_err(|e| {
            warn!(error = %e, "Record API request failed");
            RecordError::Transport {
                reason: e.to_string(),
            }
        })
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, RecordError> {
        if !response.is_success() {
            let message = match response.json::<ODataErrorBody>() {
                Ok(body) => match body.error.code {
                    Some(code) => format!("{} ({code})", body.error.message),
                    None => body.error.message,
                },
                Err(_) => response.body().chars().take(MAX_ERROR_BODY_CHARS).collect(),
            };
            warn!(status = response.status(), message = %message, "Record API returned an error");
            return Err(RecordError::Api {
                status: response.status(),
                message,
            });
        }

        response.json().map_err(|e| RecordError::Decode {
            reason: format!("{e:#}"),
        })
    }
}
