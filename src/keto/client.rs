//! # Keto Client
//!
//! [`AcpEngine`] over the Keto admin REST API.
//!
//! ## Endpoints
//!
//! - `GET    /engines/acp/ory/{flavour}/{policies|roles}/{id}` - 200, 404 when missing
//! - `GET    /engines/acp/ory/{flavour}/{policies|roles}` - 200
//! - `PUT    /engines/acp/ory/{flavour}/{policies|roles}` - 200
//! - `DELETE /engines/acp/ory/{flavour}/{policies|roles}/{id}` - 204, 404 when missing

use crate::config::ControllerConfig;
use crate::keto::{AcpEngine, EngineError, Flavour, PolicyDocument, RoleDocument};
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};

const FORWARDED_PROTO: &str = "X-Forwarded-Proto";
const APPLICATION_JSON: &str = "application/json";

/// Document collections of the ACP engine
#[derive(Debug, Clone, Copy)]
enum Collection {
    Policies,
    Roles,
}

impl Collection {
    fn segment(self) -> &'static str {
        match self {
            Collection::Policies => "policies",
            Collection::Roles => "roles",
        }
    }

    /// Metric and span label
    fn label(self) -> &'static str {
        match self {
            Collection::Policies => "policy",
            Collection::Roles => "role",
        }
    }
}

/// HTTP client for the Keto ACP engine
#[derive(Debug, Clone)]
pub struct KetoClient {
    http_client: reqwest::Client,
    base_url: Url,
    forwarded_proto: Option<String>,
    origin: Option<String>,
}

impl KetoClient {
    /// Create a client for the Keto admin API at `base_url`
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("Keto URL '{base_url}' cannot be a base URL"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
            forwarded_proto: None,
            origin: None,
        })
    }

    /// Create a client from the controller configuration
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        Ok(Self::new(config.engine_base_url()?, config.request_timeout())?
            .with_forwarded_proto(config.forwarded_proto.clone())
            .with_origin(config.origin.clone()))
    }

    /// Send `X-Forwarded-Proto` with every request
    #[must_use]
    pub fn with_forwarded_proto(mut self, forwarded_proto: Option<String>) -> Self {
        self.forwarded_proto = forwarded_proto.filter(|value| !value.is_empty());
        self
    }

    /// Send `Origin` with every request
    #[must_use]
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin.filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(
        &self,
        collection: Collection,
        flavour: Flavour,
        id: Option<&str>,
    ) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        {
            let Ok(mut segments) = url.path_segments_mut() else {
                return Err(EngineError::InvalidUrl(self.base_url.to_string()));
            };
            segments
                .pop_if_empty()
                .extend(["engines", "acp", "ory", flavour.as_str(), collection.segment()]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Send one request, returns the status and the raw body
    async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, String), EngineError> {
        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .header(ACCEPT, APPLICATION_JSON);
        if let Some(forwarded_proto) = &self.forwarded_proto {
            request = request.header(FORWARDED_PROTO, forwarded_proto);
        }
        if let Some(origin) = &self.origin {
            request = request.header(ORIGIN, origin);
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, APPLICATION_JSON).body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&method, url, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&method, url, e))?;

        debug!(http.status = status.as_u16(), "Keto responded");
        Ok((status, text))
    }

    async fn get_document<T: DeserializeOwned>(
        &self,
        collection: Collection,
        flavour: Flavour,
        id: &str,
    ) -> Result<Option<T>, EngineError> {
        let span = info_span!(
            "keto.engine.get",
            engine.kind = collection.label(),
            engine.flavour = %flavour,
            document.id = id
        );
        async move {
            let start = Instant::now();
            let result = async {
                let url = self.endpoint(collection, flavour, Some(id))?;
                match self.execute(Method::GET, &url, None).await? {
                    (StatusCode::OK, body) => decode(&Method::GET, &url, &body).map(Some),
                    (StatusCode::NOT_FOUND, _) => Ok(None),
                    (status, _) => Err(unexpected_status(&Method::GET, &url, status)),
                }
            }
            .await;
            track(collection, "get", start, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn list_documents<T: DeserializeOwned>(
        &self,
        collection: Collection,
        flavour: Flavour,
    ) -> Result<Vec<T>, EngineError> {
        let span = info_span!(
            "keto.engine.list",
            engine.kind = collection.label(),
            engine.flavour = %flavour
        );
        async move {
            let start = Instant::now();
            let result = async {
                let url = self.endpoint(collection, flavour, None)?;
                match self.execute(Method::GET, &url, None).await? {
                    (StatusCode::OK, body) => {
                        // An empty engine answers with null
                        decode::<Option<Vec<T>>>(&Method::GET, &url, &body)
                            .map(Option::unwrap_or_default)
                    }
                    (status, _) => Err(unexpected_status(&Method::GET, &url, status)),
                }
            }
            .await;
            track(collection, "list", start, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn upsert_document<T: Serialize + DeserializeOwned + Sync>(
        &self,
        collection: Collection,
        flavour: Flavour,
        id: &str,
        document: &T,
    ) -> Result<T, EngineError> {
        let span = info_span!(
            "keto.engine.upsert",
            engine.kind = collection.label(),
            engine.flavour = %flavour,
            document.id = id
        );
        async move {
            let start = Instant::now();
            let result = async {
                let url = self.endpoint(collection, flavour, None)?;
                let body = encode(&Method::PUT, &url, document)?;
                match self.execute(Method::PUT, &url, Some(body)).await? {
                    (StatusCode::OK, body) => decode(&Method::PUT, &url, &body),
                    (status, _) => Err(unexpected_status(&Method::PUT, &url, status)),
                }
            }
            .await;
            track(collection, "upsert", start, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn delete_document(
        &self,
        collection: Collection,
        flavour: Flavour,
        id: &str,
    ) -> Result<(), EngineError> {
        let span = info_span!(
            "keto.engine.delete",
            engine.kind = collection.label(),
            engine.flavour = %flavour,
            document.id = id
        );
        async move {
            let start = Instant::now();
            let result = async {
                let url = self.endpoint(collection, flavour, Some(id))?;
                match self.execute(Method::DELETE, &url, None).await? {
                    (StatusCode::NO_CONTENT, _) => Ok(()),
                    (StatusCode::NOT_FOUND, _) => {
                        debug!("Document does not exist in Keto, nothing to delete");
                        Ok(())
                    }
                    (status, _) => Err(unexpected_status(&Method::DELETE, &url, status)),
                }
            }
            .await;
            track(collection, "delete", start, &result);
            result
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl AcpEngine for KetoClient {
    async fn get_policy(
        &self,
        flavour: Flavour,
        id: &str,
    ) -> Result<Option<PolicyDocument>, EngineError> {
        self.get_document(Collection::Policies, flavour, id).await
    }

    async fn list_policies(&self, flavour: Flavour) -> Result<Vec<PolicyDocument>, EngineError> {
        self.list_documents(Collection::Policies, flavour).await
    }

    async fn upsert_policy(
        &self,
        flavour: Flavour,
        policy: &PolicyDocument,
    ) -> Result<PolicyDocument, EngineError> {
        self.upsert_document(Collection::Policies, flavour, &policy.id, policy)
            .await
    }

    async fn delete_policy(&self, flavour: Flavour, id: &str) -> Result<(), EngineError> {
        self.delete_document(Collection::Policies, flavour, id).await
    }

    async fn get_role(&self, flavour: Flavour, id: &str) -> Result<Option<RoleDocument>, EngineError> {
        self.get_document(Collection::Roles, flavour, id).await
    }

    async fn list_roles(&self, flavour: Flavour) -> Result<Vec<RoleDocument>, EngineError> {
        self.list_documents(Collection::Roles, flavour).await
    }

    async fn upsert_role(
        &self,
        flavour: Flavour,
        role: &RoleDocument,
    ) -> Result<RoleDocument, EngineError> {
        self.upsert_document(Collection::Roles, flavour, &role.id, role)
            .await
    }

    async fn delete_role(&self, flavour: Flavour, id: &str) -> Result<(), EngineError> {
        self.delete_document(Collection::Roles, flavour, id).await
    }
}

fn transport_error(method: &Method, url: &Url, error: reqwest::Error) -> EngineError {
    EngineError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        source: Box::new(error),
    }
}

fn unexpected_status(method: &Method, url: &Url, status: StatusCode) -> EngineError {
    EngineError::UnexpectedStatus {
        method: method.to_string(),
        url: url.to_string(),
        status,
    }
}

fn encode<T: Serialize>(method: &Method, url: &Url, document: &T) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(document).map_err(|e| EngineError::Encode {
        method: method.to_string(),
        url: url.to_string(),
        source: e,
    })
}

fn decode<T: DeserializeOwned>(method: &Method, url: &Url, body: &str) -> Result<T, EngineError> {
    serde_json::from_str(body).map_err(|e| EngineError::Decode {
        method: method.to_string(),
        url: url.to_string(),
        source: e,
    })
}

fn track<T>(collection: Collection, operation: &str, start: Instant, result: &Result<T, EngineError>) {
    metrics::record_engine_operation(
        collection.label(),
        operation,
        start.elapsed().as_secs_f64(),
    );
    if result.is_err() {
        metrics::increment_engine_operation_errors(collection.label(), operation);
    }
}
