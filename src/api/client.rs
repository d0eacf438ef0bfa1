use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::{
    ApiErrorBody, CreateTenantResponse, ParityProvider, QuotaProvider, ResourceQuota, TenantCreator,
};
use crate::{config::Config, wizard::submit::CreateTenantRequest, Error, Result};

/// REST client for the console API
#[derive(Clone, Debug)]
pub struct ConsoleClient {
    base_url: String,
    http: reqwest::Client,
}

impl ConsoleClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { base_url, http })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.operator_api_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    /// Decode a successful body, or turn the console error body into an `ApiError`
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body).map_err(Error::SerializationError);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| fallback_message(status, body));

        Err(Error::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

fn fallback_message(status: StatusCode, body: String) -> String {
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    } else {
        body
    }
}

#[async_trait]
impl ParityProvider for ConsoleClient {
    #[instrument(skip(self))]
    async fn parity_choices(&self, nodes: u32, disks_per_node: u32) -> Result<Vec<String>> {
        let url = self.url(&format!("get-parity/{nodes}/{disks_per_node}"));
        debug!(%url, "requesting parity choices");

        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl QuotaProvider for ConsoleClient {
    #[instrument(skip(self))]
    async fn resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        let url = self.url(&format!("namespaces/{namespace}/resourcequotas/{name}"));

        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl TenantCreator for ConsoleClient {
    #[instrument(skip_all, fields(namespace = %request.namespace, tenant = %request.name))]
    async fn create_tenant(&self, request: &CreateTenantRequest) -> Result<CreateTenantResponse> {
        let response = self
            .http
            .post(self.url("tenants"))
            .json(request)
            .send()
            .await?;

        Self::decode(response).await
    }
}
