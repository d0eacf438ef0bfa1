use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{wizard::submit::CreateTenantRequest, Result};

mod client;
mod quota;

pub use client::ConsoleClient;
pub use quota::KubeQuotas;

/// Resource name suffix Kubernetes uses for per storage class quotas
pub const STORAGE_CLASS_SUFFIX: &str = ".storageclass.storage.k8s.io/requests.storage";

/// Capacity planning endpoint
#[async_trait]
pub trait ParityProvider: Send + Sync {
    /// Parity levels valid for `nodes` servers with `disks_per_node` drives, highest
    /// first (e.g. `["EC:4", "EC:3", "EC:2"]`)
    async fn parity_choices(&self, nodes: u32, disks_per_node: u32) -> Result<Vec<String>>;
}

/// Namespace quota lookup
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota>;
}

/// Tenant creation endpoint
#[async_trait]
pub trait TenantCreator: Send + Sync {
    async fn create_tenant(&self, request: &CreateTenantRequest) -> Result<CreateTenantResponse>;
}

/// A namespace resource quota, reduced to elements with both a hard limit and usage
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceQuota {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub elements: Vec<ResourceQuotaElement>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceQuotaElement {
    pub name: String,

    #[serde(default)]
    pub hard: i64,

    #[serde(default)]
    pub used: i64,
}

impl ResourceQuotaElement {
    /// Storage class this element limits, if it is a storage quota
    pub fn storage_class(&self) -> Option<&str> {
        self.name.strip_suffix(STORAGE_CLASS_SUFFIX)
    }

    /// Bytes still available under this element
    pub fn remaining(&self) -> u64 {
        u64::try_from(self.hard.saturating_sub(self.used)).unwrap_or(0)
    }
}

impl ResourceQuota {
    /// Storage classes a tenant may request volumes from
    pub fn storage_classes(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(ResourceQuotaElement::storage_class)
            .collect()
    }

    /// Remaining bytes per storage class
    pub fn limit_sizes(&self) -> BTreeMap<String, u64> {
        self.elements
            .iter()
            .filter_map(|e| e.storage_class().map(|sc| (sc.to_string(), e.remaining())))
            .collect()
    }
}

/// Error body returned by the console API
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub code: u16,
    pub message: String,
}

/// Credentials handed back once a tenant has been created
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateTenantResponse {
    #[serde(default)]
    pub console: Vec<TenantCredentials>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TenantCredentials {
    pub access_key: String,
    pub secret_key: String,

    #[serde(default)]
    pub url: String,
}
