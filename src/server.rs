use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{api::QuotaProvider, Metrics};

/// Diagnostics to be exposed by the web server
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
    pub started: DateTime<Utc>,
    pub last_event: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            started: now,
            last_event: now,
        }
    }
}

/// State shared between the web server handlers
#[derive(Clone)]
pub struct State {
    /// Diagnostics refreshed by every API call
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
    metrics: Metrics,
    /// Source of namespace quotas
    quotas: Arc<dyn QuotaProvider>,
}

impl State {
    pub fn new(quotas: Arc<dyn QuotaProvider>) -> Result<Self, prometheus::Error> {
        let registry = prometheus::Registry::default();
        let metrics = Metrics::default().register(&registry)?;

        Ok(Self {
            diagnostics: Arc::default(),
            registry,
            metrics,
            quotas,
        })
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub fn recorder(&self) -> &Metrics {
        &self.metrics
    }

    pub fn quotas(&self) -> &dyn QuotaProvider {
        self.quotas.as_ref()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Note that an API call was served
    pub async fn touch(&self) {
        self.diagnostics.write().await.last_event = Utc::now();
    }
}
