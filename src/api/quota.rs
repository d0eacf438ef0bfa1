use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{
    api::{
        core::v1::{Namespace, ResourceQuota as KubeResourceQuota},
        storage::v1::StorageClass,
    },
    apimachinery::pkg::api::resource::Quantity,
};
use kube::{api::ListParams, Api, Client, ResourceExt};
use kube_quantity::ParsedQuantity;
use tracing::{debug, info, instrument};

use super::{QuotaProvider, ResourceQuota, ResourceQuotaElement, STORAGE_CLASS_SUFFIX};
use crate::{Error, Result};

/// Namespace quota lookup straight against the Kubernetes API
#[derive(Clone)]
pub struct KubeQuotas {
    client: Client,
}

impl KubeQuotas {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Every storage class, uncapped, for namespaces without a storage quota
    async fn uncapped(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        // The namespace itself has to exist
        Api::<Namespace>::all(self.client.clone())
            .get(namespace)
            .await
            .map_err(Error::KubeError)?;

        let classes = Api::<StorageClass>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;

        info!(
            namespace,
            classes = classes.items.len(),
            "no storage quota, offering every storage class"
        );

        Ok(ResourceQuota {
            name: name.to_string(),
            elements: classes
                .items
                .iter()
                .map(|sc| ResourceQuotaElement {
                    name: format!("{}{STORAGE_CLASS_SUFFIX}", sc.name_any()),
                    hard: i64::MAX,
                    used: 0,
                })
                .collect(),
        })
    }
}

fn quantity_bytes(name: &str, quantity: &Quantity) -> Result<i64> {
    let parsed = ParsedQuantity::try_from(quantity.clone())
        .map_err(|e| Error::InvalidQuantity(format!("{name}: {e}")))?;

    parsed
        .to_bytes_i64()
        .ok_or_else(|| Error::InvalidQuantity(format!("{name}: {} out of range", quantity.0)))
}

/// Keep the resources carrying both a hard limit and a usage.
///
/// Resources that are not whole byte counts (e.g. `requests.cpu: 500m`) are
/// skipped; only a malformed storage class quota is an error.
fn quota_elements(quota: &KubeResourceQuota) -> Result<Vec<ResourceQuotaElement>> {
    let empty = BTreeMap::new();
    let status = quota.status.as_ref();
    let hard = status.and_then(|s| s.hard.as_ref()).unwrap_or(&empty);
    let used = status.and_then(|s| s.used.as_ref()).unwrap_or(&empty);

    let mut elements = Vec::new();
    for (name, limit) in hard {
        let Some(usage) = used.get(name) else {
            continue;
        };

        let bytes = quantity_bytes(name, limit)
            .and_then(|hard| Ok((hard, quantity_bytes(name, usage)?)));
        match bytes {
            Ok((hard, used)) => elements.push(ResourceQuotaElement {
                name: name.clone(),
                hard,
                used,
            }),
            Err(e) if name.ends_with(STORAGE_CLASS_SUFFIX) => return Err(e),
            Err(e) => debug!("skipping quota resource: {e}"),
        }
    }

    Ok(elements)
}

#[async_trait]
impl QuotaProvider for KubeQuotas {
    #[instrument(skip(self))]
    async fn resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        let quotas: Api<KubeResourceQuota> = Api::namespaced(self.client.clone(), namespace);

        match quotas.get(name).await {
            Ok(quota) => Ok(ResourceQuota {
                name: quota.name_any(),
                elements: quota_elements(&quota)?,
            }),
            Err(kube::Error::Api(ae)) if ae.code == 404 => self.uncapped(namespace, name).await,
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}
