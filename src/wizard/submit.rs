//! Assembly of the tenant creation request once every page is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::{
    pages::{Configure, NameTenant},
    sizing_page::{MemoryRequest, SizingPage},
    Page, Wizard, WizardState,
};
use crate::{
    api::{CreateTenantResponse, QuotaProvider, TenantCreator},
    sizing::{LayoutKey, MemoryResource, Parity, SizingInput},
};

/// Name given to the single pool of a new tenant
pub const FIRST_POOL: &str = "pool-0";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CreateTenantRequest {
    pub name: String,
    pub namespace: String,

    /// Empty to deploy the operator's default image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(rename = "erasureCodingParity")]
    pub erasure_coding_parity: u32,

    pub pools: Vec<Pool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub servers: u32,
    pub volumes_per_server: u32,
    pub volume_configuration: VolumeConfiguration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PoolResources>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct VolumeConfiguration {
    /// Bytes per volume
    pub size: u64,
    pub storage_class_name: String,
}

/// Requests and limits keyed by resource name (`memory` in bytes)
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolResources {
    #[serde(default)]
    pub requests: BTreeMap<String, u64>,

    #[serde(default)]
    pub limits: BTreeMap<String, u64>,
}

impl From<MemoryResource> for PoolResources {
    fn from(memory: MemoryResource) -> Self {
        Self {
            requests: BTreeMap::from([("memory".to_string(), memory.request)]),
            limits: BTreeMap::from([("memory".to_string(), memory.limit)]),
        }
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Pages still hold invalid values: {}", page_list(.0))]
    NotReady(Vec<Page>),

    #[error("The tenant size has no usable layout")]
    MissingLayout,

    #[error("No erasure code parity selected")]
    MissingParity,

    #[error(transparent)]
    Api(#[from] crate::Error),
}

fn page_list(pages: &[Page]) -> String {
    pages
        .iter()
        .map(Page::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values collected by the wizard pages
#[derive(Clone, Debug, Default)]
pub struct TenantForm {
    pub name: NameTenant,
    pub configure: Configure,
    pub sizing: SizingPage,
}

impl TenantForm {
    /// Apply sizing fields, capped by what is left of the selected storage class.
    ///
    /// Returns the layout to fetch parity levels for, as [`SizingPage::update`].
    pub fn update_size(&mut self, input: SizingInput, wizard: &Wizard) -> Option<LayoutKey> {
        let input = SizingInput {
            max_size: self.name.max_size(),
            ..input
        };
        let key = self.sizing.update(input);
        self.sizing.report(wizard);

        key
    }

    /// Re-check the current size against the selected storage class quota
    fn resize(&mut self, wizard: &Wizard) -> Option<LayoutKey> {
        let input = self.sizing.input().cloned()?;
        self.update_size(input, wizard)
    }

    /// Switch storage class, returning `false` when the quota does not offer it
    pub fn select_storage_class(&mut self, class: &str, wizard: &Wizard) -> bool {
        if !self.name.storage_classes.iter().any(|c| c == class) {
            return false;
        }

        self.name.selected_storage_class = class.to_string();
        self.name.report(wizard);
        self.resize(wizard);

        true
    }

    /// Refresh the namespace quota, then the size it caps
    pub async fn load_quota(&mut self, quotas: &dyn QuotaProvider, wizard: &Wizard) -> bool {
        let found = self.name.load_quota(quotas, wizard).await;
        self.resize(wizard);

        found
    }

    /// Size server memory, returning whether the size page is still valid
    pub fn set_memory(&mut self, request: MemoryRequest, wizard: &Wizard) -> bool {
        self.sizing.set_memory(request);
        self.sizing.report(wizard)
    }
}

/// Build the creation request, refusing while any page is invalid
pub fn build_request(
    state: &WizardState,
    form: &TenantForm,
) -> Result<CreateTenantRequest, SubmitError> {
    if !state.can_submit() {
        return Err(SubmitError::NotReady(state.invalid_pages()));
    }

    let distribution = form.sizing.distribution();
    if !form.sizing.is_valid() || !distribution.is_valid() {
        return Err(SubmitError::MissingLayout);
    }

    let parity: Parity = form
        .sizing
        .ec_parity()
        .parse()
        .map_err(|_| SubmitError::MissingParity)?;

    Ok(CreateTenantRequest {
        name: form.name.tenant_name.clone(),
        namespace: form.name.namespace.clone(),
        image: form.configure.image().to_string(),
        erasure_coding_parity: parity.drives(),
        pools: vec![Pool {
            name: FIRST_POOL.into(),
            servers: distribution.nodes,
            volumes_per_server: distribution.disks,
            volume_configuration: VolumeConfiguration {
                size: distribution.pv_size,
                storage_class_name: form.name.selected_storage_class.clone(),
            },
            resources: form.sizing.memory().map(PoolResources::from),
        }],
    })
}

/// Create the tenant described by `form`
#[instrument(skip_all, fields(wizard = %wizard.id()))]
pub async fn submit(
    wizard: &Wizard,
    form: &TenantForm,
    creator: &dyn TenantCreator,
) -> Result<CreateTenantResponse, SubmitError> {
    let request = build_request(&wizard.snapshot(), form)?;
    info!(
        namespace = %request.namespace,
        tenant = %request.name,
        parity = request.erasure_coding_parity,
        "creating tenant"
    );

    Ok(creator.create_tenant(&request).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_json_diff::assert_json_eq;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        api::{ResourceQuota, ResourceQuotaElement, TenantCredentials},
        sizing::{units::GIB, MemoryError, Unit},
        Error, Result,
    };

    fn form() -> TenantForm {
        let mut sizing = SizingPage::new();
        let key = sizing.update(one_tib()).unwrap();
        sizing.apply_parities(key, Ok(vec!["EC:8".into(), "EC:4".into(), "EC:2".into()]));

        TenantForm {
            name: NameTenant {
                tenant_name: "tenant-1".into(),
                namespace: "tenants".into(),
                selected_storage_class: "standard".into(),
                ..Default::default()
            },
            configure: Configure::default(),
            sizing,
        }
    }

    fn one_tib() -> SizingInput {
        SizingInput {
            nodes: 4,
            drives_per_server: 4,
            total_size: 1,
            unit: Unit::Ti,
            ..Default::default()
        }
    }

    /// `small` has 512 Gi left, `large` 4 Ti
    struct TwoClasses;

    #[async_trait]
    impl QuotaProvider for TwoClasses {
        async fn resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
            let element = |class: &str, hard: i64| ResourceQuotaElement {
                name: format!("{class}.storageclass.storage.k8s.io/requests.storage"),
                hard,
                used: 0,
            };
            match namespace {
                "tenants" => Ok(ResourceQuota {
                    name: name.into(),
                    elements: vec![element("large", 4 << 40), element("small", 512 << 30)],
                }),
                _ => Err(Error::ApiError {
                    status: 404,
                    message: "namespace not found".into(),
                }),
            }
        }
    }

    /// A named tenant in `tenants`, sized at 1 Ti on `large`
    async fn quota_form(wizard: &Wizard) -> TenantForm {
        let mut form = TenantForm {
            name: NameTenant {
                tenant_name: "tenant-1".into(),
                namespace: "tenants".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(form.load_quota(&TwoClasses, wizard).await);
        assert_eq!(form.name.selected_storage_class, "large");

        let key = form.update_size(one_tib(), wizard).unwrap();
        form.sizing.apply_parities(key, Ok(vec!["EC:4".into(), "EC:2".into()]));
        form.sizing.report(wizard);

        form
    }

    fn ready() -> WizardState {
        let mut state = WizardState::tenant_creation();
        state.set_page_valid(Page::NameTenant, true);
        state
    }

    #[derive(Default)]
    struct RecordingCreator {
        requests: Mutex<Vec<CreateTenantRequest>>,
    }

    #[async_trait]
    impl TenantCreator for RecordingCreator {
        async fn create_tenant(
            &self,
            request: &CreateTenantRequest,
        ) -> Result<CreateTenantResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CreateTenantResponse {
                console: vec![TenantCredentials {
                    access_key: "console".into(),
                    secret_key: "console123".into(),
                    url: String::new(),
                }],
            })
        }
    }

    #[test]
    fn builds_the_payload() {
        let request = build_request(&ready(), &form()).unwrap();

        assert_json_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "name": "tenant-1",
                "namespace": "tenants",
                "erasureCodingParity": 4,
                "pools": [{
                    "name": "pool-0",
                    "servers": 4,
                    "volumes_per_server": 4,
                    "volume_configuration": {
                        "size": 68719476736u64,
                        "storage_class_name": "standard"
                    }
                }]
            })
        );
    }

    #[test]
    fn carries_image_and_memory() {
        let mut form = form();
        form.configure = Configure {
            custom_image: true,
            image_name: "registry.local/storage/server:RELEASE.2024".into(),
        };
        let wizard = Wizard::new(ready());
        let memory = MemoryRequest {
            memory_gi: 4,
            max_memory: 64 * GIB,
        };
        assert!(form.set_memory(memory, &wizard));
        assert!(form.sizing.select_parity("EC:2"));

        let request = build_request(&wizard.snapshot(), &form).unwrap();
        assert_eq!(request.image, "registry.local/storage/server:RELEASE.2024");
        assert_eq!(request.erasure_coding_parity, 2);
        assert_json_eq!(
            serde_json::to_value(&request.pools[0].resources).unwrap(),
            json!({
                "requests": { "memory": 4294967296u64 },
                "limits": { "memory": 8589934592u64 }
            })
        );
    }

    #[test]
    fn refuses_while_pages_are_invalid() {
        let err = build_request(&WizardState::tenant_creation(), &form()).unwrap_err();

        assert!(matches!(&err, SubmitError::NotReady(pages) if pages == &[Page::NameTenant]));
        assert_eq!(err.to_string(), "Pages still hold invalid values: nameTenant");
    }

    #[test]
    fn refuses_without_a_layout() {
        let mut form = form();
        form.sizing = SizingPage::new();

        assert!(matches!(
            build_request(&ready(), &form),
            Err(SubmitError::MissingLayout)
        ));
    }

    #[tokio::test]
    async fn storage_class_quota_caps_the_size() {
        let wizard = Wizard::default();
        let mut form = quota_form(&wizard).await;
        assert_eq!(form.sizing.input().unwrap().max_size, 4 << 40);
        assert!(wizard.can_submit());

        assert!(form.select_storage_class("small", &wizard));
        assert_eq!(form.sizing.input().unwrap().max_size, 512 << 30);
        assert!(form.sizing.validation_errors().contains_key("volume_size"));
        assert!(!wizard.can_submit());
        assert!(matches!(
            build_request(&wizard.snapshot(), &form),
            Err(SubmitError::NotReady(pages)) if pages == [Page::TenantSize]
        ));

        // Back to a class with room, no new parity lookup needed
        assert!(form.select_storage_class("large", &wizard));
        assert!(wizard.can_submit());
        let request = build_request(&wizard.snapshot(), &form).unwrap();
        assert_eq!(request.pools[0].volume_configuration.storage_class_name, "large");

        assert!(!form.select_storage_class("missing", &wizard));
        assert_eq!(form.name.selected_storage_class, "large");
    }

    #[tokio::test]
    async fn losing_the_namespace_quota_blocks_submission() {
        let wizard = Wizard::default();
        let mut form = quota_form(&wizard).await;
        assert!(wizard.can_submit());

        form.name.namespace = "gone".into();
        assert!(!form.load_quota(&TwoClasses, &wizard).await);
        assert!(!wizard.can_submit());
        let invalid = wizard.snapshot().invalid_pages();
        assert_eq!(invalid, [Page::NameTenant, Page::TenantSize]);
    }

    #[tokio::test]
    async fn memory_errors_block_submission() {
        let wizard = Wizard::default();
        let mut form = quota_form(&wizard).await;

        let too_large = MemoryRequest {
            memory_gi: 128,
            max_memory: 64 * GIB,
        };
        assert!(!form.set_memory(too_large, &wizard));
        assert!(!wizard.can_submit());
        assert_eq!(
            form.sizing.validation_errors()["memory"],
            MemoryError::RequestTooLarge.to_string()
        );

        let fits = MemoryRequest {
            memory_gi: 16,
            max_memory: 64 * GIB,
        };
        assert!(form.set_memory(fits, &wizard));
        assert!(wizard.can_submit());
        let request = build_request(&wizard.snapshot(), &form).unwrap();
        let resources = request.pools[0].resources.as_ref().unwrap();
        assert_eq!(resources.requests["memory"], 16 * GIB);
    }

    #[tokio::test]
    async fn submits_through_the_creator() {
        let wizard = Wizard::new(ready());
        let creator = RecordingCreator::default();

        let response = submit(&wizard, &form(), &creator).await.unwrap();
        assert_eq!(response.console[0].access_key, "console");

        let requests = creator.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].pools[0].servers, 4);
    }

    #[tokio::test]
    async fn nothing_is_sent_before_the_wizard_is_done() {
        let wizard = Wizard::default();
        let creator = RecordingCreator::default();

        assert!(submit(&wizard, &form(), &creator).await.is_err());
        assert!(creator.requests.lock().unwrap().is_empty());
    }
}
