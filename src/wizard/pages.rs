//! Typed field sets of the wizard pages and their validation.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::{Page, Wizard};
use crate::{
    api::{QuotaProvider, ResourceQuota},
    Error,
};

/// Field name to message, empty when the page is valid
pub type ValidationErrors = BTreeMap<&'static str, String>;

/// Longest name Kubernetes accepts for a label value
const MAX_NAME_LEN: usize = 63;

/// Name of the storage quota looked up for a namespace
pub fn storage_quota_name(namespace: &str) -> String {
    format!("{namespace}-storagequota")
}

fn is_dns_label(name: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| alnum(c) || c == '-')
        && name.starts_with(alnum)
        && name.ends_with(alnum)
}

/// First page: tenant name, namespace and storage class
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameTenant {
    pub tenant_name: String,
    pub namespace: String,
    pub selected_storage_class: String,

    /// Storage classes the namespace quota allows
    pub storage_classes: Vec<String>,

    /// Remaining bytes per storage class
    pub limit_sizes: BTreeMap<String, u64>,

    /// Problem found while looking the namespace up
    pub namespace_error: Option<String>,
}

impl NameTenant {
    /// Refresh storage classes and limits from the namespace quota.
    ///
    /// Keeps the selected class when it is still offered, otherwise selects the
    /// first available one.
    pub fn apply_quota(&mut self, quota: &ResourceQuota) {
        self.limit_sizes = quota.limit_sizes();
        self.storage_classes = quota
            .storage_classes()
            .into_iter()
            .map(String::from)
            .collect();

        if self.storage_classes.is_empty() {
            self.selected_storage_class.clear();
            self.namespace_error = Some("No storage classes available.".into());
            return;
        }

        self.namespace_error = None;
        if !self.storage_classes.contains(&self.selected_storage_class) {
            self.selected_storage_class = self.storage_classes[0].clone();
        }
    }

    /// Forget everything learned about the namespace after a failed lookup
    pub fn quota_failed(&mut self, error: &Error) {
        warn!(namespace = %self.namespace, "namespace quota lookup failed: {error}");

        self.storage_classes.clear();
        self.limit_sizes.clear();
        self.selected_storage_class.clear();
        self.namespace_error = Some("Please enter a valid namespace".into());
    }

    /// Look the namespace quota up, apply it and report the page to `wizard`.
    ///
    /// Returns whether the lookup succeeded.
    pub async fn load_quota(&mut self, quotas: &dyn QuotaProvider, wizard: &Wizard) -> bool {
        let quota_name = storage_quota_name(&self.namespace);
        info!(namespace = %self.namespace, quota = %quota_name, "loading namespace quota");

        let found = match quotas.resource_quota(&self.namespace, &quota_name).await {
            Ok(quota) => {
                self.apply_quota(&quota);
                true
            }
            Err(e) => {
                self.quota_failed(&e);
                false
            }
        };
        self.report(wizard);

        found
    }

    /// Bytes still available for the selected storage class
    pub fn max_size(&self) -> u64 {
        self.limit_sizes
            .get(&self.selected_storage_class)
            .copied()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.tenant_name.is_empty() {
            errors.insert("tenant-name", "Field cannot be empty".into());
        } else if !is_dns_label(&self.tenant_name) {
            errors.insert(
                "tenant-name",
                "Name only can contain lowercase letters, numbers and '-'. Must start and end with a letter or number".into(),
            );
        }

        if self.namespace.is_empty() {
            errors.insert("namespace", "Field cannot be empty".into());
        } else if let Some(e) = &self.namespace_error {
            errors.insert("namespace", e.clone());
        }

        if self.selected_storage_class.is_empty() {
            errors.insert("storage_class", "Please select a storage class".into());
        }

        errors
    }

    /// Push this page's validity to the wizard
    pub fn report(&self, wizard: &Wizard) -> ValidationErrors {
        let errors = self.validate();
        wizard.set_page_valid(Page::NameTenant, errors.is_empty());
        errors
    }
}

/// Container image settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configure {
    pub custom_image: bool,
    pub image_name: String,
}

/// `registry/name:tag` with a non empty tag
fn is_image_reference(image: &str) -> bool {
    image
        .split_once('/')
        .and_then(|(_, rest)| rest.split_once(':'))
        .is_some_and(|(_, tag)| !tag.is_empty())
}

impl Configure {
    /// Image to deploy, empty to let the operator pick its default
    pub fn image(&self) -> &str {
        if self.custom_image {
            &self.image_name
        } else {
            ""
        }
    }

    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.custom_image
            && !self.image_name.is_empty()
            && !is_image_reference(&self.image_name)
        {
            errors.insert(
                "image",
                "Format must be of form: 'registry/image:VERSION'".into(),
            );
        }

        errors
    }

    pub fn report(&self, wizard: &Wizard) -> ValidationErrors {
        let errors = self.validate();
        wizard.set_page_valid(Page::Configure, errors.is_empty());
        errors
    }
}
