//! The sizing page of the tenant wizard.
//!
//! [`SizingPage`] is the synchronous state machine: every input change recomputes
//! the distribution and, when the layout is usable, asks for the parity levels of
//! that layout. Answers are matched against the layout they were requested for and
//! dropped once the operator has moved on to another one.
//!
//! [`SizingSession`] drives the page against a [`ParityProvider`], debouncing
//! lookups and reporting validity to the [`Wizard`].

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, instrument, warn};

use super::{pages::ValidationErrors, Page, Wizard};
use crate::{
    api::ParityProvider,
    config::Config,
    sizing::{
        annotate_default, choose_default_if_invalid, erasure_code_calc, memory_resource,
        parse_parities, try_distribute, ErasureCodeCalc, LayoutKey, MemoryError, MemoryResource,
        Parity, ParityChoice, SizingInput, StorageDistribution,
    },
    Result,
};

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SizingState {
    /// No input received yet
    #[default]
    Uninitialized,

    /// Waiting on the parity levels of the current layout
    Computing,

    /// Layout and parity are both usable
    Valid,

    /// The layout is unusable or its parity levels could not be loaded
    Invalid,
}

/// Requested server memory, in Gi, and what the selected nodes can offer, in bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequest {
    pub memory_gi: u64,
    pub max_memory: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SizingPage {
    input: Option<SizingInput>,
    distribution: StorageDistribution,
    field_errors: ValidationErrors,

    /// Layout whose parity answer is awaited
    pending: Option<LayoutKey>,

    /// Layout the stored parity levels belong to
    loaded: Option<LayoutKey>,

    parities: Vec<String>,
    choices: Vec<ParityChoice>,
    calc: Option<ErasureCodeCalc>,
    ec_parity: String,

    /// Whether the operator picked a parity other than the computed default
    parity_overridden: bool,

    parity_error: Option<String>,

    memory_request: Option<MemoryRequest>,
    memory: Option<MemoryResource>,
    memory_error: Option<MemoryError>,

    state: SizingState,
}

impl SizingPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply new input, returning the layout to fetch parity levels for.
    ///
    /// Returns `None` when the layout is unusable, or when the parity levels of
    /// its topology are already loaded and only need rescoring.
    pub fn update(&mut self, input: SizingInput) -> Option<LayoutKey> {
        self.field_errors.clear();
        self.parity_error = None;

        let distribution = match try_distribute(&input) {
            Ok(distribution) => distribution,
            Err(e) => {
                debug!("sizing input rejected: {e}");
                if let Some(field) = e.field() {
                    self.field_errors.insert(field, e.to_string());
                }
                self.input = Some(input);
                self.distribution = StorageDistribution::invalid(&e);
                self.pending = None;
                self.calc = None;
                self.state = SizingState::Invalid;
                self.refresh_memory();
                return None;
            }
        };

        let key = input.layout_key();
        self.input = Some(input);
        self.distribution = distribution;

        if self.loaded == Some(key) {
            self.pending = None;
            self.rescore(key);
            self.refresh_memory();
            return None;
        }

        self.pending = Some(key);
        self.state = SizingState::Computing;
        self.refresh_memory();

        Some(key)
    }

    /// Size server memory against the current raw capacity
    pub fn set_memory(&mut self, request: MemoryRequest) {
        self.memory_request = Some(request);
        self.refresh_memory();
    }

    fn refresh_memory(&mut self) {
        self.field_errors.remove("memory");
        self.memory = None;
        self.memory_error = None;

        let Some(request) = self.memory_request else {
            return;
        };
        if !self.distribution.is_valid() {
            return;
        }

        let capacity = self.distribution.raw_capacity();
        match memory_resource(request.memory_gi, capacity, request.max_memory) {
            Ok(memory) => self.memory = Some(memory),
            Err(e) => {
                debug!("memory request rejected: {e}");
                self.field_errors.insert("memory", e.to_string());
                self.memory_error = Some(e);
            }
        }
    }

    /// Recompute capacities for already loaded parity levels
    fn rescore(&mut self, key: LayoutKey) {
        let values = std::mem::take(&mut self.parities);
        match parse_parities(&values) {
            Ok(parities) => self.load_parities(key, values, &parities),
            Err(e) => self.clear_parities(e.to_string()),
        }
    }

    /// Apply the parity answer for `key`.
    ///
    /// Returns `false` when the answer is stale and was dropped.
    pub fn apply_parities(&mut self, key: LayoutKey, answer: Result<Vec<String>>) -> bool {
        if self.pending != Some(key) {
            debug!(?key, pending = ?self.pending, "dropping stale parity answer");
            return false;
        }
        self.pending = None;

        let parsed = answer.and_then(|values| {
            let parities = parse_parities(&values)?;
            Ok((values, parities))
        });

        match parsed {
            Ok((values, parities)) => self.load_parities(key, values, &parities),
            Err(e) => {
                warn!(?key, "parity lookup failed: {e}");
                self.clear_parities(e.to_string());
            }
        }

        true
    }

    fn load_parities(&mut self, key: LayoutKey, values: Vec<String>, parities: &[Parity]) {
        let calc = erasure_code_calc(
            parities,
            self.distribution.persistent_volumes,
            self.distribution.pv_size,
        );
        let Some(calc) = calc else {
            self.clear_parities("No parity levels available for this layout".into());
            return;
        };

        let default = calc.default_ec.to_string();
        if !self.parity_overridden {
            self.ec_parity.clear();
        }
        self.ec_parity = choose_default_if_invalid(&self.ec_parity, &values, &default);
        self.parity_overridden = self.ec_parity != default;

        let choices: Vec<_> = values.iter().map(ParityChoice::new).collect();
        self.choices = annotate_default(&choices, &default);
        self.parities = values;
        self.loaded = Some(key);
        self.calc = Some(calc);
        self.state = SizingState::Valid;
    }

    fn clear_parities(&mut self, reason: String) {
        self.loaded = None;
        self.parities.clear();
        self.choices.clear();
        self.calc = None;
        self.ec_parity.clear();
        self.parity_error = Some(reason);
        self.state = SizingState::Invalid;
    }

    /// Pick a parity among the loaded choices
    pub fn select_parity(&mut self, value: &str) -> bool {
        if !self.parities.iter().any(|p| p == value) {
            return false;
        }

        self.ec_parity = value.to_string();
        self.parity_overridden = self
            .calc
            .as_ref()
            .map_or(true, |calc| calc.default_ec.to_string() != value);

        true
    }

    pub fn is_valid(&self) -> bool {
        self.state == SizingState::Valid
            && self.distribution.is_valid()
            && self.calc.is_some()
            && !self.ec_parity.is_empty()
            && self.memory_error.is_none()
    }

    /// Push this page's validity to the wizard
    pub fn report(&self, wizard: &Wizard) -> bool {
        let valid = self.is_valid();
        wizard.set_page_valid(Page::TenantSize, valid);
        valid
    }

    pub fn state(&self) -> SizingState {
        self.state
    }

    pub fn input(&self) -> Option<&SizingInput> {
        self.input.as_ref()
    }

    pub fn distribution(&self) -> &StorageDistribution {
        &self.distribution
    }

    pub fn pending(&self) -> Option<LayoutKey> {
        self.pending
    }

    pub fn choices(&self) -> &[ParityChoice] {
        &self.choices
    }

    pub fn erasure_calc(&self) -> Option<&ErasureCodeCalc> {
        self.calc.as_ref()
    }

    pub fn ec_parity(&self) -> &str {
        &self.ec_parity
    }

    pub fn parity_error(&self) -> Option<&str> {
        self.parity_error.as_deref()
    }

    /// Memory for every server, `None` when none was requested
    pub fn memory(&self) -> Option<MemoryResource> {
        self.memory
    }

    pub fn memory_error(&self) -> Option<MemoryError> {
        self.memory_error
    }

    /// Field level messages mirroring the distribution error
    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.field_errors
    }
}

/// Runs a [`SizingPage`] against a parity provider
#[derive(Clone)]
pub struct SizingSession {
    page: Arc<RwLock<SizingPage>>,
    provider: Arc<dyn ParityProvider>,
    wizard: Wizard,
    debounce: Duration,
}

impl SizingSession {
    pub fn new(provider: Arc<dyn ParityProvider>, wizard: Wizard, debounce: Duration) -> Self {
        Self {
            page: Arc::new(RwLock::new(SizingPage::new())),
            provider,
            wizard,
            debounce,
        }
    }

    pub fn from_config(provider: Arc<dyn ParityProvider>, wizard: Wizard, config: &Config) -> Self {
        Self::new(provider, wizard, config.parity_debounce)
    }

    /// Apply new input and start the parity lookup for its layout, if any.
    ///
    /// The returned task finishes once the answer has been applied or dropped.
    #[instrument(skip(self), fields(wizard = %self.wizard.id()))]
    pub async fn update(&self, input: SizingInput) -> Option<JoinHandle<()>> {
        let key = {
            let mut page = self.page.write().await;
            let key = page.update(input);
            page.report(&self.wizard);
            key
        }?;

        let page = self.page.clone();
        let provider = self.provider.clone();
        let wizard = self.wizard.clone();
        let debounce = self.debounce;

        Some(tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
                if page.read().await.pending() != Some(key) {
                    debug!(?key, "parity lookup superseded during debounce");
                    return;
                }
            }

            info!(nodes = key.0, disks = key.1, "fetching parity choices");
            let answer = provider.parity_choices(key.0, key.1).await;

            let mut page = page.write().await;
            if page.apply_parities(key, answer) {
                page.report(&wizard);
            }
        }))
    }

    pub async fn select_parity(&self, value: &str) -> bool {
        let mut page = self.page.write().await;
        let selected = page.select_parity(value);
        page.report(&self.wizard);

        selected
    }

    pub async fn set_memory(&self, request: MemoryRequest) -> bool {
        let mut page = self.page.write().await;
        page.set_memory(request);

        page.report(&self.wizard)
    }

    pub async fn snapshot(&self) -> SizingPage {
        self.page.read().await.clone()
    }
}
