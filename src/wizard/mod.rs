use std::{collections::BTreeSet, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

pub mod pages;
pub mod sizing_page;
pub mod submit;

/// Pages of the tenant creation wizard
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Page {
    NameTenant,
    TenantSize,
    Configure,
    Affinity,
    IdentityProvider,
    Security,
    Encryption,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::NameTenant,
        Page::TenantSize,
        Page::Configure,
        Page::Affinity,
        Page::IdentityProvider,
        Page::Security,
        Page::Encryption,
    ];
}

impl Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Page::NameTenant => "nameTenant",
            Page::TenantSize => "tenantSize",
            Page::Configure => "configure",
            Page::Affinity => "affinity",
            Page::IdentityProvider => "identityProvider",
            Page::Security => "security",
            Page::Encryption => "encryption",
        };

        f.write_str(name)
    }
}

/// Which pages of a wizard currently hold valid values
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WizardState {
    pages: Vec<Page>,
    valid: BTreeSet<Page>,
    current: usize,
}

impl WizardState {
    /// A wizard over `pages`, in order, none of them valid yet
    pub fn new(pages: impl IntoIterator<Item = Page>) -> Self {
        let mut registered = Vec::new();
        for page in pages {
            if !registered.contains(&page) {
                registered.push(page);
            }
        }

        Self {
            pages: registered,
            valid: BTreeSet::new(),
            current: 0,
        }
    }

    /// The tenant creation wizard.
    ///
    /// Every page except the first is valid with its default values; the operator
    /// still has to pick a name and a namespace.
    pub fn tenant_creation() -> Self {
        let mut state = Self::new(Page::ALL);
        state.valid.extend(Page::ALL.into_iter().filter(|p| *p != Page::NameTenant));
        state
    }

    /// Record the validity of `page`, returning whether anything changed
    pub fn set_page_valid(&mut self, page: Page, valid: bool) -> bool {
        if valid {
            self.valid.insert(page)
        } else {
            self.valid.remove(&page)
        }
    }

    pub fn is_valid(&self, page: Page) -> bool {
        self.valid.contains(&page)
    }

    /// Registered pages that still hold invalid values
    pub fn invalid_pages(&self) -> Vec<Page> {
        self.pages
            .iter()
            .copied()
            .filter(|p| !self.valid.contains(p))
            .collect()
    }

    pub fn can_submit(&self) -> bool {
        self.pages.iter().all(|p| self.valid.contains(p))
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<Page> {
        self.pages.get(self.current).copied()
    }

    pub fn next(&mut self) -> bool {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to `page`, if it is part of this wizard
    pub fn go_to(&mut self, page: Page) -> bool {
        match self.pages.iter().position(|p| *p == page) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }
}

/// Shared handle on a [`WizardState`].
///
/// Every clone observes the same state; subscribers are only woken when a change
/// actually alters it.
#[derive(Clone, Debug)]
pub struct Wizard {
    id: Uuid,
    state: Arc<watch::Sender<WizardState>>,
}

impl Wizard {
    pub fn new(state: WizardState) -> Self {
        let (state, _) = watch::channel(state);

        Self {
            id: Uuid::new_v4(),
            state: Arc::new(state),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_page_valid(&self, page: Page, valid: bool) -> bool {
        let changed = self
            .state
            .send_if_modified(|state| state.set_page_valid(page, valid));
        if changed {
            debug!(wizard = %self.id, %page, valid, "page validity changed");
        }

        changed
    }

    pub fn can_submit(&self) -> bool {
        self.state.borrow().can_submit()
    }

    pub fn snapshot(&self) -> WizardState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WizardState> {
        self.state.subscribe()
    }

    pub fn next_page(&self) -> Option<Page> {
        self.state.send_if_modified(WizardState::next);
        self.state.borrow().current_page()
    }

    pub fn previous_page(&self) -> Option<Page> {
        self.state.send_if_modified(WizardState::previous);
        self.state.borrow().current_page()
    }
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new(WizardState::tenant_creation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_requires_every_page() {
        let mut state = WizardState::new([Page::TenantSize, Page::Configure]);

        state.set_page_valid(Page::TenantSize, false);
        assert!(!state.can_submit());
        state.set_page_valid(Page::TenantSize, true);
        assert!(!state.can_submit());
        state.set_page_valid(Page::Configure, true);
        assert!(state.can_submit());

        state.set_page_valid(Page::TenantSize, false);
        assert!(!state.can_submit());
        assert_eq!(state.invalid_pages(), vec![Page::TenantSize]);
    }

    #[test]
    fn validity_updates_are_idempotent() {
        let mut state = WizardState::new([Page::TenantSize]);

        assert!(state.set_page_valid(Page::TenantSize, true));
        assert!(!state.set_page_valid(Page::TenantSize, true));
        let once = state.clone();
        state.set_page_valid(Page::TenantSize, true);
        assert_eq!(state, once);

        assert!(state.set_page_valid(Page::TenantSize, false));
        assert!(!state.set_page_valid(Page::TenantSize, false));
    }

    #[test]
    fn unregistered_pages_do_not_gate_submission() {
        let mut state = WizardState::new([Page::NameTenant]);
        state.set_page_valid(Page::NameTenant, true);
        state.set_page_valid(Page::Security, false);

        assert!(state.can_submit());
    }

    #[test]
    fn tenant_creation_waits_for_a_name() {
        let state = WizardState::tenant_creation();

        assert_eq!(state.pages().len(), 7);
        assert_eq!(state.invalid_pages(), vec![Page::NameTenant]);
        assert!(!state.can_submit());
    }

    #[test]
    fn navigates_between_pages() {
        let pages = [Page::NameTenant, Page::TenantSize, Page::NameTenant];
        let mut state = WizardState::new(pages);

        assert_eq!(state.pages(), &[Page::NameTenant, Page::TenantSize]);
        assert!(!state.previous());
        assert!(state.next());
        assert_eq!(state.current_page(), Some(Page::TenantSize));
        assert!(!state.next());
        assert!(state.go_to(Page::NameTenant));
        assert_eq!(state.current_index(), 0);
        assert!(!state.go_to(Page::Encryption));
    }

    #[tokio::test]
    async fn subscribers_see_validity_changes() {
        let wizard = Wizard::new(WizardState::new([Page::TenantSize, Page::Configure]));
        let mut updates = wizard.subscribe();

        wizard.set_page_valid(Page::Configure, true);
        updates.changed().await.unwrap();
        assert!(!updates.borrow_and_update().can_submit());

        // Repeating a value does not notify
        assert!(!wizard.set_page_valid(Page::Configure, true));
        assert!(!updates.has_changed().unwrap());

        wizard.set_page_valid(Page::TenantSize, true);
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().can_submit());
        assert!(wizard.can_submit());
    }

    #[tokio::test]
    async fn subscribers_follow_navigation() {
        let wizard = Wizard::new(WizardState::new([Page::NameTenant, Page::TenantSize]));
        let mut updates = wizard.subscribe();

        assert_eq!(wizard.previous_page(), Some(Page::NameTenant));
        assert!(!updates.has_changed().unwrap());

        assert_eq!(wizard.next_page(), Some(Page::TenantSize));
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().current_index(), 1);

        // Already on the last page
        assert_eq!(wizard.next_page(), Some(Page::TenantSize));
        assert!(!updates.has_changed().unwrap());

        assert_eq!(wizard.previous_page(), Some(Page::NameTenant));
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().current_page(), Some(Page::NameTenant));
    }

    #[test]
    fn page_names_match_the_api() {
        assert_eq!(Page::TenantSize.to_string(), "tenantSize");
        assert_eq!(
            serde_json::to_string(&Page::IdentityProvider).unwrap(),
            r#""identityProvider""#
        );
    }
}
