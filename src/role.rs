//! # Role manager (C8)
//!
//! Holds and mutates the instance's role, and gates which subsystems run,
//! per the table in spec.md §4.8. The effective role is computed once at
//! boot from `InstanceConfig` and mutated only by the three transition
//! methods below.

use tokio::sync::RwLock;

use crate::error::MonitorResult;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Primary,
    Dependent { primary_sync_url: String },
    Standalone,
}

impl Role {
    /// `primarySyncURL` set ⇒ dependent; else explicit primary flag ⇒
    /// primary; else standalone. The two conditions are never both true
    /// (enforced by the transition methods, which always clear the other).
    /// An empty string is treated as unset — `promote_to_primary` and
    /// `reset_to_standalone` clear the key by writing "" rather than
    /// deleting the row, since `config_set` has no delete counterpart.
    pub fn from_config(primary_sync_url: Option<String>, explicit_primary: bool) -> Self {
        match primary_sync_url.filter(|s| !s.is_empty()) {
            Some(url) => Role::Dependent { primary_sync_url: url },
            None if explicit_primary => Role::Primary,
            None => Role::Standalone,
        }
    }
}

#[derive(Debug)]
pub struct RoleManager {
    state: RwLock<Role>,
    store: std::sync::Arc<Store>,
}

impl RoleManager {
    pub async fn load(store: std::sync::Arc<Store>) -> MonitorResult<Self> {
        let primary_sync_url = store.config_get("primarySyncURL").await?;
        let explicit_primary = store
            .config_get("instanceRole")
            .await?
            .map(|v| v == "primary")
            .unwrap_or(false);
        Ok(Self {
            state: RwLock::new(Role::from_config(primary_sync_url, explicit_primary)),
            store,
        })
    }

    pub async fn role(&self) -> Role {
        self.state.read().await.clone()
    }

    pub async fn is_primary(&self) -> bool {
        matches!(self.role().await, Role::Primary)
    }

    pub async fn is_dependent(&self) -> bool {
        matches!(self.role().await, Role::Dependent { .. })
    }

    pub async fn is_standalone(&self) -> bool {
        matches!(self.role().await, Role::Standalone)
    }

    /// Locally-stored endpoints are scheduled on primary and standalone;
    /// notifications fire on primary and standalone; dependents only
    /// schedule endpoints synced from the primary and never notify.
    pub async fn emits_notifications(&self) -> bool {
        !self.is_dependent().await
    }

    pub async fn promote_to_primary(&self) -> MonitorResult<()> {
        self.store.config_set("primarySyncURL", "").await.ok();
        self.store.config_set("instanceRole", "primary").await?;
        *self.state.write().await = Role::Primary;
        Ok(())
    }

    pub async fn demote_to_dependent(&self, primary_sync_url: String) -> MonitorResult<()> {
        self.store.config_set("primarySyncURL", &primary_sync_url).await?;
        self.store.config_set("instanceRole", "").await.ok();
        *self.state.write().await = Role::Dependent { primary_sync_url };
        Ok(())
    }

    pub async fn reset_to_standalone(&self) -> MonitorResult<()> {
        self.store.config_set("primarySyncURL", "").await.ok();
        self.store.config_set("instanceRole", "").await.ok();
        *self.state.write().await = Role::Standalone;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependent_wins_over_explicit_primary() {
        // Invariant: the two conditions must never be simultaneously true;
        // if config is inconsistent, dependent takes precedence since it's
        // checked first, matching spec.md §4.8.
        let role = Role::from_config(Some("http://primary".into()), true);
        assert_eq!(role, Role::Dependent { primary_sync_url: "http://primary".into() });
    }

    #[test]
    fn no_config_is_standalone() {
        assert_eq!(Role::from_config(None, false), Role::Standalone);
    }

    #[test]
    fn empty_primary_sync_url_is_treated_as_unset() {
        // promote_to_primary/reset_to_standalone clear the key by writing
        // "" rather than deleting the row; a reload must not reread that as
        // a still-configured dependent.
        assert_eq!(Role::from_config(Some(String::new()), false), Role::Standalone);
        assert_eq!(Role::from_config(Some(String::new()), true), Role::Primary);
    }
}
