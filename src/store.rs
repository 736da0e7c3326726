use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::policy::{PolicyBuilder, PolicySet};
use crate::routing::{RouteIndex, RouteIndexBuilder};
use crate::Result;

/// Holds the active `PolicySet` and `RouteIndex`.
///
/// Readers take a snapshot with `load_policy` / `load_routes` and keep
/// using it for the whole request; writers publish a fully built value in
/// one store. A reader never observes a half-applied update.
#[derive(Debug)]
pub struct PolicyStore {
    policy: ArcSwap<PolicySet>,
    routes: ArcSwap<RouteIndex>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(PolicySet::default())
    }
}

impl PolicyStore {
    pub fn new(policy: PolicySet) -> Self {
        Self {
            policy: ArcSwap::from_pointee(policy),
            routes: ArcSwap::from_pointee(RouteIndex::default()),
        }
    }

    pub fn with_routes(self, routes: RouteIndex) -> Self {
        self.routes.store(Arc::new(routes));
        self
    }

    pub fn load_policy(&self) -> Arc<PolicySet> {
        self.policy.load_full()
    }

    pub fn load_routes(&self) -> Arc<RouteIndex> {
        self.routes.load_full()
    }

    /// Publishes a new policy. In-flight requests finish on the snapshot
    /// they already hold.
    pub fn replace(&self, policy: PolicySet) {
        tracing::info!(
            deny = policy.deny.len(),
            allow = policy.allow.len(),
            jwt_rules = policy.jwt_rules.len(),
            "publishing policy"
        );
        self.policy.store(Arc::new(policy));
    }

    pub fn replace_routes(&self, routes: RouteIndex) {
        tracing::info!(services = routes.len(), "publishing route index");
        self.routes.store(Arc::new(routes));
    }

    /// Builds a policy from json and publishes it. On error the active
    /// policy is left untouched.
    pub fn update_policy_json(&self, json: &str) -> Result<()> {
        match PolicyBuilder::from_json(json).build() {
            Ok(policy) => {
                self.replace(policy);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejected policy update, keeping previous policy");
                Err(err)
            }
        }
    }

    pub fn update_routes_json(&self, json: &str) -> Result<()> {
        match RouteIndexBuilder::from_json(json).build() {
            Ok(routes) => {
                self.replace_routes(routes);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejected route update, keeping previous index");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use assert_matches::assert_matches;

    const POLICY: &str = r#"{
        "allow": [
            { "name": "health", "conditionType": "path", "matcherType": "exact", "matcherValue": "/health" }
        ]
    }"#;

    #[test]
    fn starts_empty() {
        let store = PolicyStore::default();
        assert!(store.load_policy().is_empty());
        assert!(store.load_routes().is_empty());
    }

    #[test]
    fn update_publishes_new_snapshot() {
        let store = PolicyStore::default();
        let before = store.load_policy();

        store.update_policy_json(POLICY).expect("valid policy");

        let after = store.load_policy();
        assert!(before.allow.is_empty());
        assert!(after.allow.contains_key("health"));
    }

    #[test]
    fn rejected_update_keeps_previous_snapshot() {
        let store = PolicyStore::default();
        store.update_policy_json(POLICY).expect("valid policy");

        assert_matches!(
            store.update_policy_json(r#"{"allow": [{"name": "x", "isLeaf": false}]}"#),
            Err(Error::Validation(_))
        );
        assert!(store.load_policy().allow.contains_key("health"));

        assert_matches!(
            store.update_routes_json(r#"{"services": 1}"#),
            Err(Error::Deserializing(_))
        );
        assert!(store.load_routes().is_empty());
    }

    #[test]
    fn routes_update() {
        let store = PolicyStore::default().with_routes(RouteIndex::new().with_service("a", "v0", vec![]));
        assert!(store.load_routes().contains("a"));

        store
            .update_routes_json(r#"{"services": [{"targetService": "b", "defaultVersion": "v1"}]}"#)
            .expect("valid routes");

        let routes = store.load_routes();
        assert!(!routes.contains("a"));
        assert_eq!(Some("v1"), routes.default_version("b"));
    }
}
