use std::sync::Arc;

use crate::policy::{Decision, PolicySet};
use crate::request::RequestContext;
use crate::store::PolicyStore;
use crate::verifier::{JwksVerifier, TokenVerifier};

/// Makes permit/deny decisions against the policy currently held by a
/// `PolicyStore`.
///
/// The evaluator is synchronous and never blocks, so one instance can be
/// shared by every request worker.
pub struct PolicyEvaluator<V = JwksVerifier> {
    store: Arc<PolicyStore>,
    verifier: V,
}

impl PolicyEvaluator<JwksVerifier> {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self {
            store,
            verifier: JwksVerifier::default(),
        }
    }
}

impl<V> PolicyEvaluator<V>
where
    V: TokenVerifier,
{
    pub fn with_verifier<R: TokenVerifier>(self, verifier: R) -> PolicyEvaluator<R> {
        PolicyEvaluator {
            store: self.store,
            verifier,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Decides a request against the active policy.
    ///
    /// The policy snapshot is loaded once, so a concurrent update never
    /// changes the rules mid-evaluation. On return `request.claims` holds
    /// the claims of the token that verified, if any.
    pub fn authorize(&self, request: &mut RequestContext) -> Decision {
        let policy = self.store.load_policy();
        self.authorize_with(&policy, request)
    }

    /// Decides a request against an explicit policy.
    pub fn authorize_with(&self, policy: &PolicySet, request: &mut RequestContext) -> Decision {
        request.claims = None;

        for rule in &policy.jwt_rules {
            let token = match rule.location.extract(&request.headers, &request.params) {
                Some(token) => token,
                None => continue,
            };
            match self.verifier.verify(token, &rule.verification) {
                Ok(claims) => {
                    request.claims = Some(claims);
                    break;
                }
                Err(err) => {
                    tracing::warn!(jwt_rule = %rule.name, error = %err, "token verification failed");
                    return Decision::Denied;
                }
            }
        }

        if let Some(name) = policy.matching_deny(request) {
            tracing::debug!(rule = name, "denied by rule");
            return Decision::Denied;
        }

        if policy.allow.is_empty() {
            tracing::debug!("no allow rules, permitting");
            return Decision::Allowed;
        }

        match policy.matching_allow(request) {
            Some(name) => {
                tracing::debug!(rule = name, "allowed by rule");
                Decision::Allowed
            }
            None => {
                tracing::debug!("no allow rule matched, denying");
                Decision::Denied
            }
        }
    }
}
