use serde::Deserialize;

use crate::request::RequestContext;
use crate::verifier::MalformedClaim;
use crate::Matcher;

/// Request attribute a leaf condition inspects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionType {
    SourceIp,
    RemoteIp,
    DestIp,
    Host,
    Method,
    Path,
    Port,
    /// Requires a key naming the header.
    Header,
    /// Transport-verified peer identity.
    Identity,
    /// `iss + "/" + sub` of the verified token.
    RequestPrincipal,
    AuthAudience,
    AuthPresenter,
    /// Requires a key naming the claim.
    AuthClaim,
}

impl ConditionType {
    pub fn requires_key(self) -> bool {
        matches!(self, ConditionType::Header | ConditionType::AuthClaim)
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub key: Option<String>,
    pub matcher: Matcher,
}

impl Condition {
    pub fn new(condition_type: ConditionType, matcher: Matcher) -> Self {
        Self {
            condition_type,
            key: None,
            matcher,
        }
    }

    pub fn keyed(condition_type: ConditionType, key: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            condition_type,
            key: Some(key.into()),
            matcher,
        }
    }

    /// Extracts the attribute this condition names and runs the matcher.
    ///
    /// Token-derived conditions are `false` when the request carries no
    /// verified claims. A claim with an unexpected shape is reported as an
    /// error for the caller to treat as a non-match.
    pub(crate) fn evaluate(&self, request: &RequestContext) -> Result<bool, MalformedClaim> {
        let matcher = &self.matcher;
        let key = self.key.as_deref().unwrap_or_default();

        let matched = match self.condition_type {
            ConditionType::SourceIp => matcher.matches(&request.source_ip),
            ConditionType::RemoteIp => matcher.matches(&request.remote_ip),
            ConditionType::DestIp => matcher.matches(&request.dest_ip),
            ConditionType::Host => matcher.matches(&request.host),
            ConditionType::Method => matcher.matches(&request.method),
            ConditionType::Path => matcher.matches(&request.path),
            ConditionType::Port => matcher.matches_int(i64::from(request.port)),
            ConditionType::Header => request
                .headers
                .get_all(key)
                .iter()
                .any(|value| matcher.matches(value)),
            ConditionType::Identity => request
                .peer_identity
                .as_deref()
                .map_or(false, |identity| matcher.matches(identity)),
            ConditionType::RequestPrincipal => match &request.claims {
                None => false,
                Some(claims) => {
                    let issuer = claims
                        .issuer()?
                        .ok_or_else(|| MalformedClaim("iss".into()))?;
                    let subject = claims
                        .subject()?
                        .ok_or_else(|| MalformedClaim("sub".into()))?;
                    matcher.matches(&format!("{}/{}", issuer, subject))
                }
            },
            ConditionType::AuthAudience => match &request.claims {
                None => false,
                Some(claims) => claims
                    .audiences()?
                    .into_iter()
                    .any(|audience| matcher.matches(audience)),
            },
            ConditionType::AuthPresenter => match &request.claims {
                None => false,
                Some(claims) => claims
                    .presenter()?
                    .map_or(false, |presenter| matcher.matches(&presenter)),
            },
            ConditionType::AuthClaim => match &request.claims {
                None => false,
                Some(claims) => claims
                    .strings(key)?
                    .map_or(false, |values| values.into_iter().any(|v| matcher.matches(v))),
            },
        };
        Ok(matched)
    }
}
