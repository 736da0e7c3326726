use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    matcher::{Matcher, MatcherType},
    policy::builder::{matcher_pattern, validate_header_name, SCHEMA_VERSION},
    routing::{MatchRoute, RouteIndex, RouteRule, ServiceRoutes, TOTAL_WEIGHT},
    Error, Result,
};

/// Compiles a json routing definition into a `RouteIndex`.
pub struct RouteIndexBuilder {
    json: String,
}

impl RouteIndexBuilder {
    pub fn from_json(json: &str) -> Self {
        Self { json: json.into() }
    }

    pub fn build(self) -> Result<RouteIndex> {
        let definition: RoutingDefinition = serde_json::from_str(&self.json)?;

        if let Some(version) = &definition.schema_version {
            if version != SCHEMA_VERSION {
                return Err(Error::Validation(format!(
                    "unsupported schema version {}",
                    version
                )));
            }
        }

        let mut services = HashMap::with_capacity(definition.services.len());
        for service in definition.services {
            let name = match service.target_service.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => return Err(Error::Validation("route without a target service".into())),
            };
            if services.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "duplicate target service {}",
                    name
                )));
            }

            let routes = service
                .match_routes
                .into_iter()
                .map(|route| route.compile(&name))
                .collect::<Result<Vec<_>>>()?;
            services.insert(name, ServiceRoutes::new(service.default_version, routes));
        }

        Ok(RouteIndex { services })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingDefinition {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDefinition {
    #[serde(default)]
    target_service: Option<String>,
    default_version: String,
    #[serde(default)]
    match_routes: Vec<MatchRouteDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchRouteDefinition {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    weight: Option<i64>,
    #[serde(default)]
    rules: Vec<RouteRuleDefinition>,
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum RouteRuleKind {
    Header,
    Parameter,
    Path,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRuleDefinition {
    #[serde(rename = "type")]
    kind: RouteRuleKind,
    #[serde(default)]
    key: Option<String>,
    matcher_type: MatcherType,
    #[serde(default)]
    matcher_value: Option<Value>,
    #[serde(default)]
    ignore_case: bool,
}

impl MatchRouteDefinition {
    fn compile(self, service: &str) -> Result<MatchRoute> {
        let version = match self.version {
            Some(version) if !version.is_empty() => version,
            _ => {
                return Err(Error::Validation(format!(
                    "route of {} without a version",
                    service
                )))
            }
        };

        let weight = self.weight.unwrap_or(i64::from(TOTAL_WEIGHT));
        let weight = u8::try_from(weight)
            .ok()
            .filter(|weight| *weight <= TOTAL_WEIGHT)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "weight {} of {} version {} is outside 0..=100",
                    weight, service, version
                ))
            })?;

        if self.rules.is_empty() {
            return Err(Error::Validation(format!(
                "route of {} version {} has no rules",
                service, version
            )));
        }
        let rules = self
            .rules
            .into_iter()
            .map(RouteRuleDefinition::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(MatchRoute::new(version, weight, rules))
    }
}

impl RouteRuleDefinition {
    fn compile(self) -> Result<RouteRule> {
        let pattern = matcher_pattern(self.matcher_value)
            .map_err(|reason| Error::Validation(format!("route rule: {}", reason)))?;
        let matcher = Matcher::new(self.matcher_type, &pattern, self.ignore_case)?;

        let key = match (self.kind, self.key) {
            (RouteRuleKind::Path, _) => return Ok(RouteRule::Path { matcher }),
            (_, Some(key)) if !key.is_empty() => key,
            _ => return Err(Error::Validation("keyed route rule without a key".into())),
        };

        if self.kind == RouteRuleKind::Header {
            validate_header_name(&key)?;
            Ok(RouteRule::Header { key, matcher })
        } else {
            Ok(RouteRule::Parameter { key, matcher })
        }
    }
}
