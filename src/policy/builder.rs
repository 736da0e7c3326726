use std::collections::{btree_map::Entry, BTreeMap};

use jsonwebtoken::jwk::JwkSet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    condition::{Condition, ConditionType},
    matcher::{Matcher, MatcherType},
    policy::{Operator, PolicySet, Rule},
    token::{HeaderSource, TokenLocation},
    verifier::{JwtRule, TokenVerificationRule},
    Error, Result,
};

pub const SCHEMA_VERSION: &str = "2023-06-01";

lazy_static! {
    // RFC 7230 token characters.
    static ref HEADER_NAME: Regex = Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$")
        .expect("header name pattern is valid");
}

/// Compiles a json policy definition into a `PolicySet`.
///
/// The whole document is validated before anything is returned: a single
/// bad rule rejects the definition.
pub struct PolicyBuilder {
    json: String,
}

impl PolicyBuilder {
    pub fn from_json(json: &str) -> Self {
        Self { json: json.into() }
    }

    pub fn build(self) -> Result<PolicySet> {
        let definition: PolicyDefinition = serde_json::from_str(&self.json)?;

        if let Some(version) = &definition.schema_version {
            if version != SCHEMA_VERSION {
                return Err(Error::Validation(format!(
                    "unsupported schema version {}",
                    version
                )));
            }
        }

        let mut policy = PolicySet::new();
        insert_rules(&mut policy.deny, definition.deny, "deny")?;
        insert_rules(&mut policy.allow, definition.allow, "allow")?;

        for jwt_rule in definition.jwt_rules {
            if policy.jwt_rules.iter().any(|r| r.name == jwt_rule.name) {
                return Err(Error::Validation(format!(
                    "duplicate jwt rule {}",
                    jwt_rule.name
                )));
            }
            policy.jwt_rules.push(jwt_rule.compile()?);
        }

        Ok(policy)
    }
}

fn insert_rules(
    target: &mut BTreeMap<String, Rule>,
    definitions: Vec<RuleDefinition>,
    section: &str,
) -> Result<()> {
    for definition in definitions {
        let name = match definition.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(Error::Validation(format!(
                    "{} rule without a name",
                    section
                )))
            }
        };
        let rule = definition.compile(&name)?;
        match target.entry(name) {
            Entry::Vacant(item) => {
                item.insert(rule);
            }
            Entry::Occupied(item) => {
                return Err(Error::Validation(format!(
                    "duplicate {} rule {}",
                    section,
                    item.key()
                )))
            }
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyDefinition {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    deny: Vec<RuleDefinition>,
    #[serde(default)]
    allow: Vec<RuleDefinition>,
    #[serde(default)]
    jwt_rules: Vec<JwtRuleDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDefinition {
    #[serde(default)]
    name: Option<String>,
    /// Inferred from `conditionType` when absent.
    #[serde(default)]
    is_leaf: Option<bool>,
    #[serde(default)]
    condition_type: Option<ConditionType>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    matcher_type: Option<MatcherType>,
    #[serde(default)]
    matcher_value: Option<Value>,
    #[serde(default)]
    ignore_case: bool,
    #[serde(default)]
    operator: Option<Operator>,
    #[serde(default)]
    negate: bool,
    #[serde(default)]
    children: Vec<RuleDefinition>,
}

impl RuleDefinition {
    fn compile(self, root: &str) -> Result<Rule> {
        let is_leaf = self.is_leaf.unwrap_or(self.condition_type.is_some());
        if is_leaf {
            return self.compile_leaf(root).map(Rule::Leaf);
        }

        let op = self
            .operator
            .ok_or_else(|| invalid(root, "composite rule without an operator"))?;
        let children = self
            .children
            .into_iter()
            .map(|child| child.compile(root))
            .collect::<Result<Vec<_>>>()?;

        Ok(Rule::Composite {
            op,
            negate: self.negate,
            children,
        })
    }

    fn compile_leaf(self, root: &str) -> Result<Condition> {
        if !self.children.is_empty() || self.operator.is_some() {
            return Err(invalid(root, "leaf rule with composite fields"));
        }
        let condition_type = self
            .condition_type
            .ok_or_else(|| invalid(root, "leaf rule without a condition type"))?;
        let matcher_type = self
            .matcher_type
            .ok_or_else(|| invalid(root, "leaf rule without a matcher type"))?;
        let pattern = matcher_pattern(self.matcher_value)
            .map_err(|reason| invalid(root, reason))?;

        let key = match (condition_type.requires_key(), self.key) {
            (true, Some(key)) if !key.is_empty() => Some(key),
            (true, _) => {
                return Err(invalid(
                    root,
                    format!("{:?} condition requires a key", condition_type),
                ))
            }
            (false, key) => key,
        };
        if let (ConditionType::Header, Some(name)) = (condition_type, &key) {
            validate_header_name(name)?;
        }

        let matcher = Matcher::new(matcher_type, &pattern, self.ignore_case)?;
        Ok(Condition {
            condition_type,
            key,
            matcher,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwtRuleDefinition {
    name: String,
    #[serde(default)]
    from_headers: Vec<HeaderSourceDefinition>,
    #[serde(default)]
    from_params: Vec<String>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    audiences: Vec<String>,
    /// Inline JWKS, either as a json string or an embedded object.
    #[serde(default)]
    jwks: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderSourceDefinition {
    name: String,
    #[serde(default)]
    prefix: String,
}

impl JwtRuleDefinition {
    fn compile(self) -> Result<JwtRule> {
        let name = self.name;
        let key_set = match self.jwks {
            None | Some(Value::Null) => JwkSet { keys: vec![] },
            Some(Value::String(raw)) if raw.trim().is_empty() => JwkSet { keys: vec![] },
            Some(Value::String(raw)) => serde_json::from_str(&raw)
                .map_err(|e| invalid(&name, format!("invalid jwks: {}", e)))?,
            Some(object) => serde_json::from_value(object)
                .map_err(|e| invalid(&name, format!("invalid jwks: {}", e)))?,
        };

        let mut headers = Vec::with_capacity(self.from_headers.len());
        for header in self.from_headers {
            validate_header_name(&header.name)?;
            headers.push(HeaderSource::new(header.name, header.prefix));
        }

        Ok(JwtRule {
            name,
            location: TokenLocation {
                headers,
                params: self.from_params,
            },
            verification: TokenVerificationRule {
                key_set,
                issuer: self.issuer.filter(|issuer| !issuer.is_empty()),
                audiences: self.audiences,
            },
        })
    }
}

/// Matcher operands may be written as json strings or numbers.
pub(crate) fn matcher_pattern(value: Option<Value>) -> std::result::Result<String, &'static str> {
    match value {
        Some(Value::String(value)) => Ok(value),
        Some(Value::Number(value)) => Ok(value.to_string()),
        Some(_) => Err("matcher value must be a string or a number"),
        None => Err("missing matcher value"),
    }
}

pub(crate) fn validate_header_name(name: &str) -> Result<()> {
    if HEADER_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid header name {:?}", name)))
    }
}

fn invalid(rule: &str, reason: impl std::fmt::Display) -> Error {
    Error::Validation(format!("rule {}: {}", rule, reason))
}
