pub(crate) mod builder;
pub use builder::PolicyBuilder;

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::condition::Condition;
use crate::request::RequestContext;
use crate::verifier::JwtRule;

/// Boolean operator of a composite rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    /// Identity element: what an empty child list evaluates to.
    pub fn identity(self) -> bool {
        self == Operator::And
    }
}

/// Node of a rule tree.
///
/// Trees are built once at load time and never mutated; a policy change
/// replaces the whole tree. Only composite nodes carry negation.
#[derive(Debug, Clone)]
pub enum Rule {
    Leaf(Condition),
    Composite {
        op: Operator,
        negate: bool,
        children: Vec<Rule>,
    },
}

impl Rule {
    pub fn leaf(condition: Condition) -> Self {
        Rule::Leaf(condition)
    }

    pub fn and(children: Vec<Rule>) -> Self {
        Rule::Composite {
            op: Operator::And,
            negate: false,
            children,
        }
    }

    pub fn or(children: Vec<Rule>) -> Self {
        Rule::Composite {
            op: Operator::Or,
            negate: false,
            children,
        }
    }

    /// Flips the negation flag of a composite. Leaves are returned as-is.
    pub fn negated(self) -> Self {
        match self {
            Rule::Composite {
                op,
                negate,
                children,
            } => Rule::Composite {
                op,
                negate: !negate,
                children,
            },
            leaf => leaf,
        }
    }

    /// Evaluates the tree depth-first, children in order, stopping as soon
    /// as the accumulated value decides the operator.
    pub fn evaluate(&self, request: &RequestContext) -> bool {
        match self {
            Rule::Leaf(condition) => match condition.evaluate(request) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(
                        condition = ?condition.condition_type,
                        key = ?condition.key,
                        error = %e,
                        "leaf condition failed, treating as no match"
                    );
                    false
                }
            },
            Rule::Composite {
                op,
                negate,
                children,
            } => {
                let mut acc = op.identity();
                for child in children {
                    match op {
                        Operator::Or if acc => break,
                        Operator::And if !acc => break,
                        _ => {}
                    }
                    let matched = child.evaluate(request);
                    acc = match op {
                        Operator::Or => acc || matched,
                        Operator::And => acc && matched,
                    };
                }
                *negate != acc
            }
        }
    }
}

/// The named deny and allow rule trees active at one point in time, along
/// with the jwt rules used to populate token claims before evaluation.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub deny: BTreeMap<String, Rule>,
    pub allow: BTreeMap<String, Rule>,
    pub jwt_rules: Vec<JwtRule>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deny(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.deny.insert(name.into(), rule);
        self
    }

    pub fn with_allow(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.allow.insert(name.into(), rule);
        self
    }

    pub fn with_jwt_rule(mut self, rule: JwtRule) -> Self {
        self.jwt_rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.allow.is_empty() && self.jwt_rules.is_empty()
    }

    /// Name of the first deny rule matching the request.
    pub fn matching_deny(&self, request: &RequestContext) -> Option<&str> {
        first_match(&self.deny, request)
    }

    /// Name of the first allow rule matching the request.
    pub fn matching_allow(&self, request: &RequestContext) -> Option<&str> {
        first_match(&self.allow, request)
    }
}

fn first_match<'a>(rules: &'a BTreeMap<String, Rule>, request: &RequestContext) -> Option<&'a str> {
    rules
        .iter()
        .find(|(_, rule)| rule.evaluate(request))
        .map(|(name, _)| name.as_str())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allowed
    }

    pub fn is_denied(self) -> bool {
        self == Decision::Denied
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{ConditionType, Matcher};
    use proptest::prelude::*;
    use test_case::test_case;

    fn path(prefix: &str) -> Rule {
        Rule::leaf(Condition::new(ConditionType::Path, Matcher::prefix(prefix)))
    }

    /// Leaf whose outcome is fixed: matches every path or none.
    pub(crate) fn constant(value: bool) -> Rule {
        if value {
            path("")
        } else {
            Rule::leaf(Condition::new(ConditionType::Path, Matcher::exact("\u{0}")))
        }
    }

    fn request(path: &str) -> RequestContext {
        RequestContext::builder().path(path).build()
    }

    #[test_case(Operator::And, false, true; "empty and")]
    #[test_case(Operator::Or, false, false; "empty or")]
    #[test_case(Operator::And, true, false; "negated empty and")]
    #[test_case(Operator::Or, true, true; "negated empty or")]
    fn empty_composite_is_identity(op: Operator, negate: bool, expected: bool) {
        let rule = Rule::Composite {
            op,
            negate,
            children: vec![],
        };
        assert_eq!(expected, rule.evaluate(&request("/")));
    }

    #[test]
    fn nested_tree() {
        // (path starts with /api AND NOT (path starts with /api/internal OR /api/debug))
        let rule = Rule::and(vec![
            path("/api"),
            Rule::or(vec![path("/api/internal"), path("/api/debug")]).negated(),
        ]);

        assert!(rule.evaluate(&request("/api/orders")));
        assert!(!rule.evaluate(&request("/api/internal/x")));
        assert!(!rule.evaluate(&request("/api/debug")));
        assert!(!rule.evaluate(&request("/web")));
    }

    #[test]
    fn negated_leaf_is_unchanged() {
        let rule = path("/a").negated();
        assert!(rule.evaluate(&request("/a")));
    }

    #[test]
    fn malformed_leaf_is_no_match() {
        let mut request = request("/");
        request.claims = Some(crate::verifier::Claims::new(
            serde_json::json!({"groups": [1, 2]})
                .as_object()
                .cloned()
                .expect("object"),
        ));
        let claim = Rule::leaf(Condition::keyed(
            ConditionType::AuthClaim,
            "groups",
            Matcher::prefix(""),
        ));

        assert!(!claim.evaluate(&request));
        assert!(Rule::or(vec![claim.clone(), constant(true)]).evaluate(&request));
        assert!(Rule::or(vec![claim]).negated().evaluate(&request));
    }

    #[test]
    fn first_match_reports_rule_name() {
        let policy = PolicySet::new()
            .with_deny("block-admin", path("/admin"))
            .with_allow("public", path("/public"));

        assert_eq!(Some("block-admin"), policy.matching_deny(&request("/admin/x")));
        assert_eq!(None, policy.matching_deny(&request("/public")));
        assert_eq!(Some("public"), policy.matching_allow(&request("/public")));
        assert!(!policy.is_empty());
        assert!(PolicySet::new().is_empty());
    }

    #[derive(Debug, Clone)]
    pub(crate) enum Shape {
        Leaf(bool),
        Node(Operator, bool, Vec<Shape>),
    }

    pub(crate) fn shape() -> impl Strategy<Value = Shape> {
        let leaf = any::<bool>().prop_map(Shape::Leaf);
        leaf.prop_recursive(4, 32, 5, |inner| {
            (
                prop_oneof![Just(Operator::And), Just(Operator::Or)],
                any::<bool>(),
                prop::collection::vec(inner, 0..5),
            )
                .prop_map(|(op, negate, children)| Shape::Node(op, negate, children))
        })
    }

    pub(crate) fn build(shape: &Shape) -> Rule {
        match shape {
            Shape::Leaf(value) => constant(*value),
            Shape::Node(op, negate, children) => Rule::Composite {
                op: *op,
                negate: *negate,
                children: children.iter().map(build).collect(),
            },
        }
    }

    /// Evaluates every child and folds, without short-circuiting.
    pub(crate) fn reference(shape: &Shape) -> bool {
        match shape {
            Shape::Leaf(value) => *value,
            Shape::Node(op, negate, children) => {
                let values: Vec<bool> = children.iter().map(reference).collect();
                let acc = match op {
                    Operator::And => values.iter().all(|v| *v),
                    Operator::Or => values.iter().any(|v| *v),
                };
                *negate != acc
            }
        }
    }

    proptest! {
        #[test]
        fn short_circuit_agrees_with_full_reduction(shape in shape()) {
            let rule = build(&shape);
            prop_assert_eq!(reference(&shape), rule.evaluate(&request("/anything")));
        }
    }
}
