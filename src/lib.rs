#![deny(rust_2018_idioms, warnings)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cognitive_complexity,
    clippy::large_enum_variant,
    clippy::similar_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::return_self_not_must_use
)]
mod condition;
mod errors;
mod evaluator;
mod matcher;
mod policy;
mod request;
mod routing;
mod store;
mod token;
mod verifier;

pub use condition::{Condition, ConditionType};
pub use errors::{Error, Result, TokenError};
pub use evaluator::PolicyEvaluator;
pub use matcher::{Matcher, MatcherType};
pub use policy::builder::SCHEMA_VERSION;
pub use policy::PolicyBuilder;
pub use policy::{Decision, Operator, PolicySet, Rule};
pub use request::{MultiMap, RequestContext, RequestContextBuilder};
pub use routing::{MatchRoute, RouteIndex, RouteIndexBuilder, RouteRule, RouteSelection, TOTAL_WEIGHT};
pub use store::PolicyStore;
pub use token::{HeaderSource, TokenLocation, AUTHORIZATION, BEARER_PREFIX};
pub use verifier::{Claims, JwksVerifier, JwtRule, TokenVerificationRule, TokenVerifier};
