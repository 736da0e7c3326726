use std::net::IpAddr;

use ipnet::IpNet;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::{Error, Result};

/// Kind of comparison a `Matcher` performs, as named in policy definitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatcherType {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Regex,
    Cidr,
    IntEqual,
}

/// Value-comparison primitive at the bottom of every rule tree.
///
/// A matcher is built once from configuration and never mutated, so it can
/// be shared across request threads without locking. String kinds compare
/// case-sensitively unless built with `ignore_case`.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact { value: String, ignore_case: bool },
    Prefix { value: String, ignore_case: bool },
    Suffix { value: String, ignore_case: bool },
    Contains { value: String, ignore_case: bool },
    /// Anchored at both ends: the whole candidate must match.
    Regex(Regex),
    Cidr(IpNet),
    IntEqual(i64),
}

impl Matcher {
    /// Builds a matcher of the given kind from its textual operand.
    pub fn new(kind: MatcherType, pattern: &str, ignore_case: bool) -> Result<Self> {
        let normalize = |value: &str| {
            if ignore_case {
                value.to_lowercase()
            } else {
                value.to_string()
            }
        };

        let matcher = match kind {
            MatcherType::Exact => Matcher::Exact {
                value: normalize(pattern),
                ignore_case,
            },
            MatcherType::Prefix => Matcher::Prefix {
                value: normalize(pattern),
                ignore_case,
            },
            MatcherType::Suffix => Matcher::Suffix {
                value: normalize(pattern),
                ignore_case,
            },
            MatcherType::Contains => Matcher::Contains {
                value: normalize(pattern),
                ignore_case,
            },
            MatcherType::Regex => {
                let regex = RegexBuilder::new(&format!("^(?:{})$", pattern))
                    .case_insensitive(ignore_case)
                    .build()
                    .map_err(|e| invalid(pattern, e))?;
                Matcher::Regex(regex)
            }
            MatcherType::Cidr => Matcher::Cidr(parse_cidr(pattern)?),
            MatcherType::IntEqual => {
                Matcher::IntEqual(pattern.trim().parse().map_err(|e| invalid(pattern, e))?)
            }
        };
        Ok(matcher)
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Matcher::Exact {
            value: value.into(),
            ignore_case: false,
        }
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Matcher::Prefix {
            value: value.into(),
            ignore_case: false,
        }
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Self::new(MatcherType::Regex, pattern, false)
    }

    pub fn cidr(block: &str) -> Result<Self> {
        Self::new(MatcherType::Cidr, block, false)
    }

    pub fn int_equal(value: i64) -> Self {
        Matcher::IntEqual(value)
    }

    pub fn kind(&self) -> MatcherType {
        match self {
            Matcher::Exact { .. } => MatcherType::Exact,
            Matcher::Prefix { .. } => MatcherType::Prefix,
            Matcher::Suffix { .. } => MatcherType::Suffix,
            Matcher::Contains { .. } => MatcherType::Contains,
            Matcher::Regex(_) => MatcherType::Regex,
            Matcher::Cidr(_) => MatcherType::Cidr,
            Matcher::IntEqual(_) => MatcherType::IntEqual,
        }
    }

    /// Matches a textual candidate.
    ///
    /// `Cidr` and `IntEqual` parse the candidate first; a candidate that does
    /// not parse is simply not a match.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact { value, ignore_case } => {
                fold(candidate, *ignore_case) == value.as_str()
            }
            Matcher::Prefix { value, ignore_case } => {
                fold(candidate, *ignore_case).starts_with(value.as_str())
            }
            Matcher::Suffix { value, ignore_case } => {
                fold(candidate, *ignore_case).ends_with(value.as_str())
            }
            Matcher::Contains { value, ignore_case } => {
                fold(candidate, *ignore_case).contains(value.as_str())
            }
            Matcher::Regex(regex) => regex.is_match(candidate),
            Matcher::Cidr(block) => candidate
                .trim()
                .parse::<IpAddr>()
                .map_or(false, |addr| block.contains(&addr)),
            Matcher::IntEqual(expected) => candidate
                .trim()
                .parse::<i64>()
                .map_or(false, |actual| actual == *expected),
        }
    }

    /// Matches a numeric candidate such as a port.
    ///
    /// String kinds see the decimal rendering of the number.
    pub fn matches_int(&self, candidate: i64) -> bool {
        match self {
            Matcher::IntEqual(expected) => candidate == *expected,
            _ => self.matches(&candidate.to_string()),
        }
    }
}

fn fold(candidate: &str, ignore_case: bool) -> std::borrow::Cow<'_, str> {
    if ignore_case {
        std::borrow::Cow::Owned(candidate.to_lowercase())
    } else {
        std::borrow::Cow::Borrowed(candidate)
    }
}

fn parse_cidr(pattern: &str) -> Result<IpNet> {
    let pattern = pattern.trim();
    if let Ok(block) = pattern.parse::<IpNet>() {
        return Ok(block.trunc());
    }
    pattern
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|e| invalid(pattern, e))
}

fn invalid(pattern: &str, reason: impl std::fmt::Display) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}
