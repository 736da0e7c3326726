use crate::request::MultiMap;

pub const AUTHORIZATION: &str = "Authorization";
pub const BEARER_PREFIX: &str = "Bearer ";

/// A header to read a token from, and the prefix its value must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSource {
    pub name: String,
    pub prefix: String,
}

impl HeaderSource {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

/// Ordered lookup plan for a bearer token.
///
/// Configured headers are tried first, then query parameters, then the
/// standard `Authorization` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLocation {
    pub headers: Vec<HeaderSource>,
    pub params: Vec<String>,
}

impl TokenLocation {
    /// Returns the raw token, or `None` when the request carries none.
    pub fn extract<'a>(&self, headers: &'a MultiMap, params: &'a MultiMap) -> Option<&'a str> {
        let token = self
            .from_headers(headers)
            .or_else(|| self.from_params(params))
            .or_else(|| from_authorization(headers))?;

        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    fn from_headers<'a>(&self, headers: &'a MultiMap) -> Option<&'a str> {
        self.headers.iter().find_map(|source| {
            headers
                .get_first(&source.name)
                .filter(|value| !value.is_empty())
                .and_then(|value| value.strip_prefix(source.prefix.as_str()))
        })
    }

    fn from_params<'a>(&self, params: &'a MultiMap) -> Option<&'a str> {
        // a present parameter wins even when its value is empty.
        self.params.iter().find_map(|name| params.get_first(name))
    }
}

fn from_authorization(headers: &MultiMap) -> Option<&str> {
    let value = headers.get_first(AUTHORIZATION)?;
    Some(value.strip_prefix(BEARER_PREFIX).unwrap_or(value))
}
