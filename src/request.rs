use std::collections::BTreeMap;

use crate::verifier::Claims;

/// Ordered multi-valued map used for request headers and query parameters.
///
/// A map built with `case_insensitive` folds names to lowercase on insert
/// and lookup, which is how HTTP header names compare.
#[derive(Debug, Clone, Default)]
pub struct MultiMap {
    case_insensitive: bool,
    entries: BTreeMap<String, Vec<String>>,
}

impl MultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = self.normalize(name.into());
        self.entries.entry(name).or_default().push(value.into());
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        let found = if self.case_insensitive {
            self.entries.get(&name.to_ascii_lowercase())
        } else {
            self.entries.get(name)
        };
        found.map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalize(&self, name: String) -> String {
        if self.case_insensitive {
            name.to_ascii_lowercase()
        } else {
            name
        }
    }
}

/// Normalized view of one inbound request.
///
/// Built once by the transport layer and read by the evaluator. The only
/// field the evaluator writes is `claims`, set after a token verifies.
/// `headers` always starts out case-insensitive, whichever way the context
/// is constructed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source_ip: String,
    pub dest_ip: String,
    pub remote_ip: String,
    pub host: String,
    pub port: u16,
    pub method: String,
    pub path: String,
    pub headers: MultiMap,
    pub params: MultiMap,
    /// Peer principal established by the transport, e.g. an mTLS identity.
    pub peer_identity: Option<String>,
    pub claims: Option<Claims>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            source_ip: String::new(),
            dest_ip: String::new(),
            remote_ip: String::new(),
            host: String::new(),
            port: 0,
            method: String::new(),
            path: String::new(),
            headers: MultiMap::case_insensitive(),
            params: MultiMap::new(),
            peer_identity: None,
            claims: None,
        }
    }
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    context: RequestContext,
}

impl RequestContextBuilder {
    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.context.source_ip = ip.into();
        self
    }

    pub fn dest_ip(mut self, ip: impl Into<String>) -> Self {
        self.context.dest_ip = ip.into();
        self
    }

    pub fn remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.context.remote_ip = ip.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.context.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.context.port = port;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.context.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.context.path = path.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.params.insert(name, value);
        self
    }

    pub fn peer_identity(mut self, identity: impl Into<String>) -> Self {
        self.context.peer_identity = Some(identity.into());
        self
    }

    pub fn build(self) -> RequestContext {
        self.context
    }
}
