use std::borrow::Cow;
use std::fmt;

use jsonwebtoken::{jwk::Jwk, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::errors::TokenError;
use crate::token::TokenLocation;

/// Verified claim set of a bearer token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

/// A claim is present but does not have the shape its reader expects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MalformedClaim(pub(crate) String);

impl fmt::Display for MalformedClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim {} has an unexpected shape", self.0)
    }
}

impl From<MalformedClaim> for TokenError {
    fn from(err: MalformedClaim) -> Self {
        TokenError::MalformedClaim(err.0)
    }
}

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Claims(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub(crate) fn issuer(&self) -> Result<Option<&str>, MalformedClaim> {
        self.string("iss")
    }

    pub(crate) fn subject(&self) -> Result<Option<&str>, MalformedClaim> {
        self.string("sub")
    }

    /// Authorized party (`azp`). Numeric and boolean values are read in
    /// their json text form.
    pub(crate) fn presenter(&self) -> Result<Option<Cow<'_, str>>, MalformedClaim> {
        match self.0.get("azp") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(Cow::Borrowed(value.as_str()))),
            Some(scalar @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Some(Cow::Owned(scalar.to_string())))
            }
            Some(_) => Err(MalformedClaim("azp".into())),
        }
    }

    /// Audiences as a list; a single string audience is a list of one and a
    /// missing claim is an empty list.
    pub(crate) fn audiences(&self) -> Result<Vec<&str>, MalformedClaim> {
        Ok(self.strings("aud")?.unwrap_or_default())
    }

    pub(crate) fn string(&self, name: &str) -> Result<Option<&str>, MalformedClaim> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(MalformedClaim(name.to_string())),
        }
    }

    /// Reads a claim that may be a string or a list of strings.
    pub(crate) fn strings(&self, name: &str) -> Result<Option<Vec<&str>>, MalformedClaim> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(vec![value.as_str()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| MalformedClaim(name.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(MalformedClaim(name.to_string())),
        }
    }
}

/// What a token must satisfy to be accepted: a signature from a key in
/// `key_set`, the configured issuer, and one of the configured audiences.
#[derive(Debug, Clone)]
pub struct TokenVerificationRule {
    pub key_set: JwkSet,
    /// Exact match when present.
    pub issuer: Option<String>,
    /// When non-empty, at least one token audience must be listed here.
    pub audiences: Vec<String>,
}

/// A named pairing of where to find a token and how to verify it.
#[derive(Debug, Clone)]
pub struct JwtRule {
    pub name: String,
    pub location: TokenLocation,
    pub verification: TokenVerificationRule,
}

/// Verifies a raw compact token against a `TokenVerificationRule`.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, rule: &TokenVerificationRule) -> Result<Claims, TokenError>;
}

/// Verifies tokens against an in-memory JWKS.
///
/// Only the signature is checked by default; temporal claims (`exp`, `nbf`)
/// are not enforced unless `with_expiry_enforcement(true)` is set. Issuer and
/// audience checks are driven by the rule, not by the token library.
#[derive(Debug, Clone)]
pub struct JwksVerifier {
    enforce_expiry: bool,
    leeway: u64,
}

impl Default for JwksVerifier {
    fn default() -> Self {
        Self {
            enforce_expiry: false,
            leeway: 60,
        }
    }
}

impl JwksVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expiry_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_expiry = enforce;
        self
    }

    /// Clock skew allowance in seconds, used only with expiry enforcement.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.validate_aud = false;
        validation.validate_exp = self.enforce_expiry;
        validation.validate_nbf = self.enforce_expiry;
        validation.leeway = self.leeway;
        validation.required_spec_claims.clear();
        if self.enforce_expiry {
            validation.required_spec_claims.insert("exp".to_string());
        }
        validation
    }

    fn verify_signature(&self, token: &str, key_set: &JwkSet) -> Result<Claims, TokenError> {
        if key_set.keys.is_empty() {
            return Err(TokenError::EmptyKeySet);
        }

        let header = jsonwebtoken::decode_header(token)?;
        let validation = self.validation(header.alg);

        if let Some(kid) = header.kid.as_deref() {
            let jwk = key_set
                .find(kid)
                .ok_or_else(|| TokenError::UnknownKey(kid.to_string()))?;
            return decode(token, jwk, &validation);
        }

        // no kid: accept the first key that verifies.
        let mut last_error = None;
        for jwk in &key_set.keys {
            match decode(token, jwk, &validation) {
                Ok(claims) => return Ok(claims),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(TokenError::NoMatchingKey))
    }
}

impl TokenVerifier for JwksVerifier {
    fn verify(&self, token: &str, rule: &TokenVerificationRule) -> Result<Claims, TokenError> {
        let claims = self.verify_signature(token, &rule.key_set)?;

        if let Some(expected) = rule.issuer.as_deref().filter(|issuer| !issuer.is_empty()) {
            let actual = claims.issuer()?;
            if actual != Some(expected) {
                return Err(TokenError::IssuerMismatch {
                    expected: expected.to_string(),
                    actual: actual.map(ToString::to_string),
                });
            }
        }

        if !rule.audiences.is_empty() {
            let accepted = claims
                .audiences()?
                .into_iter()
                .any(|aud| rule.audiences.iter().any(|allowed| allowed == aud));
            if !accepted {
                return Err(TokenError::AudienceMismatch);
            }
        }

        Ok(claims)
    }
}

fn decode(token: &str, jwk: &Jwk, validation: &Validation) -> Result<Claims, TokenError> {
    let key = DecodingKey::from_jwk(jwk)?;
    let data = jsonwebtoken::decode::<Map<String, Value>>(token, &key, validation)?;
    Ok(Claims(data.claims))
}
