#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

pub const TRUSTED_SECRET: &[u8] = b"mesh-authz-trusted-secret-000000";
pub const UNTRUSTED_SECRET: &[u8] = b"mesh-authz-untrusted-secret-9999";
pub const KID: &str = "primary";

pub fn jwks(kid: &str, secret: &[u8]) -> Value {
    json!({
        "keys": [{
            "kty": "oct",
            "kid": kid,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(secret),
        }]
    })
}

pub fn sign(claims: &Value, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret)).expect("token encodes")
}

/// Policy json with a single jwt rule reading the standard bearer header.
pub fn policy_with_jwt(allow: Value) -> String {
    json!({
        "schemaVersion": "2023-06-01",
        "allow": allow,
        "jwtRules": [{
            "name": "corp-idp",
            "fromHeaders": [{ "name": "Authorization", "prefix": "Bearer " }],
            "issuer": "https://idp.example.com",
            "audiences": ["orders"],
            "jwks": jwks(KID, TRUSTED_SECRET).to_string(),
        }]
    })
    .to_string()
}
