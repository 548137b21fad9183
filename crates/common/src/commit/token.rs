use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyError, PublicKey, Signature, WriteKey};

/// Prefix of an `Authorization` header value carrying a token.
pub const BEARER_PREFIX: &str = "Bearer ";
/// Token format version understood by the account service.
pub const TOKEN_VERSION: &str = "1.0.0";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is not of the form header.payload.signature")]
    Malformed,
    #[error("invalid base64url in token: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid token json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token signature: {0}")]
    Key(#[from] KeyError),
    #[error("token signature is not an ed25519 signature")]
    Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    EdDSA,
}

/// What the bearer may do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Potency {
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub alg: Algorithm,
    pub typ: String,
    pub uav: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub aud: String,
    /// Expiry as a unix timestamp; `None` never expires.
    pub exp: Option<u64>,
    pub fct: Vec<serde_json::Value>,
    pub iss: String,
    pub nbf: Option<u64>,
    /// The delegation this capability derives from, as an encoded token.
    pub prf: Option<String>,
    pub ptc: Potency,
    pub rsc: String,
}

/// An unsigned capability, fixed at construction.
///
/// Grants the audience `potency` over `resource` on behalf of the issuer. The
///  signing algorithm is part of the header from the start; signing only
///  serializes and never edits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    header: Header,
    payload: Payload,
}

impl CapabilityToken {
    /// An `APPEND` capability on every resource (`*`) with no expiry.
    pub fn append(issuer: impl Into<String>, audience: impl Into<String>, proof: Option<String>) -> Self {
        Self {
            header: Header {
                alg: Algorithm::EdDSA,
                typ: "JWT".to_string(),
                uav: TOKEN_VERSION.to_string(),
            },
            payload: Payload {
                aud: audience.into(),
                exp: None,
                fct: Vec::new(),
                iss: issuer.into(),
                nbf: None,
                prf: proof,
                ptc: Potency::Append,
                rsc: "*".to_string(),
            },
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Encode and sign as `header.payload.signature`.
    ///
    /// Header and payload are unpadded base64url JSON; the signature over
    ///  `header.payload` is padded base64url, which is what the account service
    ///  has always been sent.
    pub fn sign(&self, key: &WriteKey) -> Result<String, TokenError> {
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.header)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.payload)?);
        let signed = format!("{}.{}", header, payload);
        let signature = key.sign(signed.as_bytes());
        Ok(format!("{}.{}", signed, URL_SAFE.encode(signature.to_bytes())))
    }

    /// Decode `token` and check its signature against `issuer`.
    pub fn verify(token: &str, issuer: &PublicKey) -> Result<Self, TokenError> {
        let (header, payload, signature) = split(token).ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE
            .decode(signature)
            .or_else(|_| URL_SAFE_NO_PAD.decode(signature))?;
        let signature = Signature::from_slice(&signature).map_err(|_| TokenError::Signature)?;

        let signed_len = header.len() + 1 + payload.len();
        issuer.verify(token[..signed_len].as_bytes(), &signature)?;

        Ok(Self {
            header: serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header)?)?,
            payload: serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?,
        })
    }
}

fn split(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split('.');
    let parts = (parts.next()?, parts.next()?, parts.next()?, parts.next());
    match parts {
        (header, payload, signature, None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Some((header, payload, signature))
        }
        _ => None,
    }
}

/// A `Bearer <token>` string whose token has the three-segment shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn parse(value: &str) -> Result<Self, TokenError> {
        let token = value.strip_prefix(BEARER_PREFIX).ok_or(TokenError::Malformed)?;
        Self::from_token(token.to_string())
    }

    /// Wrap an already encoded token.
    pub fn from_token(token: String) -> Result<Self, TokenError> {
        split(&token).ok_or(TokenError::Malformed)?;
        Ok(Self(token))
    }

    /// The token without its prefix.
    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn into_token(self) -> String {
        self.0
    }

    pub fn header_value(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.0)
    }
}
