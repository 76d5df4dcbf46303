//! Impersonated user identities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The identity a function sees through `ctx.auth`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Subject claim. Filled with a digest of the other claims when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Issuer claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// `issuer|subject`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_identifier: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Nickname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the email address is verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Picture URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    /// Any further claims.
    #[serde(flatten)]
    pub custom_claims: BTreeMap<String, serde_json::Value>,
}

impl UserIdentity {
    /// Creates an empty identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Adds a custom claim.
    #[must_use]
    pub fn claim(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_claims.insert(key.into(), value);
        self
    }

    /// Fills in `subject`, `issuer` and `tokenIdentifier` where missing.
    ///
    /// The generated subject is the SHA-256 of the identity's JSON form, so
    /// the same claims always impersonate the same user.
    #[must_use]
    pub fn with_defaults(mut self, default_issuer: &str) -> Self {
        if self.subject.is_none() {
            self.subject = Some(self.digest());
        }
        if self.issuer.is_none() {
            self.issuer = Some(default_issuer.to_string());
        }
        if self.token_identifier.is_none() {
            self.token_identifier = Some(format!(
                "{}|{}",
                self.issuer.as_deref().unwrap_or_default(),
                self.subject.as_deref().unwrap_or_default()
            ));
        }
        self
    }

    fn digest(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex_digest(&encoded)
    }
}

/// Lower-case hex SHA-256 of `bytes`.
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
