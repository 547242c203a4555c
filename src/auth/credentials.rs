//! Institutional login credentials.

use std::fmt;

use regex::Regex;

use crate::error::AccessError;

/// Minimum number of characters accepted for a secret.
pub const MIN_SECRET_CHARS: usize = 8;

/// Identity and secret used for the SSO form.
///
/// Validated at construction and immutable afterwards. The secret is redacted
/// in Debug output.
#[derive(Clone)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    /// Validates and wraps an identity/secret pair.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] when the identity is not an
    /// address under `institution_domain` or the secret is shorter than
    /// [`MIN_SECRET_CHARS`].
    pub fn new(
        identity: impl Into<String>,
        secret: impl Into<String>,
        institution_domain: &str,
    ) -> Result<Self, AccessError> {
        let identity = identity.into();
        let secret = secret.into();
        if !identity_matches(&identity, institution_domain) {
            return Err(AccessError::configuration(format!(
                "identity must be an address under @{institution_domain}"
            )));
        }
        if secret.chars().count() < MIN_SECRET_CHARS {
            return Err(AccessError::configuration(format!(
                "secret must be at least {MIN_SECRET_CHARS} characters"
            )));
        }
        Ok(Self { identity, secret })
    }

    /// Returns the login identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the secret. Never log the return value.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Returns true iff `identity` is `<local>@<institution_domain>` and `secret`
/// has at least [`MIN_SECRET_CHARS`] characters.
#[must_use]
pub fn validate_credentials(identity: &str, secret: &str, institution_domain: &str) -> bool {
    identity_matches(identity, institution_domain) && secret.chars().count() >= MIN_SECRET_CHARS
}

fn identity_matches(identity: &str, institution_domain: &str) -> bool {
    if institution_domain.is_empty() {
        return false;
    }
    let pattern = format!(r"(?i)^[^@\s]+@{}$", regex::escape(institution_domain));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(identity))
}
