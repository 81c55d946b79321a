//! Secure credential handling for provider adapters.
//!
//! Every adapter stores its API key as an [`ApiCredential`]:
//!
//! - **No accidental logging**: credentials never appear in Debug/Display
//! - **Memory safety**: values are zeroed on drop via the `secrecy` crate
//! - **Explicit exposure**: the raw value is only reachable through
//!   `.expose()`, called at the point the HTTP header is built
//!
//! Adapters are constructed with `Option<ApiCredential>` so a missing key
//! is a normal state: the adapter reports itself unconfigured and fails
//! with a typed error at invoke time instead of panicking at startup.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Where a credential was loaded from.
///
/// Useful when debugging configuration issues without exposing the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from an environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a raw value. After this point the value cannot be logged.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from an environment variable, if set and non-empty.
    pub fn from_env(env_var: &str, name: &'static str) -> Option<Self> {
        match std::env::var(env_var) {
            Ok(v) if !v.is_empty() => Some(Self::new(v, CredentialSource::Environment, name)),
            _ => None,
        }
    }

    /// Expose the raw value for use in an HTTP header.
    ///
    /// Only call this at the point of use; never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Human-readable name for error messages (e.g. "OpenAI API key").
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
