//! Layered configuration for the pipeline binaries.
//!
//! Settings come from `configuration/base.yaml`, an environment-specific
//! overlay picked by `APP_ENVIRONMENT`, and finally `APP_`-prefixed
//! environment variables.

pub mod environment;
pub mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{load_config, Config, LoadConfigError};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

/// A secret string that serializes its value back out, so configuration
/// structures holding credentials can round-trip. Debug output stays
/// redacted through the inner [`SecretString`].
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SerializableSecretString(SecretString);

impl Serialize for SerializableSecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(SecretString::new(value))
    }
}

impl From<SecretString> for SerializableSecretString {
    fn from(value: SecretString) -> Self {
        Self(value)
    }
}

impl ExposeSecret<String> for SerializableSecretString {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}
