use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SerializableSecretString;

/// Configuration for connecting to a Postgres database, used for both the
/// operational source and the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the server is listening.
    pub port: u16,
    /// Name of the database to connect to.
    pub name: String,
    /// Username for authentication.
    pub username: String,
    /// Password for the specified user; redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

/// Errors produced when validating loaded configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("storage area names cannot be empty")]
    EmptyStorageArea,

    #[error("staging and processed areas must be distinct")]
    OverlappingStorageAreas,

    #[error("connection host cannot be empty")]
    EmptyHost,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn connection_config_deserializes_with_secret_password() {
        let config: PgConnectionConfig = serde_json::from_value(serde_json::json!({
            "host": "localhost",
            "port": 5432,
            "name": "totes",
            "username": "etl",
            "password": "hunter2",
        }))
        .unwrap();

        assert_eq!(config.password.as_ref().unwrap().expose_secret(), "hunter2");
        // The secret must not leak through Debug.
        assert!(!format!("{config:?}").contains("hunter2"));
        assert_eq!(config.validate(), Ok(()));
    }
}
