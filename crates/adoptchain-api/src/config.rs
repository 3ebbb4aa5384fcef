//! Server configuration, read once from the environment at startup.

use std::fmt;
use std::net::SocketAddr;

use alloy_primitives::Address;

use crate::error::AppError;

/// Everything the server needs to start.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// HS256 key for session credentials.
    pub jwt_secret: String,
    pub chain_ws_url: String,
    pub contract_address: Address,
    /// Operator key used to sign settlement and mint transactions.
    pub signer_private_key: String,
    /// Addresses allowed to drive settlements. Empty admits any
    /// authenticated address.
    pub operators: Vec<Address>,
    pub otlp_endpoint: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("chain_ws_url", &self.chain_ws_url)
            .field("contract_address", &self.contract_address)
            .field("operators", &self.operators)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Blank values count as
    /// unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
        };

        let port = match get("PORT") {
            Some(port) => port
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => 3000,
        };
        let contract_address = require("CONTRACT_ADDRESS")?
            .parse()
            .map_err(|e| AppError::Config(format!("CONTRACT_ADDRESS is not an address: {e}")))?;
        let operators = get("OPERATOR_ADDRESSES")
            .map(|list| parse_addresses(&list))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port,
            jwt_secret: require("JWT_SECRET")?,
            chain_ws_url: require("CHAIN_WS_URL")?,
            contract_address,
            signer_private_key: require("SIGNER_PRIVATE_KEY")?,
            operators,
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_addresses(list: &str) -> Result<Vec<Address>, AppError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|e| AppError::Config(format!("OPERATOR_ADDRESSES entry {entry}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn env(overrides: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/adoptchain"),
            ("JWT_SECRET", "secret"),
            ("CHAIN_WS_URL", "ws://localhost:8545"),
            ("CONTRACT_ADDRESS", CONTRACT),
            ("SIGNER_PRIVATE_KEY", "0x01"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        for (key, value) in overrides {
            vars.insert((*key).to_owned(), (*value).to_owned());
        }
        vars
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config, AppError> {
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_optional_values_are_unset() {
        // Arrange
        let vars = env(&[]);

        // Act
        let config = load(&vars).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.operators.is_empty());
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.contract_address, CONTRACT.parse::<Address>().unwrap());
        assert_eq!(config.bind_address().unwrap().port(), 3000);
    }

    #[test]
    fn test_missing_required_value_is_reported_by_name() {
        let mut vars = env(&[]);
        vars.remove("JWT_SECRET");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_operator_list_is_parsed_and_blank_entries_skipped() {
        let vars = env(&[(
            "OPERATOR_ADDRESSES",
            "0x1111111111111111111111111111111111111111, ,0x2222222222222222222222222222222222222222",
        )]);

        let config = load(&vars).unwrap();

        assert_eq!(
            config.operators,
            vec![Address::repeat_byte(0x11), Address::repeat_byte(0x22)]
        );
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let vars = env(&[("PORT", "http")]);

        assert!(matches!(load(&vars), Err(AppError::Config(_))));
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let config = load(&env(&[])).unwrap();

        let debug = format!("{config:?}");

        assert!(!debug.contains("secret"));
        assert!(!debug.contains("postgres://"));
    }
}
