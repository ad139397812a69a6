use std::env;
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CREDENTIALS_FILE: &str = "service-account.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub credentials_path: PathBuf,
    /// Bearer key required on every request, when set.
    pub api_key: Option<String>,
    /// `host:port` of a local Firestore emulator.
    pub firestore_emulator_host: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("RESCUE_RELAY_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid RESCUE_RELAY_PORT: {:?}", raw))?,
            None => DEFAULT_PORT,
        };

        let credentials_path = lookup("RESCUE_RELAY_CREDENTIALS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE));

        Ok(Self {
            port,
            credentials_path,
            api_key: lookup("RESCUE_RELAY_API_KEY").filter(|k| !k.is_empty()),
            firestore_emulator_host: lookup("FIRESTORE_EMULATOR_HOST").filter(|h| !h.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.credentials_path, PathBuf::from("service-account.json"));
        assert!(config.api_key.is_none());
        assert!(config.firestore_emulator_host.is_none());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("RESCUE_RELAY_PORT", "9000"),
            ("RESCUE_RELAY_CREDENTIALS", "/etc/relay/sa.json"),
            ("RESCUE_RELAY_API_KEY", "secret"),
            ("FIRESTORE_EMULATOR_HOST", "localhost:8081"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.credentials_path, PathBuf::from("/etc/relay/sa.json"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.firestore_emulator_host.as_deref(), Some("localhost:8081"));
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let config = config(&[("RESCUE_RELAY_API_KEY", "")]).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = config(&[("RESCUE_RELAY_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("RESCUE_RELAY_PORT"));
    }
}
