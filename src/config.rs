//! Client configuration.
//!
//! Environment variables:
//!   IPS_API_ROOT              - API root address, e.g. `https://ips.example.com`
//!   IPS_PARTICIPANT_ID        - Participant identifier (BIC)
//!   IPS_TIMEOUT_SECS          - Whole-request timeout (default: 30)
//!   IPS_CONNECT_TIMEOUT_SECS  - Connect timeout (default: 10)
//!   IPS_SIGN_QUERY            - "false" leaves query parameters out of signatures (default: true)
//!   IPS_KEY_PATH              - Participant private key (PEM or DER)
//!   IPS_CERT_PATH             - Participant certificate (PEM or DER)

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::canonical::QueryCanonicalization;
use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Root address without a trailing slash; resource URIs are appended verbatim.
    pub api_root: String,
    pub participant_id: String,
    pub query_canonicalization: QueryCanonicalization,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_root: impl Into<String>, participant_id: impl Into<String>) -> Self {
        let mut api_root = api_root.into();
        while api_root.ends_with('/') {
            api_root.pop();
        }
        Self {
            api_root,
            participant_id: participant_id.into(),
            query_canonicalization: QueryCanonicalization::default(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_query_canonicalization(mut self, mode: QueryCanonicalization) -> Self {
        self.query_canonicalization = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_root = required(&lookup, "IPS_API_ROOT")?;
        Url::parse(&api_root).map_err(|e| ConfigError::Invalid {
            name: "IPS_API_ROOT",
            reason: e.to_string(),
        })?;
        let participant_id = required(&lookup, "IPS_PARTICIPANT_ID")?;

        let mut config = Self::new(api_root, participant_id);
        if let Some(secs) = seconds(&lookup, "IPS_TIMEOUT_SECS")? {
            config.timeout = secs;
        }
        if let Some(secs) = seconds(&lookup, "IPS_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = secs;
        }
        if let Some(v) = lookup("IPS_SIGN_QUERY") {
            config.query_canonicalization = match v.trim() {
                "true" | "1" => QueryCanonicalization::Sorted,
                "false" | "0" => QueryCanonicalization::Omitted,
                other => {
                    return Err(ConfigError::Invalid {
                        name: "IPS_SIGN_QUERY",
                        reason: format!("expected true or false, got {:?}", other),
                    })
                }
            };
        }
        Ok(config)
    }
}

/// Where to load participant credentials from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialPaths {
    pub key: PathBuf,
    pub certificate: PathBuf,
}

impl CredentialPaths {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            key: required(&lookup, "IPS_KEY_PATH")?.into(),
            certificate: required(&lookup, "IPS_CERT_PATH")?.into(),
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn seconds<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                })
        })
        .transpose()
}
