//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::access::{AccessPolicy, AccessTableError, MethodMatching};
use crate::infrastructure::bus::DEFAULT_SUBSCRIBER_BUFFER;
use crate::infrastructure::grpc::server::DEFAULT_STREAM_BUFFER;

/// Where the access table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclSource {
    /// Inline JSON from `GATEWAY_ACL`.
    Inline(String),
    /// JSON file named by `GATEWAY_ACL_FILE`.
    File(PathBuf),
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 8082,
            health_port: 8083,
        }
    }
}

/// Channel buffer settings.
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Events buffered per bus subscriber before drops start.
    pub subscriber_buffer: usize,
    /// Messages buffered per response stream.
    pub stream_buffer: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Access table source.
    pub acl: AclSource,
    /// How policy entries are compared with method names.
    pub matching: MethodMatching,
    /// Server port settings.
    pub server: ServerSettings,
    /// Channel buffer settings.
    pub buffers: BufferSettings,
    /// Upper bound on graceful shutdown before the process exits anyway.
    pub shutdown_timeout: Duration,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `GATEWAY_ACL` nor `GATEWAY_ACL_FILE` is set,
    /// or the one that is set is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let acl = match (lookup("GATEWAY_ACL"), lookup("GATEWAY_ACL_FILE")) {
            (Some(json), _) if json.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("GATEWAY_ACL".to_string()));
            }
            (Some(json), _) => AclSource::Inline(json),
            (None, Some(path)) if path.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("GATEWAY_ACL_FILE".to_string()));
            }
            (None, Some(path)) => AclSource::File(PathBuf::from(path)),
            (None, None) => {
                return Err(ConfigError::MissingEnvVar(
                    "GATEWAY_ACL or GATEWAY_ACL_FILE".to_string(),
                ));
            }
        };

        let matching = lookup("GATEWAY_ACL_MATCH")
            .map(|s| MethodMatching::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            grpc_port: parse_or(&lookup, "GATEWAY_GRPC_PORT", ServerSettings::default().grpc_port),
            health_port: parse_or(
                &lookup,
                "GATEWAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let buffers = BufferSettings {
            subscriber_buffer: parse_or(
                &lookup,
                "GATEWAY_SUBSCRIBER_BUFFER",
                BufferSettings::default().subscriber_buffer,
            ),
            stream_buffer: parse_or(
                &lookup,
                "GATEWAY_STREAM_BUFFER",
                BufferSettings::default().stream_buffer,
            ),
        };

        let shutdown_timeout = Duration::from_secs(parse_or(
            &lookup,
            "GATEWAY_SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        ));

        Ok(Self {
            acl,
            matching,
            server,
            buffers,
            shutdown_timeout,
        })
    }

    /// Load and parse the access table.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the table is invalid.
    pub fn access_policy(&self) -> Result<AccessPolicy, ConfigError> {
        let json = match &self.acl {
            AclSource::Inline(json) => json.clone(),
            AclSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                    path: path.clone(),
                    source,
                })?
            }
        };

        Ok(AccessPolicy::from_json_with(&json, self.matching)?)
    }
}

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// ACL file could not be read.
    #[error("failed to read access table {}: {source}", path.display())]
    ReadFile {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// ACL contents are not a valid access table.
    #[error("invalid access table: {0}")]
    InvalidAccessTable(#[from] AccessTableError),
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn acl_required() {
        let err = GatewayConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn empty_acl_rejected() {
        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ACL", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref key) if key == "GATEWAY_ACL"));
    }

    #[test]
    fn defaults_applied() {
        let config = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ACL", "{}")])).unwrap();

        assert_eq!(config.acl, AclSource::Inline("{}".to_string()));
        assert_eq!(config.matching, MethodMatching::Segment);
        assert_eq!(config.server.grpc_port, 8082);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.buffers.subscriber_buffer, 1024);
        assert_eq!(config.buffers.stream_buffer, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_applied() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_ACL_FILE", "/etc/gateway/acl.json"),
            ("GATEWAY_ACL_MATCH", "FULL"),
            ("GATEWAY_GRPC_PORT", "9000"),
            ("GATEWAY_SUBSCRIBER_BUFFER", "64"),
            ("GATEWAY_SHUTDOWN_TIMEOUT_SECS", "5"),
            ("GATEWAY_HEALTH_PORT", "not-a-port"),
        ]))
        .unwrap();

        assert_eq!(config.acl, AclSource::File(PathBuf::from("/etc/gateway/acl.json")));
        assert_eq!(config.matching, MethodMatching::FullPath);
        assert_eq!(config.server.grpc_port, 9000);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.buffers.subscriber_buffer, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn inline_acl_wins_over_file() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_ACL", r#"{"alice": ["*"]}"#),
            ("GATEWAY_ACL_FILE", "/nonexistent"),
        ]))
        .unwrap();

        let policy = config.access_policy().unwrap();
        assert!(policy.allowed("alice", "/gateway.v1.Biz/Add"));
    }

    #[test]
    fn policy_loaded_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bob": ["Check"]}}"#).unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let config = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ACL_FILE", &path)])).unwrap();
        let policy = config.access_policy().unwrap();

        assert!(policy.allowed("bob", "/gateway.v1.Biz/Check"));
        assert!(!policy.allowed("bob", "/gateway.v1.Biz/Add"));
    }

    #[test]
    fn missing_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = GatewayConfig {
            acl: AclSource::File(path.clone()),
            matching: MethodMatching::Segment,
            server: ServerSettings::default(),
            buffers: BufferSettings::default(),
            shutdown_timeout: Duration::from_secs(1),
        };

        let err = config.access_policy().unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { path: ref p, .. } if *p == path));
    }

    #[test]
    fn malformed_table_is_invalid() {
        let config = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ACL", "[1, 2]")])).unwrap();
        let err = config.access_policy().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAccessTable(_)));
    }
}
