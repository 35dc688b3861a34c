use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: invalid value `{value}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Elasticsearch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Start-up settings, read once from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub backend: BackendKind,
    pub elasticsearch_url: String,
    pub users_index: String,
    pub shops_index: String,
    pub search_timeout: Duration,
    pub users_seed: Option<PathBuf>,
    pub shops_seed: Option<PathBuf>,
    pub tls: Option<TlsPaths>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend: BackendKind::Memory,
            elasticsearch_url: "http://localhost:9200".into(),
            users_index: "users".into(),
            shops_index: "repair_shops".into(),
            search_timeout: Duration::from_millis(30_000),
            users_seed: None,
            shops_seed: None,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds the config from any key lookup. Unset or empty keys keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut cfg = ServerConfig::default();

        if let Some(v) = get("HTTP_ADDR") {
            cfg.http_addr = v.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                var: "HTTP_ADDR",
                value: v.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(v) = get("SEARCH_BACKEND") {
            cfg.backend = match v.trim().to_ascii_lowercase().as_str() {
                "memory" => BackendKind::Memory,
                "elasticsearch" => BackendKind::Elasticsearch,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SEARCH_BACKEND",
                        value: v,
                        reason: "expected `memory` or `elasticsearch`".into(),
                    })
                }
            };
        }
        if let Some(v) = get("ELASTICSEARCH_URL") {
            cfg.elasticsearch_url = v;
        }
        if let Some(v) = get("USERS_INDEX") {
            cfg.users_index = v;
        }
        if let Some(v) = get("SHOPS_INDEX") {
            cfg.shops_index = v;
        }
        if let Some(v) = get("SEARCH_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "SEARCH_TIMEOUT_MS",
                value: v.clone(),
                reason: format!("{e}"),
            })?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "SEARCH_TIMEOUT_MS",
                    value: v,
                    reason: "must be > 0".into(),
                });
            }
            cfg.search_timeout = Duration::from_millis(ms);
        }
        cfg.users_seed = get("USERS_SEED").map(PathBuf::from);
        cfg.shops_seed = get("SHOPS_SEED").map(PathBuf::from);
        cfg.tls = match (get("TLS_CERT_PATH"), get("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(from(&[]).unwrap(), ServerConfig::default());
        assert_eq!(from(&[("USERS_INDEX", "  ")]).unwrap().users_index, "users");
    }

    #[test]
    fn reads_every_setting() {
        let cfg = from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("SEARCH_BACKEND", "Elasticsearch"),
            ("ELASTICSEARCH_URL", "http://es:9200"),
            ("SEARCH_TIMEOUT_MS", "1500"),
            ("SHOPS_SEED", "/data/shops.ndjson"),
            ("TLS_CERT_PATH", "cert.pem"),
            ("TLS_KEY_PATH", "key.pem"),
        ])
        .unwrap();
        assert_eq!(cfg.http_addr.port(), 9000);
        assert_eq!(cfg.backend, BackendKind::Elasticsearch);
        assert_eq!(cfg.elasticsearch_url, "http://es:9200");
        assert_eq!(cfg.search_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.shops_seed, Some(PathBuf::from("/data/shops.ndjson")));
        assert!(cfg.tls.is_some());
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(
            from(&[("SEARCH_TIMEOUT_MS", "soon")]),
            Err(ConfigError::Invalid { var: "SEARCH_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            from(&[("SEARCH_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { var: "SEARCH_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            from(&[("SEARCH_BACKEND", "solr")]),
            Err(ConfigError::Invalid { var: "SEARCH_BACKEND", .. })
        ));
        assert_eq!(from(&[("TLS_KEY_PATH", "k")]), Err(ConfigError::PartialTls));
    }
}
