use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration for the Gatekeeper gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub access: AccessConfig,

    /// Glob patterns that bypass the authorization call.
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Number of worker threads (0 = one per core)
    #[serde(default)]
    pub workers: usize,

    /// Honor inbound trace headers. Forced off at preparation: this
    /// process is the trace origin.
    #[serde(default)]
    pub propagate_inbound_trace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthConfig {
    /// Path answered with 200 and no body, bypassing the pipeline.
    #[serde(default)]
    pub check_url: Option<String>,

    /// Register a default health check with the service registry.
    /// Forced off at preparation.
    #[serde(default)]
    pub register_default_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Gates both the exposition endpoint and histogram recording.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path serving the Prometheus text exposition.
    #[serde(default = "default_metrics_route")]
    pub route: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle upstream connections kept per host.
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Idle upstream connections kept in total.
    #[serde(default = "default_max_idle_total")]
    pub max_idle_total: usize,

    /// Idle connections older than this are discarded.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for token verification. Unset = every token is
    /// treated as undecodable and callers stay anonymous.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Token algorithm — default "HS256".
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Service name of the policy host answering access checks.
    #[serde(default = "default_access_service")]
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// Static seed for the instance table: service name → host:port list.
    #[serde(default)]
    pub services: HashMap<String, Vec<String>>,
}

impl GatewayConfig {
    /// Load configuration from a YAML file merged with `GATEKEEPER_`
    /// prefixed environment variables (`GATEKEEPER_SERVER__HTTP_ADDR`, ...).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("GATEKEEPER_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Worker count, with 0 meaning one per available core.
    pub fn effective_workers(&self) -> usize {
        if self.server.workers > 0 {
            self.server.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Apply the properties this gateway forces regardless of what the
    /// file or environment said.
    pub fn prepare(&mut self) {
        if self.server.propagate_inbound_trace {
            tracing::info!("Inbound trace propagation requested but forced off: gateway is the trace origin");
        }
        self.server.propagate_inbound_trace = false;

        if self.health.register_default_check {
            tracing::info!("Default registry health check requested but forced off");
        }
        self.health.register_default_check = false;
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            workers: 0,
            propagate_inbound_trace: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            route: default_metrics_route(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle_per_host(),
            max_idle_total: default_max_idle_total(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: default_jwt_algorithm(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            service: default_access_service(),
        }
    }
}

// Serde default functions

fn default_http_addr() -> SocketAddr {
    "0.0.0.0:7070".parse().unwrap()
}

fn default_metrics_route() -> Option<String> {
    Some("/metrics".to_string())
}

fn default_max_idle_per_host() -> usize {
    1000
}

fn default_max_idle_total() -> usize {
    1500
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_service() -> String {
    "goauth".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.server.http_addr.port(), 7070);
        assert_eq!(cfg.server.workers, 0);
        assert!(!cfg.server.propagate_inbound_trace);
        assert!(cfg.health.check_url.is_none());
        assert!(cfg.metrics.enabled);
        assert_eq!(cfg.metrics.route.as_deref(), Some("/metrics"));
        assert_eq!(cfg.pool.max_idle_per_host, 1000);
        assert_eq!(cfg.pool.max_idle_total, 1500);
        assert_eq!(cfg.pool.idle_timeout_secs, 600);
        assert_eq!(cfg.access.service, "goauth");
        assert!(cfg.whitelist.is_empty());
    }

    #[test]
    fn prepare_forces_trace_and_registry_props_off() {
        let mut cfg = GatewayConfig::default();
        cfg.server.propagate_inbound_trace = true;
        cfg.health.register_default_check = true;
        cfg.prepare();
        assert!(!cfg.server.propagate_inbound_trace);
        assert!(!cfg.health.register_default_check);
    }

    #[test]
    fn effective_workers_zero_means_per_core() {
        let cfg = GatewayConfig::default();
        assert!(cfg.effective_workers() >= 1);

        let mut pinned = GatewayConfig::default();
        pinned.server.workers = 3;
        assert_eq!(pinned.effective_workers(), 3);
    }

    #[test]
    fn yaml_fields_deserialize() {
        let yaml = r#"
server:
  http_addr: "127.0.0.1:8080"
  workers: 2
health:
  check_url: "/health"
metrics:
  enabled: false
whitelist:
  - "/public/*"
discovery:
  services:
    user-svc:
      - "127.0.0.1:9001"
      - "127.0.0.1:9002"
"#;
        let cfg: GatewayConfig = serde_yaml_parse(yaml);
        assert_eq!(cfg.server.http_addr.port(), 8080);
        assert_eq!(cfg.server.workers, 2);
        assert_eq!(cfg.health.check_url.as_deref(), Some("/health"));
        assert!(!cfg.metrics.enabled);
        assert_eq!(cfg.whitelist, vec!["/public/*"]);
        assert_eq!(cfg.discovery.services["user-svc"].len(), 2);
    }

    fn serde_yaml_parse(yaml: &str) -> GatewayConfig {
        Figment::new()
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap()
    }
}
