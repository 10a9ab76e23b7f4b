//! Engine configuration: loaded through the same lexer/token-parser pipeline
//! the teacher used for its server config, generalized from a static-file
//! server's vhost list down to what an embedded engine actually needs.

pub use crate::config_handler::parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use crate::lexer::Lexer;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WORKER_THREADS: usize = 1;
pub const DEFAULT_BACKLOG: usize = 128;

/// TLS certificate chain and private key, both PEM files on disk.
#[derive(Debug, Clone, FromYaml)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: String::new(),
            key_path: String::new(),
        }
    }
}

/// A declared route path, carried in config purely as documentation/
/// pre-registration data. The handler function pointer and the argument
/// schema itself are always wired in the embedding program's own code,
/// since YAML has no way to name a function.
#[derive(Debug, Clone, FromYaml)]
pub struct RouteDescriptor {
    pub path: String,
}

impl Default for RouteDescriptor {
    fn default() -> Self {
        Self {
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct EngineConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub worker_threads: usize,
    pub backlog: usize,
    pub tls: Option<TlsConfig>,
    pub routes: Vec<RouteDescriptor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            worker_threads: DEFAULT_WORKER_THREADS,
            backlog: DEFAULT_BACKLOG,
            tls: None,
            routes: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_str(input: &str) -> ParseResult<Self> {
        <Self as FromYaml>::from_str(input)
    }

    pub fn from_path(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = EngineConfig::from_str("host: 0.0.0.0\nports: [8080]\nworker_threads: 2\nbacklog: 128\n").unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.ports, vec![8080]);
        assert_eq!(cfg.worker_threads, 2);
        assert!(cfg.tls.is_none());
    }

    #[test]
    fn rejects_unknown_field_gracefully_by_skipping() {
        // derive_yaml warns on unknown fields rather than failing; this keeps
        // config forward-compatible with fields a newer engine might add.
        let cfg = EngineConfig::from_str("host: 127.0.0.1\nports: [9090]\nworker_threads: 1\nbacklog: 64\nbogus: true\n").unwrap();
        assert_eq!(cfg.ports, vec![9090]);
    }
}
