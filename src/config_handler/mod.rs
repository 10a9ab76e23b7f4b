// `display`/`types`/`validate` described the teacher's static-file-server
// vhost config (`Config`/`ServerConfig`/`RouteConfig`) and are kept on disk
// as reference only; they're superseded by `crate::config::EngineConfig`
// and are not part of the compiled module tree.
pub mod parser;

pub use parser::{ConfigParser, ParseResult, FromYaml, ConfigError};
