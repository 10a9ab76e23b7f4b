use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

use crate::config_handler::parser::ConfigError;
use crate::route::RouteRegisterError;

/// Engine-level error kinds, per the error-type mapping: protocol and
/// argument failures are recoverable per-connection and never reach here
/// directly (they're folded into the request context instead) — this enum
/// covers the failures that can escape a call into the embedding API.
#[derive(Debug)]
pub enum EngineError {
    ProtocolError(String),
    RouteMissing,
    ArgError(String),
    Io(std::io::Error),
    Config(String),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ProtocolError(s) => write!(f, "protocol error: {s}"),
            EngineError::RouteMissing => write!(f, "no route registered for this path"),
            EngineError::ArgError(s) => write!(f, "argument error: {s}"),
            EngineError::Io(e) => write!(f, "I/O error: {e}"),
            EngineError::Config(s) => write!(f, "configuration error: {s}"),
        }
    }
}

impl Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

pub struct CleanError(pub Box<dyn Error>);

impl Debug for CleanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for CleanError {}

impl From<ConfigError> for CleanError {
    fn from(e: ConfigError) -> Self {
        CleanError(Box::new(EngineError::Config(e.to_string())))
    }
}

impl std::fmt::Display for RouteRegisterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RouteRegisterError::EmptyPath => write!(f, "route path must not be empty"),
            RouteRegisterError::MissingLeadingSlash => write!(f, "route path must start with '/'"),
        }
    }
}

impl Error for RouteRegisterError {}

impl From<RouteRegisterError> for CleanError {
    fn from(e: RouteRegisterError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<crate::schema::SchemaCompileError> for CleanError {
    fn from(e: crate::schema::SchemaCompileError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<EngineError> for CleanError {
    fn from(e: EngineError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::io::Error> for CleanError {
    fn from(e: std::io::Error) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for CleanError {
    fn from(e: std::net::AddrParseError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<String> for CleanError {
    fn from(s: String) -> Self {
        CleanError(Box::new(EngineError::Config(s)))
    }
}

impl From<&str> for CleanError {
    fn from(s: &str) -> Self {
        CleanError(Box::new(EngineError::Config(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;
