//! Glob-reexport convenience module, following the teacher's own
//! `pub use crate::*` + ecosystem-crate re-export convention.

pub use crate::config::EngineConfig;
pub use crate::connection::{Connection, PollWant, Transport};
pub use crate::context::{BodyState, FailureKind, ParseState, RequestContext};
pub use crate::engine::Engine;
pub use crate::error::{CleanError, EngineError, Result};
pub use crate::handle::RequestHandle;
pub use crate::module::Module;
pub use crate::route::{ErrorHandler, Handler, HandlerFuture, RouteTable};
pub use crate::schema::{ArgError, Schema, SlotDescriptor, SlotKind};

pub use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::{TcpListener, TcpStream},
};
pub use proxy_log::{debug, errors, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File, OpenOptions};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

// 2xx/3xx
pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_NO_CONTENT: u16 = 204;
pub const HTTP_FOUND: u16 = 302;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const GATEWAY_TIMEOUT: u16 = 504;

pub const READ_BUF_SIZE: usize = 8192;
pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB
