//! Per-request state: incremental header/body assembly, response
//! construction, and handler dispatch.
//!
//! Grounded on `src/http/response.rs` (`HttpResponse::to_bytes`, header
//! serialization, status line) for response assembly, and on
//! `src/http/http_connection.rs`'s read/write-phase split for when
//! dispatch happens relative to I/O. The bag-of-bits the spec describes
//! (`parse_error`, `parsed_arguments`, `body_done`, `connection_closed`,
//! ...) is modeled here as two small tagged enums instead, per the
//! per-context redesign flag: `ParseState` rules out "resolved AND failed"
//! simultaneously, and `BodyState::Aborted` folds "body_done" and
//! "connection_closed after a read error" into one state instead of two
//! independent flags that could otherwise disagree.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::route::{ErrorHandler, Handler, RouteTable};
use crate::schema::{Schema, ValueStore};
use crate::task::{self, Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    RouteMissing,
    ArgError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseState {
    InProgress,
    Failed(FailureKind),
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Streaming,
    Complete,
    Aborted,
}

enum HeaderAccum {
    None,
    Field(Vec<u8>),
    Value { field: String, value: Vec<u8> },
}

/// Query strings of exactly `MAX_QUERY_LEN - 1` bytes parse; `MAX_QUERY_LEN`
/// bytes or more is a protocol error.
pub const MAX_QUERY_LEN: usize = 8192;

/// One in-flight request's state. Lives inside a connection's pipeline
/// queue from `message begin` until its response has been fully flushed.
pub struct RequestContext {
    pub headers: HashMap<String, String>,
    pub request_body: ByteBuffer,
    pub body_state: BodyState,
    pub parse_state: ParseState,

    pub response_status: u16,
    pub response_headers: HashMap<String, String>,
    pub response_body: ByteBuffer,
    pub should_keepalive: bool,

    url_scratch: Vec<u8>,
    header_accum: HeaderAccum,
    resolved_path: Option<String>,
    schema: Option<Arc<Schema>>,
    handler: Option<Handler>,
    error_handler: Option<ErrorHandler>,
    values: Option<ValueStore>,

    body_tx: Option<Sender>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            request_body: ByteBuffer::new(),
            body_state: BodyState::Streaming,
            parse_state: ParseState::InProgress,
            response_status: 200,
            response_headers: HashMap::new(),
            response_body: ByteBuffer::new(),
            should_keepalive: true,
            url_scratch: Vec::new(),
            header_accum: HeaderAccum::None,
            resolved_path: None,
            schema: None,
            handler: None,
            error_handler: None,
            values: None,
            body_tx: None,
        }
    }

    pub fn on_url(&mut self, bytes: &[u8]) {
        self.url_scratch.extend_from_slice(bytes);
    }

    /// Resolves the route and parses query arguments against its schema,
    /// exactly once, on the first opportunity (first header-field callback
    /// or headers-complete, whichever comes first). An oversized query
    /// string is a protocol error, not a handler-dispatchable failure: it
    /// is reported to the caller directly so the connection can be closed
    /// without invoking any handler, per the error-handling design.
    pub fn resolve_route(&mut self, routes: &RouteTable) -> Result<(), ()> {
        if self.parse_state != ParseState::InProgress {
            return Ok(());
        }
        let url = String::from_utf8_lossy(&self.url_scratch).into_owned();
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, q),
            None => (url.as_str(), ""),
        };
        if query.len() >= MAX_QUERY_LEN {
            return Err(());
        }
        let Some(entry) = routes.lookup(path) else {
            self.parse_state = ParseState::Failed(FailureKind::RouteMissing);
            return Ok(());
        };
        self.resolved_path = Some(path.to_string());
        match ValueStore::parse(entry.schema.clone(), query) {
            Ok(values) => {
                self.schema = Some(entry.schema.clone());
                self.handler = Some(entry.handler);
                self.error_handler = entry.error_handler;
                self.values = Some(values);
                self.parse_state = ParseState::Resolved;
            }
            Err(e) => {
                self.error_handler = entry.error_handler;
                self.parse_state = ParseState::Failed(FailureKind::ArgError(e.to_string()));
            }
        }
        Ok(())
    }

    pub fn query_too_long(&self) -> bool {
        let url = String::from_utf8_lossy(&self.url_scratch);
        match url.split_once('?') {
            Some((_, q)) => q.len() >= MAX_QUERY_LEN,
            None => false,
        }
    }

    /// Feeds one header-field chunk. A field following a completed
    /// field+value pair finalizes the previous header into the map first.
    pub fn on_header_field(&mut self, bytes: &[u8]) -> Result<(), ()> {
        match std::mem::replace(&mut self.header_accum, HeaderAccum::None) {
            HeaderAccum::None => {
                self.header_accum = HeaderAccum::Field(bytes.to_vec());
            }
            HeaderAccum::Field(mut existing) => {
                existing.extend_from_slice(bytes);
                self.header_accum = HeaderAccum::Field(existing);
            }
            HeaderAccum::Value { field, value } => {
                if value.is_empty() {
                    return Err(()); // empty value at a field/value transition: protocol error
                }
                self.finalize_header(field, value);
                self.header_accum = HeaderAccum::Field(bytes.to_vec());
            }
        }
        Ok(())
    }

    pub fn on_header_value(&mut self, bytes: &[u8]) -> Result<(), ()> {
        match std::mem::replace(&mut self.header_accum, HeaderAccum::None) {
            HeaderAccum::Field(field) if field.is_empty() => return Err(()),
            HeaderAccum::Field(field) => {
                let field = String::from_utf8_lossy(&field).into_owned();
                self.header_accum = HeaderAccum::Value { field, value: bytes.to_vec() };
            }
            HeaderAccum::Value { field, mut value } => {
                value.extend_from_slice(bytes);
                self.header_accum = HeaderAccum::Value { field, value };
            }
            HeaderAccum::None => return Err(()),
        }
        Ok(())
    }

    pub fn finish_headers(&mut self) -> Result<(), ()> {
        if let HeaderAccum::Value { field, value } = std::mem::replace(&mut self.header_accum, HeaderAccum::None) {
            if value.is_empty() {
                return Err(());
            }
            self.finalize_header(field, value);
        }
        Ok(())
    }

    fn finalize_header(&mut self, field: String, value: Vec<u8>) {
        let field = field.to_ascii_lowercase();
        let value = String::from_utf8_lossy(&value).into_owned();
        self.headers.insert(field, value); // duplicates overwrite, matching last-wins semantics
    }

    pub fn on_body(&mut self, bytes: &[u8]) {
        self.request_body.append(bytes);
        if let Some(tx) = &self.body_tx {
            tx.send(task::Signal::More);
        }
    }

    pub fn on_body_done(&mut self) {
        self.body_state = BodyState::Complete;
        if let Some(tx) = &self.body_tx {
            tx.send(task::Signal::Done);
        }
    }

    /// Called by the connection when the socket dies while this context's
    /// handler is (or might be) blocked on a body read.
    pub fn abort_body(&mut self) {
        self.body_state = BodyState::Aborted;
        if let Some(tx) = &self.body_tx {
            tx.send(task::Signal::Closed);
        }
    }

    pub fn is_handler_resolved(&self) -> bool {
        self.parse_state == ParseState::Resolved
    }

    pub fn is_parse_failed(&self) -> bool {
        matches!(self.parse_state, ParseState::Failed(_))
    }

    pub fn parse_state_is_in_progress(&self) -> bool {
        self.parse_state == ParseState::InProgress
    }

    pub fn handler(&self) -> Option<Handler> {
        self.handler
    }

    pub fn resolved_error_handler(&self) -> Option<ErrorHandler> {
        self.error_handler
    }

    pub fn values(&self) -> Option<&ValueStore> {
        self.values.as_ref()
    }

    /// Allocates the body-read channel the handler task will block on.
    /// Returns the receive half; the context keeps the send half.
    pub fn take_body_channel(&mut self) -> Receiver {
        let (tx, rx) = task::channel();
        self.body_tx = Some(tx);
        rx
    }

    pub fn drop_body_channel(&mut self) {
        self.body_tx = None;
    }

    pub fn body_state(&self) -> BodyState {
        self.body_state
    }

    /// Builds the final response byte stream per the serialization rules:
    /// status line, a recomputed `Content-Length`, `Connection`, then the
    /// user's remaining headers, a blank line, and the body.
    pub fn serialize_response(&mut self, reason_phrase: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.response_status, reason_phrase).as_bytes());
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.response_body.len()).as_bytes());
        out.extend_from_slice(
            format!("Connection: {}\r\n", if self.should_keepalive { "keep-alive" } else { "close" }).as_bytes(),
        );
        for (k, v) in &self.response_headers {
            if k.eq_ignore_ascii_case("content-length") || k.eq_ignore_ascii_case("connection") {
                continue; // Content-Length and Connection are always engine-computed
            }
            out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.response_body.as_slice());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{HandlerFuture, RouteTable};
    use crate::schema::{Schema, SlotDescriptor, SlotKind};

    fn handler(_h: crate::handle::RequestHandle) -> HandlerFuture {
        Box::pin(async { 200 })
    }

    fn routes() -> RouteTable {
        let mut t = RouteTable::new();
        t.register("/hello", Schema::compile(vec![SlotDescriptor::new("name", SlotKind::String, false)]).unwrap(), handler).unwrap();
        t
    }

    #[test]
    fn resolves_route_and_parses_query() {
        let routes = routes();
        let mut ctx = RequestContext::new();
        ctx.on_url(b"/hello?name=ada");
        ctx.resolve_route(&routes).unwrap();
        assert!(ctx.is_handler_resolved());
        assert_eq!(ctx.values().unwrap().string(0), "ada");
    }

    #[test]
    fn missing_route_is_route_missing_failure() {
        let routes = routes();
        let mut ctx = RequestContext::new();
        ctx.on_url(b"/nope");
        ctx.resolve_route(&routes).unwrap();
        assert_eq!(ctx.parse_state, ParseState::Failed(FailureKind::RouteMissing));
    }

    #[test]
    fn header_field_value_alternation_lowercases_and_overwrites_duplicates() {
        let mut ctx = RequestContext::new();
        ctx.on_header_field(b"Host").unwrap();
        ctx.on_header_value(b"first").unwrap();
        ctx.on_header_field(b"Host").unwrap();
        ctx.on_header_value(b"second").unwrap();
        ctx.finish_headers().unwrap();
        assert_eq!(ctx.headers.get("host").unwrap(), "second");
    }

    #[test]
    fn empty_value_at_transition_is_a_protocol_error() {
        let mut ctx = RequestContext::new();
        ctx.on_header_field(b"X-Empty").unwrap();
        ctx.on_header_value(b"").unwrap();
        assert!(ctx.on_header_field(b"Next").is_err());
    }

    #[test]
    fn response_serialization_recomputes_content_length_and_keepalive() {
        let mut ctx = RequestContext::new();
        ctx.response_body.append(b"Hello, ada!");
        ctx.should_keepalive = false;
        let bytes = ctx.serialize_response("OK");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("Hello, ada!"));
    }

    #[test]
    fn oversize_query_is_detected() {
        let mut ctx = RequestContext::new();
        let long = "a".repeat(MAX_QUERY_LEN + 1);
        ctx.on_url(format!("/hello?{long}").as_bytes());
        assert!(ctx.query_too_long());
    }

    #[test]
    fn query_exactly_at_the_boundary_is_rejected_one_below_is_not() {
        let mut under = RequestContext::new();
        under.on_url(format!("/hello?{}", "a".repeat(MAX_QUERY_LEN - 1)).as_bytes());
        assert!(!under.query_too_long());

        let mut at = RequestContext::new();
        at.on_url(format!("/hello?{}", "a".repeat(MAX_QUERY_LEN)).as_bytes());
        assert!(at.query_too_long());
    }
}
