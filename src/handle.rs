//! The handle passed into every handler: typed query-argument access, body
//! reading, and response writing.
//!
//! Grounded on `src/http/http_connection.rs`'s `HttpConnection`/`HttpResponse`
//! pair as the thing a request handler ultimately touches, generalized from
//! direct field access into a narrow, cloneable `Rc<RefCell<Connection>>`
//! handle so a handler `async fn` can hold it across a suspend point (a body
//! read) without borrowing the connection for the whole request lifetime.

use std::cell::RefCell;
use std::fmt::Arguments;
use std::rc::Rc;

use crate::connection::Connection;
use crate::task::Signal;

/// Handed to every route handler. Cloning is cheap (an `Rc` bump) and every
/// clone refers to the same connection and the same front-of-queue request.
#[derive(Clone)]
pub struct RequestHandle {
    conn: Rc<RefCell<Connection>>,
}

impl RequestHandle {
    pub fn new(conn: Rc<RefCell<Connection>>) -> Self {
        Self { conn }
    }

    fn with_ctx<R>(&self, f: impl FnOnce(&crate::context::RequestContext) -> R) -> R {
        let conn = self.conn.borrow();
        let ctx = conn.pending.front().expect("handler running without a front context");
        f(ctx)
    }

    fn with_ctx_mut<R>(&self, f: impl FnOnce(&mut crate::context::RequestContext) -> R) -> R {
        let mut conn = self.conn.borrow_mut();
        let ctx = conn.front_context_mut().expect("handler running without a front context");
        f(ctx)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.with_ctx(|ctx| ctx.headers.get(&name).cloned())
    }

    /// The query-argument parse failure message, if the route matched but
    /// argument parsing failed — the state an error handler runs in.
    pub fn arg_error_message(&self) -> Option<String> {
        self.with_ctx(|ctx| match &ctx.parse_state {
            crate::context::ParseState::Failed(crate::context::FailureKind::ArgError(msg)) => Some(msg.clone()),
            _ => None,
        })
    }

    pub fn exists(&self, index: usize) -> bool {
        self.with_ctx(|ctx| ctx.values().map(|v| v.exists(index)).unwrap_or(false))
    }

    pub fn flag(&self, index: usize) -> bool {
        self.with_ctx(|ctx| ctx.values().map(|v| v.flag(index)).unwrap_or(false))
    }

    pub fn integer(&self, index: usize) -> i64 {
        self.with_ctx(|ctx| ctx.values().map(|v| v.integer(index)).unwrap_or(0))
    }

    pub fn number(&self, index: usize) -> f64 {
        self.with_ctx(|ctx| ctx.values().map(|v| v.number(index)).unwrap_or(0.0))
    }

    pub fn string(&self, index: usize) -> String {
        self.with_ctx(|ctx| ctx.values().map(|v| v.string(index).to_string()).unwrap_or_default())
    }

    pub fn list_len(&self, index: usize) -> usize {
        self.with_ctx(|ctx| ctx.values().map(|v| v.list_len(index)).unwrap_or(0))
    }

    pub fn list_string(&self, index: usize, at: usize) -> String {
        self.with_ctx(|ctx| ctx.values().map(|v| v.list_string(index, at).to_string()).unwrap_or_default())
    }

    pub fn set_status(&self, status: u16) {
        self.with_ctx_mut(|ctx| ctx.response_status = status);
    }

    pub fn set_header(&self, name: &str, value: &str) {
        self.with_ctx_mut(|ctx| {
            ctx.response_headers.insert(name.to_string(), value.to_string());
        });
    }

    pub fn write(&self, bytes: &[u8]) {
        self.with_ctx_mut(|ctx| ctx.response_body.append(bytes));
    }

    pub fn write_fmt(&self, args: Arguments<'_>) {
        self.with_ctx_mut(|ctx| ctx.response_body.append_fmt(args));
    }

    /// Splices a byte range of an open file straight into the response
    /// buffer, mirroring the teacher's `ActiveAction::FileDownload` streaming
    /// path but performed eagerly since handlers here run to completion
    /// inside one poll rather than across several write phases.
    pub fn write_file(&self, file: &mut std::fs::File, offset: u64, len: usize) -> std::io::Result<usize> {
        self.with_ctx_mut(|ctx| ctx.response_body.splice_from_file(file, offset, len))
    }

    pub fn body_len_so_far(&self) -> usize {
        self.with_ctx(|ctx| ctx.request_body.len())
    }

    /// Reads the next chunk of request body bytes, suspending until either
    /// more bytes arrive, the body is complete, or the connection died.
    /// Returns `None` once there is nothing further to read.
    pub async fn read(&self) -> Option<Vec<u8>> {
        loop {
            let already = self.with_ctx_mut(|ctx| {
                if !ctx.request_body.is_empty() {
                    let mut out = vec![0u8; ctx.request_body.len()];
                    ctx.request_body.drain_into(&mut out);
                    return Some(Some(out));
                }
                match ctx.body_state() {
                    crate::context::BodyState::Complete | crate::context::BodyState::Aborted => Some(None),
                    crate::context::BodyState::Streaming => None,
                }
            });
            if let Some(result) = already {
                return result;
            }
            let receiver = self.with_ctx_mut(|ctx| ctx.take_body_channel());
            match receiver.recv().await {
                Some(Signal::More) | Some(Signal::Done) => continue,
                Some(Signal::Closed) | None => {
                    return self.with_ctx_mut(|ctx| {
                        ctx.drop_body_channel();
                        if ctx.request_body.is_empty() {
                            None
                        } else {
                            let mut out = vec![0u8; ctx.request_body.len()];
                            ctx.request_body.drain_into(&mut out);
                            Some(out)
                        }
                    });
                }
            }
        }
    }

    /// Reads the whole body to completion, appending each chunk to `file`.
    /// Returns the total bytes written.
    pub async fn read_to_file(&self, file: &mut std::fs::File) -> std::io::Result<usize> {
        use std::io::Write;
        let mut total = 0;
        while let Some(chunk) = self.read().await {
            file.write_all(&chunk)?;
            total += chunk.len();
        }
        Ok(total)
    }
}
