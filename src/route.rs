//! Exact-match route table: path -> (schema, handler, user data).
//!
//! Grounded on `src/router.rs`'s `Router { routes: HashMap<String, ...> }`,
//! generalized from its `"port|host|path"` triple keying down to a plain
//! path key, since this engine's routes aren't virtual-host-scoped. The
//! "reject registration if the callback is null" rule from the component
//! design has no analogue here: a `fn` item can't be null in safe Rust, so
//! there's nothing to check.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handle::RequestHandle;
use crate::schema::Schema;

pub type HandlerFuture = std::pin::Pin<Box<dyn std::future::Future<Output = u16>>>;
pub type Handler = fn(RequestHandle) -> HandlerFuture;
pub type ErrorHandler = fn(RequestHandle) -> HandlerFuture;

pub struct RouteEntry {
    pub schema: Arc<Schema>,
    pub handler: Handler,
    pub error_handler: Option<ErrorHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRegisterError {
    EmptyPath,
    MissingLeadingSlash,
}

#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, RouteEntry>,
    general_error_handler: Option<ErrorHandler>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), general_error_handler: None }
    }

    pub fn register(
        &mut self,
        path: &str,
        schema: Schema,
        handler: Handler,
    ) -> Result<(), RouteRegisterError> {
        validate_path(path)?;
        self.routes.insert(
            path.to_string(),
            RouteEntry { schema: Arc::new(schema), handler, error_handler: None },
        );
        Ok(())
    }

    /// Registers (or replaces) the path-specific error callback for an
    /// already-registered route.
    pub fn register_error_handler(
        &mut self,
        path: &str,
        handler: ErrorHandler,
    ) -> Result<(), RouteRegisterError> {
        validate_path(path)?;
        match self.routes.get_mut(path) {
            Some(entry) => {
                entry.error_handler = Some(handler);
                Ok(())
            }
            None => Err(RouteRegisterError::EmptyPath), // no route to attach to; caller registers route first
        }
    }

    pub fn set_general_error_handler(&mut self, handler: ErrorHandler) {
        self.general_error_handler = Some(handler);
    }

    pub fn general_error_handler(&self) -> Option<ErrorHandler> {
        self.general_error_handler
    }

    pub fn lookup(&self, path: &str) -> Option<&RouteEntry> {
        self.routes.get(path)
    }
}

fn validate_path(path: &str) -> Result<(), RouteRegisterError> {
    if path.is_empty() {
        return Err(RouteRegisterError::EmptyPath);
    }
    if !path.starts_with('/') {
        return Err(RouteRegisterError::MissingLeadingSlash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn dummy(_h: RequestHandle) -> HandlerFuture {
        Box::pin(async { 200 })
    }

    #[test]
    fn rejects_empty_path() {
        let mut table = RouteTable::new();
        assert_eq!(
            table.register("", Schema::compile(vec![]).unwrap(), dummy).unwrap_err(),
            RouteRegisterError::EmptyPath
        );
    }

    #[test]
    fn rejects_path_without_leading_slash() {
        let mut table = RouteTable::new();
        assert_eq!(
            table.register("hello", Schema::compile(vec![]).unwrap(), dummy).unwrap_err(),
            RouteRegisterError::MissingLeadingSlash
        );
    }

    #[test]
    fn exact_match_lookup() {
        let mut table = RouteTable::new();
        table.register("/hello", Schema::compile(vec![]).unwrap(), dummy).unwrap();
        assert!(table.lookup("/hello").is_some());
        assert!(table.lookup("/hello/").is_none());
        assert!(table.lookup("/nope").is_none());
    }
}
