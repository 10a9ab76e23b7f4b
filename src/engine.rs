//! Embedding API: register routes, add modules, optionally enable TLS, and
//! run the worker pool.
//!
//! Grounded on `src/bin/main.rs`'s `Server::new(config, &poll)?; server.run(poll)`
//! shape, generalized from one `Server` built around a fixed `AppConfig` into
//! a builder the embedding program drives directly in Rust (routes are
//! function pointers, which YAML can't name), with `EngineConfig` supplying
//! only the network-level settings (host, ports, worker thread count,
//! backlog, optional TLS paths).

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;

use mio::net::TcpListener;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::module::Module;
use crate::reactor::{self, BoundListener};
use crate::route::{ErrorHandler, Handler, RouteRegisterError, RouteTable};
use crate::schema::Schema;
use crate::tls;

pub struct Engine {
    config: EngineConfig,
    routes: RouteTable,
    modules: Vec<Module>,
    tls_config: Option<Arc<rustls::ServerConfig>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, routes: RouteTable::new(), modules: Vec::new(), tls_config: None }
    }

    pub fn add_route(&mut self, path: &str, schema: Schema, handler: Handler) -> std::result::Result<(), RouteRegisterError> {
        self.routes.register(path, schema, handler)
    }

    pub fn add_error_route(&mut self, path: &str, handler: ErrorHandler) -> std::result::Result<(), RouteRegisterError> {
        self.routes.register_error_handler(path, handler)
    }

    pub fn set_general_error_handler(&mut self, handler: ErrorHandler) {
        self.routes.set_general_error_handler(handler);
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.push(module);
    }

    /// Loads the TLS cert/key named in the config, if any. A no-op (plain
    /// HTTP) when `config.tls` is absent.
    pub fn load_tls(&mut self) -> Result<()> {
        let Some(tls_cfg) = &self.config.tls else { return Ok(()) };
        if tls_cfg.cert_path.is_empty() || tls_cfg.key_path.is_empty() {
            return Err(EngineError::Config("tls configured but cert_path/key_path missing".into()).into());
        }
        let server_config = tls::load_server_config(
            std::path::Path::new(&tls_cfg.cert_path),
            std::path::Path::new(&tls_cfg.key_path),
        )?;
        self.tls_config = Some(server_config);
        Ok(())
    }

    /// Binds every configured port once, then spawns `worker_threads` OS
    /// threads, each with its own `mio::Poll` and a `try_clone`d listener
    /// per port, and blocks on all of them.
    pub fn listen_and_serve(self) -> Result<()> {
        let mut std_listeners = Vec::new();
        for &port in &self.config.ports {
            let addr = format!("{}:{}", self.config.host, port);
            let std_listener = StdTcpListener::bind(&addr).map_err(EngineError::from)?;
            std_listeners.push(std_listener);
        }

        let routes = Arc::new(self.routes);
        let modules = Arc::new(self.modules);
        let worker_count = self.config.worker_threads.max(1);

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let mut bound = Vec::with_capacity(std_listeners.len());
            for std_listener in &std_listeners {
                let cloned = std_listener.try_clone().map_err(EngineError::from)?;
                cloned.set_nonblocking(true).map_err(EngineError::from)?;
                bound.push(BoundListener {
                    listener: TcpListener::from_std(cloned),
                    tls_config: self.tls_config.clone(),
                });
            }
            let routes = routes.clone();
            let modules = modules.clone();
            handles.push(thread::spawn(move || reactor::run_worker(bound, routes, modules)));
        }

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(EngineError::from(e).into()),
                Err(_) => return Err(EngineError::ProtocolError("worker thread panicked".into()).into()),
            }
        }
        Ok(())
    }
}
