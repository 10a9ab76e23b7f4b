//! Engine-wide lifecycle hooks, independent of any single route.
//!
//! Grounded on the `SessionStore`/`session_store` threading throughout
//! `src/http/http_connection.rs` and `src/server.rs` — ambient per-worker
//! state the teacher wires into the reactor loop rather than into any one
//! handler. Generalized into an explicit, user-registrable hook bundle so
//! the embedding program can add its own cross-cutting behavior (metrics,
//! session stores, warm caches) without the engine needing to know about it.

/// Three optional callbacks invoked, in registration order, at loop-init,
/// loop-teardown, and full engine teardown respectively.
#[derive(Default)]
pub struct Module {
    pub on_loop_init: Option<fn()>,
    pub on_loop_teardown: Option<fn()>,
    pub on_engine_teardown: Option<fn()>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_init(mut self, f: fn()) -> Self {
        self.on_loop_init = Some(f);
        self
    }

    pub fn with_loop_teardown(mut self, f: fn()) -> Self {
        self.on_loop_teardown = Some(f);
        self
    }

    pub fn with_engine_teardown(mut self, f: fn()) -> Self {
        self.on_engine_teardown = Some(f);
        self
    }
}

/// Runs every module's loop-init hook, in registration order.
pub fn run_loop_init(modules: &[Module]) {
    for module in modules {
        if let Some(f) = module.on_loop_init {
            f();
        }
    }
}

pub fn run_loop_teardown(modules: &[Module]) {
    for module in modules {
        if let Some(f) = module.on_loop_teardown {
            f();
        }
    }
}

pub fn run_engine_teardown(modules: &[Module]) {
    for module in modules {
        if let Some(f) = module.on_engine_teardown {
            f();
        }
    }
}
