use http_engine::config::EngineConfig;
use http_engine::engine::Engine;
use http_engine::error::Result;
use http_engine::handle::RequestHandle;
use http_engine::route::HandlerFuture;
use http_engine::schema::{Schema, SlotDescriptor, SlotKind};
use proxy_log::info;

fn hello(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        let name = handle.string(0);
        let name = if name.is_empty() { "world".to_string() } else { name };
        handle.write_fmt(format_args!("Hello, {name}!"));
        200
    })
}

fn upload(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        match handle.read().await {
            Some(bytes) => {
                handle.write(&bytes);
                200
            }
            None => {
                // Connection died mid-read (scenario 5): close without a reply.
                0
            }
        }
    })
}

fn general_error(handle: RequestHandle) -> HandlerFuture {
    Box::pin(async move {
        if let Some(msg) = handle.arg_error_message() {
            handle.write_fmt(format_args!("bad arguments: {msg}"));
        }
        500
    })
}

fn main() -> Result<()> {
    let config = std::path::Path::new("config.yaml")
        .exists()
        .then(|| EngineConfig::from_path(std::path::Path::new("config.yaml")))
        .transpose()?
        .unwrap_or_default();

    let mut engine = Engine::new(config);
    engine.load_tls()?;

    engine.add_route("/hello", Schema::compile(vec![SlotDescriptor::new("name", SlotKind::String, false)])?, hello)?;

    engine.add_route("/upload", Schema::compile(vec![])?, upload)?;

    engine.set_general_error_handler(general_error);

    info!("listening");
    engine.listen_and_serve()
}
