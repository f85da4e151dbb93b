//! Demo binary: loads configuration, assembles a `SyncPipeline` per
//! registered route from the middleware config, and exercises it against
//! an in-process sample request. Does not bind a socket or speak
//! HTTP/1.1 or HTTP/2 itself — that wire-level work belongs to the
//! transport this crate is designed to sit behind.

mod config;

use std::path::PathBuf;

use clap::Parser;
use switchboard_config::ConfigLoader;
use switchboard_core::{Context, HttpMethod, Request, Response};
use switchboard_factory::MiddlewareFactory;
use switchboard_pipeline::{SyncPipeline, TerminalHandler};
use tracing::{info, warn};

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "switchboard-server", version, about = "Switchboard demo gateway")]
struct Cli {
    /// Path to the server configuration file.
    #[arg(short, long, default_value = "switchboard-server.yaml")]
    config: PathBuf,

    /// Path to the middleware configuration file, overriding the one the
    /// server config names.
    #[arg(long)]
    middleware_config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let server_config = ServerConfig::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&server_config.log_level)),
        )
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        http1_port = server_config.http1_port,
        http2_port = server_config.http2_port,
        "switchboard-server starting"
    );

    let middleware_path = cli.middleware_config.unwrap_or(server_config.middleware_config.clone());
    let middleware_config = if middleware_path.exists() {
        ConfigLoader::new().load_file(&middleware_path)?
    } else {
        warn!(path = %middleware_path.display(), "no middleware config found, running with defaults only");
        switchboard_config::MiddlewareConfig::default()
    };

    let factory = MiddlewareFactory::global();

    // Sample route set, standing in for whatever a real transport would
    // register as it binds handlers. The demo exists to show the pipeline
    // assembly and invocation path end to end, not to model a real API.
    let demo_routes = ["/health", "/v1/widgets", "/v1/widgets/{id}"];

    for path in demo_routes {
        let effective = middleware_config.effective_middlewares_for(path);
        let mut pipeline = SyncPipeline::new().with_performance_monitoring(true);

        {
            let factory = factory.read().expect("middleware factory lock poisoned");
            for entry in &effective {
                match factory.create(entry) {
                    Ok(Some(built)) => pipeline.add_middleware(built.sync),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(route = path, middleware = %entry.name, error = %e, "failed to build middleware, skipping it");
                    }
                }
            }
        }

        pipeline.set_final_handler(TerminalHandler::sync(|_req, _ctx| Ok(Response::new(200))));

        let request = Request::new(HttpMethod::Get, path, "HTTP/1.1");
        let mut context = Context::new();
        match pipeline.execute(request, &mut context) {
            Ok(response) => info!(route = path, status = response.status, middlewares = pipeline.names().len(), "demo pipeline run"),
            Err(e) => warn!(route = path, error = %e, "demo pipeline run failed"),
        }
    }

    info!("demo run complete; no socket was bound (transport is out of scope for this binary)");
    Ok(())
}
