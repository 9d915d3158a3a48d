//! webmux server binary: config from the environment, one Axum listener.

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use webmux::config::Config;
use webmux::logging;
use webmux::proxy::{router, ProxyState};
use webmux::remux::FfmpegRemuxer;
use webmux::store::S3ObjectStore;

#[derive(Parser)]
#[command(
    name = "webmux-server",
    version = webmux::VERSION,
    about = "On-demand audio remuxing proxy over S3-compatible storage"
)]
struct Args {
    /// Listen address, overriding LISTEN_ADDR
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Verbose (debug) logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(if args.debug { "debug" } else { "info" });

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            process::exit(1);
        }
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    info!(
        version = webmux::VERSION,
        endpoint = %config.store.endpoint,
        bucket = %config.store.bucket,
        "starting webmux"
    );

    let store = Arc::new(S3ObjectStore::connect(&config.store).await);
    let app = router(ProxyState::new(store, Arc::new(FfmpegRemuxer::new())));

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Cannot listen on {}: {err}", config.listen_addr);
            process::exit(1);
        }
    };
    info!(addr = %config.listen_addr, "listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {err}");
        process::exit(1);
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
