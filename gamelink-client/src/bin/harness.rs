// gamelink-harness: a small CLI for exercising a `gamelink-client` connection
// by hand against a real server, useful while developing against a new
// protocol deployment.

use std::env;
use std::process;

use bytes::Bytes;
use gamelink_client::{load_config_from_path, Client, ClientConfig};
use tracing::{error, info, warn};

fn usage() -> ! {
    eprintln!("usage: gamelink-harness <host> <port> [config.toml]");
    process::exit(2);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| usage());
    let port: u16 = args
        .next()
        .unwrap_or_else(|| usage())
        .parse()
        .unwrap_or_else(|_| usage());

    let config = match args.next() {
        Some(path) => match load_config_from_path(path.as_ref()) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("FATAL: failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => ClientConfig::default(),
    };

    info!(version = env!("CARGO_PKG_VERSION"), %host, port, "gamelink-harness starting");

    let client = match Client::new(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL: failed to construct client: {}", e);
            process::exit(1);
        }
    };

    client.on_connect(|success| info!(success, "connect"));
    client.on_disconnect(|intentional, cause| warn!(intentional, ?cause, "disconnected"));
    client.on_receive(|stage_id, packet| {
        info!(stage_id, msg_id = %packet.msg_id, bytes = packet.payload.len(), "push received")
    });
    client.on_error(|stage_id, error_code, packet| {
        error!(stage_id, error_code, msg_id = %packet.msg_id, "application error")
    });

    if let Err(e) = client.connect(&host, port).await {
        eprintln!("FATAL: connect failed: {}", e);
        process::exit(1);
    }

    match client.request("Ping", 0, Bytes::new()).await {
        Ok(response) => info!(msg_id = %response.msg_id, "ping reply"),
        Err(e) => warn!(error = %e, "ping request failed"),
    }

    client.disconnect().await;
    info!("gamelink-harness exiting");
}
