use tokio::signal;
use tokio::sync::broadcast;

use disco::client::{ClientEvent, DiscoClient};
use disco::config::Config;
use disco::gateway::intents;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "disco=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("  \x1b[31merror\x1b[0m {e}");
            std::process::exit(1);
        }
    };
    print_banner(&config);

    let client = DiscoClient::new(&config);
    let events = client.subscribe();

    if let Err(e) = client.connect().await {
        tracing::error!("failed to connect: {e}");
        std::process::exit(1);
    }

    tokio::select! {
        _ = log_events(events) => {},
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
        },
    }

    if let Err(e) = client.disconnect().await {
        tracing::warn!("failed to disconnect cleanly: {e}");
    }
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let intents = intents::names(config.intents);

    eprintln!();
    eprintln!("  \x1b[1;36mdisco\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mapi\x1b[0m          {}", config.api_url);
    eprintln!("  \x1b[2mgateway\x1b[0m      v{}", config.gateway_version);
    eprintln!(
        "  \x1b[2mshard\x1b[0m        {}/{}",
        config.shard_id, config.shard_count
    );
    eprintln!("  \x1b[2mintents\x1b[0m      {}", intents.join(", "));

    if intents::has_privileged(config.intents) {
        eprintln!();
        eprintln!("  \x1b[33m! privileged intents requested\x1b[0m");
    }

    eprintln!();
}

/// Log everything the client delivers. Returns once the gateway shuts down.
async fn log_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Ready(ready)) => {
                let name = ready
                    .user
                    .as_ref()
                    .and_then(|u| u.username.clone())
                    .unwrap_or_default();
                tracing::info!("ready as {name} in {} guild(s)", ready.guilds.len());
            }
            Ok(ClientEvent::Dispatch(event)) => {
                tracing::info!("{} (sequence {})", event.event_name, event.sequence);
            }
            Ok(ClientEvent::Disconnected(reason)) => {
                tracing::warn!("disconnected: {reason:?}");
                return;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("event log lagged, skipped {n} event(s)");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
