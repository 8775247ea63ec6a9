// Framework bootstrap for the match server runtime (spec.md §2 "Control
// flow", §6 "Configuration"). `init_runtime` keeps the teacher's
// tracing/dotenvy/panic-hook setup verbatim; `run`/`run_with_config` are
// rewritten around a raw TCP accept loop instead of an axum `Router`.

use std::io::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::frameworks::config::{self, ServerConfig};
use crate::interface_adapters::net::connections::ConnectionRegistry;
use crate::interface_adapters::net::session;
use crate::interface_adapters::protocol;
use crate::interface_adapters::state::AppState;
use crate::use_cases::identity::IdentityRegistry;
use crate::use_cases::lobby::LobbyRegistry;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Max concurrently-registered player identities; generous relative to
/// any realistic `lobby_count * 2`, just a sanity ceiling (spec.md §4.3).
const MAX_IDENTITIES: usize = 100_000;

fn build_state(config: &ServerConfig) -> Arc<AppState> {
    Arc::new(AppState {
        connections: Arc::new(ConnectionRegistry::new()),
        identity: Arc::new(IdentityRegistry::new(MAX_IDENTITIES)),
        lobbies: Arc::new(LobbyRegistry::new(config.lobby_count)),
    })
}

/// Waits for the process to receive an OS shutdown request (Ctrl-C, or
/// SIGTERM on Unix). Resolves once; callers select on it alongside other
/// work so the wait never blocks the accept loop for more than a tick.
async fn shutdown_requested() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Accepts connections until a shutdown signal fires, spawning one session
/// task per connection (spec.md §2, §3). The acceptor checks for shutdown
/// on every loop iteration, i.e. no later than the next accept (spec.md
/// §5: "the acceptor's cancellation flag is checked every ≤1 s").
pub async fn run(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(&config);

    tracing::info!(%address, lobby_count = config.lobby_count, "listening");

    let stop = Arc::new(Notify::new());
    {
        let state = state.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            shutdown_requested().await;
            tracing::info!("shutdown signal received");
            shutdown(&state).await;
            // `notify_one`, not `notify_waiters`: it stores a permit if the
            // accept loop isn't waiting on `notified()` yet (e.g. mid-accept),
            // so this signal can never be missed by a race.
            stop.notify_one();
        });
    }

    loop {
        tokio::select! {
            _ = stop.notified() => {
                tracing::info!("acceptor stopped");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                }
                let handle = state.connections.insert(stream).await;
                tracing::debug!(%peer, handle, "accepted connection");

                tokio::spawn(session::run_session(
                    handle,
                    state.connections.clone(),
                    state.identity.clone(),
                    state.lobbies.clone(),
                ));
            }
        }
    }
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = config::resolve_config(&args)
        .map_err(|e| std::io::Error::other(format!("invalid configuration: {}", e.0)))?;

    let ip: std::net::IpAddr = config
        .ip
        .parse()
        .map_err(|e| std::io::Error::other(format!("invalid IP {}: {e}", config.ip)))?;
    let address = SocketAddr::from((ip, config.port));

    let listener = TcpListener::bind(address).await.inspect_err(|e| {
        tracing::error!(%address, error = %e, "failed to bind");
    })?;

    run(listener, config).await
}

/// Broadcasts `C45DOWN` to every live connection and tears them all down.
/// Called from the process's shutdown signal handler (spec.md §5).
pub async fn shutdown(state: &AppState) {
    state.connections.broadcast(&protocol::line_down(None)).await;
    state.connections.shutdown_all().await;
}
