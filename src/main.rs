use c45_lobby_server::run_with_config;

#[tokio::main]
async fn main() {
    if let Err(e) = run_with_config().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
