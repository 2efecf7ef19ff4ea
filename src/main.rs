mod calc;
mod json_store;
mod master;
mod models;
mod mysql_store;
mod server;
mod store;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = match store::open_store_from_env() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("ストアの初期化に失敗: {}", e);
            std::process::exit(1);
        }
    };

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);

    server::run(port, store).await;
}
