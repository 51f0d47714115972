//! Example server: discovers the schema of the configured datasources and
//! serves the generic data API.
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/app cargo run --example server
//! ```

use axum::Router;
use tabular_sdk::{common_routes_with_ready, initialize, repository_routes, Settings};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabular_sdk=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let state = initialize(&settings).await?;

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(repository_routes(state));

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
