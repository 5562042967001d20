use axum::serve;
use engraph::api::handlers::AppState;
use engraph::api::routes::create_router;
use engraph::config::AppConfig;
use engraph::logic::SchemaFieldIndex;
use engraph::seed;
use engraph::store::MemoryStore;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging, defaulting to Info
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new().filter_level(LevelFilter::Info).init();

    println!("Engraph: Entity Relationship Resolution Server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}, batch window={}ms",
        config.server.host, config.server.port, config.resolver.batch_window_ms
    );

    let store = Arc::new(MemoryStore::new());

    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        println!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
        println!("Seed data loaded successfully");
    }

    let state = AppState {
        store,
        field_index: Arc::new(SchemaFieldIndex::new()),
        batch_window: config.batch_window(),
        max_batch_size: config.resolver.max_batch_size,
    };

    run_server(create_router().with_state(state), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Engraph server running on http://{}", bind_address);
    serve(listener, app).await?;
    Ok(())
}
