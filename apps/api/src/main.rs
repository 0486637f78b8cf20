use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use billing_cell::{InvoiceService, OrderService};
use catalog_cell::{handlers::CatalogCellState, ProductCatalogService};
use flow_cell::{
    FirestoreFlowStore, FlowCellState, FlowChangeFeed, FlowLifecycleRules, FlowStore,
    SupabaseFlowStore, TelehealthFlowOrchestrator,
};
use shared_config::{AppConfig, FlowBackend};
use shared_database::{firestore::FirestoreClient, supabase::SupabaseClient};

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telehealth Flow API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Catalog and billing always ride on Supabase; only the flow records can
    // sit on Firestore.
    let supabase = Arc::new(SupabaseClient::new(&config));
    let store: Arc<dyn FlowStore> = match config.flow_backend {
        FlowBackend::Supabase => Arc::new(SupabaseFlowStore::new(supabase.clone())),
        FlowBackend::Firestore => {
            Arc::new(FirestoreFlowStore::new(Arc::new(FirestoreClient::new(&config))))
        }
    };

    let catalog = Arc::new(ProductCatalogService::new(supabase.clone()));
    let orchestrator = Arc::new(TelehealthFlowOrchestrator::new(
        store,
        catalog.clone(),
        Arc::new(OrderService::new(supabase.clone())),
        Arc::new(InvoiceService::new(supabase)),
        Arc::new(FlowChangeFeed::new()),
        FlowLifecycleRules::default(),
    ));

    let flow_state = Arc::new(FlowCellState {
        config: config.clone(),
        orchestrator,
    });
    let catalog_state = Arc::new(CatalogCellState { catalog });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(flow_state, catalog_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .await
        .unwrap();
}
