//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::PgDocumentStore, email::ResendEmailAdapter, identity::{provision_admins, JwtIdentityVerifier},
        summary_llm::OpenAiSummaryAdapter,
    },
    config::{Config, StoreBackend},
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use crm_core::ports::{DocumentStore, SummaryService};
use crm_core::InMemoryDocumentStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Document Store & Run Migrations ---
    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = PgDocumentStore::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory document store; data is lost on restart.");
            Arc::new(InMemoryDocumentStore::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let email_adapter = Arc::new(ResendEmailAdapter::new(&config.email)?);
    if config.email.api_key.is_none() {
        warn!("RESEND_API_KEY is not set; email sends will report 'Email service not configured'.");
    }

    let summarizer: Option<Arc<dyn SummaryService>> = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let openai_client = Client::with_config(openai_config);
            Some(Arc::new(OpenAiSummaryAdapter::new(
                openai_client,
                config.summary_model.clone(),
            )))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; student summaries will use the template.");
            None
        }
    };

    let provisioned = provision_admins(store.as_ref(), &config.admin_subjects).await?;
    if provisioned > 0 {
        info!("Provisioned {} admin user(s).", provisioned);
    }
    let identity = Arc::new(JwtIdentityVerifier::new(&config.jwt, store.clone()));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        store,
        config.clone(),
        email_adapter,
        summarizer,
        identity,
    ));

    // --- 5. Configure CORS ---
    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                ApiError::Internal(format!("Invalid CORS origin '{}': {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let api_router = web::router(app_state)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
