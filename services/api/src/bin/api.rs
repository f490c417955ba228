//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{OpenAiDialogueAdapter, PgStore, ScriptedDialogueAdapter},
    config::Config,
    error::ApiError,
    web::{routes, ApiDoc, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::Router;
use deliberation_core::memory::InMemoryStore;
use deliberation_core::ports::{DialogueService, SurveyStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
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

    // --- 2. Pick the Response Store ---
    let store: Arc<dyn SurveyStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let store = Arc::new(PgStore::new(pool));
            info!("Running database migrations...");
            store
                .run_migrations()
                .await
                .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;
            info!("Database migrations complete.");
            store
        }
        None => {
            info!("DATABASE_URL not set, using the in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    // --- 3. Pick the Dialogue Provider ---
    let dialogue: Arc<dyn DialogueService> = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let client = Client::with_config(openai_config);
            Arc::new(OpenAiDialogueAdapter::new(client, config.chat_model.clone()))
        }
        None => {
            info!("OPENAI_API_KEY not set, using the scripted dialogue provider");
            Arc::new(ScriptedDialogueAdapter::new())
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = AppState::new(store, dialogue, config.clone());

    let allow_origin = if config.cors_origin == "*" {
        AllowOrigin::any()
    } else {
        let origin = config
            .cors_origin
            .parse::<HeaderValue>()
            .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?;
        AllowOrigin::exact(origin)
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(routes(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
