mod db;
mod frame;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::classify::{Classify, HeuristicClassifier, LlmClassifier};
use services::context::EnvContext;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // Initialize the LLM client (non-fatal: generation disabled if config
    // missing, classification falls back to the heuristic).
    let (streamer, classifier): (Option<Arc<dyn llm::LlmStream>>, Arc<dyn Classify>) =
        match llm::config::LlmConfig::from_env().and_then(|config| {
            let client = llm::LlmClient::from_config(&config)?;
            Ok((client, config.classifier_model))
        }) {
            Ok((client, classifier_model)) => {
                tracing::info!(model = client.model(), classifier_model = %classifier_model, "LLM client initialized");
                let classifier_client = client.clone().with_model(classifier_model);
                let streamer: Arc<dyn llm::LlmStream> = Arc::new(client);
                let classifier: Arc<dyn Classify> = Arc::new(LlmClassifier::new(Arc::new(classifier_client)));
                (Some(streamer), classifier)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM client not configured — generation disabled");
                let classifier: Arc<dyn Classify> = Arc::new(HeuristicClassifier);
                (None, classifier)
            }
        };

    let state = state::AppState::new(pool, streamer, classifier, Arc::new(EnvContext));

    let app = routes::api_routes(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "draftdeck listening");
    axum::serve(listener, app).await.expect("server failed");
}
