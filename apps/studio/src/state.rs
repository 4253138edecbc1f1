use std::sync::Arc;

use crate::caption::ImageCaptioner;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::pipeline::Pipeline;
use crate::post::{LlmPostEvaluator, LlmPostGenerator};
use crate::session::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions. Each one owns its own output store.
    pub sessions: Arc<SessionRegistry>,
    /// Caption → generate → evaluate, shared read-only by every session.
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wires the production pipeline. A `Config` is required, so nothing in
    /// the pipeline exists until the API key has been validated.
    pub fn new(config: &Config, captioner: Arc<dyn ImageCaptioner>) -> Self {
        let llm = LlmClient::new(config.deepseek_api_key.clone());
        let pipeline = Pipeline::new(
            captioner,
            Arc::new(LlmPostGenerator::new(llm.clone())),
            Arc::new(LlmPostEvaluator::new(llm)),
        );
        Self::with_pipeline(pipeline)
    }

    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            pipeline: Arc::new(pipeline),
        }
    }
}
