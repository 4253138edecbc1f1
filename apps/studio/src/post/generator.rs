//! Post Generator: drafts one social-media caption from the image captions
//! and business context with a single `deepseek-chat` call.

use async_trait::async_trait;
use tracing::info;

use crate::caption::CaptionPair;
use crate::errors::AppError;
use crate::llm_client::{ChatModel, Completion, LlmClient};
use crate::post::prompts::{GENERATOR_PROMPT_TEMPLATE, GENERATOR_SYSTEM};
use crate::post::{fill_template, BusinessContext, PostGenerator};

pub struct LlmPostGenerator {
    llm: LlmClient,
}

impl LlmPostGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

/// Builds the drafting prompt. Captions and context are embedded verbatim.
pub fn build_generation_prompt(captions: &CaptionPair, context: &BusinessContext) -> String {
    fill_template(
        GENERATOR_PROMPT_TEMPLATE,
        &[
            ("conditional_caption", captions.conditional.as_str()),
            ("unconditional_caption", captions.unconditional.as_str()),
            ("company_info", context.company_info.as_str()),
            ("recent_posts", context.recent_posts.as_str()),
        ],
    )
}

#[async_trait]
impl PostGenerator for LlmPostGenerator {
    async fn generate_post(
        &self,
        captions: &CaptionPair,
        context: &BusinessContext,
    ) -> Result<String, AppError> {
        let prompt = build_generation_prompt(captions, context);

        let post = self
            .llm
            .call_text(Completion {
                model: ChatModel::Chat,
                system: GENERATOR_SYSTEM,
                prompt: &prompt,
                max_tokens: None,
            })
            .await
            .map_err(|e| AppError::llm("Generation", e))?;

        info!("Generated post ({} chars)", post.chars().count());
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn captions() -> CaptionPair {
        CaptionPair {
            conditional: "a photograph of a bamboo toothbrush".to_string(),
            unconditional: "a toothbrush on a sink".to_string(),
        }
    }

    fn context() -> BusinessContext {
        BusinessContext {
            company_info: "Acme Corp, eco-friendly".to_string(),
            recent_posts: "Plastic-free July!\nNew refill station".to_string(),
        }
    }

    #[test]
    fn test_prompt_embeds_all_inputs_verbatim() {
        let prompt = build_generation_prompt(&captions(), &context());
        assert!(prompt.contains("Conditional Caption: a photograph of a bamboo toothbrush"));
        assert!(prompt.contains("Unconditional Caption: a toothbrush on a sink"));
        assert!(prompt.contains("Company Information: Acme Corp, eco-friendly"));
        assert!(prompt.contains("Plastic-free July!\nNew refill station"));
        assert!(prompt.ends_with("Just give the caption that I can post on social media sites please."));
    }

    #[test]
    fn test_prompt_does_not_sanitize_user_text() {
        let mut ctx = context();
        ctx.company_info = "<b>Acme</b> {recent_posts} \"quoted\"".to_string();
        let prompt = build_generation_prompt(&captions(), &ctx);
        assert!(prompt.contains("Company Information: <b>Acme</b> {recent_posts} \"quoted\""));
    }

    #[tokio::test]
    async fn test_generate_post_uses_chat_model_without_token_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "messages": [{"role": "system", "content": GENERATOR_SYSTEM}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Brush green. 🌱 #Acme\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = LlmPostGenerator::new(LlmClient::with_base_url("k".into(), server.uri()));
        let post = generator.generate_post(&captions(), &context()).await.unwrap();
        assert_eq!(post, "Brush green. 🌱 #Acme\n");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn test_generate_post_propagates_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let generator = LlmPostGenerator::new(LlmClient::with_base_url("k".into(), server.uri()));
        let err = generator.generate_post(&captions(), &context()).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }
}
