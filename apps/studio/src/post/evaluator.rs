//! Post Evaluator: one `deepseek-reasoner` call that critiques a drafted post.
//!
//! The chat API is text-only, so the image never leaves the process; the
//! rubric tells the model to use the captions as the image description.

use async_trait::async_trait;
use tracing::info;

use crate::caption::UploadedImage;
use crate::errors::AppError;
use crate::llm_client::{ChatModel, Completion, LlmClient};
use crate::post::prompts::{EVALUATOR_MAX_TOKENS, EVALUATOR_PROMPT_TEMPLATE, EVALUATOR_SYSTEM};
use crate::post::{fill_template, BusinessContext, PostEvaluator};

pub struct LlmPostEvaluator {
    llm: LlmClient,
}

impl LlmPostEvaluator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

pub fn build_evaluation_prompt(post: &str, context: &BusinessContext) -> String {
    fill_template(
        EVALUATOR_PROMPT_TEMPLATE,
        &[
            ("caption", post),
            ("company_info", context.company_info.as_str()),
        ],
    )
}

#[async_trait]
impl PostEvaluator for LlmPostEvaluator {
    async fn evaluate_post(
        &self,
        image: &UploadedImage,
        post: &str,
        context: &BusinessContext,
    ) -> Result<String, AppError> {
        let prompt = build_evaluation_prompt(post, context);

        let evaluation = self
            .llm
            .call_text(Completion {
                model: ChatModel::Reasoner,
                system: EVALUATOR_SYSTEM,
                prompt: &prompt,
                max_tokens: Some(EVALUATOR_MAX_TOKENS),
            })
            .await
            .map_err(|e| AppError::llm("Evaluation", e))?;

        info!(
            "Evaluated post for image {} ({} chars)",
            image.fingerprint(),
            evaluation.chars().count()
        );
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::image::test_image_bytes;
    use image::ImageFormat;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> BusinessContext {
        BusinessContext {
            company_info: "Acme Corp, eco-friendly".to_string(),
            recent_posts: "ignored by the rubric".to_string(),
        }
    }

    #[test]
    fn test_rubric_covers_all_criteria() {
        let prompt = build_evaluation_prompt("Brush green.", &context());
        assert!(prompt.contains("**Engagement Potential**"));
        assert!(prompt.contains("**Alignment with Company Values**"));
        assert!(prompt.contains("scale of 1 to 10"));
        assert!(prompt.contains("### Caption\nBrush green.\n"));
        assert!(prompt.contains("### Company Information\nAcme Corp, eco-friendly\n"));
        assert!(!prompt.contains("ignored by the rubric"));
        assert!(prompt.contains("as described in the company information below"));
        assert!(!prompt.contains("[describe company values"));
    }

    #[tokio::test]
    async fn test_evaluate_post_uses_reasoner_with_token_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "deepseek-reasoner",
                "max_tokens": 1024,
                "messages": [{"role": "system", "content": EVALUATOR_SYSTEM}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "content": "## Engagement\nStrong hook.\n\n**Rating: 8/10**",
                    "reasoning_content": "The user wants..."
                }}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let evaluator = LlmPostEvaluator::new(LlmClient::with_base_url("k".into(), server.uri()));
        let image =
            UploadedImage::from_bytes(test_image_bytes(ImageFormat::Png, [9, 9, 9])).unwrap();
        let evaluation = evaluator
            .evaluate_post(&image, "Brush green.", &context())
            .await
            .unwrap();
        assert_eq!(evaluation, "## Engagement\nStrong hook.\n\n**Rating: 8/10**");
    }

    #[tokio::test]
    async fn test_image_is_not_transmitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Rating: 6/10"}}]
            })))
            .mount(&server)
            .await;

        let evaluator = LlmPostEvaluator::new(LlmClient::with_base_url("k".into(), server.uri()));
        let image =
            UploadedImage::from_bytes(test_image_bytes(ImageFormat::Png, [9, 9, 9])).unwrap();
        evaluator
            .evaluate_post(&image, "Brush green.", &context())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m["content"].is_string()));
    }
}
