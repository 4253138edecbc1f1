//! Caption → generate → evaluate, as one all-or-nothing unit of work.
//!
//! Flow: captioner (conditional, then unconditional) → post generator →
//!       post evaluator → `SessionRecord`.
//!
//! Stages run strictly in sequence. Any stage error aborts the run and no
//! record is produced, so callers can never store a half-populated result.

use std::sync::Arc;

use tracing::info;

use crate::caption::{ImageCaptioner, UploadedImage};
use crate::errors::AppError;
use crate::post::{BusinessContext, PostEvaluator, PostGenerator};
use crate::session::store::SessionRecord;

/// The three pipeline collaborators, built once at startup and shared by all
/// sessions.
#[derive(Clone)]
pub struct Pipeline {
    captioner: Arc<dyn ImageCaptioner>,
    generator: Arc<dyn PostGenerator>,
    evaluator: Arc<dyn PostEvaluator>,
}

impl Pipeline {
    pub fn new(
        captioner: Arc<dyn ImageCaptioner>,
        generator: Arc<dyn PostGenerator>,
        evaluator: Arc<dyn PostEvaluator>,
    ) -> Self {
        Self {
            captioner,
            generator,
            evaluator,
        }
    }

    pub async fn run(
        &self,
        image: &UploadedImage,
        context: &BusinessContext,
    ) -> Result<SessionRecord, AppError> {
        let fingerprint = image.fingerprint();

        // Step 1: captions
        info!("Captioning image {fingerprint}");
        let captions = self.captioner.caption(image).await?;

        // Step 2: draft
        info!("Drafting post for image {fingerprint}");
        let post = self.generator.generate_post(&captions, context).await?;

        // Step 3: critique
        info!("Evaluating post for image {fingerprint}");
        let evaluation = self.evaluator.evaluate_post(image, &post, context).await?;

        Ok(SessionRecord::new(
            fingerprint.clone(),
            captions,
            post,
            evaluation,
        ))
    }
}

/// In-process stand-ins for the model and the chat API.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::Pipeline;
    use crate::caption::{CaptionPair, ImageCaptioner, UploadedImage};
    use crate::errors::AppError;
    use crate::post::{BusinessContext, PostEvaluator, PostGenerator};

    #[derive(Default)]
    pub struct FakeCaptioner {
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageCaptioner for FakeCaptioner {
        async fn caption(&self, image: &UploadedImage) -> Result<CaptionPair, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Caption(crate::caption::CaptionError::EmptyCaption));
            }
            let (w, h) = image.rgb().dimensions();
            Ok(CaptionPair {
                conditional: format!("a photograph of a {w}x{h} product shot"),
                unconditional: format!("a {w}x{h} product shot"),
            })
        }
    }

    /// Every draft is numbered, mimicking a stochastic remote model.
    #[derive(Default)]
    pub struct FakeGenerator {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PostGenerator for FakeGenerator {
        async fn generate_post(
            &self,
            captions: &CaptionPair,
            context: &BusinessContext,
        ) -> Result<String, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!(
                "Draft #{n}: {} by {}",
                captions.unconditional, context.company_info
            ))
        }
    }

    #[derive(Default)]
    pub struct FakeEvaluator {
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PostEvaluator for FakeEvaluator {
        async fn evaluate_post(
            &self,
            _image: &UploadedImage,
            post: &str,
            _context: &BusinessContext,
        ) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Llm("Evaluation LLM call failed: status 503".into()));
            }
            Ok(format!(
                "## Engagement Potential\nSolid hook in \"{post}\".\n\n**Rating: 8/10**"
            ))
        }
    }

    pub struct Fakes {
        pub captioner: Arc<FakeCaptioner>,
        pub generator: Arc<FakeGenerator>,
        pub evaluator: Arc<FakeEvaluator>,
    }

    impl Fakes {
        pub fn new() -> Self {
            Self {
                captioner: Arc::new(FakeCaptioner::default()),
                generator: Arc::new(FakeGenerator::default()),
                evaluator: Arc::new(FakeEvaluator::default()),
            }
        }

        pub fn pipeline(&self) -> Pipeline {
            Pipeline::new(
                self.captioner.clone(),
                self.generator.clone(),
                self.evaluator.clone(),
            )
        }
    }
}
