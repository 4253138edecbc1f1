//! Caption Model Adapter: turns an uploaded image into a conditional and an
//! unconditional caption.
//!
//! The trained model is an external collaborator behind `CaptionBackend`.
//! `CaptionAdapter` owns the fixed prompt and token budget and runs both
//! branches back to back on the blocking pool.

pub mod blip;
pub mod image;

use std::sync::Arc;

use ::image::RgbImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;

pub use self::image::{Fingerprint, UploadedImage};

/// Text prefix that steers the conditional branch.
pub const CONDITIONAL_PROMPT: &str = "a photograph of";
/// Upper bound on newly generated tokens per caption.
pub const MAX_NEW_TOKENS: usize = 40;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("failed to load caption model: {0}")]
    Load(String),

    #[error("model produced an empty caption")]
    EmptyCaption,
}

/// Both captions produced for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPair {
    pub conditional: String,
    pub unconditional: String,
}

/// A loaded image-captioning model.
///
/// Implementations are blocking and are only ever invoked from
/// `spawn_blocking`.
pub trait CaptionBackend: Send + Sync + 'static {
    /// Runs the model over `image`, optionally seeded with `prompt`, and returns
    /// the full token sequence (prompt tokens included), generating at most
    /// `max_new_tokens` beyond the prompt.
    fn encode(
        &self,
        image: &RgbImage,
        prompt: Option<&str>,
        max_new_tokens: usize,
    ) -> Result<Vec<u32>, CaptionError>;

    /// Decodes tokens to plain text, skipping special tokens.
    fn decode(&self, tokens: &[u32]) -> Result<String, CaptionError>;
}

/// Produces a `CaptionPair` for an uploaded image. The pipeline depends on this
/// trait so tests can swap in a fake captioner.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    async fn caption(&self, image: &UploadedImage) -> Result<CaptionPair, AppError>;
}

/// Adapts any `CaptionBackend` to `ImageCaptioner`.
pub struct CaptionAdapter<B> {
    backend: Arc<B>,
}

impl<B: CaptionBackend> CaptionAdapter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

/// One captioning branch: encode, decode, trim, reject empty output.
fn run_branch<B: CaptionBackend>(
    backend: &B,
    image: &RgbImage,
    prompt: Option<&str>,
) -> Result<String, CaptionError> {
    let tokens = backend.encode(image, prompt, MAX_NEW_TOKENS)?;
    let text = backend.decode(&tokens)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CaptionError::EmptyCaption);
    }
    Ok(text.to_string())
}

#[async_trait]
impl<B: CaptionBackend> ImageCaptioner for CaptionAdapter<B> {
    async fn caption(&self, image: &UploadedImage) -> Result<CaptionPair, AppError> {
        let backend = self.backend.clone();
        let owned = image.clone();

        let pair = tokio::task::spawn_blocking(move || -> Result<CaptionPair, CaptionError> {
            let conditional = run_branch(backend.as_ref(), owned.rgb(), Some(CONDITIONAL_PROMPT))?;
            let unconditional = run_branch(backend.as_ref(), owned.rgb(), None)?;
            Ok(CaptionPair {
                conditional,
                unconditional,
            })
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("caption task failed: {e}")))??;

        tracing::debug!(
            "Captioned image {}: conditional={:?} unconditional={:?}",
            image.fingerprint(),
            pair.conditional,
            pair.unconditional
        );

        Ok(pair)
    }
}
