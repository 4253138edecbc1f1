//! BLIP image captioning on candle.
//!
//! Weights and tokenizer come from the Hugging Face hub cache and are loaded
//! once at startup. Inference runs on CPU in f32.

use std::sync::{Arc, Mutex};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip;
use hf_hub::{api::tokio::Api, Repo, RepoType};
use image::{imageops::FilterType, RgbImage};
use tokenizers::Tokenizer;
use tracing::info;

use super::{CaptionBackend, CaptionError};

/// Published checkpoint used for captioning.
pub const MODEL_ID: &str = "Salesforce/blip-image-captioning-large";
/// Hub revision carrying the safetensors export of the weights.
const MODEL_REVISION: &str = "refs/pr/18";

/// Square input resolution of the BLIP vision tower.
const IMAGE_SIZE: u32 = 384;
#[allow(clippy::excessive_precision)]
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
#[allow(clippy::excessive_precision)]
const IMAGE_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// `[DEC]`, the decoder start token that replaces `[CLS]`.
const BOS_TOKEN_ID: u32 = 30522;
/// `[SEP]`, end of caption.
const SEP_TOKEN_ID: u32 = 102;

/// BLIP's BERT tokenizer plus the `[DEC]` framing the text decoder expects.
pub struct CaptionTokenizer {
    inner: Tokenizer,
}

impl CaptionTokenizer {
    pub fn new(inner: Tokenizer) -> Self {
        Self { inner }
    }

    /// `[DEC]` followed by the prompt's word pieces, without `[CLS]`/`[SEP]`.
    fn prompt_tokens(&self, prompt: Option<&str>) -> Result<Vec<u32>, CaptionError> {
        let mut tokens = vec![BOS_TOKEN_ID];
        if let Some(prompt) = prompt {
            let encoding = self
                .inner
                .encode(prompt, false)
                .map_err(|e| CaptionError::Tokenizer(e.to_string()))?;
            tokens.extend_from_slice(encoding.get_ids());
        }
        Ok(tokens)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, CaptionError> {
        let tokens = tokens.strip_prefix(&[BOS_TOKEN_ID]).unwrap_or(tokens);
        self.inner
            .decode(tokens, true)
            .map_err(|e| CaptionError::Tokenizer(e.to_string()))
    }
}

/// Extends `token_ids` one token at a time until `[SEP]` or the budget runs out.
///
/// `next_token` receives only the ids the decoder has not seen yet: the whole
/// prompt on the first step, then just the last token (the rest is in the KV
/// cache).
fn greedy_decode<F>(
    mut token_ids: Vec<u32>,
    max_new_tokens: usize,
    mut next_token: F,
) -> Result<Vec<u32>, CaptionError>
where
    F: FnMut(&[u32]) -> Result<u32, CaptionError>,
{
    for step in 0..max_new_tokens {
        let context_size = if step > 0 { 1 } else { token_ids.len() };
        let start = token_ids.len().saturating_sub(context_size);
        let next = next_token(&token_ids[start..])?;
        if next == SEP_TOKEN_ID {
            break;
        }
        token_ids.push(next);
    }
    Ok(token_ids)
}

/// Loaded BLIP model, tokenizer and device.
///
/// The text decoder keeps a KV cache between forward calls, so the model sits
/// behind a `Mutex` and the cache is reset at the start of every caption.
pub struct BlipBackend {
    model: Mutex<blip::BlipForConditionalGeneration>,
    tokenizer: CaptionTokenizer,
    device: Device,
}

impl BlipBackend {
    /// Fetches (or reuses the cached) weights and tokenizer, then builds the model.
    pub async fn load() -> Result<Arc<Self>, CaptionError> {
        info!("Loading caption model {MODEL_ID}...");

        let api = Api::new().map_err(|e| CaptionError::Load(e.to_string()))?;
        let weights = api
            .repo(Repo::with_revision(
                MODEL_ID.to_string(),
                RepoType::Model,
                MODEL_REVISION.to_string(),
            ))
            .get("model.safetensors")
            .await
            .map_err(|e| CaptionError::Load(format!("model.safetensors: {e}")))?;
        let tokenizer_path = api
            .model(MODEL_ID.to_string())
            .get("tokenizer.json")
            .await
            .map_err(|e| CaptionError::Load(format!("tokenizer.json: {e}")))?;

        let backend = tokio::task::spawn_blocking(move || -> Result<Self, CaptionError> {
            let device = Device::Cpu;
            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| CaptionError::Load(format!("tokenizer: {e}")))?;

            let config = blip::Config::image_captioning_large();
            // SAFETY: the weights file is a read-only cache entry that is not
            // modified while mapped.
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
            let model = blip::BlipForConditionalGeneration::new(&config, vb)?;

            Ok(Self {
                model: Mutex::new(model),
                tokenizer: CaptionTokenizer::new(tokenizer),
                device,
            })
        })
        .await
        .map_err(|e| CaptionError::Load(format!("model load task failed: {e}")))??;

        info!("Caption model loaded");
        Ok(Arc::new(backend))
    }

    /// Resizes to 384x384 and normalizes into a `(3, 384, 384)` f32 tensor.
    fn preprocess(&self, image: &RgbImage) -> Result<Tensor, CaptionError> {
        let resized = image::imageops::resize(image, IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom);
        let size = IMAGE_SIZE as usize;
        let data = Tensor::from_vec(resized.into_raw(), (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?;
        let mean = Tensor::new(&IMAGE_MEAN, &self.device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&IMAGE_STD, &self.device)?.reshape((3, 1, 1))?;
        Ok((data / 255.)?.broadcast_sub(&mean)?.broadcast_div(&std)?)
    }
}

impl CaptionBackend for BlipBackend {
    fn encode(
        &self,
        image: &RgbImage,
        prompt: Option<&str>,
        max_new_tokens: usize,
    ) -> Result<Vec<u32>, CaptionError> {
        let pixels = self.preprocess(image)?;
        let prompt_ids = self.tokenizer.prompt_tokens(prompt)?;

        let mut model = self
            .model
            .lock()
            .map_err(|e| CaptionError::Load(format!("model mutex poisoned: {e}")))?;
        model.reset_kv_cache();

        let image_embeds = pixels.unsqueeze(0)?.apply(model.vision_model())?;
        // Greedy decoding: no temperature, no nucleus sampling.
        let mut logits_processor = LogitsProcessor::new(0, None, None);

        greedy_decode(prompt_ids, max_new_tokens, |unseen| {
            let input_ids = Tensor::new(unseen, &self.device)?.unsqueeze(0)?;
            let logits = model.text_decoder().forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            Ok(logits_processor.sample(&logits)?)
        })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, CaptionError> {
        self.tokenizer.decode(tokens)
    }
}
