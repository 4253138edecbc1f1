// Post drafting and critique. Both stages talk to the chat API through
// llm_client only; the pipeline sees them as the two traits below.

pub mod evaluator;
pub mod generator;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::caption::{CaptionPair, UploadedImage};
use crate::errors::AppError;

pub use evaluator::LlmPostEvaluator;
pub use generator::LlmPostGenerator;

/// Placeholder company description shown until the user edits it.
pub const DEFAULT_COMPANY_INFO: &str = "Example - Fenty Beauty by Rihanna was created with the \
promise of inclusion for all women. With an unmatched offering of shades and colors for ALL skin \
tones, you'll never look elsewhere for your beauty staples.";

/// Placeholder recent posts shown until the user edits them.
pub const DEFAULT_RECENT_POSTS: &str = "Mirror mirror on the wall who's the baddest of them all...
In the mood for sum soft smooth skin 😉 Grab a spoon for this #CookiesNClean Face Scrub...
The cherry on top? #GlossBombHeat in 'Hot Cherry' 🔥🍒...
All that glitters is gold ✨creating the perfect canvas for this gold AND bold look...
Double the gloss double the glam 💦 Are you ready to #DoubleGloss fam?...";

/// Free-text business context supplied alongside the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessContext {
    pub company_info: String,
    pub recent_posts: String,
}

impl Default for BusinessContext {
    fn default() -> Self {
        Self {
            company_info: DEFAULT_COMPANY_INFO.to_string(),
            recent_posts: DEFAULT_RECENT_POSTS.to_string(),
        }
    }
}

/// Drafts a social-media post from captions and business context.
#[async_trait]
pub trait PostGenerator: Send + Sync {
    async fn generate_post(
        &self,
        captions: &CaptionPair,
        context: &BusinessContext,
    ) -> Result<String, AppError>;
}

/// Critiques a drafted post.
///
/// `image` is part of the contract but the current implementation is
/// text-only and never transmits it.
#[async_trait]
pub trait PostEvaluator: Send + Sync {
    async fn evaluate_post(
        &self,
        image: &UploadedImage,
        post: &str,
        context: &BusinessContext,
    ) -> Result<String, AppError>;
}

/// Substitutes `{key}` placeholders in a single pass over `template`.
///
/// Values are inserted verbatim and never rescanned, so user text that
/// happens to contain `{company_info}` stays as typed.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let matched = values.iter().find(|(key, _)| {
            tail[1..].starts_with(key) && tail[1 + key.len()..].starts_with('}')
        });
        match matched {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_replaces_known_keys() {
        let out = fill_template("Hi {name}, you are {age}.", &[("name", "Ada"), ("age", "36")]);
        assert_eq!(out, "Hi Ada, you are 36.");
    }

    #[test]
    fn test_fill_template_leaves_unknown_braces() {
        let out = fill_template("{unknown} {name} {", &[("name", "Ada")]);
        assert_eq!(out, "{unknown} Ada {");
    }

    #[test]
    fn test_fill_template_does_not_rescan_values() {
        let out = fill_template(
            "A={a} B={b}",
            &[("a", "{b}"), ("b", "bee")],
        );
        assert_eq!(out, "A={b} B=bee");
    }

    #[test]
    fn test_default_context_is_non_empty() {
        let context = BusinessContext::default();
        assert!(context.company_info.starts_with("Example - Fenty Beauty"));
        assert_eq!(context.recent_posts.lines().count(), 5);
    }
}
