//! Rendering: a pure function from session state to the view clients display.
//!
//! Output is shown only when the stored record belongs to the image that is
//! currently uploaded.

use chrono::{DateTime, Utc};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::Serialize;
use uuid::Uuid;

use crate::caption::{Fingerprint, UploadedImage};
use crate::post::BusinessContext;
use crate::session::store::SessionRecord;
use crate::session::Session;

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub image: Option<ImageSummary>,
    pub context: BusinessContext,
    pub processing: bool,
    pub output: Option<OutputView>,
}

#[derive(Debug, Serialize)]
pub struct ImageSummary {
    pub fingerprint: Fingerprint,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
}

#[derive(Debug, Serialize)]
pub struct OutputView {
    pub conditional_caption: String,
    pub unconditional_caption: String,
    /// Generated post, verbatim.
    pub post: String,
    pub post_html: String,
    /// Evaluation markdown, verbatim.
    pub evaluation: String,
    pub evaluation_html: String,
    pub generated_at: DateTime<Utc>,
}

pub fn render(session: &Session) -> SessionView {
    let output = session
        .image
        .as_ref()
        .and_then(|image| session.store.current_for(image.fingerprint()))
        .map(render_output);

    SessionView {
        session_id: session.id,
        created_at: session.created_at,
        image: session.image.as_ref().map(summarize),
        context: session.context.clone(),
        processing: session.processing,
        output,
    }
}

fn summarize(image: &UploadedImage) -> ImageSummary {
    let (width, height) = image.rgb().dimensions();
    ImageSummary {
        fingerprint: image.fingerprint().clone(),
        mime_type: image.format().to_mime_type(),
        width,
        height,
        byte_len: image.byte_len(),
    }
}

fn render_output(record: &SessionRecord) -> OutputView {
    OutputView {
        conditional_caption: record.captions.conditional.clone(),
        unconditional_caption: record.captions.unconditional.clone(),
        post: record.post.clone(),
        post_html: post_to_html(&record.post),
        evaluation: record.evaluation.clone(),
        evaluation_html: markdown_to_html(&record.evaluation),
        generated_at: record.generated_at,
    }
}

/// Escapes the post and keeps its line breaks.
pub fn post_to_html(post: &str) -> String {
    let escaped = html_escape::encode_text(post);
    format!(
        "<div class=\"caption-body\">{}</div>",
        escaped.replace('\n', "<br>\n")
    )
}

/// Renders LLM markdown to HTML. Raw HTML in the input is shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
