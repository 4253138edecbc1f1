// All LLM prompt constants for post drafting and critique.

/// System prompt for drafting a post.
pub const GENERATOR_SYSTEM: &str = "You are a pro social media marketing caption generator. \
    Create engaging and relevant posts.";

/// Post drafting prompt template.
/// Replace: {conditional_caption}, {unconditional_caption}, {company_info}, {recent_posts}
pub const GENERATOR_PROMPT_TEMPLATE: &str = "Generate a creative social media post based on the following inputs:
Conditional Caption: {conditional_caption}
Unconditional Caption: {unconditional_caption}
Company Information: {company_info}
Recent Social Media Posts: {recent_posts}
Just give the caption that I can post on social media sites please.";

/// System prompt for critiquing a post.
pub const EVALUATOR_SYSTEM: &str =
    "You are a pro social media marketing caption evaluator. Evaluate my caption.";

/// Output budget for the critique.
pub const EVALUATOR_MAX_TOKENS: u32 = 1024;

/// Evaluation rubric template.
/// Replace: {caption}, {company_info}
pub const EVALUATOR_PROMPT_TEMPLATE: &str = r#"Given an image and its caption, evaluate the caption's effectiveness based on the following criteria:

1. **Engagement Potential**: Consider factors such as the caption's ability to capture attention, provoke thought, or encourage interaction (likes, comments, shares). Assess whether the caption uses language that is likely to engage the target audience, including any use of humor, questions, or call-to-actions.

2. **Alignment with Company Values**: Examine if the caption accurately reflects the company's values and branding, as described in the company information below. Determine if the caption supports these values, either directly through the content or indirectly through tone and approach.

3. **Rating for the post**: Finally rate the post on a scale of 1 to 10.

### Image Description
Use the conditional and unconditional captions as the image description.

### Caption
{caption}

### Company Information
{company_info}

Please provide a detailed evaluation of the caption based on the above criteria, highlighting its strengths and suggesting any improvements if necessary."#;
