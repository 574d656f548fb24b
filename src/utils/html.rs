// src/utils/html.rs

/// Sanitises author-supplied text (question prompts, options, explanations,
/// test titles) before it is stored.
///
/// Safe formatting tags such as `<b>` or `<sub>` survive so formulas still
/// render; `<script>`, `<iframe>` and event-handler attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
