//! Source templates
//!
//! A source is an embed URL template with an `{id}` placeholder.

/// Placeholder replaced by the content id
pub const ID_PLACEHOLDER: &str = "{id}";

/// Build the embed URL for `content_id`
///
/// The id is percent-encoded so arbitrary input cannot alter the URL structure.
pub fn expand(template: &str, content_id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(content_id.as_bytes()).collect();
    template.replace(ID_PLACEHOLDER, &encoded)
}

/// Expand every template, preserving priority order
pub fn expand_all(templates: &[String], content_id: &str) -> Vec<String> {
    templates.iter().map(|t| expand(t, content_id)).collect()
}
