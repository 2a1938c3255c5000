//! Inbound body normalisation.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Characters kept by [`preview`].
pub const PREVIEW_CHARS: usize = 300;

/// Replace every HTML tag with a space and trim the result.
///
/// Entities are left as-is; the drafting model copes with them.
pub fn strip_html(body: &str) -> String {
    TAG.replace_all(body, " ").trim().to_string()
}

/// First [`PREVIEW_CHARS`] characters of the stripped body.
pub fn preview(body: &str) -> String {
    strip_html(body).chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_replaces_tags_with_spaces() {
        let html = "<html><body><p>Hi team,</p><p>Transfer failed.</p></body></html>";
        assert_eq!(strip_html(html), "Hi team,  Transfer failed.");
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(strip_html("  plain body \n"), "plain body");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let body = format!("<div>{}</div>", "é".repeat(400));
        let p = preview(&body);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert!(p.chars().all(|c| c == 'é'));
    }
}
