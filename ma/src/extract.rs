//! Response extraction
//!
//! Pure functions from an HTML snapshot to the latest answer text.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::profile::{GENERIC_EXTRACT, TargetProfile};

/// Generic-tier matches must be longer than this to count as an answer
pub const GENERIC_MIN_CHARS: usize = 10;

/// Latest answer on the page, or None
///
/// Profile selectors are tried in order and the last match of the first selector
/// yielding text wins. Then the generic tier, which only accepts substantial text.
pub fn extract(html: &str, profile: &TargetProfile) -> Option<String> {
    debug!(profile = profile.name, bytes = html.len(), "extract: called");
    let document = Html::parse_document(html);

    for selector in profile.extract {
        if let Some(text) = last_element_text(&document, selector).filter(|t| !t.is_empty()) {
            debug!(%selector, "extract: profile tier matched");
            return Some(text);
        }
    }

    for selector in GENERIC_EXTRACT {
        if let Some(text) = last_element_text(&document, selector).filter(|t| t.chars().count() > GENERIC_MIN_CHARS) {
            debug!(%selector, "extract: generic tier matched");
            return Some(text);
        }
    }

    debug!("extract: nothing found");
    None
}

/// Visible text of the last element matching `selector`
pub fn last_element_text(document: &Html, selector: &str) -> Option<String> {
    let parsed = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => {
            warn!(%selector, "Skipping unparsable extraction selector");
            return None;
        }
    };
    document.select(&parsed).last().map(element_text)
}

/// Text content with block elements breaking lines and scripts skipped
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    clean_text(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            match el.value().name() {
                "script" | "style" | "noscript" | "template" => {}
                "br" => out.push('\n'),
                "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr" | "pre" | "blockquote" | "ul"
                | "ol" | "table" | "section" | "article" => {
                    out.push('\n');
                    collect_text(el, out);
                    out.push('\n');
                }
                _ => collect_text(el, out),
            }
        }
    }
}

/// Collapse runs of whitespace; keep single line breaks
fn clean_text(text: &str) -> String {
    let mut result = String::new();
    let mut prev_was_whitespace = false;
    let mut prev_was_newline = false;

    for ch in text.chars() {
        if ch == '\n' {
            if !prev_was_newline {
                // A space right before a break is noise
                if result.ends_with(' ') {
                    result.pop();
                }
                result.push('\n');
            }
            prev_was_newline = true;
            prev_was_whitespace = true;
        } else if ch.is_whitespace() {
            if !prev_was_whitespace {
                result.push(' ');
            }
            prev_was_whitespace = true;
        } else {
            result.push(ch);
            prev_was_whitespace = false;
            prev_was_newline = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{GENERIC, profile_for};

    #[test]
    fn test_last_matching_element_wins() {
        let html = r#"<div data-message-author-role="assistant"><div class="markdown"><p>First</p></div></div>
            <div data-message-author-role="user">question</div>
            <div data-message-author-role="assistant"><div class="markdown"><p>Second answer</p></div></div>"#;
        assert_eq!(extract(html, profile_for("chatgpt")).as_deref(), Some("Second answer"));
    }

    #[test]
    fn test_profile_tiers_fall_through_in_order() {
        // No .markdown inside model-response, so the second selector answers
        let html = "<model-response>Plain gemini answer</model-response>";
        assert_eq!(extract(html, profile_for("gemini")).as_deref(), Some("Plain gemini answer"));
    }

    #[test]
    fn test_generic_tier_requires_substantial_text() {
        let short = r#"<div class="answer">Too short</div>"#;
        assert_eq!(extract(short, &GENERIC), None);

        let long = r#"<div class="answer">This answer is long enough</div>"#;
        assert_eq!(extract(long, &GENERIC).as_deref(), Some("This answer is long enough"));
    }

    #[test]
    fn test_profile_tier_accepts_short_text() {
        let html = r#"<div class="font-claude-message">Yes.</div>"#;
        assert_eq!(extract(html, profile_for("claude")).as_deref(), Some("Yes."));
    }

    #[test]
    fn test_text_skips_scripts_and_breaks_blocks() {
        let html = r#"<div class="ds-markdown"><p>Line one</p><script>var x = 1;</script><p>Line   two</p><style>p{}</style></div>"#;
        assert_eq!(
            extract(html, profile_for("deepseek")).as_deref(),
            Some("Line one\nLine two")
        );
    }

    #[test]
    fn test_nothing_found() {
        assert_eq!(extract("<html><body><p>hi</p></body></html>", profile_for("kimi")), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a   b \n\n  c  "), "a b\nc");
    }
}
