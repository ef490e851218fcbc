//! Pulling a video URL out of a free-form chat message.
//!
//! Only the first http(s) URL in the text is used. Trailing sentence
//! punctuation is dropped so `look at https://x.com/v/1.` works as expected.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

/// Matches an http(s) URL up to whitespace, quotes, or angle brackets.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"'\]]+"#).expect("URL regex is valid")
});

/// Returns the first valid http(s) URL in `text`, if any.
///
/// A candidate that fails to parse is skipped and the search continues.
#[must_use]
pub fn extract_url(text: &str) -> Option<String> {
    URL_PATTERN.find_iter(text).find_map(|m| {
        let cleaned = trim_trailing(m.as_str());
        match Url::parse(cleaned) {
            Ok(parsed) if parsed.host().is_some() => Some(cleaned.to_string()),
            Ok(_) | Err(_) => {
                debug!(candidate = %cleaned, "ignoring unparseable URL candidate");
                None
            }
        }
    })
}

fn trim_trailing(url: &str) -> &str {
    let mut result = url;
    while let Some(last) = result.chars().last() {
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' => result = &result[..result.len() - 1],
            ')' => {
                let opens = result.matches('(').count();
                let closes = result.matches(')').count();
                if closes > opens {
                    result = &result[..result.len() - 1];
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    result
}
