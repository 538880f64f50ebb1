//! URL extraction from message text.

use std::sync::LazyLock;

use regex::Regex;

/// First http(s) URL in free text. Trailing punctuation and brackets are not
/// part of the match.
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"']*[^"'\s.,!?()\[\]{}]"#).expect("valid regex")
});

/// Return the first http(s) URL in `text` that parses with a host.
pub fn first_url(text: &str) -> Option<String> {
    let candidate = URL_REGEX.find(text)?.as_str();
    let parsed = reqwest::Url::parse(candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_surrounded_by_words() {
        assert_eq!(
            first_url("check this out https://example.com/page.html thanks").as_deref(),
            Some("https://example.com/page.html")
        );
    }

    #[test]
    fn test_trailing_punctuation_trimmed() {
        assert_eq!(
            first_url("see https://example.com/a.").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            first_url("wow https://example.com/a?!").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            first_url("(https://example.com/a)").as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn test_quotes_end_the_url() {
        assert_eq!(
            first_url(r#"<a href="https://example.com/x">"#).as_deref(),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn test_first_of_many() {
        assert_eq!(
            first_url("http://one.test/1 and https://two.test/2").as_deref(),
            Some("http://one.test/1")
        );
    }

    #[test]
    fn test_no_url() {
        assert_eq!(first_url("no links here"), None);
        assert_eq!(first_url("ftp://example.com/file"), None);
        assert_eq!(first_url(""), None);
    }
}
