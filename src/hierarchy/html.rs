use std::sync::LazyLock;

use regex::{Captures, Regex};

static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[A-Za-z/!][^<>]*>").unwrap());
static INNER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());
static BREAK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6])>").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9A-Fa-f]{1,6})|([0-9]{1,7}));").unwrap());
static HREF_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(href\s*=\s*["'])https?://[^/"'?#]+([^"']*)"#).unwrap());
static URL_HOST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://[^/?#]+").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Tag-stripping passes before a value counts as unresolvable markup.
pub const MAX_STRIP_PASSES: usize = 10;

/// Shortest path accepted as a link.
const MIN_URL_PATH_LEN: usize = 5;

pub fn has_markup(s: &str) -> bool {
    MARKUP_RE.is_match(s)
}

/// Strips tags, decodes entities and collapses whitespace.
///
/// Returns `None` when markup survives [`MAX_STRIP_PASSES`] passes.
pub fn strip_html(s: &str) -> Option<String> {
    let mut current = BREAK_TAG_RE.replace_all(s, " ").into_owned();
    let mut passes = 0;
    while has_markup(&current) {
        if passes == MAX_STRIP_PASSES {
            return None;
        }
        current = INNER_TAG_RE.replace_all(&current, "").into_owned();
        passes += 1;
    }
    Some(collapse_whitespace(&decode_entities(&current)))
}

/// Strips everything that looks like a tag, however malformed.
pub fn strip_html_lossy(s: &str) -> String {
    let mut current = BREAK_TAG_RE.replace_all(s, " ").into_owned();
    while INNER_TAG_RE.is_match(&current) {
        current = INNER_TAG_RE.replace_all(&current, "").into_owned();
    }
    let without_brackets: String = current.chars().filter(|c| *c != '<' && *c != '>').collect();
    collapse_whitespace(&decode_entities(&without_brackets))
}

pub fn decode_entities(s: &str) -> String {
    let named = s
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let numeric = NUMERIC_ENTITY_RE.replace_all(&named, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });
    // &amp; last so "&amp;lt;" decodes to "&lt;", not "<"
    numeric.replace("&amp;", "&")
}

/// Rewrites `href="https://host/x"` to `href="/x"` in place.
pub fn strip_href_hosts(s: &str) -> String {
    HREF_HOST_RE
        .replace_all(s, |caps: &Captures| {
            let rest = &caps[2];
            if rest.is_empty() {
                format!("{}/", &caps[1])
            } else {
                format!("{}{}", &caps[1], rest)
            }
        })
        .into_owned()
}

/// Rich-text normalization for `text` payloads: hosts stripped from links, entities decoded.
pub fn normalize_text(s: &str) -> Option<String> {
    let cleaned = decode_entities(&strip_href_hosts(s));
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reduces a candidate URL to path + query + fragment, rejecting noise.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let path = if URL_HOST_RE.is_match(raw) {
        let stripped = URL_HOST_RE.replace(raw, "");
        if stripped.is_empty() {
            "/".to_string()
        } else {
            stripped.into_owned()
        }
    } else if raw.starts_with('/') {
        raw.to_string()
    } else {
        return None;
    };
    if path.chars().count() < MIN_URL_PATH_LEN {
        return None;
    }
    Some(path)
}

/// `teaser_copy_2` → `Teaser Copy 2`
pub fn humanize_key(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_simple_markup() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>").as_deref(), Some("Hello world"));
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(strip_html("Plans & Pricing").as_deref(), Some("Plans & Pricing"));
    }

    #[test]
    fn nested_tags_resolve_within_bound() {
        assert_eq!(strip_html("<<b>b>Bold<</b>/b>").as_deref(), Some("Bold"));
    }

    fn nested(levels: usize) -> String {
        (0..levels).fold("x".to_string(), |acc, _| format!("<a{}>", acc))
    }

    #[test]
    fn shallow_nesting_resolves() {
        assert_eq!(strip_html(&nested(3)).as_deref(), Some(""));
    }

    #[test]
    fn pathological_nesting_is_unresolvable() {
        assert!(strip_html(&nested(12)).is_none());
    }

    #[test]
    fn line_breaks_keep_words_apart() {
        assert_eq!(strip_html("Line one<br/>line two").as_deref(), Some("Line one line two"));
    }

    #[test]
    fn lossy_strip_removes_any_depth() {
        let deep = (0..12).fold("<b>".to_string(), |acc, _| format!("<{}b>", acc)) + "Body";
        assert!(strip_html(&deep).is_none());
        assert_eq!(strip_html_lossy(&deep), "Body");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a&amp;b &lt;c&gt; &quot;d&quot; &#39;e&#39;&nbsp;f"), "a&b <c> \"d\" 'e' f");
        assert_eq!(decode_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn href_hosts_stripped() {
        let html = r#"<a href="https://www.example.com/en/plans.html?x=1">Plans</a> <a href='http://example.com'>Home</a>"#;
        assert_eq!(
            strip_href_hosts(html),
            r#"<a href="/en/plans.html?x=1">Plans</a> <a href='/'>Home</a>"#
        );
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("https://www.example.com/en/plans.html#top").as_deref(), Some("/en/plans.html#top"));
        assert_eq!(normalize_url("/content/site/en/page").as_deref(), Some("/content/site/en/page"));
        assert_eq!(normalize_url("mailto:someone@example.com"), None);
        assert_eq!(normalize_url("#"), None);
        assert_eq!(normalize_url("/en"), None);
        assert_eq!(normalize_url("https://example.com"), None);
    }

    #[test]
    fn humanized_keys() {
        assert_eq!(humanize_key("teaser_copy_2"), "Teaser Copy 2");
        assert_eq!(humanize_key("button"), "Button");
    }
}
