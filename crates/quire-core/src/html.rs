//! HTML helpers consumed by renderers and templates.
//!
//! These are the small string utilities the pipeline leans on when it embeds
//! rendered text into metadata: stripping markup, escaping entities, building
//! sanitized `<meta>` tags and pulling the first paragraph or image out of a
//! rendered fragment.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));

static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("valid paragraph pattern")
});

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\s[^>]*?src\s*=\s*["']([^"']+)["']"#).expect("valid image pattern")
});

static H1_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h1(?:\s[^>]*)?>(.*?)</h1\s*>").expect("valid heading pattern")
});

/// Escape HTML special characters.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Remove every tag, leaving the text content.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Strip markup and escape entities so the text is safe inside an attribute.
///
/// Entities already present in the input are decoded first so they are not
/// escaped twice.
#[must_use]
pub fn clean_html(text: &str) -> String {
    let stripped = strip_tags(text);
    escape_html(decode_basic_entities(&stripped).trim())
}

/// Build a sanitized `<meta name=… content=…>` tag.
#[must_use]
pub fn meta(name: &str, content: &str) -> String {
    format!(
        r#"<meta name="{}" content="{}">"#,
        clean_html(name),
        clean_html(content)
    )
}

/// Build a sanitized Open Graph `<meta property="og:…">` tag.
#[must_use]
pub fn og(property: &str, content: &str) -> String {
    format!(
        r#"<meta property="og:{}" content="{}">"#,
        clean_html(property),
        clean_html(content)
    )
}

/// Inner HTML of the first `<p>` element.
#[must_use]
pub fn first_paragraph(html: &str) -> Option<String> {
    PARAGRAPH_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `src` of the first `<img>` element.
#[must_use]
pub fn first_image(html: &str) -> Option<String> {
    IMAGE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Text of the first `<h1>` element, tags removed.
#[must_use]
pub fn first_heading(html: &str) -> Option<String> {
    H1_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_basic_entities(strip_tags(m.as_str()).trim()))
        .filter(|s| !s.is_empty())
}

/// Count words in the text content of an HTML fragment.
#[must_use]
pub fn word_count(html: &str) -> usize {
    strip_tags(html).split_whitespace().count()
}

fn decode_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
