//! Locale-aware formatting for templates.
//!
//! Three kinds of formatter are supported:
//!
//! - [`MessageFormat`]: ICU-style messages with `{arg}`, `{arg, number}`,
//!   `{arg, date, short}`, `{arg, plural, one {# item} other {# items}}` and
//!   `{arg, select, a {…} other {…}}`.
//! - [`DateFormat`]: strftime patterns rendered with the locale's month and
//!   weekday names.
//! - [`NumberFormat`]: digit grouping and decimal separator per locale.
//!
//! Compiling a format is the expensive part, so compiled formatters are kept
//! in a [`FormatterCache`] keyed by `(format, locale)`. One cache is built at
//! startup and shared by reference with every template render.

use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime,
    format::{Item, StrftimeItems},
};
use serde_json::Value;
use thiserror::Error;

/// Formatting errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The message pattern could not be compiled.
    #[error("invalid message format `{format}`: {message}")]
    InvalidMessage { format: String, message: String },

    /// The strftime pattern contains an unknown specifier.
    #[error("invalid date pattern: {0}")]
    InvalidDatePattern(String),

    /// A value could not be read as a date.
    #[error("not a date: {0}")]
    InvalidDate(String),

    /// A value could not be read as a number.
    #[error("not a number: {0}")]
    InvalidNumber(String),

    /// A message argument was not provided.
    #[error("missing message argument: {0}")]
    MissingArgument(String),
}

/// Result type for formatting operations.
pub type Result<T> = std::result::Result<T, FormatError>;

type CacheKey = (String, String);

/// Process-scoped memo of compiled formatters.
#[derive(Debug, Default)]
pub struct FormatterCache {
    messages: Mutex<HashMap<CacheKey, Arc<MessageFormat>>>,
    dates: Mutex<HashMap<CacheKey, Arc<DateFormat>>>,
}

impl FormatterCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled message formatter for `(format, locale)`.
    pub fn message(&self, format: &str, locale: &str) -> Result<Arc<MessageFormat>> {
        let key = (format.to_string(), locale.to_string());
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = messages.get(&key) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(MessageFormat::compile(format, locale)?);
        messages.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Compiled date formatter for `(pattern, locale)`.
    pub fn date(&self, pattern: &str, locale: &str) -> Result<Arc<DateFormat>> {
        let key = (pattern.to_string(), locale.to_string());
        let mut dates = self.dates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = dates.get(&key) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(DateFormat::compile(pattern, locale)?);
        dates.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Number formatter for `locale`. These are tiny and not cached.
    #[must_use]
    pub fn number(&self, locale: &str) -> NumberFormat {
        NumberFormat::for_locale(locale)
    }

    /// Number of compiled formatters held.
    #[must_use]
    pub fn len(&self) -> usize {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let dates = self.dates.lock().unwrap_or_else(PoisonError::into_inner);
        messages.len() + dates.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Language subtag of a locale tag: `de-AT` → `de`.
fn language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ============================================================================
// Numbers
// ============================================================================

/// Digit grouping and decimal separator for a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    group: &'static str,
    decimal: char,
}

impl NumberFormat {
    /// Separators for a locale tag such as `en-US` or `de`.
    #[must_use]
    pub fn for_locale(locale: &str) -> Self {
        let (group, decimal) = match language(locale).as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "id" | "tr" | "da" | "el" => (".", ','),
            "fr" | "ru" | "uk" | "pl" | "cs" | "sv" | "fi" | "nb" | "no" | "sk" => ("\u{a0}", ','),
            _ => (",", '.'),
        };
        Self { group, decimal }
    }

    /// Format with at most three fraction digits, trailing zeros removed.
    #[must_use]
    pub fn format(&self, n: f64) -> String {
        if !n.is_finite() {
            return n.to_string();
        }

        let fixed = format!("{:.3}", n.abs());
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let frac_part = frac_part.trim_end_matches('0');

        let mut out = String::new();
        if n < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
            out.push('-');
        }

        let digits = int_part.len();
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (digits - i) % 3 == 0 {
                out.push_str(self.group);
            }
            out.push(c);
        }

        if !frac_part.is_empty() {
            out.push(self.decimal);
            out.push_str(frac_part);
        }
        out
    }

    /// Format a metadata value, accepting numbers and numeric strings.
    pub fn format_value(&self, value: &Value) -> Result<String> {
        as_number(value)
            .map(|n| self.format(n))
            .ok_or_else(|| FormatError::InvalidNumber(display_value(value)))
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Dates
// ============================================================================

/// A validated strftime pattern bound to a locale.
#[derive(Debug, Clone)]
pub struct DateFormat {
    pattern: String,
    locale: chrono::Locale,
}

impl DateFormat {
    /// Validate `pattern` and resolve `locale`.
    pub fn compile(pattern: &str, locale: &str) -> Result<Self> {
        let pattern = match pattern {
            "short" => "%x",
            "medium" => "%d %b %Y",
            "long" => "%d %B %Y",
            other => other,
        };

        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(FormatError::InvalidDatePattern(pattern.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            locale: chrono_locale(locale),
        })
    }

    /// Format a date value (RFC 3339, `YYYY-MM-DD[ HH:MM:SS]` or a Unix
    /// timestamp in seconds).
    pub fn format_value(&self, value: &Value) -> Result<String> {
        let date = parse_date(value).ok_or_else(|| FormatError::InvalidDate(display_value(value)))?;
        let mut out = String::new();
        write!(out, "{}", date.format_localized(&self.pattern, self.locale))
            .map_err(|_| FormatError::InvalidDatePattern(self.pattern.clone()))?;
        Ok(out)
    }
}

/// Map a BCP 47 style tag onto chrono's locale tables.
fn chrono_locale(tag: &str) -> chrono::Locale {
    let normalized = tag.replace('-', "_");
    if let Ok(locale) = chrono::Locale::try_from(normalized.as_str()) {
        return locale;
    }

    let lang = language(tag);
    let guess = format!("{lang}_{}", lang.to_ascii_uppercase());
    chrono::Locale::try_from(guess.as_str()).unwrap_or(chrono::Locale::POSIX)
}

fn parse_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Number(n) => {
            DateTime::from_timestamp(n.as_i64()?, 0).map(|dt| dt.fixed_offset())
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt);
            }
            for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
                    return Some(naive.and_utc().fixed_offset());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc().fixed_offset())
        }
        _ => None,
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A compiled ICU-style message.
#[derive(Debug, Clone)]
pub struct MessageFormat {
    parts: Vec<Part>,
    locale: String,
    numbers: NumberFormat,
}

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Arg(String),
    Number(String),
    Date { name: String, format: DateFormat },
    Plural { name: String, arms: Vec<(Selector, Vec<Part>)> },
    Select { name: String, arms: Vec<(Selector, Vec<Part>)> },
    Hash,
}

#[derive(Debug, Clone)]
enum Selector {
    Exact(f64),
    Key(String),
}

impl MessageFormat {
    /// Compile a message pattern for a locale.
    pub fn compile(format: &str, locale: &str) -> Result<Self> {
        let mut parser = MessageParser {
            chars: format.chars().collect(),
            pos: 0,
            source: format,
            locale,
        };
        let parts = parser.parse_parts(false)?;
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unbalanced `}`"));
        }
        Ok(Self {
            parts,
            locale: locale.to_string(),
            numbers: NumberFormat::for_locale(locale),
        })
    }

    /// Format the message, resolving arguments through `lookup`.
    pub fn format(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<String> {
        let mut out = String::new();
        self.write_parts(&self.parts, lookup, None, &mut out)?;
        Ok(out)
    }

    fn write_parts(
        &self,
        parts: &[Part],
        lookup: &dyn Fn(&str) -> Option<Value>,
        plural_value: Option<f64>,
        out: &mut String,
    ) -> Result<()> {
        for part in parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Hash => match plural_value {
                    Some(n) => out.push_str(&self.numbers.format(n)),
                    None => out.push('#'),
                },
                Part::Arg(name) => {
                    let value = argument(lookup, name)?;
                    match value {
                        Value::Number(_) => out.push_str(&self.numbers.format_value(&value)?),
                        other => out.push_str(&display_value(&other)),
                    }
                }
                Part::Number(name) => {
                    out.push_str(&self.numbers.format_value(&argument(lookup, name)?)?);
                }
                Part::Date { name, format } => {
                    out.push_str(&format.format_value(&argument(lookup, name)?)?);
                }
                Part::Plural { name, arms } => {
                    let value = argument(lookup, name)?;
                    let n = as_number(&value)
                        .ok_or_else(|| FormatError::InvalidNumber(display_value(&value)))?;
                    let category = plural_category(&self.locale, n);
                    let arm = arms
                        .iter()
                        .find(|(sel, _)| matches!(sel, Selector::Exact(x) if *x == n))
                        .or_else(|| {
                            arms.iter()
                                .find(|(sel, _)| matches!(sel, Selector::Key(k) if k == category))
                        })
                        .or_else(|| {
                            arms.iter()
                                .find(|(sel, _)| matches!(sel, Selector::Key(k) if k == "other"))
                        });
                    if let Some((_, body)) = arm {
                        self.write_parts(body, lookup, Some(n), out)?;
                    }
                }
                Part::Select { name, arms } => {
                    let key = display_value(&argument(lookup, name)?);
                    let arm = arms
                        .iter()
                        .find(|(sel, _)| matches!(sel, Selector::Key(k) if *k == key))
                        .or_else(|| {
                            arms.iter()
                                .find(|(sel, _)| matches!(sel, Selector::Key(k) if k == "other"))
                        });
                    if let Some((_, body)) = arm {
                        self.write_parts(body, lookup, plural_value, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn argument(lookup: &dyn Fn(&str) -> Option<Value>, name: &str) -> Result<Value> {
    lookup(name).ok_or_else(|| FormatError::MissingArgument(name.to_string()))
}

/// CLDR plural category for an integer-valued count in a few common languages.
fn plural_category(locale: &str, n: f64) -> &'static str {
    let lang = language(locale);
    if n.fract() != 0.0 || n < 0.0 {
        return "other";
    }
    let i = n as u64;

    match lang.as_str() {
        "ja" | "zh" | "ko" | "th" | "vi" | "id" | "ms" => "other",
        "fr" | "pt" => {
            if i < 2 {
                "one"
            } else {
                "other"
            }
        }
        "ru" | "uk" => {
            if i % 10 == 1 && i % 100 != 11 {
                "one"
            } else if (2..=4).contains(&(i % 10)) && !(12..=14).contains(&(i % 100)) {
                "few"
            } else {
                "many"
            }
        }
        "pl" => {
            if i == 1 {
                "one"
            } else if (2..=4).contains(&(i % 10)) && !(12..=14).contains(&(i % 100)) {
                "few"
            } else {
                "many"
            }
        }
        _ => {
            if i == 1 {
                "one"
            } else {
                "other"
            }
        }
    }
}

struct MessageParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
    locale: &'a str,
}

impl MessageParser<'_> {
    fn error(&self, message: impl Into<String>) -> FormatError {
        FormatError::InvalidMessage {
            format: self.source.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Parse until end of input, or until an unmatched `}` when `nested`.
    fn parse_parts(&mut self, nested: bool) -> Result<Vec<Part>> {
        let mut parts = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    if !text.is_empty() {
                        parts.push(Part::Text(std::mem::take(&mut text)));
                    }
                    self.pos += 1;
                    parts.push(self.parse_argument()?);
                }
                '}' => break,
                '#' if nested => {
                    if !text.is_empty() {
                        parts.push(Part::Text(std::mem::take(&mut text)));
                    }
                    self.pos += 1;
                    parts.push(Part::Hash);
                }
                '\'' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\'') => {
                            text.push('\'');
                            self.pos += 1;
                        }
                        Some('{' | '}' | '#') => {
                            while let Some(q) = self.peek() {
                                self.pos += 1;
                                if q == '\'' {
                                    break;
                                }
                                text.push(q);
                            }
                        }
                        _ => text.push('\''),
                    }
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        Ok(parts)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, ',' | '{' | '}'))
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn expect(&mut self, wanted: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(wanted) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{wanted}` at offset {}", self.pos)))
        }
    }

    /// Parse after an opening `{` through its closing `}`.
    fn parse_argument(&mut self) -> Result<Part> {
        let name = self.word();
        if name.is_empty() {
            return Err(self.error("empty argument name"));
        }

        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Part::Arg(name));
        }
        self.expect(',')?;

        let kind = self.word();
        self.skip_ws();
        let part = match kind.as_str() {
            "number" => {
                if self.peek() == Some(',') {
                    self.pos += 1;
                    self.word();
                }
                Part::Number(name)
            }
            "date" | "time" => {
                let style = if self.peek() == Some(',') {
                    self.pos += 1;
                    self.raw_until_close()
                } else {
                    "short".to_string()
                };
                Part::Date {
                    name,
                    format: DateFormat::compile(style.trim(), self.locale)?,
                }
            }
            "plural" => {
                self.expect(',')?;
                Part::Plural {
                    name,
                    arms: self.parse_arms(true)?,
                }
            }
            "select" => {
                self.expect(',')?;
                Part::Select {
                    name,
                    arms: self.parse_arms(false)?,
                }
            }
            other => return Err(self.error(format!("unknown argument type `{other}`"))),
        };

        self.expect('}')?;
        Ok(part)
    }

    fn raw_until_close(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '}') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_arms(&mut self, plural: bool) -> Result<Vec<(Selector, Vec<Part>)>> {
        let mut arms = Vec::new();
        loop {
            self.skip_ws();
            if matches!(self.peek(), Some('}') | None) {
                break;
            }

            let key = self.word();
            let selector = if plural && let Some(exact) = key.strip_prefix('=') {
                let value = exact
                    .parse()
                    .map_err(|_| self.error(format!("bad exact selector `{key}`")))?;
                Selector::Exact(value)
            } else {
                Selector::Key(key)
            };

            self.expect('{')?;
            let body = self.parse_parts(true)?;
            self.expect('}')?;
            arms.push((selector, body));
        }

        if !arms
            .iter()
            .any(|(sel, _)| matches!(sel, Selector::Key(k) if k == "other"))
        {
            return Err(self.error("missing `other` branch"));
        }
        Ok(arms)
    }
}

/// Plain-text rendering of a metadata value.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> impl Fn(&str) -> Option<Value> {
        move |name| value.get(name).cloned()
    }

    #[test]
    fn test_number_grouping_per_locale() {
        assert_eq!(NumberFormat::for_locale("en-US").format(1234567.5), "1,234,567.5");
        assert_eq!(NumberFormat::for_locale("de-DE").format(1234.25), "1.234,25");
        assert_eq!(NumberFormat::for_locale("fr").format(1234.0), "1\u{a0}234");
        assert_eq!(NumberFormat::for_locale("en").format(-12.0), "-12");
        assert_eq!(NumberFormat::for_locale("en").format(0.1234), "0.123");
        assert_eq!(NumberFormat::for_locale("en").format(999.0), "999");
    }

    #[test]
    fn test_plural_message() {
        let fmt = MessageFormat::compile(
            "{count, plural, =0 {no posts} one {# post} other {# posts}}",
            "en-US",
        )
        .expect("compile");

        assert_eq!(fmt.format(&args(json!({"count": 0}))).unwrap(), "no posts");
        assert_eq!(fmt.format(&args(json!({"count": 1}))).unwrap(), "1 post");
        assert_eq!(fmt.format(&args(json!({"count": 1200}))).unwrap(), "1,200 posts");
    }

    #[test]
    fn test_plural_categories_follow_language() {
        let fmt = MessageFormat::compile(
            "{n, plural, one {# fichier} other {# fichiers}}",
            "fr-FR",
        )
        .expect("compile");
        assert_eq!(fmt.format(&args(json!({"n": 0}))).unwrap(), "0 fichier");

        let ru = MessageFormat::compile(
            "{n, plural, one {# файл} few {# файла} many {# файлов} other {# файла}}",
            "ru",
        )
        .expect("compile");
        assert_eq!(ru.format(&args(json!({"n": 21}))).unwrap(), "21 файл");
        assert_eq!(ru.format(&args(json!({"n": 3}))).unwrap(), "3 файла");
        assert_eq!(ru.format(&args(json!({"n": 11}))).unwrap(), "11 файлов");
    }

    #[test]
    fn test_select_and_plain_args() {
        let fmt = MessageFormat::compile(
            "{name} updated {gender, select, female {her} male {his} other {their}} profile",
            "en",
        )
        .expect("compile");
        let out = fmt
            .format(&args(json!({"name": "Sam", "gender": "other"})))
            .unwrap();
        assert_eq!(out, "Sam updated their profile");
    }

    #[test]
    fn test_quoted_braces() {
        let fmt =
            MessageFormat::compile("Use '{name}' literally, it''s fine", "en").expect("compile");
        assert_eq!(
            fmt.format(&args(json!({}))).unwrap(),
            "Use {name} literally, it's fine"
        );
    }

    #[test]
    fn test_invalid_messages() {
        assert!(MessageFormat::compile("{count, plural, one {x}}", "en").is_err());
        assert!(MessageFormat::compile("{count, bogus}", "en").is_err());
        assert!(MessageFormat::compile("{unclosed", "en").is_err());
        assert!(MessageFormat::compile("stray }", "en").is_err());
    }

    #[test]
    fn test_missing_argument() {
        let fmt = MessageFormat::compile("Hi {name}", "en").expect("compile");
        assert!(matches!(
            fmt.format(&args(json!({}))),
            Err(FormatError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_date_format_localized() {
        let en = DateFormat::compile("%d %B %Y", "en-US").expect("compile");
        assert_eq!(en.format_value(&json!("2024-03-05")).unwrap(), "05 March 2024");

        let de = DateFormat::compile("%d %B %Y", "de-DE").expect("compile");
        assert_eq!(de.format_value(&json!("2024-03-05T10:00:00Z")).unwrap(), "05 März 2024");
    }

    #[test]
    fn test_date_format_rejects_bad_input() {
        assert!(DateFormat::compile("%Q", "en").is_err());
        let fmt = DateFormat::compile("%Y", "en").expect("compile");
        assert!(fmt.format_value(&json!("yesterday")).is_err());
        assert_eq!(fmt.format_value(&json!(0)).unwrap(), "1970");
    }

    #[test]
    fn test_message_with_date_argument() {
        let fmt = MessageFormat::compile("Posted {when, date, %Y-%m-%d}", "en").expect("compile");
        let out = fmt.format(&args(json!({"when": "2024-01-02 08:30:00"}))).unwrap();
        assert_eq!(out, "Posted 2024-01-02");
    }

    #[test]
    fn test_cache_reuses_compiled_formats() {
        let cache = FormatterCache::new();
        let a = cache.message("{n} items", "en").expect("compile");
        let b = cache.message("{n} items", "en").expect("compile");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        cache.message("{n} items", "de").expect("compile");
        cache.date("%Y", "en").expect("compile");
        assert_eq!(cache.len(), 3);
    }
}
