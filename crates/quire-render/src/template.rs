//! Template renderer.
//!
//! A small expression language rather than a full template engine:
//!
//! - `{{ title }}`, `{{ page.author.name }}`: value lookup (dotted paths,
//!   numeric segments index into lists). A missing value is an error.
//! - `{{ subtitle? }}`: optional lookup, renders nothing when missing.
//! - `{{ date | date: "%B %d, %Y" }}`: filters, applied left to right.
//! - `{{#each items}}…{{/each}}`: iterate a list (item fields visible
//!   directly, plus `this` and `index`) or a mapping (`key` and `this`).
//! - `{{#if next_path}}…{{else}}…{{/if}}`: truthiness test.
//! - `{{! comment }}`: dropped.
//!
//! Values are inserted verbatim; use the `escape` or `clean` filters when
//! embedding untrusted text.

use std::{borrow::Cow, sync::Arc};

use quire_core::{Metadata, html};
use serde_json::Value;
use thiserror::Error;

use crate::{
    format::{FormatError, FormatterCache, display_value},
    registry::Renderer,
};

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable: {0}")]
    MissingVariable(String),

    /// Invalid template syntax.
    #[error("invalid template syntax: {0}")]
    InvalidSyntax(String),

    /// Filter name not recognised.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// `#each` over something that is not a list or mapping.
    #[error("cannot iterate over `{0}`")]
    NotIterable(String),

    /// Locale formatting failed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

const FILTERS: &[&str] = &[
    "escape", "clean", "upper", "lower", "json", "number", "date", "message", "meta", "og",
    "default",
];

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Expr(Expr),
    Each {
        path: String,
        body: Vec<Node>,
    },
    If {
        path: String,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct Expr {
    head: Operand,
    optional: bool,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
struct Filter {
    name: String,
    arg: Option<Operand>,
}

#[derive(Debug, Clone)]
enum Operand {
    Literal(String),
    Path(String),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            nodes: parse_nodes(source)?,
        })
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against `context`, formatting through `formatters`.
    pub fn render(
        &self,
        context: &Metadata,
        formatters: &FormatterCache,
        default_locale: &str,
    ) -> Result<String> {
        let locale = context
            .get("locale")
            .and_then(Value::as_str)
            .unwrap_or(default_locale)
            .to_string();
        let env = Env { formatters, locale };
        let mut scope = Scope {
            frames: vec![Cow::Borrowed(context)],
        };
        let mut out = String::new();
        env.render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }
}

/// Renderer capability that expands template bodies.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    formatters: Arc<FormatterCache>,
    default_locale: String,
}

impl TemplateRenderer {
    /// Create a template renderer sharing `formatters`.
    #[must_use]
    pub fn new(formatters: Arc<FormatterCache>, default_locale: impl Into<String>) -> Self {
        Self {
            formatters,
            default_locale: default_locale.into(),
        }
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, body: &str, context: &Metadata) -> crate::Result<String> {
        let template = Template::parse("inline", body)?;
        Ok(template.render(context, &self.formatters, &self.default_locale)?)
    }
}

// ============================================================================
// Parsing
// ============================================================================

enum BlockKind {
    Each,
    If,
}

struct OpenBlock {
    kind: BlockKind,
    path: String,
    then_nodes: Vec<Node>,
    else_nodes: Option<Vec<Node>>,
}

struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<OpenBlock>,
}

impl TreeBuilder {
    fn target(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(top) => match &mut top.else_nodes {
                Some(nodes) => nodes,
                None => &mut top.then_nodes,
            },
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        self.target().push(node);
    }

    fn close(&mut self, closing: &str) -> Result<()> {
        let block = self
            .stack
            .pop()
            .ok_or_else(|| TemplateError::InvalidSyntax(format!("unexpected {{{{/{closing}}}}}")))?;

        let node = match (block.kind, closing) {
            (BlockKind::Each, "each") => Node::Each {
                path: block.path,
                body: block.then_nodes,
            },
            (BlockKind::If, "if") => Node::If {
                path: block.path,
                then_branch: block.then_nodes,
                else_branch: block.else_nodes.unwrap_or_default(),
            },
            _ => {
                return Err(TemplateError::InvalidSyntax(format!(
                    "{{{{/{closing}}}}} does not close `{}`",
                    block.path
                )));
            }
        };
        self.push(node);
        Ok(())
    }
}

fn parse_nodes(source: &str) -> Result<Vec<Node>> {
    let mut builder = TreeBuilder {
        root: Vec::new(),
        stack: Vec::new(),
    };
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            builder.push(Node::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = if after.trim_start().starts_with('!') {
            after.find("}}")
        } else {
            find_tag_end(after)
        }
        .ok_or_else(|| TemplateError::InvalidSyntax("unclosed {{ delimiter".to_string()))?;
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if tag.starts_with('!') {
            continue;
        }

        if let Some(path) = tag.strip_prefix("#each") {
            builder.stack.push(OpenBlock {
                kind: BlockKind::Each,
                path: block_path(path, "each")?,
                then_nodes: Vec::new(),
                else_nodes: None,
            });
        } else if let Some(path) = tag.strip_prefix("#if") {
            builder.stack.push(OpenBlock {
                kind: BlockKind::If,
                path: block_path(path, "if")?,
                then_nodes: Vec::new(),
                else_nodes: None,
            });
        } else if tag == "else" {
            match builder.stack.last_mut() {
                Some(top) if matches!(top.kind, BlockKind::If) && top.else_nodes.is_none() => {
                    top.else_nodes = Some(Vec::new());
                }
                _ => {
                    return Err(TemplateError::InvalidSyntax(
                        "{{else}} outside of {{#if}}".to_string(),
                    ));
                }
            }
        } else if let Some(closing) = tag.strip_prefix('/') {
            builder.close(closing.trim())?;
        } else {
            builder.push(Node::Expr(parse_expr(tag)?));
        }
    }

    if !rest.is_empty() {
        builder.push(Node::Text(rest.to_string()));
    }

    if let Some(open) = builder.stack.last() {
        return Err(TemplateError::InvalidSyntax(format!(
            "unclosed block `{}`",
            open.path
        )));
    }
    Ok(builder.root)
}

/// Byte offset of the closing `}}`, skipping quoted filter arguments.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '}' && chars.peek().is_some_and(|&(_, next)| next == '}') => {
                return Some(i);
            }
            None => {}
        }
    }
    None
}

fn block_path(raw: &str, kind: &str) -> Result<String> {
    let path = raw.trim();
    if path.is_empty() || !raw.starts_with(char::is_whitespace) {
        return Err(TemplateError::InvalidSyntax(format!(
            "{{{{#{kind}}}}} needs a variable"
        )));
    }
    Ok(path.to_string())
}

fn parse_expr(tag: &str) -> Result<Expr> {
    let mut segments = split_outside_quotes(tag, '|').into_iter();
    let head = segments.next().unwrap_or_default();
    let head = head.trim();
    if head.is_empty() {
        return Err(TemplateError::InvalidSyntax("empty expression".to_string()));
    }

    let (head, optional) = match head.strip_suffix('?') {
        Some(stripped) => (stripped.trim_end(), true),
        None => (head, false),
    };

    let mut filters = Vec::new();
    for segment in segments {
        let (name, arg) = match segment.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(parse_operand(arg.trim())?)),
            None => (segment.trim(), None),
        };
        if !FILTERS.contains(&name) {
            return Err(TemplateError::UnknownFilter(name.to_string()));
        }
        filters.push(Filter {
            name: name.to_string(),
            arg,
        });
    }

    Ok(Expr {
        head: parse_operand(head)?,
        optional,
        filters,
    })
}

fn parse_operand(raw: &str) -> Result<Operand> {
    let quote = raw.chars().next();
    if let Some(q @ ('"' | '\'')) = quote {
        let inner = raw
            .strip_prefix(q)
            .and_then(|s| s.strip_suffix(q))
            .ok_or_else(|| TemplateError::InvalidSyntax(format!("unterminated string {raw}")))?;
        return Ok(Operand::Literal(
            inner.replace(&format!("\\{q}"), &q.to_string()),
        ));
    }
    if raw.is_empty() {
        return Err(TemplateError::InvalidSyntax("missing filter argument".to_string()));
    }
    if raw.parse::<f64>().is_ok() {
        return Ok(Operand::Literal(raw.to_string()));
    }
    Ok(Operand::Path(raw.to_string()))
}

/// Split on `sep` where it does not appear inside a quoted string.
fn split_outside_quotes(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in s.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == sep => parts.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }
    parts.push(current);
    parts
}

// ============================================================================
// Rendering
// ============================================================================

struct Scope<'a> {
    frames: Vec<Cow<'a, Metadata>>,
}

impl Scope<'_> {
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = self.frames.iter().rev().find_map(|f| f.get(first))?;

        for segment in segments {
            value = match value {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }
}

struct Env<'a> {
    formatters: &'a FormatterCache,
    locale: String,
}

impl Env<'_> {
    fn render_nodes(&self, nodes: &[Node], scope: &mut Scope<'_>, out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expr(expr) => {
                    if let Some(value) = self.eval(expr, scope)? {
                        out.push_str(&display_value(&value));
                    }
                }
                Node::If {
                    path,
                    then_branch,
                    else_branch,
                } => {
                    let branch = if scope.lookup(path).is_some_and(truthy) {
                        then_branch
                    } else {
                        else_branch
                    };
                    self.render_nodes(branch, scope, out)?;
                }
                Node::Each { path, body } => {
                    let Some(collection) = scope.lookup(path).cloned() else {
                        continue;
                    };
                    let frames: Vec<Metadata> = match collection {
                        Value::Null => Vec::new(),
                        Value::Array(items) => items
                            .into_iter()
                            .enumerate()
                            .map(|(index, item)| item_frame(item, Some(index), None))
                            .collect(),
                        Value::Object(map) => map
                            .into_iter()
                            .map(|(key, item)| item_frame(item, None, Some(key)))
                            .collect(),
                        _ => return Err(TemplateError::NotIterable(path.clone())),
                    };

                    for frame in frames {
                        scope.frames.push(Cow::Owned(frame));
                        let result = self.render_nodes(body, scope, out);
                        scope.frames.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Option<Value>> {
        let mut value = match &expr.head {
            Operand::Literal(s) => Some(Value::String(s.clone())),
            Operand::Path(path) => {
                let found = scope.lookup(path).cloned();
                let has_default = expr.filters.iter().any(|f| f.name == "default");
                if found.is_none() && !expr.optional && !has_default {
                    return Err(TemplateError::MissingVariable(path.clone()));
                }
                found
            }
        };

        for filter in &expr.filters {
            value = self.apply(filter, value, scope)?;
        }
        Ok(value)
    }

    fn operand(&self, operand: Option<&Operand>, scope: &Scope<'_>) -> Option<String> {
        match operand? {
            Operand::Literal(s) => Some(s.clone()),
            Operand::Path(p) => scope.lookup(p).map(display_value),
        }
    }

    fn apply(
        &self,
        filter: &Filter,
        value: Option<Value>,
        scope: &Scope<'_>,
    ) -> Result<Option<Value>> {
        let arg = self.operand(filter.arg.as_ref(), scope);

        if filter.name == "default" {
            return Ok(match value {
                Some(v) if truthy(&v) => Some(v),
                _ => arg.map(Value::String),
            });
        }

        let Some(value) = value else {
            return Ok(None);
        };
        let text = || display_value(&value);

        let result = match filter.name.as_str() {
            "escape" => html::escape_html(&text()),
            "clean" => html::clean_html(&text()),
            "upper" => text().to_uppercase(),
            "lower" => text().to_lowercase(),
            "json" => value.to_string(),
            "number" => self.formatters.number(&self.locale).format_value(&value)?,
            "date" => {
                let pattern = arg.as_deref().unwrap_or("short");
                self.formatters
                    .date(pattern, &self.locale)?
                    .format_value(&value)?
            }
            "message" => {
                let pattern = arg.ok_or_else(|| {
                    TemplateError::InvalidSyntax("message filter needs a pattern".to_string())
                })?;
                let message = self.formatters.message(&pattern, &self.locale)?;
                let lookup = |name: &str| {
                    if name == "value" {
                        Some(value.clone())
                    } else {
                        scope.lookup(name).cloned()
                    }
                };
                message.format(&lookup)?
            }
            "meta" => html::meta(arg.as_deref().unwrap_or("description"), &text()),
            "og" => html::og(arg.as_deref().unwrap_or("title"), &text()),
            other => return Err(TemplateError::UnknownFilter(other.to_string())),
        };
        Ok(Some(Value::String(result)))
    }
}

fn item_frame(item: Value, index: Option<usize>, key: Option<String>) -> Metadata {
    let mut frame = match &item {
        Value::Object(map) => map.clone(),
        _ => Metadata::new(),
    };
    if let Some(index) = index {
        frame.insert("index".to_string(), Value::from(index));
    }
    if let Some(key) = key {
        frame.insert("key".to_string(), Value::String(key));
    }
    frame.insert("this".to_string(), item);
    frame
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx(value: Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    fn render(source: &str, context: Value) -> Result<String> {
        let cache = FormatterCache::new();
        Template::parse("test", source)?.render(&ctx(context), &cache, "en-US")
    }

    #[test]
    fn test_simple_interpolation() {
        let out = render("Hello, {{ name }}!", json!({"name": "World"})).unwrap();
        assert_eq!(out, "Hello, World!");
    }

    #[test]
    fn test_tight_braces() {
        let out = render(
            "<h1>{{title}}</h1>{{content}}",
            json!({"title": "Hi", "content": "<p>x</p>"}),
        )
        .unwrap();
        assert_eq!(out, "<h1>Hi</h1><p>x</p>");
    }

    #[test]
    fn test_missing_variable() {
        let result = render("Hello, {{ name }}!", json!({}));
        assert!(matches!(result, Err(TemplateError::MissingVariable(ref v)) if v == "name"));
    }

    #[test]
    fn test_optional_variable() {
        let out = render("Hello{{ suffix? }}!", json!({})).unwrap();
        assert_eq!(out, "Hello!");
    }

    #[test]
    fn test_dotted_paths_and_indexes() {
        let out = render(
            "{{ author.name }} / {{ tags.1 }}",
            json!({"author": {"name": "Ada"}, "tags": ["a", "b"]}),
        )
        .unwrap();
        assert_eq!(out, "Ada / b");
    }

    #[test]
    fn test_values_are_not_escaped_by_default() {
        let out = render("{{ v }}|{{ v | escape }}", json!({"v": "<b>&</b>"})).unwrap();
        assert_eq!(out, "<b>&</b>|&lt;b&gt;&amp;&lt;/b&gt;");
    }

    #[test]
    fn test_each_over_list() {
        let out = render(
            "{{#each items}}[{{ index }}:{{ title }}]{{/each}}",
            json!({"items": [{"title": "a"}, {"title": "b"}]}),
        )
        .unwrap();
        assert_eq!(out, "[0:a][1:b]");
    }

    #[test]
    fn test_each_over_scalars_uses_this() {
        let out =
            render("{{#each tags}}#{{ this }} {{/each}}", json!({"tags": ["x", "y"]})).unwrap();
        assert_eq!(out, "#x #y ");
    }

    #[test]
    fn test_each_sees_outer_scope() {
        let out = render(
            "{{#each items}}{{ site }}/{{ slug }};{{/each}}",
            json!({"site": "s", "items": [{"slug": "one"}]}),
        )
        .unwrap();
        assert_eq!(out, "s/one;");
    }

    #[test]
    fn test_each_over_scalar_is_an_error() {
        let result = render("{{#each n}}x{{/each}}", json!({"n": 3}));
        assert!(matches!(result, Err(TemplateError::NotIterable(_))));
    }

    #[test]
    fn test_if_else() {
        let tpl = "{{#if next}}<a href=\"{{ next }}\">next</a>{{else}}end{{/if}}";
        assert_eq!(render(tpl, json!({"next": "/p/2/"})).unwrap(), "<a href=\"/p/2/\">next</a>");
        assert_eq!(render(tpl, json!({})).unwrap(), "end");
        assert_eq!(render(tpl, json!({"next": ""})).unwrap(), "end");
    }

    #[test]
    fn test_nested_blocks() {
        let out = render(
            "{{#each posts}}{{#if draft}}D{{else}}{{ t }}{{/if}}{{/each}}",
            json!({"posts": [{"t": "a", "draft": false}, {"t": "b", "draft": true}]}),
        )
        .unwrap();
        assert_eq!(out, "aD");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            Template::parse("t", "{{ unclosed"),
            Err(TemplateError::InvalidSyntax(_))
        ));
        assert!(matches!(
            Template::parse("t", "{{#each xs}}no end"),
            Err(TemplateError::InvalidSyntax(_))
        ));
        assert!(matches!(
            Template::parse("t", "{{#if a}}x{{/each}}"),
            Err(TemplateError::InvalidSyntax(_))
        ));
        assert!(matches!(
            Template::parse("t", "{{ x | shout }}"),
            Err(TemplateError::UnknownFilter(_))
        ));
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(render("a{{! don't render }}b", json!({})).unwrap(), "ab");
    }

    #[test]
    fn test_default_filter() {
        let out = render("{{ subtitle | default: \"none\" }}", json!({})).unwrap();
        assert_eq!(out, "none");
        let out = render("{{ subtitle | default: site }}", json!({"site": "S"})).unwrap();
        assert_eq!(out, "S");
    }

    #[test]
    fn test_meta_and_og_filters() {
        let out = render(
            "{{ excerpt | meta: \"description\" }}{{ title | og: \"title\" }}",
            json!({"excerpt": "<b>Hi & Bye</b>", "title": "T"}),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<meta name="description" content="Hi &amp; Bye"><meta property="og:title" content="T">"#
        );
    }

    #[test]
    fn test_locale_filters() {
        let out = render(
            "{{ n | number }} {{ d | date: \"%d %B %Y\" }}",
            json!({"n": 12345.5, "d": "2024-03-05", "locale": "de-DE"}),
        )
        .unwrap();
        assert_eq!(out, "12.345,5 05 März 2024");
    }

    #[test]
    fn test_message_filter() {
        let out = render(
            "{{ count | message: \"{value, plural, one {# post} other {# posts}} by {author}\" }}",
            json!({"count": 3, "author": "Ada"}),
        )
        .unwrap();
        assert_eq!(out, "3 posts by Ada");
    }

    #[test]
    fn test_braces_inside_quoted_argument() {
        let out = render("{{ x | default: \"}}\" }}!", json!({})).unwrap();
        assert_eq!(out, "}}!");
    }

    #[test]
    fn test_pipe_inside_quoted_argument() {
        let out = render("{{ x | default: \"a|b\" }}", json!({})).unwrap();
        assert_eq!(out, "a|b");
    }

    #[test]
    fn test_renderer_trait() {
        let renderer = TemplateRenderer::new(Arc::new(FormatterCache::new()), "en-US");
        let out = renderer
            .render("{{ greeting }}", &ctx(json!({"greeting": "hey"})))
            .unwrap();
        assert_eq!(out, "hey");
    }
}
