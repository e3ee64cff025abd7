//! Markdown renderer using pulldown-cmark.
//!
//! Raw HTML in the source passes through untouched; sanitizing is left to
//! whoever embeds the output into attributes or meta tags.

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use quire_core::{Metadata, html::escape_html};

use crate::{Result, registry::Renderer};

/// Markdown to HTML renderer.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

struct ImageState {
    src: String,
    title: String,
    alt: String,
}

impl MarkdownRenderer {
    /// Create a new markdown renderer with default options.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self { options }
    }

    /// Render a markdown body to HTML.
    pub fn render_markdown(&self, content: &str) -> String {
        let parser = Parser::new_ext(content, self.options);
        let mut html = String::with_capacity(content.len() * 3 / 2);
        let mut code_block: Option<String> = None;
        let mut image: Option<ImageState> = None;
        let mut in_table_head = false;

        for event in parser {
            // Alt text is collected as plain text until the image closes.
            if let Some(img) = image.as_mut() {
                match event {
                    Event::End(TagEnd::Image) => {
                        html.push_str(&image_tag(img));
                        image = None;
                    }
                    Event::Text(text) | Event::Code(text) => img.alt.push_str(&text),
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string)
                            .unwrap_or_default(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    if lang.is_empty() {
                        html.push_str("<pre><code>");
                    } else {
                        html.push_str(&format!(
                            "<pre><code class=\"language-{}\">",
                            escape_html(&lang)
                        ));
                    }
                    code_block = Some(lang);
                }

                Event::End(TagEnd::CodeBlock) => {
                    html.push_str("</code></pre>\n");
                    code_block = None;
                }

                Event::Text(text) => {
                    if code_block.is_some() {
                        html.push_str(&escape_html(&text));
                    } else {
                        html.push_str(&escape_text(&text));
                    }
                }

                Event::Start(Tag::Image {
                    dest_url, title, ..
                }) => {
                    image = Some(ImageState {
                        src: dest_url.to_string(),
                        title: title.to_string(),
                        alt: String::new(),
                    });
                }

                Event::Start(Tag::TableHead) => {
                    in_table_head = true;
                    html.push_str("<thead><tr>");
                }

                Event::End(TagEnd::TableHead) => {
                    in_table_head = false;
                    html.push_str("</tr></thead>\n<tbody>\n");
                }

                Event::Start(Tag::TableCell) => {
                    html.push_str(if in_table_head { "<th>" } else { "<td>" });
                }

                Event::End(TagEnd::TableCell) => {
                    html.push_str(if in_table_head { "</th>" } else { "</td>" });
                }

                Event::Code(code) => {
                    html.push_str(&format!("<code>{}</code>", escape_text(&code)));
                }

                Event::SoftBreak => html.push('\n'),

                Event::HardBreak => html.push_str("<br />\n"),

                Event::Start(tag) => html.push_str(&tag_to_html_start(&tag)),

                Event::End(tag) => html.push_str(&tag_to_html_end(&tag)),

                Event::Html(raw) | Event::InlineHtml(raw) => html.push_str(&raw),

                Event::FootnoteReference(name) => {
                    let name = escape_html(&name);
                    html.push_str(&format!(
                        "<sup class=\"footnote-ref\"><a href=\"#fn-{name}\">[{name}]</a></sup>"
                    ));
                }

                Event::Rule => html.push_str("<hr />\n"),

                Event::TaskListMarker(checked) => {
                    html.push_str(if checked {
                        "<input type=\"checkbox\" checked disabled />"
                    } else {
                        "<input type=\"checkbox\" disabled />"
                    });
                }

                Event::InlineMath(math) => {
                    html.push_str(&format!(
                        "<span class=\"math inline\">\\({}\\)</span>",
                        escape_text(&math)
                    ));
                }

                Event::DisplayMath(math) => {
                    html.push_str(&format!(
                        "<div class=\"math display\">\\[{}\\]</div>",
                        escape_text(&math)
                    ));
                }
            }
        }

        html
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, body: &str, _context: &Metadata) -> Result<String> {
        Ok(self.render_markdown(body))
    }
}

fn image_tag(img: &ImageState) -> String {
    let title_attr = if img.title.is_empty() {
        String::new()
    } else {
        format!(" title=\"{}\"", escape_html(&img.title))
    };
    format!(
        "<img src=\"{}\" alt=\"{}\"{title_attr} />",
        escape_html(&img.src),
        escape_html(&img.alt)
    )
}

/// Escape text content; quotes may stay literal outside attributes.
fn escape_text(s: &CowStr<'_>) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Convert a pulldown-cmark tag to HTML opening tag.
fn tag_to_html_start(tag: &Tag) -> String {
    match tag {
        Tag::Paragraph => "<p>".to_string(),
        Tag::Heading {
            level, id, classes, ..
        } => {
            let id_attr = id
                .as_ref()
                .map(|i| format!(" id=\"{}\"", escape_html(i)))
                .unwrap_or_default();
            let class_attr = if classes.is_empty() {
                String::new()
            } else {
                let joined = classes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ");
                format!(" class=\"{}\"", escape_html(&joined))
            };
            format!("<h{}{id_attr}{class_attr}>", *level as u8)
        }
        Tag::BlockQuote(_) => "<blockquote>\n".to_string(),
        Tag::List(Some(1)) => "<ol>\n".to_string(),
        Tag::List(Some(start)) => format!("<ol start=\"{start}\">\n"),
        Tag::List(None) => "<ul>\n".to_string(),
        Tag::Item => "<li>".to_string(),
        Tag::FootnoteDefinition(name) => {
            format!("<div class=\"footnote\" id=\"fn-{}\">", escape_html(name))
        }
        Tag::Table(_) => "<table>\n".to_string(),
        Tag::TableRow => "<tr>".to_string(),
        Tag::Emphasis => "<em>".to_string(),
        Tag::Strong => "<strong>".to_string(),
        Tag::Strikethrough => "<del>".to_string(),
        Tag::Link {
            dest_url, title, ..
        } => {
            let title_attr = if title.is_empty() {
                String::new()
            } else {
                format!(" title=\"{}\"", escape_html(title))
            };
            format!("<a href=\"{}\"{title_attr}>", escape_html(dest_url))
        }
        Tag::DefinitionList => "<dl>\n".to_string(),
        Tag::DefinitionListTitle => "<dt>".to_string(),
        Tag::DefinitionListDefinition => "<dd>".to_string(),
        Tag::Superscript => "<sup>".to_string(),
        Tag::Subscript => "<sub>".to_string(),
        // Handled in the event loop or carry no markup.
        Tag::CodeBlock(_)
        | Tag::Image { .. }
        | Tag::TableHead
        | Tag::TableCell
        | Tag::HtmlBlock
        | Tag::MetadataBlock(_) => String::new(),
    }
}

/// Convert a pulldown-cmark tag end to HTML closing tag.
fn tag_to_html_end(tag: &TagEnd) -> String {
    match tag {
        TagEnd::Paragraph => "</p>\n".to_string(),
        TagEnd::Heading(level) => format!("</h{}>\n", *level as u8),
        TagEnd::BlockQuote(_) => "</blockquote>\n".to_string(),
        TagEnd::List(true) => "</ol>\n".to_string(),
        TagEnd::List(false) => "</ul>\n".to_string(),
        TagEnd::Item => "</li>\n".to_string(),
        TagEnd::FootnoteDefinition => "</div>\n".to_string(),
        TagEnd::Table => "</tbody>\n</table>\n".to_string(),
        TagEnd::TableRow => "</tr>\n".to_string(),
        TagEnd::Emphasis => "</em>".to_string(),
        TagEnd::Strong => "</strong>".to_string(),
        TagEnd::Strikethrough => "</del>".to_string(),
        TagEnd::Link => "</a>".to_string(),
        TagEnd::DefinitionList => "</dl>\n".to_string(),
        TagEnd::DefinitionListTitle => "</dt>\n".to_string(),
        TagEnd::DefinitionListDefinition => "</dd>\n".to_string(),
        TagEnd::Superscript => "</sup>".to_string(),
        TagEnd::Subscript => "</sub>".to_string(),
        TagEnd::CodeBlock
        | TagEnd::Image
        | TagEnd::TableHead
        | TagEnd::TableCell
        | TagEnd::HtmlBlock
        | TagEnd::MetadataBlock(_) => String::new(),
    }
}
