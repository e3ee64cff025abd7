//! End-to-end tests for the Quire pipeline.
//!
//! Each test lays out a small site in a temp directory and runs config
//! loading, source loading, generation and saving against it.

use std::{fs, path::Path, sync::Arc};

use quire_core::{Config, Page};
use quire_generator::{GenerateError, GenerateOutput, PageGenerator, loader, save_all};
use quire_render::{FormatterCache, LayoutSet, RenderError, RendererRegistry};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn load_config(root: &Path, toml: &str) -> Config {
    let path = root.join("quire.toml");
    fs::write(&path, toml).unwrap();
    Config::try_load(&path).unwrap()
}

fn generate(config: &Config) -> Result<GenerateOutput, GenerateError> {
    let registry = RendererRegistry::with_defaults(Arc::new(FormatterCache::new()), &config.locale);
    let layouts = LayoutSet::load(&config.layouts_dir).unwrap();
    let documents = loader::load_all(&config.source_dir)?;
    PageGenerator::new(config, &registry, &layouts).generate(&documents)
}

fn page<'a>(output: &'a GenerateOutput, relative_path: &str) -> &'a Page {
    output
        .pages
        .iter()
        .find(|p| p.relative_path == relative_path)
        .unwrap_or_else(|| panic!("no page at {relative_path}"))
}

fn item_titles(listing: &Page) -> Vec<String> {
    listing.metadata["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_post_with_layout() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "content/posts/a.md",
        "---\ntitle: \"Hi\"\nlayout: \"post\"\n---\n# Hello\n\nWorld",
    );
    write(dir.path(), "layouts/post.html", "<h1>{{title}}</h1>{{content}}");
    let config = load_config(dir.path(), "");

    let output = generate(&config).unwrap();
    let post = page(&output, "posts/a.html");

    assert_eq!(post.output_path, dir.path().join("public/posts/a.html"));
    let layout_heading = post.content.find("<h1>Hi</h1>").unwrap();
    let body_heading = post.content.find("<h1>Hello</h1>").unwrap();
    let paragraph = post.content.find("<p>World</p>").unwrap();
    assert!(layout_heading < body_heading && body_heading < paragraph);
    assert_eq!(post.excerpt(), Some("World"));
}

#[test]
fn test_round_trip_through_disk() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/index.md", "# Home\n\nWelcome.");
    write(dir.path(), "content/docs/guide.md", "---\npermalink: /guide/\n---\nRead me.");
    write(dir.path(), "content/css/site.css", "body { margin: 0 }");
    write(dir.path(), "content/about.html", "<p>{{ site_title }}</p>");
    let config = load_config(
        dir.path(),
        "[variables]\nsite_title = \"Quire & Co\"\n",
    );

    let output = generate(&config).unwrap();
    assert!(output.is_success());
    save_all(&output.pages).unwrap();

    for page in &output.pages {
        let written = fs::read_to_string(&page.output_path).unwrap();
        assert_eq!(written, page.content, "{}", page.relative_path);
    }
    assert!(dir.path().join("public/guide/index.html").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("public/css/site.css")).unwrap(),
        "body { margin: 0 }"
    );
    assert_eq!(page(&output, "about.html").content, "<p>Quire & Co</p>");
    assert_eq!(page(&output, "guide/index.html").url, "/guide/");
}

#[test]
fn test_layout_cycle_produces_no_page() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/looped.md", "---\nlayout: a\n---\nbody");
    write(dir.path(), "content/fine.md", "body");
    write(dir.path(), "layouts/a.html", "---\nlayout: b\n---\n{{content}}");
    write(dir.path(), "layouts/b.html", "---\nlayout: a\n---\n{{content}}");
    let config = load_config(dir.path(), "");

    let output = generate(&config).unwrap();

    assert_eq!(output.pages.len(), 1);
    assert_eq!(output.pages[0].relative_path, "fine.html");
    assert_eq!(output.failures.len(), 1);
    assert!(matches!(
        &output.failures[0],
        GenerateError::Render {
            source: RenderError::LayoutCycle(chain),
            ..
        } if chain == "a -> b -> a"
    ));
}

#[test]
fn test_descending_date_order_with_stable_ties() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/posts/a.md", "---\ntitle: a\ndate: 2024-01-01\n---\n");
    write(dir.path(), "content/posts/b.md", "---\ntitle: b\ndate: 2024-05-01\n---\n");
    write(dir.path(), "content/posts/c.md", "---\ntitle: c\ndate: 2024-01-01\n---\n");
    write(dir.path(), "content/posts/d.md", "---\ntitle: d\ndate: 2023-12-31\n---\n");
    write(dir.path(), "layouts/list.html", "{{#each items}}{{ title }} {{/each}}");
    let config = load_config(
        dir.path(),
        "[collections.posts]\nlayout = \"list\"\nsort_fields = [\"-date\"]\n",
    );

    let output = generate(&config).unwrap();
    let listing = page(&output, "posts/index.html");

    assert_eq!(item_titles(listing), vec!["b", "a", "c", "d"]);
    assert_eq!(listing.content, "b a c d ");

    let dates: Vec<_> = listing.metadata["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["date"].as_str().unwrap().to_string())
        .collect();
    assert!(dates.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_pagination_page_counts() {
    let dir = TempDir::new().unwrap();
    for i in 0..11 {
        write(
            dir.path(),
            &format!("content/posts/p{i:02}.md"),
            &format!("---\ntitle: p{i:02}\nweight: {i}\n---\n"),
        );
    }
    write(
        dir.path(),
        "layouts/list.html",
        "{{ page_number }}/{{ total_pages }}{{#if previous_path}} prev={{ previous_path }}{{/if}}{{#if next_path}} next={{ next_path }}{{/if}}",
    );
    let config = load_config(
        dir.path(),
        "[collections.posts]\nlayout = \"list\"\nsort_fields = [\"weight\"]\npage_size = 4\n",
    );

    let output = generate(&config).unwrap();
    assert_eq!(output.listing_pages, 3);

    let first = page(&output, "posts/index.html");
    let second = page(&output, "posts/page/2/index.html");
    let last = page(&output, "posts/page/3/index.html");

    assert_eq!(item_titles(first), vec!["p00", "p01", "p02", "p03"]);
    assert_eq!(item_titles(last), vec!["p08", "p09", "p10"]);
    assert_eq!(first.content, "1/3 next=/posts/page/2/");
    assert_eq!(second.content, "2/3 prev=/posts/ next=/posts/page/3/");
    assert_eq!(last.content, "3/3 prev=/posts/page/2/");
}

#[test]
fn test_evenly_divisible_collection() {
    let dir = TempDir::new().unwrap();
    for i in 0..6 {
        write(dir.path(), &format!("content/n{i}.md"), "x");
    }
    write(dir.path(), "layouts/list.html", "{{ total_items }}");
    let config = load_config(
        dir.path(),
        "[collections.all]\nlayout = \"list\"\npage_size = 3\n",
    );

    let output = generate(&config).unwrap();
    assert_eq!(output.listing_pages, 2);
    assert_eq!(item_titles(page(&output, "all/page/2/index.html")).len(), 3);
}

#[test]
fn test_duplicate_output_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/a.md", "markdown");
    write(dir.path(), "content/b.md", "---\npermalink: /a.html\n---\nclash");
    let config = load_config(dir.path(), "");

    let err = generate(&config).unwrap_err();
    match err {
        GenerateError::DuplicateOutput { first, second, .. } => {
            assert_eq!(first, "a.md");
            assert_eq!(second, "b.md");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_rebuild_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "content/posts/a.md",
        "---\ntitle: A\ndate: 2024-02-03\nlayout: post\n---\nSome *text* with ![img](/a.png).",
    );
    write(
        dir.path(),
        "layouts/post.html",
        "{{ excerpt | meta: \"description\" }}{{ image | og: \"image\" }}{{ date | date: \"long\" }}{{content}}",
    );
    let config = load_config(dir.path(), "");

    let first = generate(&config).unwrap();
    save_all(&first.pages).unwrap();
    let on_disk = fs::read(dir.path().join("public/posts/a.html")).unwrap();

    let second = generate(&config).unwrap();
    save_all(&second.pages).unwrap();
    assert_eq!(fs::read(dir.path().join("public/posts/a.html")).unwrap(), on_disk);
    assert_eq!(first.pages, second.pages);

    let html = String::from_utf8(on_disk).unwrap();
    assert!(html.starts_with(
        "<meta name=\"description\" content=\"Some text with .\"><meta property=\"og:image\" content=\"/a.png\">03 February 2024"
    ));
}

#[test]
fn test_locale_and_taxonomy_pages() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/a.md", "---\ntitle: A\ntags: [Rust, Web]\n---\n");
    write(dir.path(), "content/b.md", "---\ntitle: B\ntags: [rust]\n---\n");
    write(
        dir.path(),
        "layouts/tag.html",
        "{{ group }}: {{ total_items | message: \"{value, plural, one {# Beitrag} other {# Beiträge}}\" }}",
    );
    let config = load_config(
        dir.path(),
        "locale = \"de-DE\"\n[collections.tags]\nlayout = \"tag\"\ngroup_by = \"tags\"\n",
    );

    let output = generate(&config).unwrap();
    assert_eq!(page(&output, "tags/rust/index.html").content, "Rust: 2 Beiträge");
    assert_eq!(page(&output, "tags/web/index.html").content, "Web: 1 Beitrag");
}

#[test]
fn test_drafts_excluded_from_pages_and_collections() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/a.md", "---\ntitle: A\n---\n");
    write(dir.path(), "content/b.md", "---\ntitle: B\ndraft: true\n---\n");
    write(dir.path(), "layouts/list.html", "{{#each items}}{{ title }}{{/each}}");
    let config = load_config(dir.path(), "[collections.all]\nlayout = \"list\"\n");

    let output = generate(&config).unwrap();
    assert_eq!(output.document_pages(), 1);
    assert_eq!(page(&output, "all/index.html").content, "A");
}
