//! Collection expansion.
//!
//! A collection selects documents by a filter, orders them by sort fields,
//! optionally splits them into groups (one listing per distinct value of a
//! field), and paginates each sequence into listing pages.

use std::collections::BTreeMap;

use quire_core::{
    CollectionConfig, Metadata, Page, SourceDocument,
    content::{path_to_slash, slugify, url_for},
    sort::{compare_by_fields, parse_sort_fields},
};
use serde_json::Value;

/// One listing page before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Output path relative to the output directory.
    pub relative_path: String,

    /// Render context: site variables plus listing fields.
    pub context: Metadata,
}

/// Items sharing one value of the collection's `group_by` field.
#[derive(Debug, Clone)]
pub struct Group<'p> {
    /// Value as first seen in the sorted items.
    pub label: String,

    /// Slug used in output paths.
    pub slug: String,

    /// Items in collection order.
    pub items: Vec<&'p Page>,
}

/// Filter and sort the pages belonging to a collection.
///
/// `entries` pairs each generated page with the document it came from, in
/// source order. Ties on every sort field fall back to source path order.
pub fn select<'p>(
    collection: &CollectionConfig,
    entries: &[(&SourceDocument, &'p Page)],
) -> Vec<&'p Page> {
    let fields = parse_sort_fields(&collection.sort_fields);

    let mut selected: Vec<(String, &'p Page)> = entries
        .iter()
        .filter(|(doc, _)| {
            collection
                .filter
                .matches(&doc.source_key(), &doc.front_matter)
        })
        .map(|(doc, page)| (doc.source_key(), *page))
        .collect();

    selected.sort_by(|(a_key, a), (b_key, b)| {
        compare_by_fields(&a.metadata, &b.metadata, &fields).then_with(|| a_key.cmp(b_key))
    });

    selected.into_iter().map(|(_, page)| page).collect()
}

/// Split sorted items by the values of `field`.
///
/// List values put an item in every group it names. Items without the field
/// join no group. Groups are ordered by slug; values that slugify alike share
/// a group.
pub fn group<'p>(field: &str, items: &[&'p Page]) -> Vec<Group<'p>> {
    let mut groups: BTreeMap<String, Group<'p>> = BTreeMap::new();

    for page in items {
        for label in group_values(page.metadata.get(field)) {
            let slug = slugify(&label);
            if slug.is_empty() {
                continue;
            }
            let group = groups.entry(slug.clone()).or_insert_with(|| Group {
                label,
                slug,
                items: Vec::new(),
            });
            // A list naming the same value twice still lists the page once.
            if !group.items.iter().any(|p| std::ptr::eq(*p, *page)) {
                group.items.push(*page);
            }
        }
    }

    groups.into_values().collect()
}

fn group_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values.iter().filter_map(scalar_label).collect(),
        Some(value) => scalar_label(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Paginate a slice of items.
///
/// `page` is 1-based. Returns the items on that page and the page count.
/// Page 0 and pages past the end are empty; a `per_page` of 0 is treated
/// as 1.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize) {
    let per_page = per_page.max(1);
    let total_pages = items.len().div_ceil(per_page);
    let Some(start) = page
        .checked_sub(1)
        .and_then(|p| p.checked_mul(per_page))
        .filter(|start| *start < items.len())
    else {
        return (&[], total_pages);
    };
    let end = start.saturating_add(per_page).min(items.len());

    (&items[start..end], total_pages)
}

/// Output path of a listing page: `<base>/index.html` for the first page,
/// `<base>/page/<n>/index.html` after that.
#[must_use]
pub fn listing_path(base: &str, page_number: usize) -> String {
    let base = base.trim_matches('/');
    let dir = if page_number <= 1 {
        base.to_string()
    } else if base.is_empty() {
        format!("page/{page_number}")
    } else {
        format!("{base}/page/{page_number}")
    };

    if dir.is_empty() {
        "index.html".to_string()
    } else {
        format!("{dir}/index.html")
    }
}

/// Build every listing page for one collection.
///
/// M matching items at page size N give `ceil(M / N)` pages, so a collection
/// with no items produces none.
pub fn listings(
    name: &str,
    collection: &CollectionConfig,
    entries: &[(&SourceDocument, &Page)],
    site_context: &Metadata,
) -> Vec<Listing> {
    let items = select(collection, entries);
    let base = collection.base_path(name);

    match collection.group_by.as_deref() {
        Some(field) => group(field, &items)
            .into_iter()
            .flat_map(|g| {
                let group_base = if base.is_empty() {
                    g.slug.clone()
                } else {
                    format!("{base}/{}", g.slug)
                };
                paginate_listing(
                    name,
                    collection,
                    &g.items,
                    &group_base,
                    Some(g.label.as_str()),
                    site_context,
                )
            })
            .collect(),
        None => paginate_listing(name, collection, &items, base, None, site_context),
    }
}

fn paginate_listing(
    name: &str,
    collection: &CollectionConfig,
    items: &[&Page],
    base: &str,
    group: Option<&str>,
    site_context: &Metadata,
) -> Vec<Listing> {
    let per_page = collection
        .effective_page_size()
        .unwrap_or(items.len())
        .max(1);
    let total_pages = items.len().div_ceil(per_page);

    (1..=total_pages)
        .map(|page_number| {
            let (page_items, _) = paginate(items, page_number, per_page);
            let relative_path = listing_path(base, page_number);

            let mut ctx = site_context.clone();
            ctx.insert("layout".into(), Value::String(collection.layout.clone()));
            ctx.insert("collection".into(), Value::String(name.to_string()));
            ctx.insert(
                "title".into(),
                Value::String(group.unwrap_or(name).to_string()),
            );
            if let Some(group) = group {
                ctx.insert("group".into(), Value::String(group.to_string()));
            }
            ctx.insert(
                "items".into(),
                Value::Array(page_items.iter().map(|p| item_value(p)).collect()),
            );
            ctx.insert("page_number".into(), Value::from(page_number));
            ctx.insert("total_pages".into(), Value::from(total_pages));
            ctx.insert("total_items".into(), Value::from(items.len()));
            ctx.insert("url".into(), Value::String(url_for(&relative_path)));
            if page_number > 1 {
                ctx.insert(
                    "previous_path".into(),
                    Value::String(url_for(&listing_path(base, page_number - 1))),
                );
            }
            if page_number < total_pages {
                ctx.insert(
                    "next_path".into(),
                    Value::String(url_for(&listing_path(base, page_number + 1))),
                );
            }

            Listing {
                relative_path,
                context: ctx,
            }
        })
        .collect()
}

fn item_value(page: &Page) -> Value {
    let mut item = page.metadata.clone();
    item.insert("url".into(), Value::String(page.url.clone()));
    if let Some(source) = &page.source_path {
        item.insert("source_path".into(), Value::String(path_to_slash(source)));
    }
    Value::Object(item)
}
