//! Parse structured listing data from raw HTML without rendering.
//!
//! Two sources live here: schema.org linked data (`application/ld+json`
//! blocks typed `Product` or `Offer`) and page-level social/meta
//! descriptors (`og:*`, `product:*`). Both are read with the `scraper`
//! crate; markup heuristics live with the platform adapters.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Listing fields read from a linked-data block. Prices stay textual so
/// every source goes through the same price parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedListing {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    /// Raw `offers.itemCondition`, usually a schema.org URI.
    pub item_condition: Option<String>,
    pub images: Vec<String>,
}

/// Social/meta descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDescriptors {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: Option<String>,
    pub condition: Option<String>,
}

impl MetaDescriptors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.price.is_none()
            && self.condition.is_none()
    }
}

/// Return the first linked-data object typed `Product` or `Offer`.
///
/// Handles single objects, top-level arrays and `@graph` containers.
/// Malformed blocks are skipped.
pub fn extract_linked_listing(document: &Html) -> Option<LinkedListing> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for element in document.select(&sel) {
        let text = element.inner_html();
        let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };
        if let Some(listing) = listing_objects(&value).find(|v| is_listing_type(v)) {
            return Some(parse_listing(listing));
        };
    }
    None
}

fn listing_objects(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    if let Some(graph) = value.get("@graph").and_then(|g| g.as_array()) {
        Box::new(graph.iter())
    } else if let Some(items) = value.as_array() {
        Box::new(items.iter())
    } else {
        Box::new(std::iter::once(value))
    }
}

fn is_listing_type(value: &Value) -> bool {
    let is_match = |t: &str| matches!(t, "Product" | "Offer");
    match value.get("@type") {
        Some(Value::String(t)) => is_match(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(|t| t.as_str()).any(is_match),
        _ => false,
    }
}

fn parse_listing(v: &Value) -> LinkedListing {
    // An `Offer` carries its own price; a `Product` nests it under `offers`.
    let offer = match v.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        Some(o) => Some(o),
        None => Some(v),
    };

    LinkedListing {
        name: string_field(v, "name"),
        description: string_field(v, "description"),
        price: offer.and_then(|o| scalar_text(o.get("price")?)),
        item_condition: offer.and_then(|o| string_field(o, "itemCondition")),
        images: v.get("image").map(image_urls).unwrap_or_default(),
    }
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `image` may be a URL, a list of URLs, or `ImageObject`s with `url`.
fn image_urls(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(image_urls).collect(),
        Value::Object(_) => string_field(v, "url").into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Read the social/meta descriptors a listing page usually carries.
pub fn extract_meta(document: &Html) -> MetaDescriptors {
    MetaDescriptors {
        title: meta_property(document, "og:title"),
        description: meta_property(document, "og:description"),
        image: meta_property(document, "og:image"),
        price: meta_property(document, "product:price:amount")
            .or_else(|| meta_property(document, "og:price:amount")),
        condition: meta_property(document, "product:condition"),
    }
}

fn meta_property(document: &Html, property: &str) -> Option<String> {
    let sel = Selector::parse(&format!(r#"meta[property="{property}"]"#)).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

/// Visible text of an element, trimmed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Collapse runs of whitespace containing a newline into a single space.
pub fn collapse_newlines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
