//! Coerce raw field sets into a [`CanonicalItem`].
//!
//! A raw field set either comes straight out of an adapter or is one the
//! caller held on to from an earlier extraction (the `cached*` keys). Both
//! go through the same coercions, so normalizing an already-normalized
//! record changes nothing.

use crate::item::CanonicalItem;
use crate::patterns::{normalize_condition, parse_price};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loosely typed listing fields, as extracted or as cached by a caller.
///
/// Scalars that arrive in several shapes (price as number or string, image
/// list as array or JSON-encoded string, availability as bool or string)
/// are kept as [`Value`] until normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFields {
    pub title: Option<String>,
    pub price: Option<Value>,
    pub condition: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_links: Option<Value>,
    pub available: Option<Value>,

    pub cached_title: Option<String>,
    pub cached_price: Option<Value>,
    pub cached_condition: Option<String>,
    pub cached_description: Option<String>,
    pub cached_location: Option<String>,
    pub cached_image_links: Option<Value>,
    pub cached_available: Option<Value>,
}

impl RawFields {
    /// Whether a usable title is present under either key.
    pub fn has_title(&self) -> bool {
        first_text(&self.title, &self.cached_title).is_some()
    }
}

impl From<&CanonicalItem> for RawFields {
    fn from(item: &CanonicalItem) -> Self {
        RawFields {
            title: Some(item.title.clone()),
            price: Some(Value::from(item.price)),
            condition: item.condition.as_ref().map(|c| c.to_string()),
            description: item.description.clone(),
            location: item.location.clone(),
            image_links: Some(Value::from(item.image_links.clone())),
            available: Some(Value::Bool(item.available)),
            ..Default::default()
        }
    }
}

/// Normalize one raw field set. Fresh keys win over cached ones.
pub fn normalize(raw: &RawFields) -> CanonicalItem {
    CanonicalItem {
        title: first_text(&raw.title, &raw.cached_title).unwrap_or_default(),
        price: first_value(&raw.price, &raw.cached_price)
            .map(coerce_price)
            .unwrap_or(0.0),
        condition: first_text(&raw.condition, &raw.cached_condition)
            .and_then(|c| normalize_condition(&c)),
        description: first_text(&raw.description, &raw.cached_description),
        location: first_text(&raw.location, &raw.cached_location),
        image_links: first_value(&raw.image_links, &raw.cached_image_links)
            .map(coerce_images)
            .unwrap_or_default(),
        available: first_value(&raw.available, &raw.cached_available)
            .map(coerce_bool)
            .unwrap_or(true),
    }
}

fn first_text(fresh: &Option<String>, cached: &Option<String>) -> Option<String> {
    [fresh, cached]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_value<'a>(fresh: &'a Option<Value>, cached: &'a Option<Value>) -> Option<&'a Value> {
    [fresh, cached].into_iter().flatten().find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn coerce_price(v: &Value) -> f64 {
    let price = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_price(s),
        _ => 0.0,
    };
    if price.is_finite() && price > 0.0 {
        price
    } else {
        0.0
    }
}

fn coerce_images(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(|inner| inner.is_array())
            .map(|inner| coerce_images(&inner))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn coerce_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}
