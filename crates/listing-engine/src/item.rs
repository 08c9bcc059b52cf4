//! The canonical, caller-facing listing record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing condition: one of the canonical grades, or the page's own label
/// when no keyword matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
    Other(String),
}

impl Condition {
    /// Canonical grades, best first.
    pub const CANONICAL: [Condition; 5] = [
        Condition::New,
        Condition::LikeNew,
        Condition::Good,
        Condition::Fair,
        Condition::Poor,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Condition::New => "New",
            Condition::LikeNew => "Like New",
            Condition::Good => "Good",
            Condition::Fair => "Fair",
            Condition::Poor => "Poor",
            Condition::Other(raw) => raw,
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Condition::Other(_))
    }
}

impl From<String> for Condition {
    fn from(s: String) -> Self {
        Condition::CANONICAL
            .into_iter()
            .find(|c| c.as_str() == s)
            .unwrap_or(Condition::Other(s))
    }
}

impl From<Condition> for String {
    fn from(c: Condition) -> Self {
        match c {
            Condition::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized marketplace listing.
///
/// `title` is always non-empty when produced by the engine; everything else
/// may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalItem {
    pub title: String,
    /// Non-negative; `0.0` when no price could be recovered.
    pub price: f64,
    pub condition: Option<Condition>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub image_links: Vec<String>,
    /// `false` only when the page says the listing is gone, sold or pending.
    pub available: bool,
}

/// Optional fields that can be absent from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemField {
    Price,
    Condition,
    Description,
    Location,
    ImageLinks,
}

impl ItemField {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemField::Price => "price",
            ItemField::Condition => "condition",
            ItemField::Description => "description",
            ItemField::Location => "location",
            ItemField::ImageLinks => "imageLinks",
        }
    }
}

/// Not a failure: the record is usable but some optional fields are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialDataWarning {
    pub missing: Vec<ItemField>,
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.missing.iter().map(|m| m.as_str()).collect();
        write!(f, "partial listing, missing: {}", names.join(", "))
    }
}

impl CanonicalItem {
    /// Optional fields that ended up empty. A zero price counts as missing.
    pub fn missing_fields(&self) -> Vec<ItemField> {
        let mut missing = Vec::new();
        if self.price == 0.0 {
            missing.push(ItemField::Price);
        }
        if self.condition.is_none() {
            missing.push(ItemField::Condition);
        }
        if self.description.is_none() {
            missing.push(ItemField::Description);
        }
        if self.location.is_none() {
            missing.push(ItemField::Location);
        }
        if self.image_links.is_empty() {
            missing.push(ItemField::ImageLinks);
        }
        missing
    }

    pub fn partial_warning(&self) -> Option<PartialDataWarning> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            None
        } else {
            Some(PartialDataWarning { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CanonicalItem {
        CanonicalItem {
            title: "Desk Lamp".into(),
            price: 15.0,
            condition: Some(Condition::LikeNew),
            description: Some("Brass, works fine".into()),
            location: Some("Seattle, WA".into()),
            image_links: vec!["https://images.offerup.com/a.jpg".into()],
            available: true,
        }
    }

    #[test]
    fn test_condition_serde_as_label() {
        let json = serde_json::to_value(item()).unwrap();
        assert_eq!(json["condition"], "Like New");
        assert_eq!(json["imageLinks"][0], "https://images.offerup.com/a.jpg");

        let back: CanonicalItem = serde_json::from_value(json).unwrap();
        assert_eq!(back.condition, Some(Condition::LikeNew));
    }

    #[test]
    fn test_unknown_condition_label_roundtrips_as_other() {
        let c: Condition = serde_json::from_str("\"Used\"").unwrap();
        assert_eq!(c, Condition::Other("Used".into()));
        assert!(!c.is_canonical());
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"Used\"");
    }

    #[test]
    fn test_complete_item_has_no_warning() {
        assert!(item().partial_warning().is_none());
    }

    #[test]
    fn test_partial_warning_lists_missing_fields() {
        let mut it = item();
        it.price = 0.0;
        it.location = None;
        let warning = it.partial_warning().expect("should warn");
        assert_eq!(warning.missing, vec![ItemField::Price, ItemField::Location]);
        assert_eq!(warning.to_string(), "partial listing, missing: price, location");
    }
}
