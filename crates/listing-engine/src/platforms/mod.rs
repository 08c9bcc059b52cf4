//! Marketplace detection and the per-platform adapters.

pub mod facebook;
pub mod offerup;

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Supported marketplaces, in matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    OfferUp,
    FacebookMarketplace,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::OfferUp, Platform::FacebookMarketplace];

    pub fn name(self) -> &'static str {
        match self {
            Platform::OfferUp => offerup::PLATFORM_NAME,
            Platform::FacebookMarketplace => facebook::PLATFORM_NAME,
        }
    }

    fn pattern(self) -> &'static Regex {
        static OFFERUP: OnceLock<Regex> = OnceLock::new();
        static FACEBOOK: OnceLock<Regex> = OnceLock::new();
        match self {
            Platform::OfferUp => OFFERUP
                .get_or_init(|| Regex::new(r"offerup\.com/item").expect("offerup regex is valid")),
            Platform::FacebookMarketplace => FACEBOOK.get_or_init(|| {
                Regex::new(r"facebook\.com/marketplace/item").expect("facebook regex is valid")
            }),
        }
    }

    /// First platform whose URL pattern matches.
    pub fn detect(url: &str) -> Option<Platform> {
        let url = url.trim();
        Self::ALL.into_iter().find(|p| p.pattern().is_match(url))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display label for any listing URL, supported or not.
pub fn marketplace_label(url: &str) -> &'static str {
    let host = url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default();
    let on = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

    if on("offerup.com") {
        "OfferUp"
    } else if host.starts_with("ebay.") || host.contains(".ebay.") {
        "eBay"
    } else if on("mercari.com") {
        "Mercari"
    } else if on("facebook.com") && url.contains("/marketplace") {
        "Facebook Marketplace"
    } else {
        "Unknown"
    }
}
