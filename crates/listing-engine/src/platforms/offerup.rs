//! OfferUp: statically rendered listing pages, read with per-field
//! fallback chains.
//!
//! Each field owns an ordered strategy table. Strategies run from most to
//! least trustworthy and the first non-empty value wins:
//!
//! 1. linked data (`application/ld+json` Product/Offer)
//! 2. social/meta descriptors
//! 3. semantic markers (`data-testid`, heading structure)
//! 4. rendering-framework style classes (MUI)
//! 5. regex over the raw page
//!
//! Chains are independent: one field falling through to the bottom has no
//! effect on the others. Only an unrecoverable title is an error.

use crate::error::{ExtractError, ExtractResult};
use crate::fetch::PageFetcher;
use crate::normalize::RawFields;
use crate::structured::{
    collapse_newlines, element_text, extract_linked_listing, extract_meta, LinkedListing,
    MetaDescriptors,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const PLATFORM_NAME: &str = "OfferUp";

/// Present anywhere in the page once a listing is withdrawn.
pub const UNAVAILABLE_MARKER: &str = "This item is no longer available";

/// Substring identifying first-party listing images.
const IMAGE_HOST: &str = "offerup.com";

/// Tier a strategy belongs to, most trustworthy first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    LinkedData,
    Meta,
    SemanticMarkup,
    StyleClass,
    TextPattern,
}

/// One extraction strategy for one field.
pub struct Strategy {
    pub name: &'static str,
    pub tier: Tier,
    pub run: fn(&ListingPage) -> Option<String>,
}

/// Parsed page plus the structured sources every chain consults.
pub struct ListingPage {
    html: String,
    document: Html,
    linked: Option<LinkedListing>,
    meta: MetaDescriptors,
}

impl ListingPage {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let linked = extract_linked_listing(&document);
        let meta = extract_meta(&document);
        debug!(
            linked_data = linked.is_some(),
            meta_title = meta.title.is_some(),
            meta_description = meta.description.is_some(),
            meta_image = meta.image.is_some(),
            meta_price = meta.price.is_some(),
            "parsed listing page"
        );
        Self {
            html: html.to_string(),
            document,
            linked,
            meta,
        }
    }

    fn linked(&self) -> Option<&LinkedListing> {
        self.linked.as_ref()
    }

    fn first_text(&self, css: &str) -> Option<String> {
        let sel = Selector::parse(css).ok()?;
        self.document
            .select(&sel)
            .next()
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
    }

    /// First element matching `css` whose text satisfies `pred`.
    fn find_text(&self, css: &str, pred: impl Fn(&str) -> bool) -> Option<String> {
        let sel = Selector::parse(css).ok()?;
        self.document
            .select(&sel)
            .map(|el| element_text(&el))
            .find(|t| pred(t.as_str()))
    }

    /// Text of the first `<p>` in the block following a "Description"
    /// heading's container.
    fn description_after_heading(&self, heading_css: &str, paragraph_css: &str) -> Option<String> {
        let heading_sel = Selector::parse(heading_css).ok()?;
        let paragraph_sel = Selector::parse(paragraph_css).ok()?;
        self.document
            .select(&heading_sel)
            .filter(|h| element_text(h).eq_ignore_ascii_case("description"))
            .find_map(|h| {
                let container = h.parent()?;
                let block = container.next_siblings().find_map(ElementRef::wrap)?;
                let para = block.select(&paragraph_sel).next()?;
                Some(collapse_newlines(&element_text(&para)))
            })
            .filter(|t| !t.is_empty())
    }
}

// ── Strategy tables ─────────────────────────────────────────────────────────

pub const TITLE_CHAIN: &[Strategy] = &[
    Strategy {
        name: "linked-data name",
        tier: Tier::LinkedData,
        run: |p| p.linked()?.name.clone(),
    },
    Strategy {
        name: "og:title",
        tier: Tier::Meta,
        run: |p| {
            // og:title carries a " - OfferUp" site suffix.
            let title = p.meta.title.as_deref()?;
            let head = title.trim();
            let head = head.strip_suffix(" - OfferUp").unwrap_or(head).trim();
            (!head.is_empty()).then(|| head.to_string())
        },
    },
    Strategy {
        name: "data-testid listing-title",
        tier: Tier::SemanticMarkup,
        run: |p| p.first_text(r#"[data-testid="listing-title"]"#),
    },
    Strategy {
        name: "h1",
        tier: Tier::StyleClass,
        run: |p| p.first_text("h1"),
    },
];

pub const PRICE_CHAIN: &[Strategy] = &[
    Strategy {
        name: "linked-data offers.price",
        tier: Tier::LinkedData,
        run: |p| p.linked()?.price.clone(),
    },
    Strategy {
        name: "product:price:amount",
        tier: Tier::Meta,
        run: |p| p.meta.price.clone(),
    },
    Strategy {
        name: "data-testid price",
        tier: Tier::SemanticMarkup,
        run: |p| p.first_text(r#"[data-testid="price"], [data-qa="price"]"#),
    },
    Strategy {
        name: "MuiTypography-h4",
        tier: Tier::StyleClass,
        run: |p| p.first_text("p.MuiTypography-h4"),
    },
    Strategy {
        name: "currency regex",
        tier: Tier::TextPattern,
        run: |p| {
            price_token_regex()
                .find(&p.html)
                .map(|m| m.as_str().to_string())
        },
    },
];

pub const DESCRIPTION_CHAIN: &[Strategy] = &[
    Strategy {
        name: "linked-data description",
        tier: Tier::LinkedData,
        run: |p| p.linked()?.description.clone(),
    },
    Strategy {
        name: "og:description",
        tier: Tier::Meta,
        run: |p| p.meta.description.clone(),
    },
    Strategy {
        name: "data-testid listing-description",
        tier: Tier::SemanticMarkup,
        run: |p| {
            p.first_text(r#"[data-testid="listing-description"]"#)
                .map(|t| collapse_newlines(&t))
        },
    },
    Strategy {
        name: "description heading",
        tier: Tier::SemanticMarkup,
        run: |p| p.description_after_heading("h2", "p"),
    },
    Strategy {
        name: "MuiTypography-h5 description",
        tier: Tier::StyleClass,
        run: |p| p.description_after_heading("h2.MuiTypography-h5", "p.MuiTypography-body1"),
    },
];

pub const CONDITION_CHAIN: &[Strategy] = &[
    Strategy {
        name: "linked-data itemCondition",
        tier: Tier::LinkedData,
        run: |p| schema_condition_word(p.linked()?.item_condition.as_deref()?),
    },
    Strategy {
        name: "product:condition",
        tier: Tier::Meta,
        run: |p| p.meta.condition.as_deref().map(title_case),
    },
    Strategy {
        name: "MuiTypography-body1 condition label",
        tier: Tier::StyleClass,
        run: |p| {
            let label = p.find_text("p.MuiTypography-body1", |t| t.contains("Condition:"))?;
            let value = label.replacen("Condition: ", "", 1).trim().to_string();
            (!value.is_empty()).then_some(value)
        },
    },
];

pub const LOCATION_CHAIN: &[Strategy] = &[Strategy {
    name: "MuiTypography-body1 location label",
    tier: Tier::StyleClass,
    run: |p| {
        let label = p.find_text("span.MuiTypography-body1", |t| t.starts_with("in "))?;
        let place = label.trim_start_matches("in ").trim().to_string();
        (!place.is_empty()).then_some(place)
    },
}];

// ── Chain runner ────────────────────────────────────────────────────────────

/// Outcome of one chain: the value and the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: String,
    pub source: &'static str,
    pub tier: Tier,
}

/// Run `chain` in order; stop at the first strategy producing a non-empty
/// value. On exhaustion, the attempted strategy names are returned.
pub fn run_chain(
    field: &'static str,
    chain: &[Strategy],
    page: &ListingPage,
) -> Result<Resolved, Vec<&'static str>> {
    let mut attempted = Vec::with_capacity(chain.len());
    for strategy in chain {
        attempted.push(strategy.name);
        if let Some(value) = (strategy.run)(page).filter(|v| !v.trim().is_empty()) {
            debug!(field, source = strategy.name, "field resolved");
            return Ok(Resolved {
                value,
                source: strategy.name,
                tier: strategy.tier,
            });
        }
    }
    debug!(field, "no strategy matched");
    Err(attempted)
}

fn resolve(field: &'static str, chain: &[Strategy], page: &ListingPage) -> Option<String> {
    run_chain(field, chain, page).ok().map(|r| r.value)
}

/// `https://schema.org/UsedCondition` → `Used`.
pub fn schema_condition_word(uri: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/(\w+)Condition$").expect("condition uri regex is valid"));
    re.captures(uri.trim()).map(|c| c[1].to_string())
}

fn price_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\d[\d,]*(?:\.\d{2})?").expect("price regex is valid"))
}

fn title_case(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Linked-data and meta images first; only when both are empty, fall back
/// to `<img>` tags pointing at the platform's own host.
pub fn extract_images(page: &ListingPage) -> Vec<String> {
    let mut images: Vec<String> = page
        .linked()
        .map(|l| l.images.clone())
        .unwrap_or_default();
    if let Some(image) = &page.meta.image {
        if !images.contains(image) {
            images.push(image.clone());
        }
    }
    if !images.is_empty() {
        debug!(count = images.len(), "images from structured data");
        return images;
    }

    let Ok(sel) = Selector::parse("img[src]") else {
        return images;
    };
    let mut found: Vec<String> = page
        .document
        .select(&sel)
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| src.contains(IMAGE_HOST))
        .map(str::to_string)
        .collect();

    // With several matches the first is the seller's avatar; a lone match
    // is the listing photo.
    if found.len() > 1 {
        found.remove(0);
    }
    debug!(count = found.len(), "images from img tags");
    found
}

/// Run every chain over already-fetched HTML.
pub fn extract_from_html(html: &str) -> ExtractResult<RawFields> {
    let page = ListingPage::parse(html);

    let title = run_chain("title", TITLE_CHAIN, &page).map_err(|attempted| {
        warn!(platform = PLATFORM_NAME, ?attempted, "no title strategy matched");
        ExtractError::failed(PLATFORM_NAME, &attempted)
    })?;

    let price = resolve("price", PRICE_CHAIN, &page);

    Ok(RawFields {
        title: Some(title.value),
        price: price.map(|p| json!(p)),
        description: resolve("description", DESCRIPTION_CHAIN, &page),
        condition: resolve("condition", CONDITION_CHAIN, &page),
        location: resolve("location", LOCATION_CHAIN, &page),
        image_links: Some(json!(extract_images(&page))),
        available: Some(json!(!html.contains(UNAVAILABLE_MARKER))),
        ..Default::default()
    })
}

/// Fetch `url` and extract its raw fields.
pub async fn scrape(fetcher: &PageFetcher, url: &str) -> ExtractResult<RawFields> {
    debug!(url, "OfferUp: fetching listing");
    let page = fetcher.fetch(url).await?;
    extract_from_html(&page.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> ListingPage {
        ListingPage::parse(html)
    }

    #[test]
    fn test_title_prefers_linked_data() {
        let p = page(
            r#"<script type="application/ld+json">{"@type":"Product","name":"Road Bike"}</script>
               <meta property="og:title" content="Other - OfferUp">
               <h1>Heading</h1>"#,
        );
        let r = run_chain("title", TITLE_CHAIN, &p).unwrap();
        assert_eq!(r.value, "Road Bike");
        assert_eq!(r.tier, Tier::LinkedData);
    }

    #[test]
    fn test_title_meta_suffix_stripped() {
        let p = page(r#"<meta property="og:title" content="Desk Lamp - OfferUp">"#);
        assert_eq!(run_chain("title", TITLE_CHAIN, &p).unwrap().value, "Desk Lamp");
    }

    #[test]
    fn test_title_meta_keeps_dashes_in_name() {
        let p = page(r#"<meta property="og:title" content="Dell XPS 13 - 16GB RAM - OfferUp">"#);
        assert_eq!(
            run_chain("title", TITLE_CHAIN, &p).unwrap().value,
            "Dell XPS 13 - 16GB RAM"
        );

        let unsuffixed = page(r#"<meta property="og:title" content="Crib - Mattress Included">"#);
        assert_eq!(
            resolve("title", TITLE_CHAIN, &unsuffixed).as_deref(),
            Some("Crib - Mattress Included")
        );
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let p = page("<body><h1>  Futon  </h1></body>");
        let r = run_chain("title", TITLE_CHAIN, &p).unwrap();
        assert_eq!(r.value, "Futon");
        assert_eq!(r.source, "h1");
    }

    #[test]
    fn test_title_exhaustion_reports_attempts() {
        let p = page("<body><p>nothing here</p></body>");
        let attempted = run_chain("title", TITLE_CHAIN, &p).unwrap_err();
        assert_eq!(attempted.len(), TITLE_CHAIN.len());
        assert_eq!(attempted[0], "linked-data name");
    }

    #[test]
    fn test_price_chain_tiers() {
        let semantic = page(r#"<span data-testid="price">$45</span><p class="MuiTypography-h4">$99</p>"#);
        assert_eq!(resolve("price", PRICE_CHAIN, &semantic).as_deref(), Some("$45"));

        let style = page(r#"<p class="MuiTypography-h4 other">$1,200</p>"#);
        assert_eq!(resolve("price", PRICE_CHAIN, &style).as_deref(), Some("$1,200"));

        let text_only = page("<div>Asking $300.00 obo</div>");
        let r = run_chain("price", PRICE_CHAIN, &text_only).unwrap();
        assert_eq!(r.value, "$300.00");
        assert_eq!(r.tier, Tier::TextPattern);
    }

    #[test]
    fn test_currency_regex_needs_a_digit() {
        let html = "<script>var a=$,b=1;</script><div>Asking $25</div>";
        let p = page(html);
        assert_eq!(resolve("price", PRICE_CHAIN, &p).as_deref(), Some("$25"));

        let fields = extract_from_html(&format!("<h1>Chair</h1>{html}")).unwrap();
        assert_eq!(crate::normalize::normalize(&fields).price, 25.0);
    }

    #[test]
    fn test_description_heading_structure() {
        let html = r#"
        <div>
          <div class="MuiGrid-item"><h2 class="MuiTypography-h5">Description</h2></div>
          <div><p class="MuiTypography-body1">Solid oak.
             Some wear on legs.</p></div>
        </div>"#;
        let p = page(html);
        let r = run_chain("description", DESCRIPTION_CHAIN, &p).unwrap();
        assert_eq!(r.value, "Solid oak. Some wear on legs.");
        assert_eq!(r.source, "description heading");
    }

    #[test]
    fn test_condition_sources() {
        let linked = page(
            r#"<script type="application/ld+json">
               {"@type":"Product","name":"x","offers":{"itemCondition":"https://schema.org/NewCondition"}}
               </script>"#,
        );
        assert_eq!(resolve("condition", CONDITION_CHAIN, &linked).as_deref(), Some("New"));

        let meta = page(r#"<meta property="product:condition" content="USED">"#);
        assert_eq!(resolve("condition", CONDITION_CHAIN, &meta).as_deref(), Some("Used"));

        let label = page(r#"<p class="MuiTypography-body1">Condition: Like new</p>"#);
        assert_eq!(resolve("condition", CONDITION_CHAIN, &label).as_deref(), Some("Like new"));
    }

    #[test]
    fn test_location_label() {
        let p = page(
            r#"<span class="MuiTypography-body1">Posted 2 days ago</span>
               <span class="MuiTypography-body1">in Tacoma, WA</span>"#,
        );
        assert_eq!(resolve("location", LOCATION_CHAIN, &p).as_deref(), Some("Tacoma, WA"));
    }

    #[test]
    fn test_images_drop_avatar_when_several() {
        let p = page(
            r#"<img src="https://images.offerup.com/avatar.jpg">
               <img src="https://cdn.other.com/ad.png">
               <img src="https://images.offerup.com/1.jpg">
               <img src="https://images.offerup.com/2.jpg">"#,
        );
        assert_eq!(
            extract_images(&p),
            vec![
                "https://images.offerup.com/1.jpg".to_string(),
                "https://images.offerup.com/2.jpg".to_string()
            ]
        );
    }

    #[test]
    fn test_single_image_kept() {
        let p = page(r#"<img src="https://images.offerup.com/only.jpg">"#);
        assert_eq!(extract_images(&p), vec!["https://images.offerup.com/only.jpg".to_string()]);
    }

    #[test]
    fn test_structured_images_deduplicated() {
        let p = page(
            r#"<script type="application/ld+json">{"@type":"Product","name":"x","image":"https://i/1.jpg"}</script>
               <meta property="og:image" content="https://i/1.jpg">
               <img src="https://images.offerup.com/ignored.jpg">"#,
        );
        assert_eq!(extract_images(&p), vec!["https://i/1.jpg".to_string()]);
    }

    #[test]
    fn test_meta_only_page() {
        let raw = extract_from_html(r#"<html><head><meta property="og:title" content="Desk Lamp"></head></html>"#)
            .unwrap();
        assert_eq!(raw.title.as_deref(), Some("Desk Lamp"));
        assert!(raw.price.is_none());
        assert_eq!(raw.available, Some(json!(true)));
    }

    #[test]
    fn test_unavailable_marker() {
        let raw = extract_from_html(
            r#"<h1>Couch</h1><div>This item is no longer available</div>"#,
        )
        .unwrap();
        assert_eq!(raw.available, Some(json!(false)));
    }

    #[test]
    fn test_no_title_anywhere_fails() {
        let err = extract_from_html("<html><body><p>$20</p></body></html>").unwrap_err();
        match err {
            ExtractError::ExtractionFailed { platform, attempted } => {
                assert_eq!(platform, PLATFORM_NAME);
                assert_eq!(attempted.len(), TITLE_CHAIN.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_schema_condition_word() {
        assert_eq!(
            schema_condition_word("https://schema.org/RefurbishedCondition").as_deref(),
            Some("Refurbished")
        );
        assert_eq!(schema_condition_word("Used"), None);
    }
}
