//! Facebook Marketplace: client-rendered pages whose listing data lives in
//! serialized relay payloads inside inline scripts.
//!
//! The page is loaded in an isolated browser context, one evaluation pulls
//! out the candidate scripts plus meta fallbacks and gallery images, and
//! the rest happens in [`crate::candidates`].

use crate::browser::SessionManager;
use crate::candidates::{
    best_listing, filter_fragments, MAX_FRAGMENTS, MAX_FRAGMENT_LEN, MIN_SCRIPT_LEN,
    PAYLOAD_MARKER,
};
use crate::error::{ExtractError, ExtractResult};
use crate::normalize::RawFields;
use crate::patterns::parse_price_opt;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const PLATFORM_NAME: &str = "Facebook Marketplace";

/// Everything the adapter needs from the rendered page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub scripts: Vec<String>,
    pub meta: SnapshotMeta,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: Option<String>,
}

/// Listing id from the URL: `/item/<digits>`, else the first run of ten or
/// more digits.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let item = ITEM.get_or_init(|| Regex::new(r"/item/(\d+)").expect("item regex is valid"));
    let digits = DIGITS.get_or_init(|| Regex::new(r"(\d{10,})").expect("digits regex is valid"));

    item.captures(url)
        .or_else(|| digits.captures(url))
        .map(|c| c[1].to_string())
}

/// Page script: dismiss the login modal without waiting on it, then collect
/// candidate scripts, meta descriptors and gallery images in one round trip.
pub fn snapshot_script(listing_id: &str) -> String {
    let id = serde_json::to_string(listing_id).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
    const lid = {id};
    const close = document.querySelector('[aria-label="Close"]');
    if (close) {{ setTimeout(() => {{ try {{ close.click(); }} catch (_) {{}} }}, 0); }}

    const scripts = [];
    for (const s of document.querySelectorAll('script')) {{
        const t = s.textContent || '';
        if (t.length <= {min_len}) continue;
        if (!t.includes('{marker}')) continue;
        if (!t.includes(lid)) continue;
        scripts.push(t.slice(0, {max_len}));
        if (scripts.length >= {max_scripts}) break;
    }}

    const meta = (prop) => {{
        const el = document.querySelector(`meta[property="${{prop}}"]`);
        return el ? el.getAttribute('content') : null;
    }};

    const images = Array.from(document.querySelectorAll('img[data-visualcompletion="media-vc-image"]'))
        .map((img) => img.src)
        .filter((src) => src && src.startsWith('https') && !src.includes('emoji'));

    return {{
        scripts,
        meta: {{
            title: meta('og:title'),
            description: meta('og:description'),
            image: meta('og:image'),
            price: meta('product:price:amount'),
        }},
        images,
    }};
}})()"#,
        min_len = MIN_SCRIPT_LEN,
        marker = PAYLOAD_MARKER,
        max_len = MAX_FRAGMENT_LEN,
        max_scripts = MAX_FRAGMENTS,
    )
}

/// Turn a page snapshot into raw fields.
///
/// Payload data wins; meta descriptors fill title, price and description.
/// Gallery images replace the meta image when present.
pub fn build_fields(snapshot: &PageSnapshot, listing_id: &str) -> ExtractResult<RawFields> {
    // The page script already filtered; re-apply so fixtures and other
    // callers get the same guarantees.
    let fragments = filter_fragments(snapshot.scripts.iter().map(String::as_str), listing_id);
    let best = best_listing(fragments, listing_id);
    let meta = &snapshot.meta;
    let meta_text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let mut fields = match &best {
        Some(listing) => {
            debug!(title = ?listing.title, "using script payload");
            RawFields {
                title: listing.title.clone().or_else(|| meta_text(&meta.title)),
                price: listing
                    .price
                    .or_else(|| meta.price.as_deref().and_then(parse_price_opt))
                    .map(|p| json!(p)),
                description: listing
                    .description
                    .clone()
                    .or_else(|| meta_text(&meta.description)),
                condition: listing.condition.clone(),
                location: listing.location.clone(),
                available: Some(json!(listing.available)),
                ..Default::default()
            }
        }
        None => {
            debug!("no payload candidates, falling back to meta descriptors");
            RawFields {
                title: meta_text(&meta.title),
                price: meta.price.as_deref().and_then(parse_price_opt).map(|p| json!(p)),
                description: meta_text(&meta.description),
                available: Some(json!(true)),
                ..Default::default()
            }
        }
    };

    let images: Vec<String> = if snapshot.images.is_empty() {
        meta_text(&meta.image).into_iter().collect()
    } else {
        snapshot.images.clone()
    };
    fields.image_links = Some(json!(images));

    if !fields.has_title() {
        let attempted: &[&'static str] = &["script payload", "og:title"];
        warn!(platform = PLATFORM_NAME, ?attempted, "no title recovered");
        return Err(ExtractError::failed(PLATFORM_NAME, attempted));
    }
    Ok(fields)
}

/// Load `url` in a fresh browser context and extract its raw fields.
pub async fn scrape(browser: &SessionManager, url: &str) -> ExtractResult<RawFields> {
    let listing_id = listing_id_from_url(url).ok_or_else(|| {
        warn!(url, "no listing id in URL");
        ExtractError::failed(PLATFORM_NAME, &["listing id"])
    })?;
    debug!(url, listing_id, "Facebook Marketplace: loading listing");

    let mut session = browser.acquire().await?;
    let snapshot = async {
        session.navigate(url).await?;
        session
            .evaluate::<PageSnapshot>(&snapshot_script(&listing_id))
            .await
    }
    .await;
    session.close().await;

    let snapshot = snapshot?;
    debug!(
        scripts = snapshot.scripts.len(),
        images = snapshot.images.len(),
        "page snapshot collected"
    );
    build_fields(&snapshot, &listing_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeLauncher;
    use crate::config::BrowserConfig;
    use std::sync::atomic::Ordering;

    const ID: &str = "1029384756102938";

    fn payload(body: &str) -> String {
        format!(
            r#"require("ScheduledServerJS").handle({{"__bbox":{{"result":{{"data":{{{body}}}}}}}}});{}"#,
            " ".repeat(MIN_SCRIPT_LEN)
        )
    }

    fn listing_payload() -> String {
        payload(&format!(
            r#""marketplace_listing_title":"Trek Marlin 5","listing_price":{{"amount":"425.00"}},
               "location_text":{{"text":"Denver, CO"}},"is_live":true,"is_sold":false,"is_pending":false,
               "share_uri":"https:\/\/www.facebook.com\/marketplace\/item\/{ID}\/""#
        ))
    }

    #[test]
    fn test_listing_id_from_url() {
        assert_eq!(
            listing_id_from_url(&format!("https://www.facebook.com/marketplace/item/{ID}/?ref=search")),
            Some(ID.to_string())
        );
        assert_eq!(
            listing_id_from_url("https://m.facebook.com/marketplace/listing?id=12345678901").as_deref(),
            Some("12345678901")
        );
        assert_eq!(listing_id_from_url("https://www.facebook.com/marketplace/item/abc"), None);
    }

    #[test]
    fn test_snapshot_script_embeds_limits() {
        let script = snapshot_script(ID);
        assert!(script.contains(&format!("const lid = \"{ID}\";")));
        assert!(script.contains("t.slice(0, 300000)"));
        assert!(script.contains("scripts.length >= 10"));
        assert!(script.contains(r#"[aria-label="Close"]"#));
    }

    #[test]
    fn test_build_from_payload() {
        let snapshot = PageSnapshot {
            scripts: vec![listing_payload()],
            meta: SnapshotMeta {
                title: Some("Ignored".into()),
                description: Some("Meta description".into()),
                image: Some("https://scontent.xx.fbcdn.net/og.jpg".into()),
                price: None,
            },
            images: vec!["https://scontent.xx.fbcdn.net/1.jpg".into()],
        };
        let fields = build_fields(&snapshot, ID).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Trek Marlin 5"));
        assert_eq!(fields.price, Some(json!(425.0)));
        assert_eq!(fields.location.as_deref(), Some("Denver, CO"));
        assert_eq!(fields.description.as_deref(), Some("Meta description"));
        assert_eq!(fields.available, Some(json!(true)));
        assert_eq!(fields.image_links, Some(json!(["https://scontent.xx.fbcdn.net/1.jpg"])));
    }

    #[test]
    fn test_meta_fallback_without_payload() {
        let snapshot = PageSnapshot {
            scripts: vec!["console.log('unrelated')".into()],
            meta: SnapshotMeta {
                title: Some("Bookshelf".into()),
                price: Some("$60".into()),
                image: Some("https://scontent.xx.fbcdn.net/og.jpg".into()),
                ..Default::default()
            },
            images: vec![],
        };
        let fields = build_fields(&snapshot, ID).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Bookshelf"));
        assert_eq!(fields.price, Some(json!(60.0)));
        assert_eq!(fields.image_links, Some(json!(["https://scontent.xx.fbcdn.net/og.jpg"])));
        assert_eq!(fields.available, Some(json!(true)));
    }

    #[test]
    fn test_no_title_is_extraction_failure() {
        let err = build_fields(&PageSnapshot::default(), ID).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ExtractionFailed { platform: PLATFORM_NAME, .. }
        ));
    }

    #[tokio::test]
    async fn test_scrape_through_session_and_release() {
        let snapshot = json!({
            "scripts": [listing_payload()],
            "meta": {"title": null, "description": null, "image": null, "price": null},
            "images": []
        });
        let (launcher, state) = FakeLauncher::returning(snapshot);
        let browser = SessionManager::with_launcher(BrowserConfig::default(), Box::new(launcher));

        let url = format!("https://www.facebook.com/marketplace/item/{ID}/");
        let fields = scrape(&browser, &url).await.unwrap();
        assert_eq!(fields.title.as_deref(), Some("Trek Marlin 5"));
        assert_eq!(browser.active_sessions(), 0);
        assert_eq!(state.contexts_closed.load(Ordering::SeqCst), 1);
        assert_eq!(state.navigations.lock().unwrap().as_slice(), [url.clone()]);
    }

    #[tokio::test]
    async fn test_scrape_releases_context_on_navigation_error() {
        let (launcher, state) = FakeLauncher::returning(json!({}));
        state.fail_navigation.store(true, Ordering::SeqCst);
        let browser = SessionManager::with_launcher(BrowserConfig::default(), Box::new(launcher));

        let err = scrape(&browser, &format!("https://www.facebook.com/marketplace/item/{ID}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Transport(_)));
        assert_eq!(browser.active_sessions(), 0);
        assert_eq!(state.contexts_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_id_never_opens_a_context() {
        let (launcher, state) = FakeLauncher::returning(json!({}));
        let browser = SessionManager::with_launcher(BrowserConfig::default(), Box::new(launcher));

        let err = scrape(&browser, "https://www.facebook.com/marketplace/item/abc/")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailed { .. }));
        assert_eq!(state.launches.load(Ordering::SeqCst), 0);
    }
}
