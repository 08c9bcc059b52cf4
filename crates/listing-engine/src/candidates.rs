//! Candidate scoring for script-embedded listing payloads.
//!
//! A listing page ships its data split across several serialized relay
//! payloads, some of which describe other listings (recommendations,
//! similar items). Each payload that mentions the listing id becomes a
//! [`Candidate`]; candidates are scored, the best one becomes the primary,
//! and gaps in it are filled from near-best candidates.

use crate::patterns::parse_price_opt;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Scripts shorter than this never carry listing data.
pub const MIN_SCRIPT_LEN: usize = 200;
/// Marker present in every serialized relay payload.
pub const PAYLOAD_MARKER: &str = "__bbox";
/// At most this many fragments are considered per page.
pub const MAX_FRAGMENTS: usize = 10;
/// Fragments are truncated to this many bytes.
pub const MAX_FRAGMENT_LEN: usize = 300_000;

/// Score weights.
pub mod weights {
    /// The payload's share link names this listing.
    pub const ANCHOR: i32 = 6;
    pub const TITLE: i32 = 3;
    pub const PRICE: i32 = 3;
    pub const LOCATION: i32 = 2;
    pub const CONDITION: i32 = 1;
    pub const LONG_DESCRIPTION: i32 = 2;
    pub const SHORT_DESCRIPTION: i32 = 1;
    pub const LIVE: i32 = 2;
    pub const SOLD: i32 = -6;
    pub const PENDING: i32 = -3;
    pub const LARGE_PAYLOAD: i32 = 1;

    pub const LONG_DESCRIPTION_CHARS: usize = 120;
    pub const SHORT_DESCRIPTION_CHARS: usize = 40;
    pub const LARGE_PAYLOAD_CHARS: usize = 200_000;

    /// Candidates within this many points of the best are merged.
    pub const MERGE_MARGIN: i32 = 4;
    /// A secondary description replaces the current one when longer by more
    /// than this many characters.
    pub const DESCRIPTION_SWAP_CHARS: usize = 30;
}

/// Explicit lifecycle flags; `None` when the payload says nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleFlags {
    pub is_live: Option<bool>,
    pub is_sold: Option<bool>,
    pub is_pending: Option<bool>,
}

impl LifecycleFlags {
    /// Unavailable only on an explicit not-live, sold or pending flag.
    pub fn available(&self) -> bool {
        self.is_live != Some(false) && self.is_sold != Some(true) && self.is_pending != Some(true)
    }
}

/// Fields recovered from one payload fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    /// Discovery position; earlier fragments win exact score ties.
    pub ordinal: usize,
    pub title: Option<String>,
    pub price_text: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub share_uri: Option<String>,
    pub lifecycle: LifecycleFlags,
    /// Whether `share_uri` contains the listing id.
    pub anchor_match: bool,
    pub payload_size: usize,
}

impl Candidate {
    fn has_content(&self) -> bool {
        self.title.is_some()
            || self.price_text.is_some()
            || self.location.is_some()
            || self.description.is_some()
            || self.condition.is_some()
    }

    fn has_price(&self) -> bool {
        self.price.is_some_and(|p| p != 0.0)
    }
}

/// A candidate with its score, as ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub candidate: Candidate,
    pub score: i32,
}

/// Result of merging the margin set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedListing {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub share_uri: Option<String>,
    pub lifecycle: LifecycleFlags,
    pub available: bool,
}

// ── Field patterns ──────────────────────────────────────────────────────────

struct FieldPatterns {
    title: [Regex; 2],
    price: [Regex; 2],
    location: Regex,
    description: [Regex; 2],
    is_live: Regex,
    is_sold: Regex,
    is_pending: Regex,
    condition: Regex,
    share_uri: Regex,
}

/// JSON string body, honouring backslash escapes.
const JSON_STR: &str = r#"((?:[^"\\]|\\.)+)"#;

fn patterns() -> &'static FieldPatterns {
    static PATTERNS: OnceLock<FieldPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: String| Regex::new(&p).expect("payload regex is valid");
        FieldPatterns {
            title: [
                re(format!(r#""marketplace_listing_title":"{JSON_STR}""#)),
                re(format!(r#""base_marketplace_listing_title":"{JSON_STR}""#)),
            ],
            price: [
                re(r#""listing_price":\{[^}]*"amount":"([^"]+)""#.to_string()),
                re(r#""formatted_amount_zeros_stripped":"([^"]+)""#.to_string()),
            ],
            location: re(format!(r#""location_text":\{{"text":"{JSON_STR}""#)),
            description: [
                re(r#"(?s)"redacted_description":\{"text":"(.*?)"\}"#.to_string()),
                re(r#"(?s)"description":\{"text":"(.*?)"\}"#.to_string()),
            ],
            is_live: re(r#""is_live":(true|false)"#.to_string()),
            is_sold: re(r#""is_sold":(true|false)"#.to_string()),
            is_pending: re(r#""is_pending":(true|false)"#.to_string()),
            condition: re(
                format!(r#""attribute_name":"Condition"[^}}]*"label":"{JSON_STR}""#),
            ),
            share_uri: re(format!(r#""share_uri":"{JSON_STR}""#)),
        }
    })
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| decode_json_string(m.as_str()))
        .filter(|s| !s.trim().is_empty())
}

fn capture_first(res: &[Regex], text: &str) -> Option<String> {
    res.iter().find_map(|re| capture(re, text))
}

fn capture_flag(re: &Regex, text: &str) -> Option<bool> {
    re.captures(text).map(|c| &c[1] == "true")
}

/// Decode JSON escapes (`\"`, `\n`, `\/`, `\uXXXX`) in a captured string
/// body. Bodies that are not valid JSON are returned as-is.
pub fn decode_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Apply the payload filter: long enough, a relay payload, mentions the id.
/// Keeps at most [`MAX_FRAGMENTS`], each truncated to [`MAX_FRAGMENT_LEN`].
pub fn filter_fragments<'a>(
    scripts: impl IntoIterator<Item = &'a str>,
    listing_id: &str,
) -> Vec<&'a str> {
    scripts
        .into_iter()
        .filter(|s| s.len() > MIN_SCRIPT_LEN)
        .filter(|s| s.contains(PAYLOAD_MARKER) && s.contains(listing_id))
        .take(MAX_FRAGMENTS)
        .map(|s| truncate_at_char_boundary(s, MAX_FRAGMENT_LEN))
        .collect()
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Read one fragment. `None` when it carries none of the content fields.
pub fn parse_fragment(ordinal: usize, text: &str, listing_id: &str) -> Option<Candidate> {
    let p = patterns();
    let price_text = capture_first(&p.price, text);
    let share_uri = capture(&p.share_uri, text);

    let candidate = Candidate {
        ordinal,
        title: capture_first(&p.title, text),
        price: price_text.as_deref().and_then(parse_price_opt),
        price_text,
        location: capture(&p.location, text),
        description: capture_first(&p.description, text),
        condition: capture(&p.condition, text),
        anchor_match: share_uri.as_deref().is_some_and(|u| u.contains(listing_id)),
        share_uri,
        lifecycle: LifecycleFlags {
            is_live: capture_flag(&p.is_live, text),
            is_sold: capture_flag(&p.is_sold, text),
            is_pending: capture_flag(&p.is_pending, text),
        },
        payload_size: text.len(),
    };
    candidate.has_content().then_some(candidate)
}

/// Candidates in discovery order, from fragments already passed through
/// [`filter_fragments`].
pub fn extract_candidates<'a>(
    fragments: impl IntoIterator<Item = &'a str>,
    listing_id: &str,
) -> Vec<Candidate> {
    fragments
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| parse_fragment(i, text, listing_id))
        .collect()
}

/// Pure score of one candidate.
pub fn score(c: &Candidate) -> i32 {
    use self::weights::*;

    let mut s = 0;
    if c.anchor_match {
        s += ANCHOR;
    }
    if c.title.is_some() {
        s += TITLE;
    }
    if c.price.is_some() {
        s += PRICE;
    }
    if c.location.is_some() {
        s += LOCATION;
    }
    if c.condition.is_some() {
        s += CONDITION;
    }

    let description_len = c.description.as_deref().map_or(0, |d| d.chars().count());
    if description_len > LONG_DESCRIPTION_CHARS {
        s += LONG_DESCRIPTION;
    } else if description_len > SHORT_DESCRIPTION_CHARS {
        s += SHORT_DESCRIPTION;
    }

    let flags = c.lifecycle;
    if flags.is_live == Some(true) {
        s += LIVE;
    }
    if flags.is_sold == Some(true) {
        s += SOLD;
    }
    if flags.is_pending == Some(true) {
        s += PENDING;
    }
    if c.payload_size > LARGE_PAYLOAD_CHARS {
        s += LARGE_PAYLOAD;
    }
    s
}

/// Score and sort descending. Ties keep discovery order.
pub fn rank(candidates: Vec<Candidate>) -> Vec<Scored> {
    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .map(|candidate| Scored {
            score: score(&candidate),
            candidate,
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.candidate.ordinal.cmp(&b.candidate.ordinal))
    });
    scored
}

/// Primary plus every candidate within [`weights::MERGE_MARGIN`] of it.
pub fn margin_set(ranked: &[Scored]) -> &[Scored] {
    let Some(best) = ranked.first() else {
        return ranked;
    };
    let floor = best.score - weights::MERGE_MARGIN;
    let end = ranked
        .iter()
        .position(|s| s.score < floor)
        .unwrap_or(ranked.len());
    &ranked[..end]
}

/// Fill the primary's gaps from the rest of the margin set, in rank order.
pub fn merge(margin: &[Scored]) -> Option<MergedListing> {
    let (primary, rest) = margin.split_first()?;
    let p = &primary.candidate;

    let mut out = MergedListing {
        title: p.title.clone(),
        price: p.price.filter(|_| p.has_price()),
        location: p.location.clone(),
        description: p.description.clone(),
        condition: p.condition.clone(),
        share_uri: p.share_uri.clone(),
        lifecycle: p.lifecycle,
        available: true,
    };

    for Scored { candidate: c, .. } in rest {
        fill(&mut out.title, &c.title);
        if out.price.is_none() && c.has_price() {
            out.price = c.price;
        }
        fill(&mut out.location, &c.location);
        fill(&mut out.condition, &c.condition);
        fill(&mut out.share_uri, &c.share_uri);

        match (&out.description, &c.description) {
            (None, Some(d)) => out.description = Some(d.clone()),
            (Some(cur), Some(d))
                if d.chars().count() > cur.chars().count() + weights::DESCRIPTION_SWAP_CHARS =>
            {
                out.description = Some(d.clone());
            }
            _ => {}
        }

        let flags = &mut out.lifecycle;
        flags.is_live = flags.is_live.or(c.lifecycle.is_live);
        flags.is_sold = flags.is_sold.or(c.lifecycle.is_sold);
        flags.is_pending = flags.is_pending.or(c.lifecycle.is_pending);
    }

    out.available = out.lifecycle.available();
    Some(out)
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// Full pipeline: parse, rank, merge.
pub fn best_listing<'a>(
    fragments: impl IntoIterator<Item = &'a str>,
    listing_id: &str,
) -> Option<MergedListing> {
    let ranked = rank(extract_candidates(fragments, listing_id));
    let best = ranked.first()?;
    let margin = margin_set(&ranked);
    debug!(
        candidates = ranked.len(),
        top_score = best.score,
        merged = margin.len(),
        "ranked payload candidates"
    );
    merge(margin)
}
