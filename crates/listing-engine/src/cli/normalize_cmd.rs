//! `listing normalize <file|->`

use anyhow::{Context, Result};
use listing_engine::{normalize, CanonicalItem, RawFields};
use std::io::Read;

pub fn run(input: &str) -> Result<()> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };

    let item = normalize_text(&text)?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub fn normalize_text(text: &str) -> Result<CanonicalItem> {
    let raw: RawFields = serde_json::from_str(text).context("input is not a JSON field set")?;
    Ok(normalize(&raw))
}
