//! `listing extract <url>`

use anyhow::Result;
use listing_engine::{CanonicalItem, Engine, EngineConfig};

pub async fn run(config: EngineConfig, url: &str, json: bool) -> Result<()> {
    let engine = Engine::new(config);
    let outcome = engine.extract_with_report(url).await;
    engine.shutdown().await;

    let (item, warning) = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        print!("{}", render(&item));
        if let Some(w) = warning {
            println!("\n({w})");
        }
    }
    Ok(())
}

/// Plain-text rendering of a record.
pub fn render(item: &CanonicalItem) -> String {
    let dash = |v: Option<&str>| v.unwrap_or("-").to_string();
    let mut out = String::new();
    out.push_str(&format!("Title:       {}\n", item.title));
    out.push_str(&format!("Price:       ${:.2}\n", item.price));
    out.push_str(&format!(
        "Condition:   {}\n",
        dash(item.condition.as_ref().map(|c| c.as_str()))
    ));
    out.push_str(&format!("Location:    {}\n", dash(item.location.as_deref())));
    out.push_str(&format!(
        "Available:   {}\n",
        if item.available { "yes" } else { "no" }
    ));
    out.push_str(&format!("Images:      {}\n", item.image_links.len()));
    if let Some(d) = &item.description {
        out.push_str(&format!("\n{d}\n"));
    }
    out
}
