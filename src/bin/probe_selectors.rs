//! Runs the selector chains against a saved page and prints what matched.
//!
//! ```text
//! probe_selectors search saved_results.html
//! probe_selectors detail saved_product.html https://www.tokopedia.com
//! ```

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::fs;

use product_scout::models::Site;
use product_scout::parsers::SelectorHits;
use product_scout::scrapers::{looks_blocked, parse_detail_fields, scan_cards};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, path) = match args.as_slice() {
        [mode, path, ..] => (mode.as_str(), path.as_str()),
        _ => bail!("usage: probe_selectors search|detail <file> [base_url]"),
    };
    let site = match args.get(2) {
        Some(base) => Site::new(base)?,
        None => Site::default(),
    };

    let html = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    println!("Loaded {} bytes from {}", html.len(), path);
    if looks_blocked(&html) {
        println!("WARNING: page looks like a captcha or block page");
    }

    let report = match mode {
        "search" => {
            let scan = scan_cards(&html, &site);
            println!(
                "Card locator: {}",
                scan.card_strategy
                    .map_or_else(|| "none matched".to_string(), |i| format!("strategy {i}"))
            );
            println!("Found {} product cards", scan.cards.len());
            serde_json::to_value(&scan)?
        }
        "detail" => {
            let hits = SelectorHits::new();
            let fields = parse_detail_fields(&html, &site, Some(&hits));
            let strategies: serde_json::Map<String, serde_json::Value> = hits
                .snapshot()
                .into_keys()
                .map(|(chain, strategy)| (chain.to_string(), json!(strategy)))
                .collect();
            json!({ "fields": fields, "strategies": strategies })
        }
        other => bail!("unknown mode '{other}', expected search or detail"),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
