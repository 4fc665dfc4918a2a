//! `talewright parse`: Parse a model reply against a callback file.

use std::io::Read;
use std::path::Path;

pub async fn run(callbacks: &Path, reply: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = super::load_registry(callbacks)?;

    let text = if reply == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(reply).map_err(|e| format!("Failed to read reply {reply}: {e}"))?
    };

    let outcome = registry.parse(&text);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
