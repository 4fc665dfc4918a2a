//! `talewright callbacks`: Print the instruction block for a callback file.

use std::path::Path;

pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let registry = super::load_registry(path)?;
    println!("{}", registry.render());
    Ok(())
}
