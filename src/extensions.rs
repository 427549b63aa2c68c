use anyhow::{bail, Result};

use crate::engine::QueryEngine;
use crate::models::normalize_extension;

/// CLI entry point for `cq extensions [--add <ext>...]`.
///
/// Adds the given extensions, then prints the full forbidden set.
pub async fn run_extensions(engine: &QueryEngine, add: &[String]) -> Result<()> {
    for ext in add {
        if normalize_extension(ext).is_none() {
            bail!("Invalid extension: '{}'", ext);
        }
        engine.repository().add_forbidden_extension(ext).await?;
    }

    let extensions = engine.list_forbidden_extensions().await?;
    if extensions.is_empty() {
        println!("No forbidden extensions.");
        return Ok(());
    }

    println!("{:<12}", "EXTENSION");
    for ext in &extensions {
        println!("{:<12}", ext);
    }

    Ok(())
}
