use super::print_json;
use frosty_core::pkg::CacheIndex;
use frosty_core::Config;
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct CacheEntry {
    name: String,
    specifier: String,
    path: PathBuf,
    exists: bool,
}

/// List every cache index entry.
pub fn list(config: &Config, json: bool) -> Result<()> {
    let index = CacheIndex::load(&config.cache_index_dir());
    let mut entries: Vec<CacheEntry> = index
        .modules()
        .flat_map(|(name, module)| {
            module.entries().map(move |(specifier, path)| CacheEntry {
                name: name.to_string(),
                specifier: specifier.to_string(),
                path: path.to_path_buf(),
                exists: path.is_dir(),
            })
        })
        .collect();
    entries.sort_by(|a, b| (&a.name, &a.specifier).cmp(&(&b.name, &b.specifier)));

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("Cache is empty ({})", index.root().display());
        return Ok(());
    }
    for entry in &entries {
        let stale = if entry.exists { "" } else { " (missing)" };
        println!(
            "{}@{} -> {}{stale}",
            entry.name,
            entry.specifier,
            entry.path.display()
        );
    }
    println!("\nTotal: {} entries", entries.len());
    Ok(())
}
