//! Cache command - manage the persistent compiler cache

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::compile::{DiskStore, StoreEntry};
use crate::config::Config;
use crate::error::TrellisResult;
use crate::ui::{self, UiContext};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> TrellisResult<()> {
    let store = DiskStore::new(config.compiler_cache_dir());

    match args.action {
        CacheAction::Path => println!("{}", store.dir().display()),
        CacheAction::List { format } => list_entries(&store, format).await?,
        CacheAction::Clear => clear_entries(&store).await?,
    }

    Ok(())
}

async fn list_entries(store: &DiskStore, format: OutputFormat) -> TrellisResult<()> {
    let entries = store.list().await?;

    match format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
    }

    Ok(())
}

fn print_table(entries: &[StoreEntry]) {
    if entries.is_empty() {
        println!("Compiler cache is empty.");
        return;
    }

    println!("{:<40} {:<17} {:>9}  {}", "FILE", "COMPILED", "SIZE", "KEY");
    println!("{}", "-".repeat(90));
    for entry in entries {
        println!(
            "{:<40} {:<17} {:>9}  {}",
            entry.filename,
            entry.compiled_at.format("%Y-%m-%d %H:%M"),
            format_size(entry.size_bytes),
            short_key(&entry.key)
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!("Total: {} artifact(s), {}", entries.len(), format_size(total));
}

fn print_json(entries: &[StoreEntry]) -> TrellisResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        key: &'a str,
        filename: &'a str,
        compiled_at: String,
        size_bytes: u64,
    }

    let rows: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            key: &e.key,
            filename: &e.filename,
            compiled_at: e.compiled_at.to_rfc3339(),
            size_bytes: e.size_bytes,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn clear_entries(store: &DiskStore) -> TrellisResult<()> {
    let ctx = UiContext::detect();
    let removed = store.clear().await?;

    if removed == 0 {
        ui::step_info(&ctx, "Compiler cache already empty");
    } else {
        ui::step_ok_detail(
            &ctx,
            &format!("Removed {} artifact(s)", removed),
            &store.dir().display().to_string(),
        );
    }
    Ok(())
}

/// Digest keys are long; the first 12 hex digits identify them in practice
fn short_key(key: &str) -> &str {
    let digest = key.rsplit('-').next().unwrap_or(key);
    digest.get(..12).unwrap_or(digest)
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_strips_prefix() {
        assert_eq!(short_key("compiler-cache-0123456789abcdef"), "0123456789ab");
        assert_eq!(short_key("abc"), "abc");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
