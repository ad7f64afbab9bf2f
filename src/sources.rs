use anyhow::Result;

use crate::config::Config;

/// `sdx sources`: configured adapters, whether they sync, and their item types.
pub fn list_sources(config: &Config) -> Result<()> {
    if config.adapters.is_empty() {
        println!("No adapters configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<24} ITEM TYPES",
        "DOCTYPE", "STATUS", "TABLE"
    );
    for (name, adapter) in &config.adapters {
        let status = if config.sync.disabled.iter().any(|d| d == name) {
            "disabled"
        } else {
            "enabled"
        };
        let items: Vec<String> = adapter
            .item_types(name)
            .into_iter()
            .map(|item| match item.where_clause {
                Some(w) => format!("{} ({})", item.item_type, w),
                None => item.item_type,
            })
            .collect();
        println!(
            "{:<16} {:<10} {:<24} {}",
            name,
            status,
            adapter.table,
            items.join(", ")
        );
    }

    Ok(())
}
