//! `sites` command: list registered sources.

use console::style;

use crate::sites::SiteRegistry;

pub fn run(registry: &SiteRegistry) -> anyhow::Result<()> {
    for meta in registry.list() {
        let auth = if meta.requires_auth {
            style("auth required").yellow().to_string()
        } else {
            style("public").green().to_string()
        };
        println!(
            "{:<12} {:<28} {}  [{}]",
            style(meta.id).bold(),
            meta.name,
            auth,
            meta.asset_types.join(", ")
        );
    }
    Ok(())
}
