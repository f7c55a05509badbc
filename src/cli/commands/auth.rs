//! `check-auth` command: verify a source is ready, logging in when
//! credentials are configured.

use console::style;

use crate::config::Settings;
use crate::sites::SiteRegistry;

pub async fn run(
    registry: &SiteRegistry,
    settings: &Settings,
    source_id: &str,
) -> anyhow::Result<()> {
    let adapter = registry
        .get(source_id)
        .ok_or_else(|| anyhow::anyhow!("Unknown source: {source_id}"))?;

    let (ok, message) = adapter.check_auth().await;
    if ok {
        println!("{} {}", style("✓").green(), message);
        return Ok(());
    }
    println!("{} {}", style("✗").red(), message);

    let credentials = settings.credentials_for(source_id);
    if credentials.email.is_empty() {
        if adapter.metadata().requires_auth {
            println!("No credentials configured for {source_id}");
        }
        return Ok(());
    }

    println!("Logging in as {}...", credentials.email);
    let (ok, message) = adapter.login(&credentials).await;
    if ok {
        println!("{} {}", style("✓").green(), message);
    } else {
        println!("{} {}", style("✗").red(), message);
    }
    Ok(())
}
