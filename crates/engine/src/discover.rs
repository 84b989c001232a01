//! Build discovery.
//!
//! Each server's deploy history is fetched and lexed, and the builds it
//! announces are inserted with their server association. One transaction
//! per server: a failing server never discards another server's work.

use crate::error::EngineResult;
use arkive_catalog::{actions, Build, Catalog};
use arkive_core::build_file_url;
use arkive_fetch::Fetcher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Discover builds from every server in the catalog. Transport failures
/// are logged and skipped; database errors other than unique-constraint
/// violations abort the run.
pub async fn discover_builds(
    catalog: &Catalog,
    fetcher: &Fetcher,
    cancel: &CancellationToken,
    deploy_history: &str,
) -> EngineResult<()> {
    let servers = actions::get_servers(catalog.pool()).await?;
    for server in servers {
        let url = build_file_url(&server, "", deploy_history);
        let records = match fetcher.fetch_deploy_history(cancel, &url).await {
            Ok(records) => records,
            Err(err) => {
                warn!(server = %server, error = %err, "get deploy history failed");
                continue;
            }
        };

        let mut builds: Vec<Build> = records.into_iter().map(Build::from).collect();
        builds.sort_by(|a, b| a.hash.cmp(&b.hash));
        builds.dedup();

        let mut tx = catalog.begin().await?;
        let mut count = 0u64;
        for build in &builds {
            match actions::add_build(&mut *tx, &server, build).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                // Repeat discovery: the association already exists.
                Err(err) if err.is_unique_violation() => {}
                Err(err) => return Err(err.into()),
            }
        }
        tx.commit().await?;
        info!(count, server = %server, "added new builds");
    }
    Ok(())
}
