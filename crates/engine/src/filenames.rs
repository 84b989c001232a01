//! Filename discovery from stored package manifests.

use crate::error::EngineResult;
use arkive_catalog::{actions, Catalog};
use arkive_core::manifest;
use arkive_objects::ObjectStore;
use std::collections::HashSet;
use tracing::warn;

/// Scan stored package-manifest objects for file names the catalog does
/// not know yet. Returns each novel name once, in discovery order; the
/// catalog is not modified. Objects that are missing or fail to decode
/// are logged and skipped.
pub async fn find_new_filenames(
    catalog: &Catalog,
    store: &ObjectStore,
) -> EngineResult<Vec<String>> {
    let mut seen: HashSet<String> = actions::get_filenames(catalog.pool())
        .await?
        .into_iter()
        .collect();
    let hashes = actions::find_manifest_hashes(catalog.pool()).await?;

    let mut novel = Vec::new();
    for hash in hashes {
        let Some(path) = store.path(&hash) else {
            warn!(%hash, "invalid manifest hash");
            continue;
        };
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%hash, error = %err, "read manifest object failed");
                continue;
            }
        };
        let entries = match manifest::decode(&text) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%hash, error = %err, "decode manifest failed");
                continue;
            }
        };
        for entry in entries {
            if seen.insert(entry.name.clone()) {
                novel.push(entry.name);
            }
        }
    }
    Ok(novel)
}
