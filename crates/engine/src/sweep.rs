//! The batched fetch-commit loop.
//!
//! Each round selects a batch of candidate files, fans the probes out
//! across the fetcher's workers, then commits every resulting state
//! transition in one transaction. The loop ends when a selection comes
//! back empty. Nothing counts as done until its transaction commits, so
//! an interrupted run reselects the same candidates next time.

use crate::error::{EngineError, EngineResult};
use crate::stats::Stats;
use arkive_catalog::{actions, Catalog, ContentMetadata, FilterQuery, HeaderRecord};
use arkive_core::{build_file_url, FileFlags};
use arkive_fetch::{ContentOutcome, Fetcher, InflightSet};
use arkive_objects::{ObjectStore, ObjectWriter};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use std::sync::Arc;
use time::macros::format_description;
use time::PrimitiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Batch size used when the caller passes 0.
pub const DEFAULT_BATCH: usize = 256;

/// Fetch-commit loop configuration.
pub struct SweepOptions {
    /// Object store for content mode; `None` fetches headers only.
    pub objects: Option<ObjectStore>,
    /// Also re-probe files previously marked NotFound.
    pub recheck: bool,
    /// Files fetched per commit; 0 selects [`DEFAULT_BATCH`].
    pub batch: usize,
}

/// What one probe decided about its file.
struct FileUpdate {
    status: u16,
    flags: FileFlags,
    header: HeaderAction,
    metadata: Option<ContentMetadata>,
}

enum HeaderAction {
    /// Upsert the full header row.
    Full(HeaderRecord),
    /// Upsert a status-only row, clearing other columns.
    StatusOnly,
    /// Leave the headers table untouched.
    None,
}

/// Run the fetch-commit loop until no candidates remain.
pub async fn run_sweep(
    catalog: &Catalog,
    fetcher: &Fetcher,
    cancel: &CancellationToken,
    filter: &FilterQuery,
    options: &SweepOptions,
    stats: &mut Stats,
) -> EngineResult<()> {
    let limit = if options.batch == 0 { DEFAULT_BATCH } else { options.batch };
    let content_mode = options.objects.is_some();

    loop {
        let candidates = actions::select_candidates(
            catalog.pool(),
            filter,
            options.recheck,
            content_mode,
            limit as i64,
        )
        .await?;
        if candidates.is_empty() {
            return Ok(());
        }
        info!(count = candidates.len(), "fetching files");

        // Shared by every worker of this batch; deduplicates content
        // downloads within it.
        let inflight = Arc::new(InflightSet::new());
        let mut slots = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let fetcher = fetcher.clone();
            let cancel = cancel.clone();
            let inflight = inflight.clone();
            let objects = options.objects.clone();
            let url = build_file_url(&candidate.server, &candidate.build, &candidate.file);
            let flags = candidate.flags;
            slots.push(tokio::spawn(async move {
                fetch_one(&fetcher, &cancel, objects.as_ref(), &inflight, &url, flags).await
            }));
        }

        // Responses associate with requests by slot index, not arrival
        // order.
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = slot
                .await
                .map_err(|err| EngineError::Worker(err.to_string()))?;
            outcomes.push(outcome);
        }

        let mut tx = catalog.begin().await?;
        info!(count = outcomes.len(), "committing files");
        for (outcome, candidate) in outcomes.into_iter().zip(&candidates) {
            let update = match outcome {
                Ok(update) => update,
                Err(err) => {
                    stats.record(0);
                    // Dropping the transaction discards the batch; the
                    // next run reselects these candidates.
                    return Err(err);
                }
            };
            stats.record(update.status);

            actions::update_file_flags(&mut *tx, candidate.id, update.flags).await?;
            match &update.header {
                HeaderAction::Full(record) => {
                    actions::upsert_header(&mut *tx, candidate.id, record).await?;
                }
                HeaderAction::StatusOnly => {
                    actions::upsert_header_status(&mut *tx, candidate.id, update.status).await?;
                }
                HeaderAction::None => {}
            }
            if let Some(metadata) = &update.metadata {
                actions::upsert_metadata(&mut *tx, candidate.id, metadata).await?;
            }
        }
        tx.commit().await?;
        debug!(count = candidates.len(), "committed files");
    }
}

/// Probe one file and classify the response.
async fn fetch_one(
    fetcher: &Fetcher,
    cancel: &CancellationToken,
    objects: Option<&ObjectStore>,
    inflight: &InflightSet,
    url: &str,
    prior: FileFlags,
) -> EngineResult<FileUpdate> {
    let mut writer = objects.map(|store| ObjectWriter::new(store.root()));
    let (status, headers, outcome) = fetcher
        .fetch_content(cancel, url, objects, inflight, writer.as_mut())
        .await?;

    if status.is_success() {
        let record = header_record(status, &headers);
        let mut flags = prior
            .without(FileFlags::NOT_FOUND)
            .with(FileFlags::EXISTS | FileFlags::HAS_HEADERS);
        let mut metadata = None;

        if let (Some(store), Some(writer)) = (objects, writer) {
            match outcome {
                ContentOutcome::Streamed => {
                    // This call owns the downloaded bytes.
                    let mut writer = writer;
                    if let Some(length) = record.content_length {
                        if length >= 0 {
                            writer.expect_size(length as u64);
                        }
                    }
                    let (size, hash) = writer.finalize().await?;
                    debug!(url, %hash, size, "stored object");
                    metadata = Some(ContentMetadata {
                        size: size as i64,
                        md5: hash,
                    });
                    flags |= FileFlags::HAS_METADATA | FileFlags::HAS_CONTENT;
                }
                ContentOutcome::Stored(hash) => {
                    // Deduplicated against an earlier run or batch: reuse
                    // the object already on disk.
                    writer.remove().await?;
                    match store.stat(&hash).await {
                        Some(meta) => {
                            debug!(url, hash = %meta.name, "reused stored object");
                            metadata = Some(ContentMetadata {
                                size: meta.size as i64,
                                md5: meta.name,
                            });
                            flags |= FileFlags::HAS_METADATA | FileFlags::HAS_CONTENT;
                        }
                        None => {
                            debug!(url, %hash, "stored object disappeared, deferring");
                        }
                    }
                }
                ContentOutcome::InFlight(hash) => {
                    // Another worker in this batch owns the download and
                    // may not have finalized yet. Record the headers only;
                    // the file stays a content candidate and a later round
                    // completes it from the stored object.
                    writer.remove().await?;
                    debug!(url, %hash, "download owned by another worker, deferring");
                }
                ContentOutcome::Discarded => {
                    writer.remove().await?;
                }
            }
        }

        debug!(url, status = status.as_u16(), "fetched");
        return Ok(FileUpdate {
            status: status.as_u16(),
            flags,
            header: HeaderAction::Full(record),
            metadata,
        });
    }

    if let Some(writer) = writer {
        writer.remove().await?;
    }

    if status == StatusCode::FORBIDDEN {
        // The modal "does not exist at this URL" signal. No header row:
        // storing the overwhelmingly common case would bloat the catalog.
        debug!(url, "file not found");
        Ok(FileUpdate {
            status: status.as_u16(),
            flags: prior.with(FileFlags::NOT_FOUND),
            header: HeaderAction::None,
            metadata: None,
        })
    } else {
        // Unexpected status: keep it for review.
        debug!(url, status = status.as_u16(), "unexpected status");
        Ok(FileUpdate {
            status: status.as_u16(),
            flags: prior.with(FileFlags::NOT_FOUND | FileFlags::HAS_HEADERS),
            header: HeaderAction::StatusOnly,
            metadata: None,
        })
    }
}

const HTTP_DATE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Parse an RFC1123 `Last-Modified` value into Unix seconds.
fn parse_http_date(value: &str) -> Option<i64> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}

fn header_record(status: StatusCode, headers: &HeaderMap) -> HeaderRecord {
    let text = |name| {
        headers
            .get(name)
            .and_then(|value: &reqwest::header::HeaderValue| value.to_str().ok())
    };
    HeaderRecord {
        status: status.as_u16(),
        content_length: text(CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        last_modified: text(LAST_MODIFIED).and_then(parse_http_date),
        content_type: text(CONTENT_TYPE).map(str::to_string),
        etag: text(ETAG).map(str::to_string),
    }
}
