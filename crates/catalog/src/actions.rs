//! Idempotent catalog operations.
//!
//! Every function takes an executor rather than a concrete handle, so a
//! body written once runs against the pool, a plain connection, or a
//! transaction as the caller requires.

use crate::error::CatalogResult;
use crate::filter::FilterQuery;
use crate::models::{Build, Candidate, ContentMetadata, HeaderRecord};
use arkive_core::{FileFlags, sanitize_base_url};
use sqlx::{Row, SqliteConnection, SqliteExecutor};

/// Insert servers that are not yet present. URLs are stored with trailing
/// slashes stripped. Returns the number of new rows.
pub async fn merge_servers<'e, E>(exec: E, servers: &[String]) -> CatalogResult<u64>
where
    E: SqliteExecutor<'e>,
{
    if servers.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["(?)"; servers.len()].join(", ");
    let sql = format!("INSERT OR IGNORE INTO servers (url) VALUES {placeholders}");
    let mut query = sqlx::query(&sql);
    for server in servers {
        query = query.bind(sanitize_base_url(server));
    }
    let result = query.execute(exec).await?;
    Ok(result.rows_affected())
}

/// Insert file names that are not yet present. Returns the number of new
/// rows.
pub async fn merge_filenames<'e, E>(exec: E, names: &[String]) -> CatalogResult<u64>
where
    E: SqliteExecutor<'e>,
{
    if names.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["(?)"; names.len()].join(", ");
    let sql = format!("INSERT OR IGNORE INTO filenames (name) VALUES {placeholders}");
    let mut query = sqlx::query(&sql);
    for name in names {
        query = query.bind(name);
    }
    let result = query.execute(exec).await?;
    Ok(result.rows_affected())
}

/// All known server URLs.
pub async fn get_servers<'e, E>(exec: E) -> CatalogResult<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    Ok(sqlx::query_scalar("SELECT url FROM servers")
        .fetch_all(exec)
        .await?)
}

/// All known file names.
pub async fn get_filenames<'e, E>(exec: E) -> CatalogResult<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    Ok(sqlx::query_scalar("SELECT name FROM filenames")
        .fetch_all(exec)
        .await?)
}

/// Insert a build and associate it with the advertising server. Returns
/// whether the build row itself was new. A duplicate association raises a
/// unique-constraint error, which repeat discovery swallows.
pub async fn add_build(
    conn: &mut SqliteConnection,
    server: &str,
    build: &Build,
) -> CatalogResult<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO builds (hash, type, time, version) VALUES (?, ?, ?, ?)")
        .bind(&build.hash)
        .bind(&build.build_type)
        .bind(build.time)
        .bind(&build.version)
        .execute(&mut *conn)
        .await?;
    let inserted = result.rows_affected() > 0;

    sqlx::query(
        "INSERT INTO build_servers (server, build) \
         VALUES ((SELECT rowid FROM servers WHERE url == ?), (SELECT rowid FROM builds WHERE hash == ?))",
    )
    .bind(sanitize_base_url(server))
    .bind(&build.hash)
    .execute(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Insert the (build, filename) combinations not already present, at the
/// Unchecked state. Returns the number of new rows.
pub async fn generate_files<'e, E>(exec: E) -> CatalogResult<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO files (build, filename) \
         SELECT builds.rowid, filenames.rowid FROM filenames, builds",
    )
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Select up to `limit` files eligible for the current run, each joined
/// with one server that advertises its build.
///
/// The inner join enumerates every (file x hosting server); the outer
/// `GROUP BY` collapses a file advertised by several servers to a single
/// row. A file is eligible when Unchecked; in content mode additionally
/// when neither NotFound nor HasContent; with `recheck` additionally when
/// NotFound.
pub async fn select_candidates<'e, E>(
    exec: E,
    filter: &FilterQuery,
    recheck: bool,
    content: bool,
    limit: i64,
) -> CatalogResult<Vec<Candidate>>
where
    E: SqliteExecutor<'e>,
{
    let mut sql = String::from(
        "WITH temp AS (
            SELECT files.rowid AS id, files.flags AS flags,
                   servers.url AS _server, builds.hash AS _build, filenames.name AS _file
            FROM files, servers, builds, filenames, build_servers
            WHERE files.build == builds.rowid
            AND files.filename == filenames.rowid
            AND files.build == build_servers.build
            AND build_servers.server == servers.rowid
            AND ( files.flags == 0",
    );
    if recheck {
        sql.push_str(&format!(
            " OR files.flags & {} != 0",
            FileFlags::NOT_FOUND.bits()
        ));
    }
    if content {
        sql.push_str(&format!(
            " OR files.flags & {} == 0",
            (FileFlags::NOT_FOUND | FileFlags::HAS_CONTENT).bits()
        ));
    }
    sql.push_str(" )");
    if !filter.is_empty() {
        sql.push(' ');
        sql.push_str(filter.expr());
    }
    sql.push_str("\n            LIMIT ?\n        ) SELECT * FROM temp GROUP BY _build, _file");

    let mut query = sqlx::query(&sql);
    for param in filter.params() {
        query = query.bind(param);
    }
    query = query.bind(limit);

    let rows = query.fetch_all(exec).await?;
    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        candidates.push(Candidate {
            id: row.try_get("id")?,
            flags: FileFlags::from_bits(row.try_get("flags")?),
            server: row.try_get("_server")?,
            build: row.try_get("_build")?,
            file: row.try_get("_file")?,
        });
    }
    Ok(candidates)
}

/// Overwrite a file's lifecycle flags.
pub async fn update_file_flags<'e, E>(exec: E, file: i64, flags: FileFlags) -> CatalogResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE files SET flags = ? WHERE rowid = ?")
        .bind(flags.bits())
        .bind(file)
        .execute(exec)
        .await?;
    Ok(())
}

/// Upsert the full header row for a file.
pub async fn upsert_header<'e, E>(exec: E, file: i64, header: &HeaderRecord) -> CatalogResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO headers (file, status, content_length, last_modified, content_type, etag) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (file) DO UPDATE SET \
             status = excluded.status, \
             content_length = excluded.content_length, \
             last_modified = excluded.last_modified, \
             content_type = excluded.content_type, \
             etag = excluded.etag",
    )
    .bind(file)
    .bind(i64::from(header.status))
    .bind(header.content_length)
    .bind(header.last_modified)
    .bind(&header.content_type)
    .bind(&header.etag)
    .execute(exec)
    .await?;
    Ok(())
}

/// Upsert a status-only header row for a file, clearing any other columns.
pub async fn upsert_header_status<'e, E>(exec: E, file: i64, status: u16) -> CatalogResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO headers (file, status) VALUES (?, ?) \
         ON CONFLICT (file) DO UPDATE SET \
             status = excluded.status, \
             content_length = NULL, \
             last_modified = NULL, \
             content_type = NULL, \
             etag = NULL",
    )
    .bind(file)
    .bind(i64::from(status))
    .execute(exec)
    .await?;
    Ok(())
}

/// Upsert the metadata row for a file.
pub async fn upsert_metadata<'e, E>(
    exec: E,
    file: i64,
    metadata: &ContentMetadata,
) -> CatalogResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO metadata (file, size, md5) VALUES (?, ?, ?) \
         ON CONFLICT (file) DO UPDATE SET size = excluded.size, md5 = excluded.md5",
    )
    .bind(file)
    .bind(metadata.size)
    .bind(&metadata.md5)
    .execute(exec)
    .await?;
    Ok(())
}

/// MD5 hashes of stored objects that are package manifests, judged by
/// their filename.
pub async fn find_manifest_hashes<'e, E>(exec: E) -> CatalogResult<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    Ok(sqlx::query_scalar(
        "SELECT metadata.md5 FROM metadata, files, filenames \
         WHERE metadata.file == files.rowid \
         AND files.filename == filenames.rowid \
         AND filenames.name LIKE 'rbxPkgManifest%'",
    )
    .fetch_all(exec)
    .await?)
}
