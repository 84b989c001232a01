//! End-to-end fetch-commit loop scenarios.

mod common;

use arkive_catalog::{actions, Catalog, FilterQuery};
use arkive_core::FileFlags;
use arkive_engine::{discover_builds, run_sweep, Stats, SweepOptions};
use arkive_fetch::Fetcher;
use arkive_objects::ObjectStore;
use common::{FakeResponse, FakeServer, TestCatalog};
use tokio_util::sync::CancellationToken;

const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

fn history_line(build_type: &str, hash: &str) -> String {
    format!("New {build_type} {hash} at 4/19/2019 1:14:29 PM, file version: 0, 384, 0, 296507\n")
}

async fn discover_and_generate(tc: &TestCatalog, servers: &[&FakeServer], filenames: &[&str]) {
    let urls: Vec<String> = servers.iter().map(|s| s.base_url.clone()).collect();
    let names: Vec<String> = filenames.iter().map(|s| s.to_string()).collect();
    actions::merge_servers(tc.catalog.pool(), &urls).await.unwrap();
    actions::merge_filenames(tc.catalog.pool(), &names).await.unwrap();

    let fetcher = Fetcher::new(4, -1.0);
    let cancel = CancellationToken::new();
    discover_builds(&tc.catalog, &fetcher, &cancel, "DeployHistory.txt")
        .await
        .unwrap();
    actions::generate_files(tc.catalog.pool()).await.unwrap();
}

async fn sweep(
    tc: &TestCatalog,
    content: bool,
    recheck: bool,
    batch: usize,
) -> Stats {
    let fetcher = Fetcher::new(4, -1.0);
    let cancel = CancellationToken::new();
    let options = SweepOptions {
        objects: content.then(|| ObjectStore::open(&tc.objects_root).unwrap()),
        recheck,
        batch,
    };
    let mut stats = Stats::new();
    run_sweep(
        &tc.catalog,
        &fetcher,
        &cancel,
        &FilterQuery::default(),
        &options,
        &mut stats,
    )
    .await
    .unwrap();
    stats
}

async fn file_flags(catalog: &Catalog, hash: &str, name: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT files.flags FROM files, builds, filenames \
         WHERE files.build == builds.rowid AND files.filename == filenames.rowid \
         AND builds.hash == ? AND filenames.name == ?",
    )
    .bind(hash)
    .bind(name)
    .fetch_one(catalog.pool())
    .await
    .unwrap()
}

async fn header_row(catalog: &Catalog, hash: &str, name: &str) -> Option<(i64, Option<i64>)> {
    sqlx::query_as(
        "SELECT headers.status, headers.content_length \
         FROM headers, files, builds, filenames \
         WHERE headers.file == files.rowid \
         AND files.build == builds.rowid AND files.filename == filenames.rowid \
         AND builds.hash == ? AND filenames.name == ?",
    )
    .bind(hash)
    .bind(name)
    .fetch_optional(catalog.pool())
    .await
    .unwrap()
}

async fn metadata_row(catalog: &Catalog, hash: &str, name: &str) -> Option<(i64, String)> {
    sqlx::query_as(
        "SELECT metadata.size, metadata.md5 \
         FROM metadata, files, builds, filenames \
         WHERE metadata.file == files.rowid \
         AND files.build == builds.rowid AND files.filename == filenames.rowid \
         AND builds.hash == ? AND filenames.name == ?",
    )
    .bind(hash)
    .bind(name)
    .fetch_optional(catalog.pool())
    .await
    .unwrap()
}

fn count_objects(root: &std::path::Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_dir() {
            count += std::fs::read_dir(entry.path()).unwrap().count();
        }
    }
    count
}

#[tokio::test]
async fn empty_run_succeeds() {
    let tc = TestCatalog::new().await;
    discover_and_generate(&tc, &[], &[]).await;
    let stats = sweep(&tc, false, false, 0).await;
    assert_eq!(stats.count(200), 0);

    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(tc.catalog.pool())
        .await
        .unwrap();
    assert_eq!(files, 0);
    let headers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM headers")
        .fetch_one(tc.catalog.pool())
        .await
        .unwrap();
    assert_eq!(headers, 0);
}

#[tokio::test]
async fn single_hit_reaches_complete() {
    let tc = TestCatalog::new().await;
    let server = FakeServer::spawn().await;
    server.set_history(&history_line("WindowsPlayer", "version-aaaa"));
    server.set("version-aaaa-RobloxApp.zip", FakeResponse::ok(b"", EMPTY_MD5));
    discover_and_generate(&tc, &[&server], &["RobloxApp.zip"]).await;

    let stats = sweep(&tc, true, false, 0).await;
    assert_eq!(stats.count(200), 1);

    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(
        FileFlags::from_bits(flags),
        FileFlags::EXISTS | FileFlags::HAS_HEADERS | FileFlags::HAS_METADATA | FileFlags::HAS_CONTENT
    );

    let (size, md5) = metadata_row(&tc.catalog, "version-aaaa", "RobloxApp.zip")
        .await
        .unwrap();
    assert_eq!(size, 0);
    assert_eq!(md5, EMPTY_MD5);

    let (status, _) = header_row(&tc.catalog, "version-aaaa", "RobloxApp.zip")
        .await
        .unwrap();
    assert_eq!(status, 200);

    assert!(tc.objects_root.join("d4").join(EMPTY_MD5).exists());
}

#[tokio::test]
async fn expected_miss_sets_not_found_without_headers() {
    let tc = TestCatalog::new().await;
    let server = FakeServer::spawn().await;
    server.set_history(&history_line("WindowsPlayer", "version-aaaa"));
    // No response registered for the artifact: the server answers 403.
    discover_and_generate(&tc, &[&server], &["RobloxApp.zip"]).await;

    let stats = sweep(&tc, false, false, 0).await;
    assert_eq!(stats.count(403), 1);

    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(FileFlags::from_bits(flags), FileFlags::NOT_FOUND);
    assert_eq!(header_row(&tc.catalog, "version-aaaa", "RobloxApp.zip").await, None);
}

#[tokio::test]
async fn failure_status_records_status_only_header() {
    let tc = TestCatalog::new().await;
    let server = FakeServer::spawn().await;
    server.set_history(&history_line("WindowsPlayer", "version-aaaa"));
    server.set("version-aaaa-RobloxApp.zip", FakeResponse::status(500));
    discover_and_generate(&tc, &[&server], &["RobloxApp.zip"]).await;

    let stats = sweep(&tc, false, false, 0).await;
    assert_eq!(stats.count(500), 1);

    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(
        FileFlags::from_bits(flags),
        FileFlags::NOT_FOUND | FileFlags::HAS_HEADERS
    );
    let (status, content_length) = header_row(&tc.catalog, "version-aaaa", "RobloxApp.zip")
        .await
        .unwrap();
    assert_eq!(status, 500);
    assert_eq!(content_length, None);
}

#[tokio::test]
async fn identical_content_across_servers_stores_one_object() {
    let tc = TestCatalog::new().await;
    let server_a = FakeServer::spawn().await;
    let server_b = FakeServer::spawn().await;
    server_a.set_history(&history_line("WindowsPlayer", "version-b001"));
    server_b.set_history(&history_line("WindowsPlayer", "version-b002"));
    server_a.set("version-b001-RobloxApp.zip", FakeResponse::ok(b"hello world", HELLO_MD5));
    server_b.set("version-b002-RobloxApp.zip", FakeResponse::ok(b"hello world", HELLO_MD5));
    discover_and_generate(&tc, &[&server_a, &server_b], &["RobloxApp.zip"]).await;

    // Batch size 1 so the second fetch sees the first object on disk.
    let stats = sweep(&tc, true, false, 1).await;
    assert_eq!(stats.count(200), 2);

    for hash in ["version-b001", "version-b002"] {
        let flags = file_flags(&tc.catalog, hash, "RobloxApp.zip").await;
        assert_eq!(
            FileFlags::from_bits(flags),
            FileFlags::EXISTS
                | FileFlags::HAS_HEADERS
                | FileFlags::HAS_METADATA
                | FileFlags::HAS_CONTENT,
            "flags for {hash}"
        );
        let (size, md5) = metadata_row(&tc.catalog, hash, "RobloxApp.zip").await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(md5, HELLO_MD5);
    }

    assert_eq!(count_objects(&tc.objects_root), 1);
}

#[tokio::test]
async fn concurrent_batch_dedup_defers_to_the_download_owner() {
    let tc = TestCatalog::new().await;
    let server_a = FakeServer::spawn().await;
    let server_b = FakeServer::spawn().await;
    server_a.set_history(&history_line("WindowsPlayer", "version-b001"));
    server_b.set_history(&history_line("WindowsPlayer", "version-b002"));
    server_a.set("version-b001-RobloxApp.zip", FakeResponse::ok(b"hello world", HELLO_MD5));
    server_b.set("version-b002-RobloxApp.zip", FakeResponse::ok(b"hello world", HELLO_MD5));
    discover_and_generate(&tc, &[&server_a, &server_b], &["RobloxApp.zip"]).await;

    // Default batch: both candidates fan out concurrently in one commit
    // round. Exactly one worker wins the in-flight claim and streams; the
    // loser records headers only, and the following round completes it
    // from the stored object. One extra 200 for that second probe.
    let stats = sweep(&tc, true, false, 0).await;
    assert_eq!(stats.count(200), 3);

    for hash in ["version-b001", "version-b002"] {
        let flags = file_flags(&tc.catalog, hash, "RobloxApp.zip").await;
        assert_eq!(
            FileFlags::from_bits(flags),
            FileFlags::EXISTS
                | FileFlags::HAS_HEADERS
                | FileFlags::HAS_METADATA
                | FileFlags::HAS_CONTENT,
            "flags for {hash}"
        );
        let (size, md5) = metadata_row(&tc.catalog, hash, "RobloxApp.zip").await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(md5, HELLO_MD5);
    }

    assert_eq!(count_objects(&tc.objects_root), 1);
}

#[tokio::test]
async fn recheck_recovers_a_not_found_file() {
    let tc = TestCatalog::new().await;
    let server = FakeServer::spawn().await;
    server.set_history(&history_line("WindowsPlayer", "version-aaaa"));
    discover_and_generate(&tc, &[&server], &["RobloxApp.zip"]).await;

    // First probe misses.
    sweep(&tc, true, false, 0).await;
    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(FileFlags::from_bits(flags), FileFlags::NOT_FOUND);

    // The file appears on the server; without recheck nothing happens.
    server.set("version-aaaa-RobloxApp.zip", FakeResponse::ok(b"", EMPTY_MD5));
    sweep(&tc, true, false, 0).await;
    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(FileFlags::from_bits(flags), FileFlags::NOT_FOUND);

    // With recheck the miss is re-probed and completes; NotFound clears.
    let stats = sweep(&tc, true, true, 0).await;
    assert_eq!(stats.count(200), 1);
    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(
        FileFlags::from_bits(flags),
        FileFlags::EXISTS | FileFlags::HAS_HEADERS | FileFlags::HAS_METADATA | FileFlags::HAS_CONTENT
    );
}

#[tokio::test]
async fn headers_then_content_upgrades_partial_to_complete() {
    let tc = TestCatalog::new().await;
    let server = FakeServer::spawn().await;
    server.set_history(&history_line("WindowsPlayer", "version-aaaa"));
    server.set("version-aaaa-RobloxApp.zip", FakeResponse::ok(b"hello world", HELLO_MD5));
    discover_and_generate(&tc, &[&server], &["RobloxApp.zip"]).await;

    // Headers-only pass: Partial, no metadata, no object.
    let stats = sweep(&tc, false, false, 0).await;
    assert_eq!(stats.count(200), 1);
    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(
        FileFlags::from_bits(flags),
        FileFlags::EXISTS | FileFlags::HAS_HEADERS
    );
    assert_eq!(metadata_row(&tc.catalog, "version-aaaa", "RobloxApp.zip").await, None);
    assert_eq!(count_objects(&tc.objects_root), 0);

    // Content pass picks the Partial file up and completes it.
    sweep(&tc, true, false, 0).await;
    let flags = file_flags(&tc.catalog, "version-aaaa", "RobloxApp.zip").await;
    assert_eq!(
        FileFlags::from_bits(flags),
        FileFlags::EXISTS | FileFlags::HAS_HEADERS | FileFlags::HAS_METADATA | FileFlags::HAS_CONTENT
    );
    let (size, md5) = metadata_row(&tc.catalog, "version-aaaa", "RobloxApp.zip")
        .await
        .unwrap();
    assert_eq!(size, 11);
    assert_eq!(md5, HELLO_MD5);
    assert!(tc.objects_root.join("5e").join(HELLO_MD5).exists());
}
