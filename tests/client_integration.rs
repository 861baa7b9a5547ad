//! Client façade against the in-memory server.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use webdav_http::client::ClientConfig;
use webdav_http::error::Operation;
use webdav_http::protocol::ResourceType;
use webdav_http::stream::UnknownLength;
use webdav_http::testing::MemoryServer;
use webdav_http::{Callback, ClientError, Depth};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> Arc<MemoryServer> {
    init_tracing();
    Arc::new(MemoryServer::new("/dav"))
}

fn counter() -> (Arc<AtomicU64>, Callback) {
    let total = Arc::new(AtomicU64::new(0));
    let seen = total.clone();
    let callback: Callback = Arc::new(move |n| {
        seen.fetch_add(n, Ordering::SeqCst);
    });
    (total, callback)
}

#[tokio::test]
async fn test_put_ls_move_scenario() {
    let server = setup();
    let client = server.client();

    client.makedirs("/data", true).await.unwrap();
    client.put_bytes("/data/foo", "foo", false).await.unwrap();

    let entries = client.ls("/data").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "data/foo");
    assert_eq!(entries[0].size, Some(3));
    assert_eq!(entries[0].resource_type, Some(ResourceType::File));

    client.move_("/data/foo", "/data/bar", false).await.unwrap();
    let entries = client.ls("/data").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "data/bar");
    assert_eq!(entries[0].size, Some(3));

    let err = client.move_("/data/foo", "/data/bar", false).await.unwrap_err();
    match &err {
        ClientError::NotFound { path } => assert_eq!(path, "/data/foo"),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(err.to_string().contains("/data/foo"));
}

#[tokio::test]
async fn test_ls_of_file_lists_itself() {
    let server = setup();
    server.insert_file("data/foo.txt", "foo");
    let client = server.client();

    let entries = client.ls("data/foo.txt").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "data/foo.txt");
    assert_eq!(entries[0].content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_info_and_getters() {
    let server = setup();
    server.insert_file("docs/readme.txt", "hello world");
    let client = server.client();

    let info = client.info("docs/readme.txt").await.unwrap();
    assert_eq!(info.name, "docs/readme.txt");
    assert_eq!(info.size, Some(11));
    assert!(!info.is_dir());
    assert!(info.created.is_some());
    assert!(info.modified.is_some());

    assert_eq!(client.content_length("docs/readme.txt").await.unwrap(), Some(11));
    assert_eq!(
        client.content_type("docs/readme.txt").await.unwrap().as_deref(),
        Some("text/plain")
    );
    assert_eq!(
        client.display_name("docs/readme.txt").await.unwrap().as_deref(),
        Some("readme.txt")
    );
    let etag = client.etag("docs/readme.txt").await.unwrap();
    assert!(etag.is_some());
    assert_eq!(client.get_property("docs/readme.txt", "getetag", None).await.unwrap(), etag);

    assert!(client.isdir("docs").await.unwrap());
    assert!(client.isfile("docs/readme.txt").await.unwrap());
    assert!(client.exists("docs").await.unwrap());
    assert!(!client.exists("nothing").await.unwrap());

    let err = client.info("nothing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_ls_names_with_spaces() {
    let server = setup();
    server.insert_file("my docs/a b.txt", "1");
    server.insert_file("my docs/c.txt", "2");
    server.insert_dir("my docs/sub");
    let client = server.client();

    let names = client.ls_names("my docs").await.unwrap();
    assert_eq!(names, vec!["my docs/a b.txt", "my docs/c.txt", "my docs/sub"]);
}

#[tokio::test]
async fn test_mkdir_semantics() {
    let server = setup();
    let client = server.client();

    client.mkdir("a", false).await.unwrap();
    assert!(server.contains("a"));

    let err = client.mkdir("a", false).await.unwrap_err();
    assert!(matches!(err, ClientError::AlreadyExists { ref path } if path == "a"));
    client.mkdir("a", true).await.unwrap();

    let err = client.mkdir("missing/child", false).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));

    client.makedirs("x/y/z", true).await.unwrap();
    assert!(server.contains("x/y/z"));
    assert_eq!(server.request_count("MKCOL"), 7);
}

#[tokio::test]
async fn test_copy_and_overwrite() {
    let server = setup();
    server.insert_file("src/one", "1");
    server.insert_file("src/two", "2");
    server.insert_file("other", "x");
    let client = server.client();

    client.copy("src", "dst", Depth::Infinity, false).await.unwrap();
    assert_eq!(server.file("dst/one").unwrap(), "1");
    assert_eq!(server.file("dst/two").unwrap(), "2");
    assert!(server.contains("src/one"));

    let err = client.copy("src/one", "other", Depth::Infinity, false).await.unwrap_err();
    assert!(matches!(err, ClientError::AlreadyExists { ref path } if path == "other"));

    client.copy("src/one", "other", Depth::Infinity, true).await.unwrap();
    assert_eq!(server.file("other").unwrap(), "1");

    client.copy("src", "shallow", Depth::Zero, false).await.unwrap();
    assert!(server.contains("shallow"));
    assert!(!server.contains("shallow/one"));
}

#[tokio::test]
async fn test_copy_onto_itself_is_forbidden() {
    let server = setup();
    server.insert_file("file", "1");
    let client = server.client();

    let err = client.copy("file", "file", Depth::Infinity, true).await.unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
}

#[tokio::test]
async fn test_move_into_missing_parent_conflicts() {
    let server = setup();
    server.insert_file("file", "1");
    let client = server.client();

    let err = client.move_("file", "nowhere/file", false).await.unwrap_err();
    match err {
        ClientError::Conflict(message) => assert!(message.contains("move")),
        other => panic!("expected Conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remove_with_locked_member_reports_multistatus() {
    let server = setup();
    server.insert_file("dir/a", "a");
    server.insert_file("dir/b", "b");
    server.lock("dir/a");
    let client = server.client();

    let err = client.remove("dir").await.unwrap_err();
    match &err {
        ClientError::MultiStatus { operation, source } => {
            assert_eq!(*operation, Operation::Remove);
            assert_eq!(source.statuses().len(), 1);
            assert!(source.statuses().contains_key("/dav/dir/a"));
        }
        other => panic!("expected MultiStatus, got {:?}", other),
    }
    assert!(err.to_string().contains("/dav/dir/a"));
    assert!(err.to_string().contains("locked"));
    assert!(server.contains("dir/b"));
}

#[tokio::test]
async fn test_remove_locked_resource_is_retried() {
    let server = setup();
    server.insert_file("busy", "x");
    server.lock("busy");
    let client = server.client();

    let err = client.remove("busy").await.unwrap_err();
    assert!(matches!(err, ClientError::Locked(_)));
    assert_eq!(server.request_count("DELETE"), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_calls_exactly_max_attempts() {
    let server = setup();
    let client = server.client_with(ClientConfig {
        retry_delay_ms: 0,
        max_attempts: 4,
        ..Default::default()
    });

    server.fail_next(503, 4);
    let err = client.put_bytes("file", "data", true).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(server.request_count("PUT"), 4);
    assert!(!server.contains("file"));

    // Nothing left injected.
    client.put_bytes("file", "data", true).await.unwrap();
    assert_eq!(server.request_count("PUT"), 5);
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failures() {
    let server = setup();
    let client = server.client();

    server.fail_next(503, 2);
    client.put_bytes("file", "data", true).await.unwrap();
    assert_eq!(server.request_count("PUT"), 3);
    assert_eq!(server.file("file").unwrap(), "data");
}

#[tokio::test]
async fn test_non_idempotent_requests_are_sent_once() {
    let server = setup();
    let client = server.client();
    server.insert_file("a", "payload");

    server.fail_next(503, 1);
    let err = client.move_("a", "b", false).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(server.request_count("MOVE"), 1);
    client.move_("a", "b", false).await.unwrap();
    assert_eq!(server.file("b").unwrap(), "payload");

    server.fail_next(503, 1);
    let err = client.mkdir("dir", false).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(server.request_count("MKCOL"), 1);

    server.fail_next(503, 1);
    let err = client.copy("b", "c", Depth::Infinity, false).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(server.request_count("COPY"), 1);

    // Overwriting copies land in the same state however often they run.
    server.fail_next(503, 1);
    client.copy("b", "c", Depth::Infinity, true).await.unwrap();
    assert_eq!(server.request_count("COPY"), 3);
    assert_eq!(server.file("c").unwrap(), "payload");
}

#[tokio::test]
async fn test_not_found_and_client_errors_are_not_retried() {
    let server = setup();
    let client = server.client();

    assert!(client.remove("missing").await.unwrap_err().is_not_found());
    assert_eq!(server.request_count("DELETE"), 1);

    server.fail_next(400, 1);
    let err = client.put_bytes("file", "x", true).await.unwrap_err();
    assert_eq!(err.status_code(), Some(400));
    assert_eq!(server.request_count("PUT"), 1);
}

#[tokio::test]
async fn test_status_classification() {
    let server = setup();
    let client = server.client_with(ClientConfig {
        retry: false,
        ..Default::default()
    });

    server.fail_next(507, 1);
    let err = client.put_bytes("big", "x", true).await.unwrap_err();
    assert!(matches!(err, ClientError::InsufficientStorage { ref path } if path == "big"));

    server.fail_next(502, 1);
    let err = client.copy("a", "b", Depth::Infinity, true).await.unwrap_err();
    assert!(matches!(err, ClientError::BadGateway));

    server.fail_next(503, 1);
    let err = client.put_bytes("x", "x", true).await.unwrap_err();
    assert_eq!(server.request_count("PUT"), 2);
    match err {
        ClientError::Http { status, reason, .. } => {
            assert_eq!(status, 503);
            assert_eq!(reason, "Service Unavailable");
        }
        other => panic!("expected Http, got {:?}", other),
    }
}

#[tokio::test]
async fn test_put_without_overwrite() {
    let server = setup();
    server.insert_file("file", "old");
    let client = server.client();

    let err = client.put_bytes("file", "new", false).await.unwrap_err();
    assert!(matches!(err, ClientError::AlreadyExists { .. }));
    assert_eq!(server.file("file").unwrap(), "old");
    assert_eq!(server.request_count("PUT"), 0);
}

#[tokio::test]
async fn test_upload_fileobj_reports_progress() {
    let server = setup();
    let client = server.client();
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let (total, callback) = counter();

    client
        .upload_fileobj(Cursor::new(data.clone()), "upload.bin", false, Some(callback))
        .await
        .unwrap();

    assert_eq!(server.file("upload.bin").unwrap(), data);
    assert_eq!(total.load(Ordering::SeqCst), 10_000);
    let put = server
        .requests()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    assert_eq!(put.headers.get("content-length").unwrap(), "10000");
}

#[tokio::test]
async fn test_upload_of_unknown_length_is_chunked() {
    let server = setup();
    let client = server.client();

    client
        .upload_fileobj(UnknownLength(Cursor::new(b"abc".to_vec())), "stream", true, None)
        .await
        .unwrap();

    assert_eq!(server.file("stream").unwrap(), "abc");
    let put = server
        .requests()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    assert!(put.headers.get("content-length").is_none());
}

#[tokio::test]
async fn test_upload_and_download_files() {
    let server = setup();
    let client = server.client();
    let dir = tempfile::tempdir().unwrap();

    let local = dir.path().join("in.txt");
    tokio::fs::write(&local, b"file contents").await.unwrap();
    client.upload_file(&local, "remote.txt", false, None).await.unwrap();
    assert_eq!(server.file("remote.txt").unwrap(), "file contents");

    let target = dir.path().join("out.txt");
    let (total, callback) = counter();
    let written = client
        .download_file("remote.txt", &target, Some(callback))
        .await
        .unwrap();
    assert_eq!(written, 13);
    assert_eq!(total.load(Ordering::SeqCst), 13);
    assert_eq!(tokio::fs::read(&target).await.unwrap(), b"file contents");
}

#[tokio::test]
async fn test_download_fileobj_into_buffer() {
    let server = setup();
    server.set_chunk_size(3);
    server.insert_file("f", "0123456789");
    let client = server.client();

    let mut buffer = Vec::new();
    let written = client.download_fileobj("f", &mut buffer, None).await.unwrap();
    assert_eq!(written, 10);
    assert_eq!(buffer, b"0123456789");
}

#[tokio::test]
async fn test_open_collection_fails() {
    let server = setup();
    server.insert_dir("dir");
    let client = server.client();

    let err = client.open("dir").await.unwrap_err();
    assert!(matches!(err, ClientError::IsACollection { ref path } if path == "dir"));
}

#[tokio::test]
async fn test_range_support_probed_once() {
    let server = setup();
    let client = server.client();

    assert!(client.supports_ranges().await);
    assert!(client.clone().supports_ranges().await);
    assert!(client.supports_ranges().await);
    assert_eq!(server.request_count("OPTIONS"), 1);

    let preset = server.client_with(ClientConfig {
        supports_ranges: Some(false),
        ..Default::default()
    });
    assert!(!preset.supports_ranges().await);
    assert_eq!(server.request_count("OPTIONS"), 1);
}

#[tokio::test]
async fn test_failed_probe_is_not_cached() {
    let server = setup();
    let client = server.client();

    server.refuse_next(1);
    assert!(!client.supports_ranges().await);
    assert_eq!(client.features().cached_supports_ranges(), None);
    assert!(client.supports_ranges().await);
    assert_eq!(server.request_count("OPTIONS"), 2);
}

#[tokio::test]
async fn test_options_lists_compliance_classes() {
    let server = setup();
    let client = server.client();

    let classes = client.options("").await.unwrap();
    assert!(classes.contains("1"));
    assert!(classes.contains("2"));
}
