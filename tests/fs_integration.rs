//! Filesystem adapter against the in-memory server.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use webdav_http::fs::{FileSystem, FsError, WebdavFileSystem};
use webdav_http::testing::MemoryServer;
use webdav_http::ClientError;

fn setup() -> (Arc<MemoryServer>, WebdavFileSystem) {
    let server = Arc::new(MemoryServer::new("/dav"));
    let fs = WebdavFileSystem::new(server.client());
    (server, fs)
}

#[tokio::test]
async fn test_ls_and_info() {
    let (server, fs) = setup();
    server.insert_file("dir/a.txt", "aaa");
    server.insert_dir("dir/sub");
    server.insert_dir("empty");

    let names = fs.ls_names("dir").await.unwrap();
    assert_eq!(names, vec!["dir/a.txt", "dir/sub"]);
    assert!(fs.ls("empty").await.unwrap().is_empty());

    let err = fs.ls("dir/a.txt").await.unwrap_err();
    assert!(matches!(err, FsError::NotADirectory(ref p) if p == "dir/a.txt"));

    let err = fs.info("missing").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(ref p) if p == "missing"));

    assert!(fs.isdir("dir/sub").await.unwrap());
    assert!(fs.isfile("dir/a.txt").await.unwrap());
    assert!(!fs.isdir("missing").await.unwrap());
    assert!(!fs.isfile("missing").await.unwrap());
    assert_eq!(fs.size("dir/a.txt").await.unwrap(), Some(3));
    assert!(fs.checksum("dir/a.txt").await.unwrap().is_some());
    assert!(fs.created("dir/a.txt").await.unwrap().is_some());
    assert!(fs.modified("dir/a.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_rmdir_refuses_non_empty_directories() {
    let (server, fs) = setup();
    server.insert_file("full/file", "x");
    server.insert_dir("empty");

    let err = fs.rmdir("full").await.unwrap_err();
    assert!(matches!(err, FsError::DirectoryNotEmpty(ref p) if p == "full"));
    assert!(server.contains("full/file"));

    fs.rmdir("empty").await.unwrap();
    assert!(!server.contains("empty"));
}

#[tokio::test]
async fn test_rm_directories_need_recursive() {
    let (server, fs) = setup();
    server.insert_file("tree/a/b", "x");
    server.insert_file("single", "x");

    let err = fs.rm("tree", false).await.unwrap_err();
    assert!(matches!(err, FsError::IsADirectory(_)));

    fs.rm("tree", true).await.unwrap();
    assert!(!server.contains("tree"));
    assert!(!server.contains("tree/a/b"));
    assert_eq!(server.request_count("DELETE"), 1);

    fs.rm("single", false).await.unwrap();
    assert!(!server.contains("single"));

    let err = fs.rm_file("single").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn test_mkdir_and_makedirs() {
    let (server, fs) = setup();
    server.insert_file("file", "x");

    fs.mkdir("one", false).await.unwrap();
    let err = fs.mkdir("one", false).await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    let err = fs.mkdir("file/child", false).await.unwrap_err();
    assert!(matches!(err, FsError::NotADirectory(ref p) if p == "file"));

    let err = fs.mkdir("missing/child", false).await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));

    fs.mkdir("a/b/c", true).await.unwrap();
    assert!(server.contains("a/b/c"));
    fs.makedirs("a/b/c", true).await.unwrap();

    let err = fs.makedirs("a/b/c", false).await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    let err = fs.makedirs("file", true).await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_copy_and_move() {
    let (server, fs) = setup();
    server.insert_file("src/one", "1");
    server.insert_file("src/nested/two", "2");

    fs.copy("src", "copy", true).await.unwrap();
    assert_eq!(server.file("copy/nested/two").unwrap(), "2");
    assert_eq!(server.request_count("COPY"), 1);

    fs.copy("src", "skeleton", false).await.unwrap();
    assert!(fs.isdir("skeleton").await.unwrap());
    assert!(fs.ls("skeleton").await.unwrap().is_empty());

    fs.cp_file("src/one", "one-copy").await.unwrap();
    assert_eq!(server.file("one-copy").unwrap(), "1");

    let err = fs.cp_file("src/one", "one-copy").await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    fs.mv("src", "moved", true).await.unwrap();
    assert!(!server.contains("src"));
    assert_eq!(server.file("moved/one").unwrap(), "1");

    fs.mv("moved/one", "renamed", false).await.unwrap();
    assert_eq!(server.file("renamed").unwrap(), "1");

    let err = fs.mv("moved/one", "again", false).await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(ref p) if p == "moved/one"));
}

#[tokio::test]
async fn test_pipe_cat_and_touch() {
    let (server, fs) = setup();

    fs.pipe_file("data.csv", Bytes::from_static(b"a,b\n1,2\n")).await.unwrap();
    assert_eq!(fs.cat_file("data.csv").await.unwrap(), "a,b\n1,2\n");
    fs.pipe_file("data.csv", Bytes::from_static(b"x")).await.unwrap();
    assert_eq!(fs.cat_file("data.csv").await.unwrap(), "x");

    fs.touch("new", false).await.unwrap();
    assert_eq!(server.file("new").unwrap(), "");

    let err = fs.touch("data.csv", false).await.unwrap_err();
    assert!(matches!(err, FsError::Unsupported(_)));
    assert_eq!(server.file("data.csv").unwrap(), "x");

    fs.touch("data.csv", true).await.unwrap();
    assert_eq!(server.file("data.csv").unwrap(), "");

    let err = fs.cat_file("dir-less").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn test_put_and_get_files() {
    let (server, fs) = setup();
    let dir = tempfile::tempdir().unwrap();

    let local = dir.path().join("local.txt");
    tokio::fs::write(&local, b"local data").await.unwrap();
    fs.put_file(&local, "deep/nested/remote.txt").await.unwrap();
    assert_eq!(server.file("deep/nested/remote.txt").unwrap(), "local data");

    let back = dir.path().join("back.txt");
    fs.get_file("deep/nested/remote.txt", &back).await.unwrap();
    assert_eq!(tokio::fs::read(&back).await.unwrap(), b"local data");

    let local_dir = dir.path().join("from-remote");
    fs.get_file("deep", &local_dir).await.unwrap();
    assert!(local_dir.is_dir());

    fs.put_file(dir.path(), "uploaded-dir").await.unwrap();
    assert!(fs.isdir("uploaded-dir").await.unwrap());
}

#[tokio::test]
async fn test_read_handle() {
    let (server, fs) = setup();
    server.set_chunk_size(4);
    server.insert_file("log.txt", "alpha\nbeta\ngamma\n");

    let mut file = fs.open_read("log.txt").await.unwrap();
    assert_eq!(file.path(), "log.txt");
    assert_eq!(file.size(), Some(17));
    assert_eq!(file.read_line().await.unwrap(), "alpha\n");
    assert_eq!(file.tell(), 6);
    assert_eq!(file.lines().await.unwrap(), vec!["beta\n", "gamma\n"]);

    file.seek(SeekFrom::Start(6)).await.unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(file.read_into(&mut buf).await.unwrap(), 4);
    assert_eq!(&buf, b"beta");
    file.close();
    assert!(file.is_closed());

    let file = fs.open_read("log.txt").await.unwrap();
    let chunks: Vec<Bytes> = file
        .into_chunks()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks.concat(), b"alpha\nbeta\ngamma\n");

    let err = fs.open_read("nothing").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
}

#[tokio::test]
async fn test_write_handle_commit_and_discard() {
    let (server, fs) = setup();
    server.insert_dir("dir");

    let mut file = fs.open_write("out.txt").await.unwrap();
    file.write(b"hello ").unwrap();
    file.write_all(b"world").await.unwrap();
    assert_eq!(file.len(), 11);
    assert!(!server.contains("out.txt"));
    file.commit().await.unwrap();
    assert_eq!(server.file("out.txt").unwrap(), "hello world");
    assert!(file.is_closed());
    assert!(matches!(file.write(b"more"), Err(FsError::Client(ClientError::StreamClosed))));
    file.close().await.unwrap();

    let mut file = fs.open_write("scratch").await.unwrap();
    file.write(b"temporary").unwrap();
    file.discard();
    file.close().await.unwrap();
    assert!(!server.contains("scratch"));
    assert_eq!(server.request_count("PUT"), 1);

    let err = fs.open_write("dir").await.unwrap_err();
    assert!(matches!(err, FsError::IsADirectory(_)));
}

#[tokio::test]
async fn test_failed_commit_keeps_the_buffer() {
    let (server, fs) = setup();
    server.insert_file("doc.txt", "original");

    let mut file = fs.open_write("doc.txt").await.unwrap();
    file.write(b"new content").unwrap();

    server.fail_next(507, 1);
    let err = file.commit().await.unwrap_err();
    assert!(matches!(err, FsError::Client(ClientError::InsufficientStorage { .. })));
    assert!(!file.is_closed());
    assert_eq!(file.len(), 11);
    assert_eq!(server.file("doc.txt").unwrap(), "original");

    file.commit().await.unwrap();
    assert_eq!(server.file("doc.txt").unwrap(), "new content");
    assert!(file.is_empty());
}

#[tokio::test]
async fn test_errors_convert_to_io() {
    let (_, fs) = setup();

    let err: std::io::Error = fs.info("missing").await.unwrap_err().into();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
