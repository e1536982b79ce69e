use std::io::{Read, Write};
use std::time::Duration;

use md5::{Digest, Md5};
use sha2::Sha512;
use tempfile::NamedTempFile;

use crate::testutil::{ServerOptions, TestServer};
use crate::{HttpProvider, TransferProvider, WebDavProvider};

fn source_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn read_all(provider: &dyn TransferProvider, url: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    provider.get_file(url).unwrap().read_to_end(&mut buf).unwrap();
    buf
}

fn assert_round_trip(provider: &dyn TransferProvider, url: &str, content: &[u8]) {
    let source = source_file(content);
    provider.put_file(source.path(), url).unwrap();
    assert_eq!(read_all(provider, url), content);
    assert_eq!(provider.get_length(url).unwrap(), content.len() as u64);
}

#[test]
fn http_put_get_length_metadata() {
    let server = TestServer::http();
    let provider = HttpProvider::new("test", &server.url("/data/"), None, true, Duration::from_secs(10));
    let url = server.url("/data/1/2/3");
    let content = b"Hi mum";

    assert_round_trip(&provider, &url, content);

    let meta = provider.get_metadata(&url).unwrap();
    assert_eq!(meta.md5sum, Some(hex::encode(Md5::digest(content))));
    assert_eq!(meta.sha512sum, Some(hex::encode(Sha512::digest(content))));
    assert_eq!(meta.length, Some(6));
    assert_eq!(server.object("/data/1/2/3").unwrap(), content);
}

#[test]
fn http_large_body_round_trip() {
    let server = TestServer::http();
    let provider = HttpProvider::new("test", &server.url("/data"), None, false, Duration::from_secs(10));
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    assert_round_trip(&provider, &server.url("/data/big.bin"), &content);
}

#[test]
fn http_remove_deletes_object() {
    let server = TestServer::http();
    let provider = HttpProvider::new("test", &server.url("/data/"), None, false, Duration::from_secs(10));
    let url = server.url("/data/x");
    assert_round_trip(&provider, &url, b"x");
    provider.remove_file(&url).unwrap();
    assert!(server.object("/data/x").is_none());
    assert_eq!(provider.get_length(&url).unwrap_err().status(), Some(404));
}

#[test]
fn http_metadata_400_when_server_does_not_understand() {
    let server = TestServer::start(ServerOptions {
        metadata: false,
        collections: None,
    });
    server.insert("/data/x", b"abc");
    let provider = HttpProvider::new("test", &server.url("/data/"), None, true, Duration::from_secs(10));
    let err = provider.get_metadata(&server.url("/data/x")).unwrap_err();
    assert!(err.is_unavailable(), "{err}");
}

#[test]
fn http_alive_against_running_server() {
    let server = TestServer::http();
    let provider = HttpProvider::new("test", &server.url("/data/"), None, false, Duration::from_secs(10));
    assert!(provider.alive());
}

#[test]
fn plain_put_fails_without_parent_collection() {
    let server = TestServer::webdav("/dav/");
    let provider = HttpProvider::new("test", &server.url("/dav/"), None, false, Duration::from_secs(10));
    let source = source_file(b"data");
    let err = provider
        .put_file(source.path(), &server.url("/dav/1/2/3"))
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
}

#[test]
fn webdav_creates_parent_collections() {
    let server = TestServer::webdav("/dav/");
    let provider = WebDavProvider::new("dav", &server.url("/dav/"), None, false, Duration::from_secs(10));
    let url = server.url("/dav/1/2/3");

    assert_round_trip(&provider, &url, b"Hi mum");
    assert!(server.has_collection("/dav/1/"));
    assert!(server.has_collection("/dav/1/2/"));
    let mkcols: Vec<String> = server
        .requests()
        .into_iter()
        .filter(|r| r.starts_with("MKCOL"))
        .collect();
    assert_eq!(mkcols, vec!["MKCOL /dav/1/", "MKCOL /dav/1/2/"]);
}

#[test]
fn webdav_tolerates_existing_collections() {
    let server = TestServer::webdav("/dav/");
    let provider = WebDavProvider::new("dav", &server.url("/dav/"), None, false, Duration::from_secs(10));
    assert_round_trip(&provider, &server.url("/dav/1/a"), b"first");
    // Second upload into the same collection sees 405 from MKCOL.
    assert_round_trip(&provider, &server.url("/dav/1/b"), b"second");
    assert_eq!(server.object("/dav/1/a").unwrap(), b"first");
}
