use tardis_types::{Datafile, TardisError};

use crate::testutil::MemoryProvider;
use crate::{TransferProvider, normalize_base_url};

#[test]
fn generate_url_appends_relative_path() {
    let provider = MemoryProvider::new("test", "http://127.0.0.1:4272/data/");
    let df = Datafile::new(1, 1, "3", "1/2/3");
    assert_eq!(
        provider.generate_url(&df).unwrap(),
        "http://127.0.0.1:4272/data/1/2/3"
    );
}

#[test]
fn generate_url_strips_file_scheme() {
    let provider = MemoryProvider::new("test", "http://host/data/");
    let df = Datafile::new(1, 1, "3", "file:///1/2/3");
    assert_eq!(provider.generate_url(&df).unwrap(), "http://host/data/1/2/3");
}

#[test]
fn generate_url_rejects_remote_scheme() {
    let provider = MemoryProvider::new("test", "http://host/data/");
    let df = Datafile::new(1, 1, "3", "https://elsewhere/1/2/3");
    let err = provider.generate_url(&df).unwrap_err();
    assert!(matches!(err, TardisError::Provider(_)), "{err}");
}

#[test]
fn check_url_names_destination() {
    let provider = MemoryProvider::new("archive", "http://host/archive/");
    let err = provider.check_url("http://host/data/x").unwrap_err();
    assert!(err.to_string().contains("archive destination"), "{err}");
    provider.check_url("http://host/archive/x").unwrap();
}

#[test]
fn check_url_rejects_parent_segments() {
    let provider = MemoryProvider::new("archive", "http://host/archive/");
    for url in [
        "http://host/archive/../data/x",
        "http://host/archive/a/../../x",
        "http://host/archive/%2E%2E/x",
    ] {
        let err = provider.check_url(url).unwrap_err();
        assert!(matches!(err, TardisError::Provider(_)), "{url}: {err}");
    }
    provider.check_url("http://host/archive/a..b/x").unwrap();
}

#[test]
fn default_send_offline_is_not_implemented() {
    let provider = MemoryProvider::new("test", "http://host/data/");
    let err = provider.send_offline("http://host/data/x").unwrap_err();
    assert!(matches!(err, TardisError::NotImplemented(_)));
}

#[test]
fn base_url_normalisation() {
    assert_eq!(normalize_base_url("http://h/data"), "http://h/data/");
    assert_eq!(normalize_base_url("http://h/data/"), "http://h/data/");
}
