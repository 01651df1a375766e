use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn from_lookup_applies_defaults() {
    let cfg = SessionConfig::from_lookup(lookup_from(&[(BACKEND_URL_VAR, "http://localhost:5000")]))
        .unwrap();
    assert_eq!(cfg.backend_url, "http://localhost:5000");
    assert_eq!(cfg.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
    assert_eq!(cfg.timeouts, RequestTimeouts::default());
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = SessionConfig::from_lookup(lookup_from(&[
        (BACKEND_URL_VAR, "https://chat.example.test/"),
        (STORAGE_PATH_VAR, "/tmp/chat/storage.json"),
        (REQUEST_TIMEOUT_VAR, "5"),
        (CONNECT_TIMEOUT_VAR, " 2 "),
    ]))
    .unwrap();
    assert_eq!(cfg.backend_url, "https://chat.example.test");
    assert_eq!(cfg.storage_path, PathBuf::from("/tmp/chat/storage.json"));
    assert_eq!(cfg.timeouts, RequestTimeouts { request_secs: 5, connect_secs: 2 });
}

#[test]
fn from_lookup_invalid_timeout_falls_back() {
    let cfg = SessionConfig::from_lookup(lookup_from(&[
        (BACKEND_URL_VAR, "http://localhost:5000"),
        (REQUEST_TIMEOUT_VAR, "soon"),
    ]))
    .unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
}

#[test]
fn from_lookup_missing_backend_url_errors() {
    let err = SessionConfig::from_lookup(lookup_from(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(BACKEND_URL_VAR)));

    let err = SessionConfig::from_lookup(lookup_from(&[(BACKEND_URL_VAR, "   ")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[test]
fn new_rejects_non_http_url() {
    let err = SessionConfig::new("ftp://example.test").unwrap_err();
    assert!(err.to_string().contains("ftp://example.test"));
}

#[test]
fn new_trims_trailing_slashes() {
    let cfg = SessionConfig::new("http://127.0.0.1:5000//").unwrap();
    assert_eq!(cfg.backend_url, "http://127.0.0.1:5000");
}
