use std::sync::Arc;

use netwarden::policy::matcher::{self, Verdict};
use netwarden::policy::reload;
use netwarden::policy::rules::{self, RulesFile};
use netwarden::policy::store::{PolicySnapshot, PolicyStore};
use netwarden::proxy::target::Target;

fn target(uri: &str) -> Target {
    Target::from_absolute_uri(uri).unwrap()
}

#[test]
fn store_loads_rules_file_and_evaluates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    std::fs::write(
        &path,
        r#"allow_always = ["api.github.com", "crates.io/*"]
deny_always = ["tracker.example.com"]
"#,
    )
    .unwrap();

    let store = PolicyStore::from_rules_file(&path).unwrap();
    let snapshot = store.snapshot();

    assert_eq!(
        matcher::evaluate(&snapshot, &target("https://api.github.com/repos")),
        Verdict::Allowed
    );
    assert_eq!(
        matcher::evaluate(&snapshot, &target("https://tracker.example.com/")),
        Verdict::Denied
    );
    assert_eq!(
        matcher::evaluate(&snapshot, &target("https://unknown.example.org/")),
        Verdict::Undecided
    );
}

#[test]
fn append_persists_to_rules_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    rules::save(&path, &RulesFile::default()).unwrap();

    let store = PolicyStore::from_rules_file(&path).unwrap();
    assert!(store.append_allow("api.github.com"));
    assert!(store.append_deny("tracker.example.com"));

    let reread = rules::load(&path).unwrap();
    assert_eq!(reread.allow_always, vec!["api.github.com"]);
    assert_eq!(reread.deny_always, vec!["tracker.example.com"]);
}

#[test]
fn append_is_idempotent_in_memory_and_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    rules::save(&path, &RulesFile::default()).unwrap();

    let store = PolicyStore::from_rules_file(&path).unwrap();
    assert!(store.append_allow("api.github.com"));
    assert!(!store.append_allow("api.github.com"));

    let reread = rules::load(&path).unwrap();
    assert_eq!(reread.allow_always, vec!["api.github.com"]);
}

#[test]
fn missing_rules_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    let store = PolicyStore::from_rules_file(&path).unwrap();
    let snapshot = store.snapshot();
    assert!(snapshot.allow.is_empty());
    assert!(snapshot.deny.is_empty());
    assert_eq!(snapshot.upstream_proxy, None);
}

#[test]
fn reload_replaces_snapshot_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    std::fs::write(&path, "allow_always = [\"old.example.com\"]\n").unwrap();

    let store = Arc::new(PolicyStore::from_rules_file(&path).unwrap());
    assert_eq!(store.snapshot().allow, vec!["old.example.com"]);

    std::fs::write(
        &path,
        "allow_always = [\"new.example.com\"]\ndeny_always = [\"bad.example.com\"]\n",
    )
    .unwrap();
    reload::reload_rules(&store, &path).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.allow, vec!["new.example.com"]);
    assert_eq!(snapshot.deny, vec!["bad.example.com"]);
}

#[test]
fn reload_with_invalid_toml_keeps_old_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    std::fs::write(&path, "allow_always = [\"good.example.com\"]\n").unwrap();

    let store = Arc::new(PolicyStore::from_rules_file(&path).unwrap());
    std::fs::write(&path, "allow_always = [not valid toml").unwrap();

    assert!(reload::reload_rules(&store, &path).is_err());
    assert_eq!(store.snapshot().allow, vec!["good.example.com"]);
}

#[test]
fn deny_wins_even_after_allow_appended() {
    let store = PolicyStore::new(PolicySnapshot {
        allow: vec![],
        deny: vec!["example.com".to_string()],
        upstream_proxy: None,
    });
    store.append_allow("example.com");
    let snapshot = store.snapshot();
    assert_eq!(
        matcher::evaluate(&snapshot, &target("https://example.com/")),
        Verdict::Denied
    );
}

#[test]
fn upstream_proxy_survives_rules_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.toml");
    std::fs::write(
        &path,
        "allow_always = []\nupstream_proxy = \"http://proxy.corp:8080\"\n",
    )
    .unwrap();

    let store = PolicyStore::from_rules_file(&path).unwrap();
    assert_eq!(
        store.snapshot().upstream_proxy,
        Some("http://proxy.corp:8080".to_string())
    );

    // Appending a rule rewrites the file; the upstream setting must survive.
    store.append_allow("api.github.com");
    let reread = rules::load(&path).unwrap();
    assert_eq!(
        reread.upstream_proxy,
        Some("http://proxy.corp:8080".to_string())
    );
}
