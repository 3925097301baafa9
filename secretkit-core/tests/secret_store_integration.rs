//! Integration tests for the secret stores.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use secrecy::ExposeSecret;
use secretkit_core::logger::{set_logger, LogLevel, Logger};
use secretkit_core::{
    DisplayState, EphemeralKeystore, SecretBackend, SecretField, SecretKitConfig, SecretScreen,
    StatusMessage, StorageError,
};
use test_case::test_case;

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_save_then_get_returns_secret(backend: SecretBackend) {
    let root = common::temp_root();
    let store = common::open_store(
        backend,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");
    assert_eq!(store.backend(), backend);

    for secret in ["hunter2", "pässwörd ✓", "with\nnewline"] {
        store.save(secret).expect("save");
        assert_eq!(
            store.get().expect("get").expect("secret").expose_secret(),
            secret
        );
    }
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_second_save_replaces_first(backend: SecretBackend) {
    let root = common::temp_root();
    let store = common::open_store(
        backend,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");

    store.save("a much longer first secret").expect("save first");
    store.save("short").expect("save second");
    assert_eq!(
        store.get().expect("get").expect("secret").expose_secret(),
        "short"
    );
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_delete_then_get_is_empty(backend: SecretBackend) {
    let root = common::temp_root();
    let store = common::open_store(
        backend,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");

    store.delete().expect("delete before any save");
    store.save("hunter2").expect("save");
    store.delete().expect("delete");
    assert!(store.get().expect("get").is_none());
    assert!(store.get_or_empty().expose_secret().is_empty());
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_empty_secret_reads_as_absent(backend: SecretBackend) {
    let root = common::temp_root();
    let store = common::open_store(
        backend,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");

    store.save("").expect("empty secret is accepted");
    assert!(store.get().expect("get").is_none());
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_secret_survives_new_instances(backend: SecretBackend) {
    let root = common::temp_root();
    common::open_store(backend, &root.paths, common::local_keystore(&root.paths))
        .expect("open store")
        .save("hunter2")
        .expect("save");

    let secret = common::read_secret(backend, &root.paths, common::local_keystore(&root.paths))
        .expect("read")
        .expect("secret");
    assert_eq!(secret.expose_secret(), "hunter2");
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_other_keystore_is_a_read_failure(backend: SecretBackend) {
    let root = common::temp_root();
    common::open_store(
        backend,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store")
        .save("hunter2")
        .expect("save");

    assert!(matches!(
        common::read_secret(
            backend,
            &root.paths,
            Arc::new(EphemeralKeystore::generate())
        ),
        Err(StorageError::Crypto(_))
    ));
}

#[test_case(SecretBackend::File ; "file")]
#[test_case(SecretBackend::Preferences ; "preferences")]
fn test_keystore_failure_propagates_on_save(backend: SecretBackend) {
    let root = common::temp_root();
    let result = common::open_store(backend, &root.paths, Arc::new(common::FailingKeystore))
        .and_then(|store| store.save("hunter2"));
    assert!(matches!(result, Err(StorageError::Keystore(_))));
}

#[test]
fn test_file_store_hunter2_scenario() {
    let root = common::temp_root();
    let store = common::open_store(
        SecretBackend::File,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");

    store.save("hunter2").expect("save");
    assert_eq!(store.get_or_empty().expose_secret(), "hunter2");
    assert!(root.paths.file_path("secret_file.txt").exists());

    store.delete().expect("delete");
    assert!(store.get_or_empty().expose_secret().is_empty());
    assert!(!root.paths.file_path("secret_file.txt").exists());
}

#[test]
fn test_truncated_file_is_a_read_failure() {
    let root = common::temp_root();
    let store = common::open_store(
        SecretBackend::File,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");
    store.save(&"x".repeat(10_000)).expect("save");

    let path = root.paths.file_path("secret_file.txt");
    let bytes = fs::read(&path).expect("read raw");
    fs::write(&path, &bytes[..bytes.len() - 100]).expect("truncate");

    assert!(store.get().is_err());
    assert!(store.get_or_empty().expose_secret().is_empty());
}

#[test]
fn test_tampered_prefs_blob_is_a_read_failure() {
    let root = common::temp_root();
    let keystore = common::local_keystore(&root.paths);
    common::open_store(SecretBackend::Preferences, &root.paths, keystore.clone())
        .expect("open store")
        .save("hunter2")
        .expect("save");

    let path = root.paths.shared_prefs_dir().join("sharedPrefs");
    let mut bytes = fs::read(&path).expect("read raw");
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
    fs::write(&path, bytes).expect("tamper");

    let store = common::open_store(SecretBackend::Preferences, &root.paths, keystore)
        .expect("reopen store");
    assert!(store.get().is_err());
    assert!(store.get_or_empty().expose_secret().is_empty());
}

#[test]
fn test_screen_flow_across_launches() {
    let root = common::temp_root();

    let mut screen = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        common::local_keystore(&root.paths),
    );
    screen.load();
    assert_eq!(
        screen.submit(SecretField::Preferences, "hunter2").expect("submit"),
        StatusMessage::Saved
    );
    assert_eq!(
        screen.submit(SecretField::File, "swordfish").expect("submit"),
        StatusMessage::Saved
    );
    drop(screen);

    let mut relaunched = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        common::local_keystore(&root.paths),
    );
    relaunched.load();
    for (field, expected) in [
        (SecretField::Preferences, "hunter2"),
        (SecretField::File, "swordfish"),
    ] {
        assert!(matches!(relaunched.view(field).display, DisplayState::Hidden));
        assert_eq!(relaunched.toggle_visibility(field), None);
        let revealed = relaunched
            .view(field)
            .display
            .revealed()
            .expect("revealed")
            .expose_secret()
            .to_string();
        assert_eq!(revealed, expected);
    }

    assert_eq!(
        relaunched.delete(SecretField::File).expect("delete"),
        StatusMessage::Deleted
    );
    relaunched.load();
    assert!(relaunched.view(SecretField::File).display.is_blank());
    assert!(matches!(
        relaunched.view(SecretField::Preferences).display,
        DisplayState::Hidden
    ));
}

#[test]
fn test_screen_with_foreign_keystore_loads_blank() {
    let root = common::temp_root();
    let mut screen = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        Arc::new(EphemeralKeystore::generate()),
    );
    screen.submit(SecretField::File, "hunter2").expect("submit");
    screen.submit(SecretField::Preferences, "hunter2").expect("submit");

    let mut other = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        Arc::new(EphemeralKeystore::generate()),
    );
    other.load();
    assert!(other.view(SecretField::File).display.is_blank());
    assert!(other.view(SecretField::Preferences).display.is_blank());
}

#[test]
fn test_screen_with_foreign_keystore_can_replace_secrets() {
    let root = common::temp_root();
    let mut screen = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        Arc::new(EphemeralKeystore::generate()),
    );
    screen.submit(SecretField::File, "hunter2").expect("submit");
    screen.submit(SecretField::Preferences, "hunter2").expect("submit");

    let keystore = Arc::new(EphemeralKeystore::generate());
    let mut other = SecretScreen::new(
        root.paths.clone(),
        SecretKitConfig::default(),
        keystore.clone(),
    );
    other.load();
    for field in [SecretField::Preferences, SecretField::File] {
        assert_eq!(
            other.submit(field, "swordfish").expect("submit"),
            StatusMessage::Saved
        );
        assert_eq!(other.toggle_visibility(field), None);
        let revealed = other
            .view(field)
            .display
            .revealed()
            .expect("revealed")
            .expose_secret()
            .to_string();
        assert_eq!(revealed, "swordfish");
    }

    let secret = common::read_secret(SecretBackend::Preferences, &root.paths, keystore)
        .expect("read")
        .expect("secret");
    assert_eq!(secret.expose_secret(), "swordfish");
}

#[derive(Default)]
struct CapturingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl Logger for CapturingLogger {
    fn log(&self, level: LogLevel, message: String) {
        self.records.lock().expect("lock").push((level, message));
    }
}

#[test]
fn test_failed_read_is_logged_without_the_secret() {
    let capture = Arc::new(CapturingLogger::default());
    set_logger(capture.clone());
    SecretKitConfig::from_json(r#"{"log_level":"warn"}"#)
        .expect("parse")
        .apply_log_level();

    let root = common::temp_root();
    let store = common::open_store(
        SecretBackend::File,
        &root.paths,
        Arc::new(EphemeralKeystore::generate()),
    )
    .expect("open store");
    store.save("hunter2").expect("save");
    fs::write(root.paths.file_path("secret_file.txt"), b"hunter2").expect("corrupt");

    assert!(store.get_or_empty().expose_secret().is_empty());

    let records = capture.records.lock().expect("lock");
    assert!(records
        .iter()
        .any(|(level, message)| *level == LogLevel::Warn && message.contains("file store")));
    assert!(records.iter().all(|(_, message)| !message.contains("hunter2")));
    assert!(records
        .iter()
        .all(|(level, _)| matches!(level, LogLevel::Warn | LogLevel::Error)));
}
