//! Config save/load roundtrip integration tests.

use secretbus_core::config::{Config, DEFAULT_PROMPT_TIMEOUT_SECS};
use secretbus_core::SessionMode;
use secretbus_secrets::{MemoryBus, SecretService};
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secretbus.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.service.bus_name, config.service.bus_name);
    assert_eq!(loaded.session.mode, SessionMode::DhEncrypted);
    assert_eq!(loaded.prompt.timeout_secs, DEFAULT_PROMPT_TIMEOUT_SECS);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secretbus.json5");

    let mut config = Config::default();
    config.session.mode = SessionMode::Plain;
    config.prompt.window_id = "Unlock mail".to_string();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.session.mode, SessionMode::Plain);
    assert_eq!(loaded.prompt.window_id, "Unlock mail");
}

#[tokio::test]
async fn test_loaded_config_drives_client() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secretbus.json5");
    std::fs::write(
        &path,
        r#"{
            // plain sessions for this host
            session: { mode: "plain" },
            prompt: { timeout_secs: 5 },
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    let service = SecretService::with_config(MemoryBus::new(), &config);
    let session = service.open_session(config.session.mode).await.unwrap();
    assert!(!session.is_encrypted());
}
