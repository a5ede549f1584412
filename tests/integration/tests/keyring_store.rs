//! Credential store over the in-process daemon.

use secretbus_core::{Config, SessionMode};
use secretbus_integration_tests::init_tracing;
use secretbus_secrets::{KeyringStore, MemoryBus, SecretError, SecretStore};

async fn open(bus: &MemoryBus, mode: SessionMode) -> KeyringStore<MemoryBus> {
    init_tracing();
    let mut config = Config::default();
    config.session.mode = mode;
    KeyringStore::open(bus.clone(), &config).await.unwrap()
}

#[tokio::test]
async fn test_store_lifecycle() {
    for mode in [SessionMode::Plain, SessionMode::DhEncrypted] {
        let bus = MemoryBus::new();
        let store = open(&bus, mode).await;

        store.add("smtp.example", "alice", b"pw-1").await.unwrap();
        assert!(matches!(
            store.add("smtp.example", "alice", b"pw-2").await,
            Err(SecretError::DuplicateItem(_))
        ));

        store.set("smtp.example", "alice", b"pw-3").await.unwrap();
        let value = store.get("smtp.example", "alice").await.unwrap();
        assert_eq!(value.to_secret_string().unwrap().expose_secret(), "pw-3");

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].account, "alice");

        store.delete("smtp.example", "alice").await.unwrap();
        assert!(matches!(
            store.get("smtp.example", "alice").await,
            Err(SecretError::NotFound(_))
        ));

        store.close().await.unwrap();
        assert_eq!(bus.session_count(), 0);
    }
}

#[tokio::test]
async fn test_store_as_trait_object() {
    let bus = MemoryBus::new();
    let store: Box<dyn SecretStore> = Box::new(open(&bus, SessionMode::DhEncrypted).await);

    store.set("api", "ci", b"token").await.unwrap();
    assert!(store.exists("api", "ci").await.unwrap());
    assert_eq!(store.get("api", "ci").await.unwrap().expose_secret(), b"token");
}

#[tokio::test]
async fn test_stores_share_the_daemon() {
    let bus = MemoryBus::new();
    let writer = open(&bus, SessionMode::DhEncrypted).await;
    let reader = open(&bus, SessionMode::Plain).await;

    writer.set("db", "admin", b"s3cret").await.unwrap();
    assert_eq!(
        reader.get("db", "admin").await.unwrap().expose_secret(),
        b"s3cret"
    );
}
