//! End-to-end item flows over plain and encrypted sessions.

use num_bigint::BigUint;
use secretbus_core::SessionMode;
use secretbus_integration_tests::client;
use secretbus_secrets::dh::OAKLEY_GROUP_2;
use secretbus_secrets::memory::LOGIN_COLLECTION;
use secretbus_secrets::types::TEXT_CONTENT_TYPE;
use secretbus_secrets::{
    attributes, ItemProperties, ObjectPath, PeerBehavior, ReplaceBehavior, SecretError,
};

async fn full_cycle(mode: SessionMode) {
    let service = client(PeerBehavior::default());
    let session = service.open_session(mode).await.unwrap();
    assert_eq!(session.is_encrypted(), mode.is_encrypted());

    let props = ItemProperties::new(
        "alice@mail.example",
        attributes([("service", "mail.example"), ("account", "alice")]),
    );
    let secret = session.new_secret(b"correct horse", TEXT_CONTENT_TYPE).unwrap();
    let item = service
        .create_item(
            service.default_collection(),
            &props,
            &secret,
            ReplaceBehavior::DoNotReplace,
        )
        .await
        .unwrap()
        .complete(&service)
        .await
        .unwrap();

    let found = service
        .search_collection(
            service.default_collection(),
            &attributes([("account", "alice")]),
        )
        .await
        .unwrap();
    assert_eq!(found, vec![item.clone()]);

    let value = service.get_secret(&item, &session).await.unwrap();
    assert_eq!(value.expose_secret(), b"correct horse");

    service
        .delete_item(&item)
        .await
        .unwrap()
        .complete(&service)
        .await
        .unwrap();
    let found = service
        .search_collection(
            service.default_collection(),
            &attributes([("account", "alice")]),
        )
        .await
        .unwrap();
    assert!(found.is_empty());

    service.close_session(session).await.unwrap();
    assert_eq!(service.bus().session_count(), 0);
}

#[tokio::test]
async fn test_plain_session_cycle() {
    full_cycle(SessionMode::Plain).await;
}

#[tokio::test]
async fn test_encrypted_session_cycle() {
    full_cycle(SessionMode::DhEncrypted).await;
}

#[tokio::test]
async fn test_encrypted_envelopes_hide_plaintext() {
    let service = client(PeerBehavior::default());
    let session = service.open_session(SessionMode::DhEncrypted).await.unwrap();

    let first = session.new_secret(b"correct horse", TEXT_CONTENT_TYPE).unwrap();
    let second = session.new_secret(b"correct horse", TEXT_CONTENT_TYPE).unwrap();

    assert_eq!(first.parameters.len(), 16);
    assert_ne!(first.parameters, second.parameters);
    assert_ne!(first.value, second.value);
    assert!(!first
        .value
        .windows(b"correct horse".len())
        .any(|w| w == b"correct horse"));
}

#[tokio::test]
async fn test_sessions_do_not_share_keys() {
    let service = client(PeerBehavior::default());
    let a = service.open_session(SessionMode::DhEncrypted).await.unwrap();
    let b = service.open_session(SessionMode::DhEncrypted).await.unwrap();
    assert_ne!(a.path(), b.path());

    let mut sealed = a.new_secret(b"only for a", TEXT_CONTENT_TYPE).unwrap();
    // Relabelled for b, the ciphertext is still under a's key.
    sealed.session = b.path().clone();
    match b.open_secret(&sealed) {
        Ok(recovered) => assert_ne!(recovered.expose_secret(), b"only for a"),
        Err(e) => assert!(matches!(e, SecretError::Padding(_))),
    }
}

#[tokio::test]
async fn test_degenerate_peer_public_values() {
    let p_minus_one = OAKLEY_GROUP_2.modulus() - 1u32;
    for bad in [BigUint::from(1u32), p_minus_one] {
        let service = client(PeerBehavior {
            forced_public: Some(bad.to_bytes_be()),
            ..PeerBehavior::default()
        });
        let result = service.open_session(SessionMode::DhEncrypted).await;
        assert!(matches!(result, Err(SecretError::OutOfRange)));
    }
}

#[tokio::test]
async fn test_rejected_encryption() {
    let service = client(PeerBehavior {
        reject_encryption: true,
        ..PeerBehavior::default()
    });
    let err = service
        .open_session(SessionMode::DhEncrypted)
        .await
        .unwrap_err();
    assert!(matches!(err, SecretError::Session { .. }));
    assert!(!err.is_prompt_outcome());

    // Plain sessions still work against the same daemon.
    service.open_session(SessionMode::Plain).await.unwrap();
}

#[tokio::test]
async fn test_item_in_unknown_collection() {
    let service = client(PeerBehavior::default());
    let session = service.open_session(SessionMode::Plain).await.unwrap();
    let secret = session.new_secret(b"x", TEXT_CONTENT_TYPE).unwrap();

    let result = service
        .create_item(
            &ObjectPath::new(LOGIN_COLLECTION).join("missing"),
            &ItemProperties::new("x", attributes([("k", "v")])),
            &secret,
            ReplaceBehavior::DoNotReplace,
        )
        .await;
    assert!(matches!(result, Err(SecretError::NotFound(_))));
}
