//! Prompt-gated operations against the in-process daemon.

use std::time::Duration;

use secretbus_core::{Config, SessionMode};
use secretbus_integration_tests::{client, init_tracing};
use secretbus_secrets::memory::LOGIN_COLLECTION;
use secretbus_secrets::types::TEXT_CONTENT_TYPE;
use secretbus_secrets::{
    attributes, ItemProperties, MemoryBus, ObjectPath, PeerBehavior, PromptScript,
    ReplaceBehavior, SecretError, SecretService, PROMPT_TIMEOUT,
};

fn login() -> ObjectPath {
    ObjectPath::new(LOGIN_COLLECTION)
}

#[tokio::test]
async fn test_unlock_completes_with_affected_paths() {
    let service = client(PeerBehavior {
        noise: true,
        ..PeerBehavior::default()
    });
    service.bus().set_locked(&login(), true);

    let pending = service.unlock_items(&[login()]).await.unwrap();
    assert!(pending.needs_prompt());
    let unlocked = pending.complete(&service).await.unwrap();

    assert_eq!(unlocked, vec![login()]);
    assert!(!service.bus().is_locked(&login()));
}

#[tokio::test]
async fn test_unlock_dismissed() {
    let service = client(PeerBehavior {
        prompt: PromptScript::Dismiss,
        ..PeerBehavior::default()
    });
    service.bus().set_locked(&login(), true);

    let err = service
        .unlock_items(&[login()])
        .await
        .unwrap()
        .complete(&service)
        .await
        .unwrap_err();
    assert!(matches!(err, SecretError::PromptDismissed(_)));
    assert!(err.is_prompt_outcome());
    assert!(service.bus().is_locked(&login()));
}

#[tokio::test(start_paused = true)]
async fn test_unlock_times_out_after_thirty_seconds() {
    let service = client(PeerBehavior {
        prompt: PromptScript::Ignore,
        ..PeerBehavior::default()
    });
    service.bus().set_locked(&login(), true);

    let started = tokio::time::Instant::now();
    let err = service
        .unlock_items(&[login()])
        .await
        .unwrap()
        .complete(&service)
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::PromptTimeout { after, .. } if after == PROMPT_TIMEOUT));
    assert!(started.elapsed() >= PROMPT_TIMEOUT);
    assert!(service.bus().is_locked(&login()));
}

#[tokio::test(start_paused = true)]
async fn test_configured_prompt_timeout() {
    init_tracing();
    let mut config = Config::default();
    config.prompt.timeout_secs = 2;

    let bus = MemoryBus::with_behavior(PeerBehavior {
        prompt: PromptScript::Ignore,
        ..PeerBehavior::default()
    });
    bus.set_locked(&login(), true);
    let service = SecretService::with_config(bus, &config);

    let err = service
        .unlock_items(&[login()])
        .await
        .unwrap()
        .complete(&service)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SecretError::PromptTimeout { after, .. } if after == Duration::from_secs(2)
    ));
}

#[tokio::test]
async fn test_deferred_create_and_delete() {
    let service = client(PeerBehavior {
        prompt_on_create: true,
        prompt_on_delete: true,
        noise: true,
        ..PeerBehavior::default()
    });
    let session = service.open_session(SessionMode::DhEncrypted).await.unwrap();
    let secret = session.new_secret(b"deferred", TEXT_CONTENT_TYPE).unwrap();

    let pending = service
        .create_item(
            &login(),
            &ItemProperties::new("deferred", attributes([("k", "v")])),
            &secret,
            ReplaceBehavior::DoNotReplace,
        )
        .await
        .unwrap();
    assert!(pending.needs_prompt());
    let item = pending.complete(&service).await.unwrap();
    assert!(!item.is_root());
    assert_eq!(
        service.get_secret(&item, &session).await.unwrap().expose_secret(),
        b"deferred"
    );

    let pending = service.delete_item(&item).await.unwrap();
    assert!(pending.needs_prompt());
    pending.complete(&service).await.unwrap();
    assert_eq!(service.bus().item_count(), 0);
}

#[tokio::test]
async fn test_concurrent_prompts_on_one_bus() {
    let service = client(PeerBehavior::default());

    service.bus().set_locked(&login(), true);
    let first = service.unlock_items(&[login()]).await.unwrap();
    let second = service.unlock_items(&[login()]).await.unwrap();
    assert!(first.needs_prompt() && second.needs_prompt());
    assert_ne!(first.prompt(), second.prompt());

    let (a, b) = tokio::join!(first.complete(&service), second.complete(&service));
    assert_eq!(a.unwrap(), vec![login()]);
    assert_eq!(b.unwrap(), vec![login()]);
}
