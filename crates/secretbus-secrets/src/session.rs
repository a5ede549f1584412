//! Session negotiation and secret sealing.
//!
//! A session is opened in one of two modes. In plain mode secrets cross the
//! bus as-is. In encrypted mode both sides exchange DH public values when
//! the session is opened and derive a shared AES key that seals every
//! secret envelope sent within that session.

use num_bigint::BigUint;
use secretbus_core::{SecretBytes, SessionMode};
use tracing::{debug, warn};

use crate::crypto::{self, SessionKey};
use crate::dh::OAKLEY_GROUP_2;
use crate::error::{Result, SecretError};
use crate::transport::{Bus, BusError, Bytes, MethodCall, ObjectPath};
use crate::types::names::{ERROR_NOT_SUPPORTED, SERVICE_INTERFACE, SESSION_INTERFACE};
use crate::types::Secret;

/// An open session with the daemon.
///
/// Owns the symmetric key (if any) exclusively. The key is zeroed when the
/// session is dropped or closed, and is never reused for another session.
#[derive(Debug)]
pub struct Session {
    path: ObjectPath,
    mode: SessionMode,
    key: Option<SessionKey>,
}

impl Session {
    /// Object path of the session on the daemon.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Negotiated mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Whether secrets in this session are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Seal a plaintext secret into an envelope for this session.
    pub fn new_secret(&self, value: &[u8], content_type: impl Into<String>) -> Result<Secret> {
        let (parameters, value) = match &self.key {
            Some(key) => {
                let (iv, ciphertext) = crypto::encrypt(value, key)?;
                (iv.to_vec(), ciphertext)
            }
            None => (Vec::new(), value.to_vec()),
        };

        Ok(Secret {
            session: self.path.clone(),
            parameters,
            value,
            content_type: content_type.into(),
        })
    }

    /// Open an envelope received from the daemon.
    pub fn open_secret(&self, secret: &Secret) -> Result<SecretBytes> {
        if secret.session != self.path {
            return Err(SecretError::session(
                "open secret",
                format!(
                    "envelope belongs to session {}, not {}",
                    secret.session, self.path
                ),
            ));
        }

        match &self.key {
            Some(key) => {
                let plaintext = crypto::decrypt(&secret.parameters, &secret.value, key)?;
                Ok(SecretBytes::new(plaintext))
            }
            None if !secret.parameters.is_empty() => Err(SecretError::session(
                "open secret",
                "plain session received algorithm parameters",
            )),
            None => Ok(SecretBytes::new(secret.value.clone())),
        }
    }
}

/// Open a session against the service object at `service_path`.
pub async fn open_session<B: Bus + ?Sized>(
    bus: &B,
    destination: &str,
    service_path: &ObjectPath,
    mode: SessionMode,
) -> Result<Session> {
    debug!(%mode, "opening session");

    let keypair = match mode {
        SessionMode::Plain => None,
        SessionMode::DhEncrypted => Some(OAKLEY_GROUP_2.generate_keypair()),
    };
    let input = Bytes(keypair.as_ref().map(|k| k.public_bytes()).unwrap_or_default());

    let call = MethodCall::new(destination, service_path.clone(), SERVICE_INTERFACE, "OpenSession")
        .with_args((mode.algorithm(), input))
        .map_err(|e| SecretError::session("marshal request", e.to_string()))?;

    let reply = bus.call(call).await.map_err(|e| match e {
        BusError::Remote { ref name, .. } if name == ERROR_NOT_SUPPORTED => {
            SecretError::session("negotiate", format!("peer rejected mode {mode}"))
        }
        other => SecretError::session("open", other.to_string()),
    })?;

    let (output, path): (Bytes, ObjectPath) =
        serde_json::from_value(serde_json::Value::Array(reply))
            .map_err(|e| SecretError::session("decode reply", e.to_string()))?;

    let Some(keypair) = keypair else {
        debug!(session = %path, "opened plain session");
        return Ok(Session {
            path,
            mode,
            key: None,
        });
    };

    if output.0.is_empty() {
        warn!(session = %path, "peer returned no public value, abandoning session");
        release(bus, destination, &path).await.ok();
        return Err(SecretError::session(
            "negotiate",
            "peer returned no public value",
        ));
    }

    let peer_public = BigUint::from_bytes_be(&output.0);
    let shared = match OAKLEY_GROUP_2.compute_shared_secret(&peer_public, keypair.private()) {
        Ok(shared) => shared,
        Err(e) => {
            warn!(session = %path, "peer public value out of range, abandoning session");
            release(bus, destination, &path).await.ok();
            return Err(e);
        }
    };
    let key = crypto::derive_key(&shared)?;

    debug!(session = %path, "opened encrypted session");
    Ok(Session {
        path,
        mode,
        key: Some(key),
    })
}

/// Ask the daemon to release a session.
///
/// The session is consumed whatever the outcome, so its key is gone once
/// this returns.
pub async fn close_session<B: Bus + ?Sized>(
    bus: &B,
    destination: &str,
    session: Session,
) -> Result<()> {
    let path = session.path.clone();
    drop(session);

    release(bus, destination, &path).await.map_err(|e| {
        warn!(session = %path, error = %e, "failed to close session");
        e
    })?;
    debug!(session = %path, "closed session");
    Ok(())
}

async fn release<B: Bus + ?Sized>(bus: &B, destination: &str, path: &ObjectPath) -> Result<()> {
    let call = MethodCall::new(destination, path.clone(), SESSION_INTERFACE, "Close");
    bus.call(call)
        .await
        .map(|_| ())
        .map_err(|e| SecretError::from_bus("close session", e))
}
