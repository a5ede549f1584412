//! Wire types exchanged with the secret service.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::transport::{base64_bytes, ObjectPath};

/// Interface and error names of the secret service protocol.
pub mod names {
    pub const SERVICE_INTERFACE: &str = "org.freedesktop.Secret.Service";
    pub const COLLECTION_INTERFACE: &str = "org.freedesktop.Secret.Collection";
    pub const ITEM_INTERFACE: &str = "org.freedesktop.Secret.Item";
    pub const SESSION_INTERFACE: &str = "org.freedesktop.Secret.Session";
    pub const PROMPT_INTERFACE: &str = "org.freedesktop.Secret.Prompt";
    pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

    pub const PROMPT_COMPLETED: &str = "Completed";

    pub const ERROR_NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";
    pub const ERROR_NO_SUCH_OBJECT: &str = "org.freedesktop.Secret.Error.NoSuchObject";
    pub const ERROR_IS_LOCKED: &str = "org.freedesktop.Secret.Error.IsLocked";
    pub const ERROR_NO_SESSION: &str = "org.freedesktop.Secret.Error.NoSession";
}

/// Item attributes: exact-match lookup keys, also used as search filters.
pub type Attributes = HashMap<String, String>;

/// Default content type for text secrets.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf8";

/// Property name of an item's label.
pub const LABEL_PROPERTY: &str = "org.freedesktop.Secret.Item.Label";

/// Property name of an item's attributes.
pub const ATTRIBUTES_PROPERTY: &str = "org.freedesktop.Secret.Item.Attributes";

/// A secret envelope as carried on the bus.
///
/// When the session is encrypted, `parameters` holds the IV and `value` the
/// ciphertext. In plain sessions `parameters` is empty and `value` is the
/// secret itself. Both buffers are zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Session the envelope was sealed for.
    pub session: ObjectPath,

    /// Algorithm parameters (the IV for encrypted sessions).
    #[serde(with = "base64_bytes")]
    pub parameters: Vec<u8>,

    /// Ciphertext or plaintext.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,

    /// MIME type of the secret.
    pub content_type: String,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("session", &self.session)
            .field("parameters", &self.parameters.len())
            .field("value", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.parameters.zeroize();
        self.value.zeroize();
    }
}

/// Properties for a new item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProperties {
    /// Human-readable label.
    #[serde(rename = "org.freedesktop.Secret.Item.Label")]
    pub label: String,

    /// Lookup attributes.
    #[serde(rename = "org.freedesktop.Secret.Item.Attributes")]
    pub attributes: Attributes,
}

impl ItemProperties {
    /// Create item properties from a label and attributes.
    pub fn new(label: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            label: label.into(),
            attributes,
        }
    }
}

/// What to do when an item with identical attributes already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplaceBehavior {
    /// Keep the existing item and add another.
    #[default]
    DoNotReplace,

    /// Overwrite the existing item.
    Replace,
}

impl ReplaceBehavior {
    /// Wire representation.
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Replace)
    }
}

/// Build an attribute map from key/value pairs.
pub fn attributes<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
