//! Message-bus transport seam.
//!
//! The protocol only needs two capabilities from the bus: issue a method
//! call and decode its typed reply, and observe asynchronous signals.
//! Arguments and reply values are serde-marshalled, so any bus binding can
//! plug in by implementing [`Bus`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Sentinel path meaning "no object" (no prompt, no item).
const ROOT_PATH: &str = "/";

/// An object path on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Create an object path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The `/` sentinel.
    pub fn root() -> Self {
        Self(ROOT_PATH.to_string())
    }

    /// Whether this is the `/` sentinel.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_PATH
    }

    /// Append a path segment.
    pub fn join(&self, segment: impl fmt::Display) -> Self {
        if self.is_root() {
            Self(format!("/{segment}"))
        } else {
            Self(format!("{}/{segment}", self.0))
        }
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A method call addressed to an object on the bus.
#[derive(Debug, Clone)]
pub struct MethodCall {
    /// Well-known bus name of the destination.
    pub destination: String,

    /// Target object.
    pub path: ObjectPath,

    /// Interface the member belongs to.
    pub interface: String,

    /// Method name.
    pub member: String,

    /// Marshalled arguments, in order.
    pub args: Vec<Value>,
}

impl MethodCall {
    /// Create a call with no arguments.
    pub fn new(
        destination: impl Into<String>,
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            path,
            interface: interface.into(),
            member: member.into(),
            args: Vec::new(),
        }
    }

    /// Set the arguments from a serializable tuple.
    ///
    /// `()` means no arguments and a 1-tuple `(x,)` a single argument.
    pub fn with_args<A: Serialize>(mut self, args: A) -> Result<Self, BusError> {
        self.args = match serde_json::to_value(args)
            .map_err(|e| BusError::InvalidArgs(e.to_string()))?
        {
            Value::Null => Vec::new(),
            Value::Array(values) => values,
            single => vec![single],
        };
        Ok(self)
    }

    /// Fully qualified method name, e.g. `org.freedesktop.Secret.Service.OpenSession`.
    pub fn qualified_member(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }
}

/// An asynchronous notification emitted by an object on the bus.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Emitting object.
    pub path: ObjectPath,

    /// Interface the signal belongs to.
    pub interface: String,

    /// Signal name.
    pub member: String,

    /// Marshalled body values.
    pub body: Vec<Value>,
}

impl Signal {
    /// Whether the signal matches an interface and member name.
    pub fn is(&self, interface: &str, member: &str) -> bool {
        self.interface == interface && self.member == member
    }
}

/// Errors raised by the bus itself.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The peer replied with a named error.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    /// The bus connection is gone.
    #[error("bus disconnected")]
    Disconnected,

    /// Arguments could not be marshalled or were rejected.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

impl BusError {
    /// Build a named remote error.
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A message-bus connection.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Issue a method call and wait for its reply values.
    async fn call(&self, call: MethodCall) -> Result<Vec<Value>, BusError>;

    /// Subscribe to signals.
    ///
    /// Every subscriber observes every signal emitted after it subscribed.
    fn subscribe(&self) -> broadcast::Receiver<Signal>;
}

/// Serde adapter carrying byte arrays as base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A byte array argument, marshalled as base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytes(#[serde(with = "base64_bytes")] pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_path_root_and_join() {
        let root = ObjectPath::root();
        assert!(root.is_root());
        assert_eq!(root.join("session").as_str(), "/session");

        let collection = ObjectPath::new("/org/freedesktop/secrets/collection/login");
        assert!(!collection.is_root());
        assert_eq!(
            collection.join(3).as_str(),
            "/org/freedesktop/secrets/collection/login/3"
        );
    }

    #[test]
    fn test_with_args_shapes() {
        let path = ObjectPath::new("/org/freedesktop/secrets");
        let call = MethodCall::new("org.freedesktop.secrets", path.clone(), "iface", "Noop")
            .with_args(())
            .unwrap();
        assert!(call.args.is_empty());

        let call = MethodCall::new("org.freedesktop.secrets", path.clone(), "iface", "One")
            .with_args((&path,))
            .unwrap();
        assert_eq!(call.args, vec![json!("/org/freedesktop/secrets")]);

        let call = MethodCall::new("org.freedesktop.secrets", path, "iface", "Two")
            .with_args(("plain", true))
            .unwrap();
        assert_eq!(call.args, vec![json!("plain"), json!(true)]);
        assert_eq!(call.qualified_member(), "iface.Two");
    }

    #[test]
    fn test_bytes_are_base64() {
        let value = serde_json::to_value(Bytes(vec![0, 1, 2, 255])).unwrap();
        assert_eq!(value, json!("AAEC/w=="));
        let back: Bytes = serde_json::from_value(value).unwrap();
        assert_eq!(back.0, vec![0, 1, 2, 255]);
        assert!(serde_json::from_value::<Bytes>(json!("not base64!")).is_err());
    }
}
