//! Encrypted secret transport for SecretBus.
//!
//! Talks to a secret service daemon over a message bus without ever placing
//! a secret on the bus in cleartext: sessions negotiate an AES-128 key over
//! an unauthenticated Diffie-Hellman exchange, and operations that need user
//! confirmation are resolved through the prompt handshake.
//!
//! The bus itself is abstracted behind [`Bus`]. [`MemoryBus`] is an
//! in-process daemon implementing it.

pub mod crypto;
pub mod dh;
pub mod error;
pub mod memory;
pub mod prompt;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

pub use error::{Result, SecretError};
pub use memory::{MemoryBus, PeerBehavior, PromptScript};
pub use prompt::{PromptHandle, PromptState, PromptWait, PROMPT_TIMEOUT};
pub use service::{Pending, SecretService};
pub use session::Session;
pub use store::{CredentialRef, KeyringStore, SecretStore};
pub use transport::{Bus, BusError, MethodCall, ObjectPath, Signal};
pub use types::{attributes, Attributes, ItemProperties, ReplaceBehavior, Secret};
