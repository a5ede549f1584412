//! In-process secret service daemon.
//!
//! [`MemoryBus`] answers the same interfaces, members and reply shapes as a
//! real secret service, keeping sessions, collections and items in memory.
//! Prompt outcomes and negotiation faults are scripted through
//! [`PeerBehavior`], which makes it the backend for exercising the client
//! end to end without a desktop session.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;
use secretbus_core::config::{DEFAULT_BUS_NAME, DEFAULT_COLLECTION, DEFAULT_SERVICE_PATH};
use secretbus_core::{SecretBytes, SessionMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use async_trait::async_trait;

use crate::crypto::{self, SessionKey};
use crate::dh::OAKLEY_GROUP_2;
use crate::transport::{Bus, BusError, Bytes, MethodCall, ObjectPath, Signal};
use crate::types::names::*;
use crate::types::{Attributes, ItemProperties, Secret};

/// Path of the single collection the daemon starts with.
pub const LOGIN_COLLECTION: &str = "/org/freedesktop/secrets/collection/login";

const SIGNAL_CAPACITY: usize = 64;

const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
const ERROR_SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

/// What the daemon does when asked to show a prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptScript {
    /// The user confirms; the deferred action runs.
    #[default]
    Complete,

    /// The user dismisses the prompt.
    Dismiss,

    /// No completion is ever signalled.
    Ignore,
}

/// Scripted daemon behavior.
#[derive(Debug, Clone, Default)]
pub struct PeerBehavior {
    /// Refuse encrypted sessions with `NotSupported`.
    pub reject_encryption: bool,

    /// Reply to DH negotiation with this public value instead of our own.
    pub forced_public: Option<Vec<u8>>,

    /// Prompt outcome.
    pub prompt: PromptScript,

    /// Emit a completion for an unrelated prompt before answering.
    pub noise: bool,

    /// Defer item creation behind a prompt.
    pub prompt_on_create: bool,

    /// Defer item deletion behind a prompt.
    pub prompt_on_delete: bool,
}

/// An in-memory secret service reachable through [`Bus`].
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    behavior: PeerBehavior,
    signals: broadcast::Sender<Signal>,
    state: Mutex<State>,
}

struct State {
    connected: bool,
    next_id: u64,
    sessions: HashMap<ObjectPath, Option<SessionKey>>,
    collections: BTreeMap<ObjectPath, CollectionState>,
    aliases: HashMap<ObjectPath, ObjectPath>,
    items: BTreeMap<ObjectPath, StoredItem>,
    prompts: HashMap<ObjectPath, Deferred>,
}

struct CollectionState {
    locked: bool,
}

struct StoredItem {
    collection: ObjectPath,
    label: String,
    attributes: Attributes,
    secret: SecretBytes,
    content_type: String,
}

/// Work held back until its prompt completes.
enum Deferred {
    Unlock(Vec<ObjectPath>),
    Create {
        collection: ObjectPath,
        item: StoredItem,
        replace: bool,
    },
    Delete(ObjectPath),
    Echo(Value),
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// A daemon with an unlocked login collection aliased as default.
    pub fn new() -> Self {
        Self::with_behavior(PeerBehavior::default())
    }

    pub fn with_behavior(behavior: PeerBehavior) -> Self {
        let login = ObjectPath::new(LOGIN_COLLECTION);
        let mut collections = BTreeMap::new();
        collections.insert(login.clone(), CollectionState { locked: false });
        let mut aliases = HashMap::new();
        aliases.insert(ObjectPath::new(DEFAULT_COLLECTION), login);

        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                behavior,
                signals,
                state: Mutex::new(State {
                    connected: true,
                    next_id: 1,
                    sessions: HashMap::new(),
                    collections,
                    aliases,
                    items: BTreeMap::new(),
                    prompts: HashMap::new(),
                }),
            }),
        }
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Number of stored items across all collections.
    pub fn item_count(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Drop the connection; every later call fails with `Disconnected`.
    pub fn disconnect(&self) {
        self.inner.state.lock().connected = false;
    }

    /// Lock or unlock a collection (or alias) directly.
    pub fn set_locked(&self, collection: &ObjectPath, locked: bool) {
        let mut state = self.inner.state.lock();
        let resolved = state.resolve(collection);
        if let Some(c) = state.collections.get_mut(&resolved) {
            c.locked = locked;
        }
    }

    pub fn is_locked(&self, collection: &ObjectPath) -> bool {
        let state = self.inner.state.lock();
        let resolved = state.resolve(collection);
        state
            .collections
            .get(&resolved)
            .map(|c| c.locked)
            .unwrap_or(false)
    }

    /// Register a prompt whose completion carries `result`.
    pub fn stage_prompt(&self, result: Value) -> ObjectPath {
        self.inner.state.lock().new_prompt(Deferred::Echo(result))
    }

    /// Broadcast an arbitrary signal to every subscriber.
    pub fn emit_signal(&self, signal: Signal) {
        let _ = self.inner.signals.send(signal);
    }

    fn emit(&self, path: ObjectPath, dismissed: bool, result: Value) {
        let signal = Signal {
            path,
            interface: PROMPT_INTERFACE.to_string(),
            member: PROMPT_COMPLETED.to_string(),
            body: vec![Value::Bool(dismissed), result],
        };
        // Nobody listening is fine.
        self.emit_signal(signal);
    }

    fn dispatch(&self, state: &mut State, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        match (call.interface.as_str(), call.member.as_str()) {
            (SERVICE_INTERFACE, "OpenSession") => self.open_session(state, call),
            (SERVICE_INTERFACE, "Lock") => {
                let (objects,): (Vec<ObjectPath>,) = args(call)?;
                let mut locked = Vec::new();
                for object in objects {
                    let collection = state.collection_of(&object)?;
                    if let Some(c) = state.collections.get_mut(&collection) {
                        c.locked = true;
                    }
                    locked.push(object);
                }
                reply((locked, ObjectPath::root()))
            }
            (SERVICE_INTERFACE, "Unlock") => {
                let (objects,): (Vec<ObjectPath>,) = args(call)?;
                let mut unlocked = Vec::new();
                let mut deferred = Vec::new();
                for object in objects {
                    let collection = state.collection_of(&object)?;
                    if state.is_locked(&collection) {
                        deferred.push(object);
                    } else {
                        unlocked.push(object);
                    }
                }
                let prompt = if deferred.is_empty() {
                    ObjectPath::root()
                } else {
                    state.new_prompt(Deferred::Unlock(deferred))
                };
                reply((unlocked, prompt))
            }
            (SESSION_INTERFACE, "Close") => {
                state
                    .sessions
                    .remove(&call.path)
                    .ok_or_else(|| no_such_object(&call.path))?;
                debug!(session = %call.path, "daemon closed session");
                Ok(Vec::new())
            }
            (COLLECTION_INTERFACE, "SearchItems") => {
                let (query,): (Attributes,) = args(call)?;
                let collection = state.resolve_collection(&call.path)?;
                let found: Vec<ObjectPath> = state
                    .items
                    .iter()
                    .filter(|(_, item)| item.collection == collection)
                    .filter(|(_, item)| {
                        query
                            .iter()
                            .all(|(k, v)| item.attributes.get(k) == Some(v))
                    })
                    .map(|(path, _)| path.clone())
                    .collect();
                reply((found,))
            }
            (COLLECTION_INTERFACE, "CreateItem") => self.create_item(state, call),
            (ITEM_INTERFACE, "GetSecret") => {
                let (session,): (ObjectPath,) = args(call)?;
                let item = state
                    .items
                    .get(&call.path)
                    .ok_or_else(|| no_such_object(&call.path))?;
                if state.is_locked(&item.collection) {
                    return Err(BusError::remote(ERROR_IS_LOCKED, call.path.to_string()));
                }
                let key = state
                    .sessions
                    .get(&session)
                    .ok_or_else(|| BusError::remote(ERROR_NO_SESSION, session.to_string()))?;
                let secret = seal(&session, key.as_ref(), item)?;
                reply((secret,))
            }
            (ITEM_INTERFACE, "Delete") => {
                if !state.items.contains_key(&call.path) {
                    return Err(no_such_object(&call.path));
                }
                if self.inner.behavior.prompt_on_delete {
                    let prompt = state.new_prompt(Deferred::Delete(call.path.clone()));
                    return reply((prompt,));
                }
                state.items.remove(&call.path);
                reply((ObjectPath::root(),))
            }
            (PROPERTIES_INTERFACE, "Get") => {
                let (interface, property): (String, String) = args(call)?;
                let value = state.property(&call.path, &interface, &property)?;
                reply((value,))
            }
            (PROMPT_INTERFACE, "Prompt") => {
                let deferred = state
                    .prompts
                    .remove(&call.path)
                    .ok_or_else(|| no_such_object(&call.path))?;
                self.answer_prompt(state, call.path.clone(), deferred);
                Ok(Vec::new())
            }
            _ => Err(BusError::remote(
                ERROR_UNKNOWN_METHOD,
                format!("no method {} on {}", call.qualified_member(), call.path),
            )),
        }
    }

    fn open_session(&self, state: &mut State, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        let (algorithm, input): (String, Bytes) = args(call)?;
        let behavior = &self.inner.behavior;

        let (output, key) = if algorithm == SessionMode::Plain.algorithm() {
            (Vec::new(), None)
        } else if algorithm == SessionMode::DhEncrypted.algorithm() && !behavior.reject_encryption
        {
            let client_public = BigUint::from_bytes_be(&input.0);
            let keypair = OAKLEY_GROUP_2.generate_keypair();
            let shared = OAKLEY_GROUP_2
                .compute_shared_secret(&client_public, keypair.private())
                .map_err(|e| BusError::remote(ERROR_INVALID_ARGS, e.to_string()))?;
            let key = crypto::derive_key(&shared)
                .map_err(|e| BusError::remote(ERROR_INVALID_ARGS, e.to_string()))?;
            let output = behavior
                .forced_public
                .clone()
                .unwrap_or_else(|| keypair.public_bytes());
            (output, Some(key))
        } else {
            return Err(BusError::remote(
                ERROR_NOT_SUPPORTED,
                format!("algorithm {algorithm} is not supported"),
            ));
        };

        let path = state.next_path(&ObjectPath::new(DEFAULT_SERVICE_PATH).join("session"));
        state.sessions.insert(path.clone(), key);
        debug!(session = %path, %algorithm, "daemon opened session");
        reply((Bytes(output), path))
    }

    fn create_item(&self, state: &mut State, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        let (properties, secret, replace): (ItemProperties, Secret, bool) = args(call)?;
        let collection = state.resolve_collection(&call.path)?;
        if state.is_locked(&collection) {
            return Err(BusError::remote(ERROR_IS_LOCKED, collection.to_string()));
        }

        let key = state
            .sessions
            .get(&secret.session)
            .ok_or_else(|| BusError::remote(ERROR_NO_SESSION, secret.session.to_string()))?;
        let plaintext = match key {
            Some(key) => crypto::decrypt(&secret.parameters, &secret.value, key)
                .map_err(|e| BusError::remote(ERROR_INVALID_ARGS, e.to_string()))?,
            None => secret.value.clone(),
        };

        let item = StoredItem {
            collection: collection.clone(),
            label: properties.label,
            attributes: properties.attributes,
            secret: SecretBytes::new(plaintext),
            content_type: secret.content_type.clone(),
        };

        if self.inner.behavior.prompt_on_create {
            let prompt = state.new_prompt(Deferred::Create {
                collection,
                item,
                replace,
            });
            return reply((ObjectPath::root(), prompt));
        }

        let path = state.store(collection, item, replace);
        reply((path, ObjectPath::root()))
    }

    fn answer_prompt(&self, state: &mut State, path: ObjectPath, deferred: Deferred) {
        if self.inner.behavior.noise {
            let unrelated = ObjectPath::new(DEFAULT_SERVICE_PATH).join("prompt").join("noise");
            self.emit(unrelated, false, json!(["/unrelated"]));
        }

        match self.inner.behavior.prompt {
            PromptScript::Ignore => {}
            PromptScript::Dismiss => self.emit(path, true, json!("")),
            PromptScript::Complete => {
                let result = match deferred {
                    Deferred::Unlock(objects) => {
                        for object in &objects {
                            if let Ok(collection) = state.collection_of(object) {
                                if let Some(c) = state.collections.get_mut(&collection) {
                                    c.locked = false;
                                }
                            }
                        }
                        json!(objects)
                    }
                    Deferred::Create {
                        collection,
                        item,
                        replace,
                    } => json!(state.store(collection, item, replace)),
                    Deferred::Delete(item) => {
                        state.items.remove(&item);
                        json!("")
                    }
                    Deferred::Echo(value) => value,
                };
                self.emit(path, false, result);
            }
        }
    }
}

impl State {
    fn next_path(&mut self, base: &ObjectPath) -> ObjectPath {
        let id = self.next_id;
        self.next_id += 1;
        base.join(id)
    }

    fn new_prompt(&mut self, deferred: Deferred) -> ObjectPath {
        let path = self.next_path(&ObjectPath::new(DEFAULT_SERVICE_PATH).join("prompt"));
        self.prompts.insert(path.clone(), deferred);
        path
    }

    fn resolve(&self, path: &ObjectPath) -> ObjectPath {
        self.aliases.get(path).cloned().unwrap_or_else(|| path.clone())
    }

    fn resolve_collection(&self, path: &ObjectPath) -> Result<ObjectPath, BusError> {
        let resolved = self.resolve(path);
        if self.collections.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(no_such_object(path))
        }
    }

    /// Collection owning `object`, which is either a collection or an item.
    fn collection_of(&self, object: &ObjectPath) -> Result<ObjectPath, BusError> {
        match self.items.get(object) {
            Some(item) => Ok(item.collection.clone()),
            None => self.resolve_collection(object),
        }
    }

    fn is_locked(&self, collection: &ObjectPath) -> bool {
        self.collections
            .get(collection)
            .map(|c| c.locked)
            .unwrap_or(false)
    }

    fn store(&mut self, collection: ObjectPath, item: StoredItem, replace: bool) -> ObjectPath {
        if replace {
            let existing = self
                .items
                .iter()
                .find(|(_, i)| i.collection == collection && i.attributes == item.attributes)
                .map(|(path, _)| path.clone());
            if let Some(path) = existing {
                self.items.insert(path.clone(), item);
                return path;
            }
        }

        let path = self.next_path(&collection);
        self.items.insert(path.clone(), item);
        path
    }

    fn property(
        &self,
        path: &ObjectPath,
        interface: &str,
        property: &str,
    ) -> Result<Value, BusError> {
        match interface {
            ITEM_INTERFACE => {
                let item = self.items.get(path).ok_or_else(|| no_such_object(path))?;
                match property {
                    "Label" => Ok(json!(item.label)),
                    "Attributes" => Ok(json!(item.attributes)),
                    "Locked" => Ok(json!(self.is_locked(&item.collection))),
                    _ => Err(unknown_property(interface, property)),
                }
            }
            COLLECTION_INTERFACE => {
                let collection = self.resolve_collection(path)?;
                match property {
                    "Locked" => Ok(json!(self.is_locked(&collection))),
                    "Items" => Ok(json!(self
                        .items
                        .iter()
                        .filter(|(_, i)| i.collection == collection)
                        .map(|(p, _)| p)
                        .collect::<Vec<_>>())),
                    _ => Err(unknown_property(interface, property)),
                }
            }
            _ => Err(unknown_property(interface, property)),
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn call(&self, call: MethodCall) -> Result<Vec<Value>, BusError> {
        let mut state = self.inner.state.lock();
        if !state.connected {
            return Err(BusError::Disconnected);
        }
        if call.destination != DEFAULT_BUS_NAME {
            return Err(BusError::remote(
                ERROR_SERVICE_UNKNOWN,
                format!("no service named {}", call.destination),
            ));
        }
        self.dispatch(&mut state, &call)
    }

    fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.inner.signals.subscribe()
    }
}

fn seal(
    session: &ObjectPath,
    key: Option<&SessionKey>,
    item: &StoredItem,
) -> Result<Secret, BusError> {
    let (parameters, value) = match key {
        Some(key) => {
            let (iv, ciphertext) = crypto::encrypt(item.secret.expose_secret(), key)
                .map_err(|e| BusError::remote(ERROR_INVALID_ARGS, e.to_string()))?;
            (iv.to_vec(), ciphertext)
        }
        None => (Vec::new(), item.secret.expose_secret().to_vec()),
    };
    Ok(Secret {
        session: session.clone(),
        parameters,
        value,
        content_type: item.content_type.clone(),
    })
}

fn args<T: DeserializeOwned>(call: &MethodCall) -> Result<T, BusError> {
    serde_json::from_value(Value::Array(call.args.clone())).map_err(|e| {
        BusError::remote(
            ERROR_INVALID_ARGS,
            format!("{}: {e}", call.qualified_member()),
        )
    })
}

fn reply<T: Serialize>(values: T) -> Result<Vec<Value>, BusError> {
    match serde_json::to_value(values).map_err(|e| BusError::InvalidArgs(e.to_string()))? {
        Value::Array(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

fn no_such_object(path: &ObjectPath) -> BusError {
    BusError::remote(ERROR_NO_SUCH_OBJECT, path.to_string())
}

fn unknown_property(interface: &str, property: &str) -> BusError {
    BusError::remote(ERROR_INVALID_ARGS, format!("no property {interface}.{property}"))
}
