//! Item protocol client.
//!
//! [`SecretService`] issues the collection, item and service calls of the
//! secret service protocol. Operations the daemon may hold behind a prompt
//! return a [`Pending`] that has to be driven through
//! [`Pending::complete`] before the operation counts as done.

use std::time::Duration;

use secretbus_core::{Config, SecretBytes, SessionMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SecretError};
use crate::prompt::{PromptHandle, PromptWait};
use crate::session::{self, Session};
use crate::transport::{Bus, MethodCall, ObjectPath};
use crate::types::names::{
    COLLECTION_INTERFACE, ITEM_INTERFACE, PROPERTIES_INTERFACE, SERVICE_INTERFACE,
};
use crate::types::{Attributes, ItemProperties, ReplaceBehavior, Secret};

/// Client for a secret service daemon on a bus.
pub struct SecretService<B: Bus> {
    bus: B,
    destination: String,
    service_path: ObjectPath,
    default_collection: ObjectPath,
    window_id: String,
    prompt_timeout: Duration,
}

impl<B: Bus> SecretService<B> {
    /// Connect with default addressing and prompt settings.
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, &Config::default())
    }

    pub fn with_config(bus: B, config: &Config) -> Self {
        Self {
            bus,
            destination: config.service.bus_name.clone(),
            service_path: ObjectPath::new(config.service.object_path.as_str()),
            default_collection: ObjectPath::new(config.service.default_collection.as_str()),
            window_id: config.prompt.window_id.clone(),
            prompt_timeout: config.prompt.timeout(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Collection used when the caller does not name one.
    pub fn default_collection(&self) -> &ObjectPath {
        &self.default_collection
    }

    pub async fn open_session(&self, mode: SessionMode) -> Result<Session> {
        session::open_session(&self.bus, &self.destination, &self.service_path, mode).await
    }

    pub async fn close_session(&self, session: Session) -> Result<()> {
        session::close_session(&self.bus, &self.destination, session).await
    }

    /// Items in `collection` whose attributes include every pair in `query`.
    pub async fn search_collection(
        &self,
        collection: &ObjectPath,
        query: &Attributes,
    ) -> Result<Vec<ObjectPath>> {
        let (items,): (Vec<ObjectPath>,) = self
            .invoke(
                "search items",
                collection.clone(),
                COLLECTION_INTERFACE,
                "SearchItems",
                (query,),
            )
            .await?;
        debug!(collection = %collection, found = items.len(), "searched collection");
        Ok(items)
    }

    /// Create an item holding `secret`.
    ///
    /// The returned path is `/` until the pending prompt (if any) completes.
    pub async fn create_item(
        &self,
        collection: &ObjectPath,
        properties: &ItemProperties,
        secret: &Secret,
        replace: ReplaceBehavior,
    ) -> Result<Pending<ObjectPath>> {
        let (item, prompt): (ObjectPath, ObjectPath) = self
            .invoke(
                "create item",
                collection.clone(),
                COLLECTION_INTERFACE,
                "CreateItem",
                (properties, secret, replace.as_bool()),
            )
            .await?;
        debug!(collection = %collection, item = %item, "create item issued");
        Ok(Pending::new(item, prompt, created_item))
    }

    /// Fetch and open the secret of `item` within `session`.
    pub async fn get_secret(&self, item: &ObjectPath, session: &Session) -> Result<SecretBytes> {
        let (secret,): (Secret,) = self
            .invoke(
                "get secret",
                item.clone(),
                ITEM_INTERFACE,
                "GetSecret",
                (session.path(),),
            )
            .await?;
        session.open_secret(&secret)
    }

    pub async fn get_attributes(&self, item: &ObjectPath) -> Result<Attributes> {
        let (attributes,): (Attributes,) = self
            .invoke(
                "get attributes",
                item.clone(),
                PROPERTIES_INTERFACE,
                "Get",
                (ITEM_INTERFACE, "Attributes"),
            )
            .await?;
        Ok(attributes)
    }

    pub async fn delete_item(&self, item: &ObjectPath) -> Result<Pending<()>> {
        let (prompt,): (ObjectPath,) = self
            .invoke("delete item", item.clone(), ITEM_INTERFACE, "Delete", ())
            .await?;
        debug!(item = %item, "delete issued");
        Ok(Pending::new((), prompt, |(), _| Ok(())))
    }

    /// Lock collections or items. Resolves to every object that ended up locked.
    pub async fn lock_items(&self, objects: &[ObjectPath]) -> Result<Pending<Vec<ObjectPath>>> {
        let (locked, prompt): (Vec<ObjectPath>, ObjectPath) = self
            .invoke(
                "lock",
                self.service_path.clone(),
                SERVICE_INTERFACE,
                "Lock",
                (objects,),
            )
            .await?;
        Ok(Pending::new(locked, prompt, affected_objects))
    }

    /// Unlock collections or items. Resolves to every object that ended up unlocked.
    pub async fn unlock_items(
        &self,
        objects: &[ObjectPath],
    ) -> Result<Pending<Vec<ObjectPath>>> {
        let (unlocked, prompt): (Vec<ObjectPath>, ObjectPath) = self
            .invoke(
                "unlock",
                self.service_path.clone(),
                SERVICE_INTERFACE,
                "Unlock",
                (objects,),
            )
            .await?;
        Ok(Pending::new(unlocked, prompt, affected_objects))
    }

    /// Drive a prompt with this client's window id and timeout.
    pub async fn wait_prompt(&self, handle: PromptHandle) -> Result<Option<Value>> {
        PromptWait::new(&self.bus, &self.destination, handle)
            .with_window_id(self.window_id.as_str())
            .with_timeout(self.prompt_timeout)
            .run()
            .await
    }

    async fn invoke<A, R>(
        &self,
        operation: &'static str,
        path: ObjectPath,
        interface: &str,
        member: &str,
        args: A,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let call = MethodCall::new(self.destination.as_str(), path, interface, member)
            .with_args(args)
            .map_err(|e| SecretError::from_bus(operation, e))?;
        let reply = self
            .bus
            .call(call)
            .await
            .map_err(|e| SecretError::from_bus(operation, e))?;
        serde_json::from_value(Value::Array(reply))
            .map_err(|source| SecretError::Decode { operation, source })
    }
}

/// Result of an operation that may still be waiting on a prompt.
#[must_use = "the operation is not finished until its prompt is completed"]
#[derive(Debug)]
pub struct Pending<T> {
    value: T,
    prompt: PromptHandle,
    finish: fn(T, Value) -> Result<T>,
}

impl<T> Pending<T> {
    fn new(value: T, prompt: ObjectPath, finish: fn(T, Value) -> Result<T>) -> Self {
        Self {
            value,
            prompt: PromptHandle::from_path(prompt),
            finish,
        }
    }

    pub fn prompt(&self) -> &PromptHandle {
        &self.prompt
    }

    /// Whether user interaction is needed before the value is final.
    pub fn needs_prompt(&self) -> bool {
        self.prompt.is_pending()
    }

    /// Drive the prompt (if any) and return the final value.
    pub async fn complete<B: Bus>(self, service: &SecretService<B>) -> Result<T> {
        match service.wait_prompt(self.prompt).await? {
            None => Ok(self.value),
            Some(result) => (self.finish)(self.value, result),
        }
    }
}

fn created_item(item: ObjectPath, result: Value) -> Result<ObjectPath> {
    if !item.is_root() {
        return Ok(item);
    }
    serde_json::from_value(result).map_err(|source| SecretError::Decode {
        operation: "create item",
        source,
    })
}

fn affected_objects(mut objects: Vec<ObjectPath>, result: Value) -> Result<Vec<ObjectPath>> {
    let prompted: Vec<ObjectPath> =
        serde_json::from_value(result).map_err(|source| SecretError::Decode {
            operation: "prompt result",
            source,
        })?;
    for path in prompted {
        if !objects.contains(&path) {
            objects.push(path);
        }
    }
    Ok(objects)
}
