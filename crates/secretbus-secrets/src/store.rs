//! Credential store backed by a secret service.
//!
//! Defines the [`SecretStore`] trait and provides [`KeyringStore`], which
//! keeps generic passwords as items tagged with `service` and `account`
//! attributes in one collection of a secret service daemon.

use async_trait::async_trait;
use secretbus_core::{Config, SecretBytes};
use tracing::debug;

use crate::error::{Result, SecretError};
use crate::session::Session;
use crate::service::SecretService;
use crate::transport::{Bus, ObjectPath};
use crate::types::{attributes, Attributes, ItemProperties, ReplaceBehavior, TEXT_CONTENT_TYPE};

/// Attribute naming the item schema.
pub const SCHEMA_ATTRIBUTE: &str = "xdg:schema";

/// Schema of generic password items.
pub const GENERIC_SCHEMA: &str = "org.freedesktop.Secret.Generic";

pub const SERVICE_ATTRIBUTE: &str = "service";
pub const ACCOUNT_ATTRIBUTE: &str = "account";

/// Metadata of a stored credential. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub service: String,
    pub account: String,
    pub item: ObjectPath,
}

/// Async trait for credential storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store a credential, overwriting any existing one.
    async fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<()>;

    /// Store a credential, failing with `DuplicateItem` if one exists.
    async fn add(&self, service: &str, account: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a credential.
    async fn get(&self, service: &str, account: &str) -> Result<SecretBytes>;

    async fn exists(&self, service: &str, account: &str) -> Result<bool>;

    /// List stored credentials (metadata only, no plaintext).
    async fn list(&self) -> Result<Vec<CredentialRef>>;

    /// Delete a credential.
    async fn delete(&self, service: &str, account: &str) -> Result<()>;
}

/// A credential store talking to a secret service daemon.
///
/// Holds one session for its whole lifetime. Call [`KeyringStore::close`]
/// to release it on the daemon.
pub struct KeyringStore<B: Bus> {
    client: SecretService<B>,
    session: Session,
    collection: ObjectPath,
}

impl<B: Bus> KeyringStore<B> {
    /// Open a session in the configured mode against the configured collection.
    pub async fn open(bus: B, config: &Config) -> Result<Self> {
        let client = SecretService::with_config(bus, config);
        let session = client.open_session(config.session.mode).await?;
        let collection = client.default_collection().clone();
        debug!(collection = %collection, mode = %config.session.mode, "opened keyring store");
        Ok(Self {
            client,
            session,
            collection,
        })
    }

    /// The underlying protocol client.
    pub fn client(&self) -> &SecretService<B> {
        &self.client
    }

    /// Release the session.
    pub async fn close(self) -> Result<()> {
        self.client.close_session(self.session).await
    }

    fn lookup(service: &str, account: &str) -> Attributes {
        attributes([
            (SCHEMA_ATTRIBUTE, GENERIC_SCHEMA),
            (SERVICE_ATTRIBUTE, service),
            (ACCOUNT_ATTRIBUTE, account),
        ])
    }

    async fn find(&self, service: &str, account: &str) -> Result<Option<ObjectPath>> {
        let found = self
            .client
            .search_collection(&self.collection, &Self::lookup(service, account))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn find_existing(&self, service: &str, account: &str) -> Result<ObjectPath> {
        self.find(service, account)
            .await?
            .ok_or_else(|| SecretError::NotFound(format!("{service}/{account}")))
    }

    async fn unlock_collection(&self) -> Result<()> {
        self.client
            .unlock_items(std::slice::from_ref(&self.collection))
            .await?
            .complete(&self.client)
            .await?;
        Ok(())
    }

    async fn write(
        &self,
        service: &str,
        account: &str,
        value: &[u8],
        replace: ReplaceBehavior,
    ) -> Result<()> {
        self.unlock_collection().await?;

        let properties = ItemProperties::new(
            format!("{account}@{service}"),
            Self::lookup(service, account),
        );
        let secret = self.session.new_secret(value, TEXT_CONTENT_TYPE)?;
        let item = self
            .client
            .create_item(&self.collection, &properties, &secret, replace)
            .await?
            .complete(&self.client)
            .await?;

        debug!(%service, %account, item = %item, "stored credential");
        Ok(())
    }
}

#[async_trait]
impl<B: Bus> SecretStore for KeyringStore<B> {
    async fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<()> {
        self.write(service, account, value, ReplaceBehavior::Replace)
            .await
    }

    async fn add(&self, service: &str, account: &str, value: &[u8]) -> Result<()> {
        if self.find(service, account).await?.is_some() {
            return Err(SecretError::DuplicateItem(format!("{service}/{account}")));
        }
        self.write(service, account, value, ReplaceBehavior::DoNotReplace)
            .await
    }

    async fn get(&self, service: &str, account: &str) -> Result<SecretBytes> {
        let item = self.find_existing(service, account).await?;
        self.unlock_collection().await?;
        self.client.get_secret(&item, &self.session).await
    }

    async fn exists(&self, service: &str, account: &str) -> Result<bool> {
        Ok(self.find(service, account).await?.is_some())
    }

    async fn list(&self) -> Result<Vec<CredentialRef>> {
        let items = self
            .client
            .search_collection(
                &self.collection,
                &attributes([(SCHEMA_ATTRIBUTE, GENERIC_SCHEMA)]),
            )
            .await?;

        let mut refs = Vec::with_capacity(items.len());
        for item in items {
            let mut attrs = self.client.get_attributes(&item).await?;
            refs.push(CredentialRef {
                service: attrs.remove(SERVICE_ATTRIBUTE).unwrap_or_default(),
                account: attrs.remove(ACCOUNT_ATTRIBUTE).unwrap_or_default(),
                item,
            });
        }
        refs.sort_by(|a, b| (&a.service, &a.account).cmp(&(&b.service, &b.account)));
        Ok(refs)
    }

    async fn delete(&self, service: &str, account: &str) -> Result<()> {
        let item = self.find_existing(service, account).await?;
        self.unlock_collection().await?;
        self.client.delete_item(&item).await?.complete(&self.client).await?;
        debug!(%service, %account, "deleted credential");
        Ok(())
    }
}
