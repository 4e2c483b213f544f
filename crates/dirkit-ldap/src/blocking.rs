//! Blocking facade over the async client.
//!
//! Each call blocks the current thread until the directory answers. The facade owns a
//! current-thread runtime, so it must not be used from within an async context.

use crate::{
    client::{self, DirectoryClient as AsyncClient},
    config::DirectoryConfig,
    entry::{AttributeChange, Entry, LookupCriteria},
    session::LdapConnector,
    Result,
};
use dirkit_core::{ConnectError, Error, ResolveError, SessionError, UpdateError};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::warn;

/// Blocking counterpart of [`crate::DirectoryClient`].
pub struct DirectoryClient {
    inner: AsyncClient,
    runtime: Arc<Runtime>,
}

impl DirectoryClient {
    /// Creates a client that dials the configured endpoint with `ldap3`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or the runtime cannot start.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        Ok(Self {
            inner: AsyncClient::new(config)?,
            runtime: build_runtime()?,
        })
    }

    /// Creates a client that opens sessions through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or the runtime cannot start.
    pub fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        Ok(Self {
            inner: AsyncClient::with_connector(config, connector)?,
            runtime: build_runtime()?,
        })
    }

    /// Opens a TLS session and binds with the configured credentials.
    ///
    /// # Errors
    ///
    /// See [`crate::DirectoryClient::connect_secure`].
    pub fn connect_secure(&self) -> std::result::Result<Connection, ConnectError> {
        let inner = self.runtime.block_on(self.inner.connect_secure())?;
        Ok(self.wrap(inner))
    }

    /// Opens an unauthenticated session.
    ///
    /// # Errors
    ///
    /// See [`crate::DirectoryClient::connect_anonymous`].
    pub fn connect_anonymous(&self) -> std::result::Result<Connection, ConnectError> {
        let inner = self.runtime.block_on(self.inner.connect_anonymous())?;
        Ok(self.wrap(inner))
    }

    fn wrap(&self, inner: client::Connection) -> Connection {
        Connection {
            inner: Some(inner),
            runtime: Arc::clone(&self.runtime),
        }
    }
}

/// Blocking counterpart of [`crate::Connection`].
///
/// The session is unbound when the connection is closed or dropped. A drop that happens inside an
/// async runtime cannot block, so it releases the transport without an unbind.
pub struct Connection {
    inner: Option<client::Connection>,
    runtime: Arc<Runtime>,
}

impl Connection {
    fn session(&mut self) -> &mut client::Connection {
        self.inner
            .as_mut()
            .unwrap_or_else(|| unreachable!("session is only taken by close and drop"))
    }

    /// See [`crate::Connection::resolve`].
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::resolve`].
    pub fn resolve(
        &mut self,
        criteria: &LookupCriteria,
    ) -> std::result::Result<Entry, ResolveError> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.session().resolve(criteria))
    }

    /// See [`crate::Connection::get_entry`].
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::resolve`].
    pub fn get_entry(
        &mut self,
        numeric_id: u32,
        string_id: &str,
        attributes: &[&str],
    ) -> std::result::Result<Entry, ResolveError> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.session().get_entry(numeric_id, string_id, attributes))
    }

    /// See [`crate::Connection::update_attribute`].
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::update_attribute`].
    pub fn update_attribute(
        &mut self,
        entry: &Entry,
        attribute: &str,
        values: &[String],
        overwrite: bool,
    ) -> std::result::Result<AttributeChange, UpdateError> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(
            self.session()
                .update_attribute(entry, attribute, values, overwrite),
        )
    }

    /// Sends an unbind and releases the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport failure if the unbind could not be sent.
    pub fn close(mut self) -> std::result::Result<(), SessionError> {
        match self.inner.take() {
            Some(inner) => self.runtime.block_on(inner.close()),
            None => Ok(()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            warn!("directory connection dropped inside an async runtime; skipping unbind");
            return;
        }
        if let Err(err) = self.runtime.block_on(inner.close()) {
            warn!(error = %err, "failed to unbind dropped directory connection");
        }
    }
}

fn build_runtime() -> Result<Arc<Runtime>> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|err| Error::Config(format!("failed to start directory runtime: {err}")))
}
