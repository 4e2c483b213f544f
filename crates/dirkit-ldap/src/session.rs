//! Directory protocol capability and its `ldap3` implementation.
//!
//! The client only talks to a directory through [`LdapConnector`] and [`LdapSession`], so any
//! transport offering dial, bind, search, modify and unbind can back it.

use crate::config::DirectoryConfig;
use crate::entry::Entry;
use async_trait::async_trait;
use dirkit_core::SessionError;
use ldap3::{
    DerefAliases, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchOptions,
};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Search scope for a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Alias dereferencing policy for a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefPolicy {
    /// Never dereference aliases.
    Never,
    /// Dereference while searching below the base.
    InSearching,
    /// Dereference when locating the base.
    FindingBase,
    /// Always dereference.
    Always,
}

impl From<DerefPolicy> for DerefAliases {
    fn from(policy: DerefPolicy) -> Self {
        match policy {
            DerefPolicy::Never => DerefAliases::Never,
            DerefPolicy::InSearching => DerefAliases::Searching,
            DerefPolicy::FindingBase => DerefAliases::Finding,
            DerefPolicy::Always => DerefAliases::Always,
        }
    }
}

/// Parameters of a single search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base DN of the search.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Alias dereferencing policy.
    pub deref: DerefPolicy,
    /// Maximum number of entries; zero means no limit.
    pub size_limit: i32,
    /// Maximum seconds the server may spend; zero means no limit.
    pub time_limit: i32,
    /// Return attribute names only.
    pub types_only: bool,
    /// Search filter.
    pub filter: String,
    /// Attributes to return.
    pub attributes: Vec<String>,
}

/// A single change within a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Replace all values of the attribute.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    fn into_mod(self) -> Mod<String> {
        match self {
            Self::Add { attribute, values } => {
                Mod::Add(attribute, values.into_iter().collect::<HashSet<_>>())
            }
            Self::Replace { attribute, values } => {
                Mod::Replace(attribute, values.into_iter().collect::<HashSet<_>>())
            }
        }
    }
}

/// Transport used when dialing a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TLS from the first byte (`ldaps://`).
    Secure,
    /// Unencrypted (`ldap://`).
    Plain,
}

impl Transport {
    /// Returns true for [`Transport::Secure`].
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Secure)
    }
}

/// An open session with a directory service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Performs a simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), SessionError>;

    /// Runs a search and returns every matching entry.
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>, SessionError>;

    /// Applies `modifications` to the entry at `dn` in one request.
    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> Result<(), SessionError>;

    /// Sends an unbind and closes the session.
    async fn unbind(&mut self) -> Result<(), SessionError>;
}

/// Opens sessions with a directory service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Establishes the transport to the configured endpoint.
    async fn dial(&self, transport: Transport) -> Result<Box<dyn LdapSession>, SessionError>;
}

/// Connector backed by `ldap3`.
#[derive(Debug, Clone)]
pub struct RealLdapConnector {
    config: DirectoryConfig,
}

impl RealLdapConnector {
    /// Creates a connector for the endpoint described by `config`.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn dial(&self, transport: Transport) -> Result<Box<dyn LdapSession>, SessionError> {
        let url = self
            .config
            .endpoint(transport.is_secure())
            .map_err(|err| SessionError::new("dial", err.to_string()))?;
        let settings = build_ldap_settings(&self.config, transport)?;

        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|err| map_ldap_error("dial", &err))?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(error = %err, "directory connection driver stopped");
            }
        });

        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Option<Duration>,
}

async fn run<F, T>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, SessionError>
where
    F: Future<Output = ldap3::result::Result<T>>,
{
    let result = match limit {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| SessionError::timed_out(operation))?,
        None => fut.await,
    };
    result.map_err(|err| map_ldap_error(operation, &err))
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), SessionError> {
        let result = run(
            self.operation_timeout,
            "bind",
            self.inner.simple_bind(dn, password),
        )
        .await?;
        result
            .success()
            .map_err(|err| map_ldap_error("bind", &err))?;
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>, SessionError> {
        let options = SearchOptions::new()
            .deref(request.deref.into())
            .sizelimit(request.size_limit)
            .timelimit(request.time_limit)
            .typesonly(request.types_only);

        let limit = self.operation_timeout;
        let ldap = self.inner.with_search_options(options);
        let result = run(
            limit,
            "search",
            ldap.search(
                &request.base_dn,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            ),
        )
        .await?;
        let (entries, _) = result
            .success()
            .map_err(|err| map_ldap_error("search", &err))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| Entry::new(entry.dn, entry.attrs))
            .collect())
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> Result<(), SessionError> {
        let mods = modifications
            .iter()
            .cloned()
            .map(DirectoryModification::into_mod)
            .collect::<Vec<_>>();

        let result = run(self.operation_timeout, "modify", self.inner.modify(dn, mods)).await?;
        result
            .success()
            .map_err(|err| map_ldap_error("modify", &err))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), SessionError> {
        run(self.operation_timeout, "unbind", self.inner.unbind()).await
    }
}

fn build_ldap_settings(
    config: &DirectoryConfig,
    transport: Transport,
) -> Result<LdapConnSettings, SessionError> {
    let mut settings = LdapConnSettings::new();
    if let Some(limit) = config.connect_timeout() {
        settings = settings.set_conn_timeout(limit);
    }

    if !transport.is_secure() {
        return Ok(settings);
    }

    if !config.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                SessionError::new("dial", format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &config.tls_ca_cert {
        let pem = fs::read(cert_path).map_err(|err| {
            SessionError::new(
                "dial",
                format!("failed to read CA certificate {}: {err}", cert_path.display()),
            )
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| SessionError::new("dial", format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                SessionError::new("dial", format!("failed to load CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(operation: &'static str, err: &ldap3::LdapError) -> SessionError {
    SessionError::new(operation, err.to_string())
}
