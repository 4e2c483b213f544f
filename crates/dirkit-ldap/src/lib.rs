//! LDAP entry lookup and attribute update helpers.
//!
//! A [`DirectoryClient`] opens a [`Connection`] (bound or anonymous). The connection resolves
//! [`LookupCriteria`] to exactly one [`Entry`] and updates a single attribute on it, adding the
//! attribute when unset and replacing it only when asked to overwrite.
//!
//! ```no_run
//! # async fn run() -> dirkit_ldap::Result<()> {
//! use dirkit_ldap::{DirectoryClient, DirectoryConfig, LookupCriteria};
//!
//! let config = DirectoryConfig::from_json_file("ldap.json")?;
//! let client = DirectoryClient::new(config)?;
//! let mut conn = client.connect_secure().await?;
//! let entry = conn.resolve(&LookupCriteria::by_uid("jdoe")).await?;
//! conn.update_attribute(&entry, "mail", &["jdoe@example.com".to_string()], false)
//!     .await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod blocking;
mod client;
mod config;
mod dn;
mod entry;
mod filter;
mod session;

pub use client::{plan_update, Connection, DirectoryClient};
pub use config::{DirectoryConfig, PEOPLE_OU};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{AttributeChange, Entry, LookupCriteria, DEFAULT_ATTRIBUTES};
pub use filter::{escape_filter_value, identifier_filter};
pub use session::{
    DerefPolicy, DirectoryModification, LdapConnector, LdapSession, RealLdapConnector,
    SearchRequest, SearchScope, Transport,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirkit_core::Result<T>;
