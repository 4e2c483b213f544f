//! Configuration for connecting to a directory service.

use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use dirkit_core::json;
use dirkit_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Subtree, relative to the base DN, that holds user entries.
pub const PEOPLE_OU: &str = "people";

/// Directory connection settings.
///
/// The JSON form uses the keys `host`, `port`, `user`, `pass` and `baseDN`, plus optional TLS
/// and timeout settings. The password is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    /// Directory server host name.
    #[validate(length(min = 1))]
    pub host: String,

    /// Directory server port.
    #[validate(range(min = 1))]
    pub port: u16,

    /// Bind user, combined with the base DN as `cn=<user>,<baseDN>`.
    #[serde(default)]
    pub user: String,

    #[serde(default = "empty_secret", skip_serializing)]
    pass: SecretString,

    /// Base distinguished name of the directory tree.
    #[serde(rename = "baseDN")]
    #[validate(length(min = 1))]
    pub base_dn: String,

    /// Whether to verify the server certificate on secure connections.
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional CA certificate (PEM) used to verify the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Optional connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Optional per-operation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,
}

fn empty_secret() -> SecretString {
    SecretString::from("")
}

const fn default_tls_verify() -> bool {
    true
}

impl DirectoryConfig {
    /// Creates a configuration for `host:port` rooted at `base_dn`, without credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty, the port is zero or the base DN does not
    /// parse.
    pub fn new(host: impl Into<String>, port: u16, base_dn: impl Into<String>) -> Result<Self> {
        let config = Self {
            host: host.into(),
            port,
            user: String::new(),
            pass: empty_secret(),
            base_dn: base_dn.into(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connect_timeout_secs: None,
            operation_timeout_secs: None,
        };
        config.check()?;
        Ok(config)
    }

    /// Decodes and validates a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed documents and [`Error::Config`] for invalid values.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = json::from_json_str(input)?;
        config.check()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the file cannot be read or decoded and [`Error::Config`] for
    /// invalid values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = json::read_json_file(path)?;
        config.check()?;
        Ok(config)
    }

    /// Validates field values and the base DN syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|err| Error::Config(format!("Invalid configuration: {err}")))?;
        DistinguishedName::parse(&self.base_dn)?;
        Ok(())
    }

    /// Sets the bind user and password.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        let pass: String = pass.into();
        self.user = user.into();
        self.pass = SecretString::from(pass);
        self
    }

    /// Enables or disables server certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Verifies the server against the CA certificate at `path`.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_cert = Some(path.into());
        self
    }

    /// Bounds the time spent establishing the transport.
    #[must_use]
    pub const fn with_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = Some(seconds);
        self
    }

    /// Bounds the time spent waiting on each bind, search, modify or unbind.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = Some(seconds);
        self
    }

    /// Bind password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.pass.expose_secret()
    }

    /// Parsed base DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base DN does not parse.
    pub fn base_dn(&self) -> Result<DistinguishedName> {
        Ok(DistinguishedName::parse(&self.base_dn)?)
    }

    /// DN used for authenticated binds: `cn=<user>,<baseDN>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base DN does not parse.
    pub fn bind_dn(&self) -> Result<DistinguishedName> {
        Ok(self
            .base_dn()?
            .child(RelativeDistinguishedName::new("cn", self.user.as_str())))
    }

    /// Search base for user entries: `ou=people,<baseDN>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base DN does not parse.
    pub fn people_dn(&self) -> Result<DistinguishedName> {
        Ok(self
            .base_dn()?
            .child(RelativeDistinguishedName::new("ou", PEOPLE_OU)))
    }

    /// Endpoint URL, `ldaps://` when `secure` and `ldap://` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host and port do not form a valid URL.
    pub fn endpoint(&self, secure: bool) -> Result<Url> {
        let scheme = if secure { "ldaps" } else { "ldap" };
        Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))
            .map_err(|err| Error::Config(format!("Invalid directory endpoint: {err}")))
    }

    /// Connect timeout, if configured.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Per-operation timeout, if configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "host": "ldap.example.com",
        "port": 636,
        "user": "admin",
        "pass": "s3cret",
        "baseDN": "dc=example,dc=com"
    }"#;

    #[test]
    fn loads_json_document() {
        let config = DirectoryConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.host, "ldap.example.com");
        assert_eq!(config.port, 636);
        assert_eq!(config.user, "admin");
        assert_eq!(config.password(), "s3cret");
        assert!(config.tls_verify);
        assert_eq!(config.operation_timeout(), None);
        assert_eq!(config.bind_dn().unwrap().as_str(), "cn=admin,dc=example,dc=com");
        assert_eq!(
            config.people_dn().unwrap().as_str(),
            "ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn serialization_skips_password() {
        let config = DirectoryConfig::from_json_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"baseDN\":\"dc=example,dc=com\""));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldap.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = DirectoryConfig::from_json_file(&path).unwrap();
        assert_eq!(config.endpoint(true).unwrap().as_str(), "ldaps://ldap.example.com:636");
        assert_eq!(config.endpoint(false).unwrap().as_str(), "ldap://ldap.example.com:636");
    }

    #[test]
    fn builder_overrides() {
        let config = DirectoryConfig::new("ldap.example.com", 389, "dc=example")
            .unwrap()
            .with_credentials("manager", "pw")
            .with_tls_verification(false)
            .with_tls_ca_cert("/etc/ssl/ca.pem")
            .with_connect_timeout_secs(5)
            .with_operation_timeout_secs(30);

        assert_eq!(config.bind_dn().unwrap().as_str(), "cn=manager,dc=example");
        assert_eq!(config.password(), "pw");
        assert!(!config.tls_verify);
        assert_eq!(config.tls_ca_cert, Some(PathBuf::from("/etc/ssl/ca.pem")));
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn derived_dns_keep_base_dn_text() {
        let config = DirectoryConfig::new("ldap.example.com", 389, "o=Acme+c=US")
            .unwrap()
            .with_credentials("admin", "pw");
        assert_eq!(config.people_dn().unwrap().as_str(), "ou=people,o=Acme+c=US");
        assert_eq!(config.bind_dn().unwrap().as_str(), "cn=admin,o=Acme+c=US");

        let config = DirectoryConfig::new("ldap.example.com", 389, "o=Acme\\2C Inc,c=US")
            .unwrap()
            .with_credentials("admin", "pw");
        assert_eq!(config.people_dn().unwrap().as_str(), "ou=people,o=Acme\\2C Inc,c=US");
        assert_eq!(config.bind_dn().unwrap().as_str(), "cn=admin,o=Acme\\2C Inc,c=US");
        assert_eq!(config.base_dn().unwrap().get("o"), Some("Acme, Inc"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            DirectoryConfig::new("", 389, "dc=example"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DirectoryConfig::new("ldap.example.com", 0, "dc=example"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DirectoryConfig::new("ldap.example.com", 389, "example"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DirectoryConfig::from_json_str(r#"{"host": "h", "port": 389}"#),
            Err(Error::Json(_))
        ));
    }
}
