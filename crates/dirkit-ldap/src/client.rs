//! Directory client: connect, resolve an entry, update one attribute.

use crate::{
    config::DirectoryConfig,
    entry::{AttributeChange, Entry, LookupCriteria},
    session::{
        DerefPolicy, DirectoryModification, LdapConnector, LdapSession, RealLdapConnector,
        SearchRequest, SearchScope, Transport,
    },
    Result,
};
use dirkit_core::{ConnectError, ResolveError, SessionError, UpdateError};
use tracing::{debug, info, warn};

/// Entry point for opening directory connections.
pub struct DirectoryClient {
    config: DirectoryConfig,
    connector: Box<dyn LdapConnector>,
    bind_dn: String,
    people_dn: String,
}

impl DirectoryClient {
    /// Creates a client that dials the configured endpoint with `ldap3`.
    ///
    /// # Errors
    ///
    /// Returns [`dirkit_core::Error::Config`] if the configuration is invalid.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let connector = Box::new(RealLdapConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    /// Creates a client that opens sessions through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`dirkit_core::Error::Config`] if the configuration is invalid.
    pub fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        config.check()?;
        config.endpoint(true)?;
        Ok(Self {
            bind_dn: config.bind_dn()?.to_string(),
            people_dn: config.people_dn()?.to_string(),
            config,
            connector,
        })
    }

    /// Configuration this client connects with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Opens a TLS session and binds as `cn=<user>,<baseDN>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Dial`] if the transport cannot be established and
    /// [`ConnectError::Auth`] if the bind is rejected.
    pub async fn connect_secure(&self) -> std::result::Result<Connection, ConnectError> {
        let mut session = self.dial(Transport::Secure).await?;

        debug!(bind_dn = %self.bind_dn, "binding to directory");
        if let Err(source) = session
            .simple_bind(&self.bind_dn, self.config.password())
            .await
        {
            warn!(bind_dn = %self.bind_dn, error = %source, "directory bind rejected");
            if let Err(err) = session.unbind().await {
                debug!(error = %err, "unbind after rejected bind failed");
            }
            return Err(ConnectError::Auth {
                bind_dn: self.bind_dn.clone(),
                source,
            });
        }

        Ok(self.connection(session, true))
    }

    /// Opens an unauthenticated session; only searches are expected to succeed on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Dial`] if the transport cannot be established.
    pub async fn connect_anonymous(&self) -> std::result::Result<Connection, ConnectError> {
        let session = self.dial(Transport::Plain).await?;
        Ok(self.connection(session, false))
    }

    async fn dial(
        &self,
        transport: Transport,
    ) -> std::result::Result<Box<dyn LdapSession>, ConnectError> {
        let endpoint = self
            .config
            .endpoint(transport.is_secure())
            .map(String::from)
            .unwrap_or_else(|_| format!("{}:{}", self.config.host, self.config.port));
        debug!(endpoint = %endpoint, "dialing directory");

        self.connector
            .dial(transport)
            .await
            .map_err(|source| ConnectError::Dial { endpoint, source })
    }

    fn connection(&self, session: Box<dyn LdapSession>, authenticated: bool) -> Connection {
        info!(
            host = %self.config.host,
            port = self.config.port,
            authenticated,
            "directory connection established"
        );
        Connection {
            session,
            people_dn: self.people_dn.clone(),
            authenticated,
        }
    }
}

/// An open directory session.
///
/// Operations take `&mut self`; share a connection across tasks only behind a lock. Dropping the
/// connection releases the transport; [`Connection::close`] also sends an unbind first.
pub struct Connection {
    session: Box<dyn LdapSession>,
    people_dn: String,
    authenticated: bool,
}

impl Connection {
    /// Returns true when the session was opened with [`DirectoryClient::connect_secure`].
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Finds the single entry matching `criteria` below `ou=people,<baseDN>`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::AmbiguousOrMissing`] unless exactly one entry matches, and
    /// [`ResolveError::SearchFailed`] if the search itself fails.
    pub async fn resolve(
        &mut self,
        criteria: &LookupCriteria,
    ) -> std::result::Result<Entry, ResolveError> {
        let request = SearchRequest {
            base_dn: self.people_dn.clone(),
            scope: SearchScope::Subtree,
            deref: DerefPolicy::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: criteria.filter(),
            attributes: criteria.attributes.clone(),
        };
        debug!(base = %request.base_dn, filter = %request.filter, "searching directory");

        let mut entries = self.session.search(&request).await.map_err(|source| {
            ResolveError::SearchFailed {
                filter: request.filter.clone(),
                source,
            }
        })?;

        if entries.len() == 1 {
            if let Some(entry) = entries.pop() {
                debug!(dn = %entry.dn(), "resolved directory entry");
                return Ok(entry);
            }
        }

        let candidates = entries
            .iter()
            .map(|entry| entry.first("uid").unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        debug!(
            matched = candidates.len(),
            filter = %request.filter,
            "lookup did not match exactly one entry"
        );
        Err(ResolveError::AmbiguousOrMissing {
            matched: candidates.len(),
            numeric_id: criteria.numeric_id,
            string_id: criteria.string_id.clone(),
            candidates,
        })
    }

    /// Resolves an entry by `uidNumber` or `uid`, returning `attributes`.
    ///
    /// A non-empty `string_id` takes precedence over `numeric_id`.
    ///
    /// # Errors
    ///
    /// See [`Connection::resolve`].
    pub async fn get_entry(
        &mut self,
        numeric_id: u32,
        string_id: &str,
        attributes: &[&str],
    ) -> std::result::Result<Entry, ResolveError> {
        let criteria = LookupCriteria::new(numeric_id, string_id, attributes.iter().copied());
        self.resolve(&criteria).await
    }

    /// Sets `attribute` on `entry` to `values`.
    ///
    /// An unset attribute is added. A set attribute is replaced when `overwrite` is true and
    /// left alone otherwise. The decision is made against the `entry` snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Exists`] without contacting the directory when the attribute is set
    /// and `overwrite` is false, and [`UpdateError::MutationFailed`] if the modify request fails.
    pub async fn update_attribute(
        &mut self,
        entry: &Entry,
        attribute: &str,
        values: &[String],
        overwrite: bool,
    ) -> std::result::Result<AttributeChange, UpdateError> {
        let change = plan_update(entry, attribute, overwrite)?;
        let modification = match change {
            AttributeChange::Added => DirectoryModification::Add {
                attribute: attribute.to_string(),
                values: values.to_vec(),
            },
            AttributeChange::Replaced => DirectoryModification::Replace {
                attribute: attribute.to_string(),
                values: values.to_vec(),
            },
        };

        if !self.authenticated {
            warn!(dn = %entry.dn(), attribute, "modifying entry over an anonymous connection");
        }

        self.session
            .modify(entry.dn(), &[modification])
            .await
            .map_err(|source| UpdateError::MutationFailed {
                dn: entry.dn().to_string(),
                attribute: attribute.to_string(),
                source,
            })?;

        info!(dn = %entry.dn(), attribute, ?change, "directory entry updated");
        Ok(change)
    }

    /// Sends an unbind and releases the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport failure if the unbind could not be sent.
    pub async fn close(mut self) -> std::result::Result<(), SessionError> {
        debug!("closing directory connection");
        self.session.unbind().await
    }
}

/// Decides how `attribute` would be written on `entry`.
///
/// | attribute set | overwrite | outcome                     |
/// |---------------|-----------|-----------------------------|
/// | no            | any       | [`AttributeChange::Added`]  |
/// | yes           | true      | [`AttributeChange::Replaced`] |
/// | yes           | false     | [`UpdateError::Exists`]     |
///
/// # Errors
///
/// Returns [`UpdateError::Exists`] when the attribute is set and `overwrite` is false.
pub fn plan_update(
    entry: &Entry,
    attribute: &str,
    overwrite: bool,
) -> std::result::Result<AttributeChange, UpdateError> {
    match (entry.is_set(attribute), overwrite) {
        (false, _) => Ok(AttributeChange::Added),
        (true, true) => Ok(AttributeChange::Replaced),
        (true, false) => Err(UpdateError::Exists {
            dn: entry.dn().to_string(),
            attribute: attribute.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockLdapConnector, MockLdapSession};
    use mockall::predicate::eq;
    use std::collections::HashMap;

    fn sample_config() -> DirectoryConfig {
        DirectoryConfig::new("ldap.example.com", 636, "dc=example")
            .unwrap()
            .with_credentials("admin", "secret")
    }

    fn entry(uid: &str, mail: &[&str]) -> Entry {
        let mut attributes = HashMap::new();
        attributes.insert("uid".to_string(), vec![uid.to_string()]);
        if !mail.is_empty() {
            attributes.insert(
                "mail".to_string(),
                mail.iter().map(ToString::to_string).collect(),
            );
        }
        Entry::new(format!("uid={uid},ou=people,dc=example"), attributes)
    }

    fn client_with_session(session: MockLdapSession) -> DirectoryClient {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_dial()
            .times(1)
            .return_once(move |_| Ok(Box::new(session)));
        DirectoryClient::with_connector(sample_config(), Box::new(connector)).unwrap()
    }

    async fn anonymous_connection(session: MockLdapSession) -> Connection {
        client_with_session(session)
            .connect_anonymous()
            .await
            .unwrap()
    }

    fn new_mail() -> Vec<String> {
        vec!["new@x.com".to_string()]
    }

    #[tokio::test]
    async fn connect_secure_binds_with_derived_dn() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .withf(|dn, password| dn == "cn=admin,dc=example" && password == "secret")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_dial()
            .with(eq(Transport::Secure))
            .times(1)
            .return_once(move |_| Ok(Box::new(session)));

        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector)).unwrap();
        let connection = client.connect_secure().await.unwrap();
        assert!(connection.is_authenticated());
    }

    #[tokio::test]
    async fn connect_secure_reports_rejected_bind() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .returning(|_, _| Err(SessionError::new("bind", "invalidCredentials")));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let client = client_with_session(session);
        let err = client.connect_secure().await.err().unwrap();
        assert!(matches!(
            err,
            ConnectError::Auth { ref bind_dn, .. } if bind_dn == "cn=admin,dc=example"
        ));
    }

    #[tokio::test]
    async fn connect_reports_dial_failure() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_dial()
            .returning(|_| Err(SessionError::new("dial", "connection refused")));

        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector)).unwrap();
        let err = client.connect_anonymous().await.err().unwrap();
        assert!(matches!(
            err,
            ConnectError::Dial { ref endpoint, .. } if endpoint == "ldap://ldap.example.com:636"
        ));
    }

    #[tokio::test]
    async fn connect_anonymous_skips_bind() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().never();

        let mut connector = MockLdapConnector::new();
        connector
            .expect_dial()
            .with(eq(Transport::Plain))
            .return_once(move |_| Ok(Box::new(session)));

        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector)).unwrap();
        let connection = client.connect_anonymous().await.unwrap();
        assert!(!connection.is_authenticated());
    }

    #[tokio::test]
    async fn resolve_returns_single_match() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|request| {
                request.base_dn == "ou=people,dc=example"
                    && request.scope == SearchScope::Subtree
                    && request.deref == DerefPolicy::Never
                    && request.size_limit == 0
                    && request.time_limit == 0
                    && !request.types_only
                    && request.filter == "(uid=jdoe)"
                    && request.attributes == ["cn", "mail"]
            })
            .times(1)
            .returning(|_| Ok(vec![entry("jdoe", &["old@x.com"])]));

        let mut connection = anonymous_connection(session).await;
        let resolved = connection
            .get_entry(1001, "jdoe", &["cn", "mail"])
            .await
            .unwrap();
        assert_eq!(resolved.dn(), "uid=jdoe,ou=people,dc=example");
        assert_eq!(resolved.first("mail"), Some("old@x.com"));
    }

    #[tokio::test]
    async fn resolve_by_uid_number() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|request| request.filter == "(uidNumber=1001)")
            .returning(|_| Ok(vec![entry("jdoe", &[])]));

        let mut connection = anonymous_connection(session).await;
        let criteria = LookupCriteria::by_uid_number(1001);
        assert!(connection.resolve(&criteria).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_rejects_zero_matches() {
        let mut session = MockLdapSession::new();
        session.expect_search().returning(|_| Ok(Vec::new()));

        let mut connection = anonymous_connection(session).await;
        let err = connection
            .resolve(&LookupCriteria::by_uid("ghost"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::AmbiguousOrMissing {
                matched: 0,
                numeric_id: 0,
                string_id: "ghost".to_string(),
                candidates: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn resolve_rejects_multiple_matches() {
        let mut session = MockLdapSession::new();
        session.expect_search().returning(|_| {
            let no_uid = Entry::new("cn=service,ou=people,dc=example", HashMap::new());
            Ok(vec![entry("jdoe", &[]), entry("jdoe2", &[]), no_uid])
        });

        let mut connection = anonymous_connection(session).await;
        let err = connection
            .resolve(&LookupCriteria::by_uid_number(1001))
            .await
            .unwrap_err();
        match err {
            ResolveError::AmbiguousOrMissing {
                matched,
                candidates,
                ..
            } => {
                assert_eq!(matched, 3);
                assert_eq!(candidates, vec!["jdoe", "jdoe2", ""]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn resolve_wraps_search_failure() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_| Err(SessionError::new("search", "noSuchObject")));

        let mut connection = anonymous_connection(session).await;
        let err = connection
            .resolve(&LookupCriteria::by_uid("jdoe"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::SearchFailed { ref filter, ref source }
                if filter == "(uid=jdoe)" && source.message() == "noSuchObject"
        ));
    }

    #[test]
    fn plan_update_decision_table() {
        let unset = entry("jdoe", &[]);
        let set = entry("jdoe", &["old@x.com"]);

        assert_eq!(plan_update(&unset, "mail", false), Ok(AttributeChange::Added));
        assert_eq!(plan_update(&unset, "mail", true), Ok(AttributeChange::Added));
        assert_eq!(plan_update(&set, "mail", true), Ok(AttributeChange::Replaced));
        assert!(matches!(
            plan_update(&set, "mail", false),
            Err(UpdateError::Exists { .. })
        ));
    }

    #[tokio::test]
    async fn update_adds_unset_attribute_for_any_overwrite() {
        for overwrite in [false, true] {
            let mut session = MockLdapSession::new();
            session
                .expect_modify()
                .withf(|dn, modifications| {
                    dn == "uid=jdoe,ou=people,dc=example"
                        && modifications
                            == [DirectoryModification::Add {
                                attribute: "mail".to_string(),
                                values: vec!["new@x.com".to_string()],
                            }]
                })
                .times(1)
                .returning(|_, _| Ok(()));

            let mut connection = anonymous_connection(session).await;
            let change = connection
                .update_attribute(&entry("jdoe", &[]), "mail", &new_mail(), overwrite)
                .await
                .unwrap();
            assert_eq!(change, AttributeChange::Added);
        }
    }

    #[tokio::test]
    async fn update_existing_without_overwrite_sends_nothing() {
        let mut session = MockLdapSession::new();
        session.expect_modify().never();

        let mut connection = anonymous_connection(session).await;
        let err = connection
            .update_attribute(&entry("jdoe", &["old@x.com"]), "mail", &new_mail(), false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UpdateError::Exists {
                dn: "uid=jdoe,ou=people,dc=example".to_string(),
                attribute: "mail".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn update_existing_with_overwrite_replaces_once() {
        let mut session = MockLdapSession::new();
        session
            .expect_modify()
            .withf(|dn, modifications| {
                dn == "uid=jdoe,ou=people,dc=example"
                    && modifications
                        == [DirectoryModification::Replace {
                            attribute: "mail".to_string(),
                            values: vec!["new@x.com".to_string()],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut connection = anonymous_connection(session).await;
        let snapshot = entry("jdoe", &["old@x.com"]);
        let change = connection
            .update_attribute(&snapshot, "mail", &new_mail(), true)
            .await
            .unwrap();
        assert_eq!(change, AttributeChange::Replaced);
        assert_eq!(snapshot.first("mail"), Some("old@x.com"));
    }

    #[tokio::test]
    async fn update_wraps_modify_failure() {
        let mut session = MockLdapSession::new();
        session
            .expect_modify()
            .returning(|_, _| Err(SessionError::new("modify", "insufficientAccessRights")));

        let mut connection = anonymous_connection(session).await;
        let err = connection
            .update_attribute(&entry("jdoe", &[]), "mail", &new_mail(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::MutationFailed { .. }));
    }

    #[tokio::test]
    async fn close_sends_unbind() {
        let mut session = MockLdapSession::new();
        session.expect_unbind().times(1).returning(|| Ok(()));

        let connection = anonymous_connection(session).await;
        assert!(connection.close().await.is_ok());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = sample_config();
        config.base_dn = "not a dn".to_string();
        let result = DirectoryClient::with_connector(config, Box::new(MockLdapConnector::new()));
        assert!(result.is_err());
    }
}
