//! Directory entries and lookup criteria.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::filter::identifier_filter;

/// Attributes most callers want back from a user lookup.
pub const DEFAULT_ATTRIBUTES: &[&str] = &["uid", "mail", "cn"];

/// Snapshot of a directory entry as returned by a search.
///
/// The snapshot is never written back; changes go through
/// [`Connection::update_attribute`](crate::Connection::update_attribute), which sends a modify
/// request and leaves this value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: String,
    attributes: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Creates an entry from its distinguished name and attribute values.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: HashMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// All attributes returned for the entry.
    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Vec<String>> {
        &self.attributes
    }

    /// Values of `attribute`, matched case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// First value of `attribute`, if any.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns true when `attribute` holds at least one non-empty value.
    #[must_use]
    pub fn is_set(&self, attribute: &str) -> bool {
        self.values(attribute)
            .is_some_and(|values| values.iter().any(|value| !value.is_empty()))
    }
}

/// How to find the entry to resolve.
///
/// A non-empty `string_id` is matched against `uid`; otherwise `numeric_id` is matched against
/// `uidNumber`, even when it is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupCriteria {
    /// Numeric identifier (`uidNumber`); zero means unset.
    #[serde(default)]
    pub numeric_id: u32,
    /// String identifier (`uid`); empty means unset.
    #[serde(default)]
    pub string_id: String,
    /// Attributes to request for the entry.
    pub attributes: Vec<String>,
}

impl LookupCriteria {
    /// Creates criteria from both identifiers and the attributes to request.
    #[must_use]
    pub fn new<I, S>(numeric_id: u32, string_id: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numeric_id,
            string_id: string_id.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// Looks an entry up by `uid`, requesting [`DEFAULT_ATTRIBUTES`].
    #[must_use]
    pub fn by_uid(uid: impl Into<String>) -> Self {
        Self::new(0, uid, DEFAULT_ATTRIBUTES.iter().copied())
    }

    /// Looks an entry up by `uidNumber`, requesting [`DEFAULT_ATTRIBUTES`].
    #[must_use]
    pub fn by_uid_number(uid_number: u32) -> Self {
        Self::new(uid_number, String::new(), DEFAULT_ATTRIBUTES.iter().copied())
    }

    /// Replaces the requested attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Search filter selecting the entry.
    #[must_use]
    pub fn filter(&self) -> String {
        identifier_filter(self.numeric_id, &self.string_id)
    }
}

/// Change applied by a successful attribute update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeChange {
    /// The attribute was unset and has been added.
    Added,
    /// The attribute was set and its values have been replaced.
    Replaced,
}
