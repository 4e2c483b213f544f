//! Distinguished name parsing and composition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use dirkit_core::Error as CoreError;

/// Errors produced while parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component had no `=` separator or was blank.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component had nothing to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component had nothing to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended in the middle of an escape sequence.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// A `\XX` escape was not a hex pair, or the decoded bytes were not UTF-8.
    #[error("invalid escape sequence in distinguished name value: {0}")]
    InvalidEscape(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::Config(err.to_string())
    }
}

/// A single `attribute=value` pair of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Creates an RDN from an attribute name and an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute name (`cn`, `ou`, `uid`, ...).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Parsed distinguished name, most specific component first.
///
/// Multi-valued RDNs (`cn=a+uid=b`) are flattened into consecutive components for lookup, but
/// keep their grouping in the string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    components: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a distinguished name such as `ou=people,dc=example,dc=com`.
    ///
    /// The string form keeps each RDN as written, including `+` groups and escapes; only
    /// whitespace around separators is dropped and `;` becomes `,`.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] when the input is empty or a component is malformed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        let mut components = Vec::new();
        for rdn in split_unescaped(input, &[',', ';'])? {
            let mut parts = Vec::new();
            for part in split_unescaped(&rdn, &['+'])? {
                let part = trim_unescaped(&part);
                components.push(parse_component(part)?);
                parts.push(part.to_string());
            }
            rdns.push(parts.join("+"));
        }

        Ok(Self {
            raw: rdns.join(","),
            components,
        })
    }

    /// String form, with each RDN as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Components in order, most specific first.
    #[must_use]
    pub fn components(&self) -> &[RelativeDistinguishedName] {
        &self.components
    }

    /// Value of the first component whose attribute matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Returns a new DN with `rdn` placed in front of this one.
    #[must_use]
    pub fn child(&self, rdn: RelativeDistinguishedName) -> Self {
        let raw = format!("{rdn},{}", self.raw);
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(rdn);
        components.extend(self.components.iter().cloned());
        Self { raw, components }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

/// Splits on any of `delimiters` outside escape sequences, keeping escapes in the output.
fn split_unescaped(
    input: &str,
    delimiters: &[char],
) -> Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let escaped = chars.next().ok_or(DistinguishedNameError::UnterminatedEscape)?;
            current.push(ch);
            current.push(escaped);
        } else if delimiters.contains(&ch) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);

    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_component(
    component: &str,
) -> Result<RelativeDistinguishedName, DistinguishedNameError> {
    let (attribute, value) = component
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(component.trim().to_string()))?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.trim().to_string(),
        ));
    }

    let value = trim_unescaped(value);
    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok(RelativeDistinguishedName::new(attribute, unescape_value(value)?))
}

/// Trims surrounding whitespace, keeping a trailing space that is escaped.
fn trim_unescaped(part: &str) -> &str {
    let start = part.trim_start();
    let trimmed = start.trim_end();
    let backslashes = trimmed.chars().rev().take_while(|&ch| ch == '\\').count();
    match start[trimmed.len()..].chars().next() {
        Some(space) if backslashes % 2 == 1 => &start[..trimmed.len() + space.len_utf8()],
        _ => trimmed,
    }
}

/// Decodes `\<char>` and `\XX` escapes (RFC 4514); hex pairs are collected as UTF-8 bytes.
fn unescape_value(value: &str) -> Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    let mut buf = [0u8; 4];

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let escaped = chars.next().ok_or(DistinguishedNameError::UnterminatedEscape)?;
        match escaped.to_digit(16) {
            Some(high) => {
                let low = chars
                    .next()
                    .and_then(|low| low.to_digit(16))
                    .ok_or_else(|| DistinguishedNameError::InvalidEscape(value.to_string()))?;
                bytes.push(u8::try_from(high * 16 + low).unwrap_or_default());
            }
            None => bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes()),
        }
    }

    String::from_utf8(bytes)
        .map_err(|_| DistinguishedNameError::InvalidEscape(value.to_string()))
}

/// Escapes an attribute value for use inside a DN (RFC 4514).
fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}
