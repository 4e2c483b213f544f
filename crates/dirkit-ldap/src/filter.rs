//! Search filter construction.

/// Builds the equality filter for an identifier lookup.
///
/// A non-empty `string_id` always wins and produces `(uid=<string_id>)`. Otherwise the numeric
/// identifier is used as `(uidNumber=<numeric_id>)`; zero is not rejected and yields
/// `(uidNumber=0)`.
///
/// The string identifier is escaped with [`escape_filter_value`], so it appears verbatim only
/// when it contains none of `*`, `(`, `)`, `\` or NUL; `j*` becomes `(uid=j\2a)`.
#[must_use]
pub fn identifier_filter(numeric_id: u32, string_id: &str) -> String {
    if string_id.is_empty() {
        format!("(uidNumber={numeric_id})")
    } else {
        format!("(uid={})", escape_filter_value(string_id))
    }
}

/// Escapes an assertion value for use in a search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_identifier_wins_regardless_of_number() {
        for numeric_id in [0, 1, 1001, u32::MAX] {
            assert_eq!(identifier_filter(numeric_id, "nb5"), "(uid=nb5)");
        }
    }

    #[test]
    fn numeric_identifier_used_when_string_empty() {
        for numeric_id in [1, 42, 1001, u32::MAX] {
            assert_eq!(
                identifier_filter(numeric_id, ""),
                format!("(uidNumber={numeric_id})")
            );
        }
    }

    #[test]
    fn zero_and_empty_still_searches_uid_number() {
        assert_eq!(identifier_filter(0, ""), "(uidNumber=0)");
    }

    #[test]
    fn escapes_filter_metacharacters() {
        assert_eq!(identifier_filter(0, "j*)(uid=*"), "(uid=j\\2a\\29\\28uid=\\2a)");
        assert_eq!(escape_filter_value("a\\b\0"), "a\\5cb\\00");
        assert_eq!(escape_filter_value("jane.doe-01"), "jane.doe-01");
    }
}
