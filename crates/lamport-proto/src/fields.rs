//! Shared field splitting for colon-delimited records.

use std::str::FromStr;

use crate::{
    FIELD_DELIMITER,
    errors::{ProtocolError, Result},
};

/// Split `text` into exactly `N` fields.
pub(crate) fn split<'a, const N: usize>(
    record: &'static str,
    text: &'a str,
) -> Result<[&'a str; N]> {
    let fields: Vec<&'a str> = text.split(FIELD_DELIMITER).collect();
    let actual = fields.len();

    fields.try_into().map_err(|_| ProtocolError::FieldCount { record, expected: N, actual })
}

/// Parse a single field, naming it in the error.
pub(crate) fn parse<T: FromStr>(field: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ProtocolError::InvalidField { field, value: value.to_string() })
}

/// Reject payloads that would break the record layout.
pub(crate) fn check_payload(payload: &str) -> Result<()> {
    if payload.contains(FIELD_DELIMITER) {
        return Err(ProtocolError::DelimiterInPayload(payload.to_string()));
    }
    Ok(())
}

/// Interpret raw record bytes as text.
pub(crate) fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_exact_count() {
        let [a, b, c] = split::<3>("test", "1:x:").unwrap();
        assert_eq!((a, b, c), ("1", "x", ""));
    }

    #[test]
    fn split_rejects_other_counts() {
        assert_eq!(
            split::<3>("test", "1:2"),
            Err(ProtocolError::FieldCount { record: "test", expected: 3, actual: 2 })
        );
        assert_eq!(
            split::<3>("test", "1:2:3:4"),
            Err(ProtocolError::FieldCount { record: "test", expected: 3, actual: 4 })
        );
    }

    #[test]
    fn parse_names_field() {
        let err = parse::<u64>("timestamp", "abc").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidField { field: "timestamp", value: "abc".into() });
    }
}
