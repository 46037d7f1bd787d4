//! Timestamp and publication-date helpers

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp stored as TEXT in SQLite
pub fn parse_rfc3339(value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Extract a four-digit year from free-form publication dates
///
/// Accepts `2021`, `2021-05-03`, `May 2021`, `2021/05`.
pub fn extract_year(value: &str) -> Option<i32> {
    let bytes = value.as_bytes();
    (0..bytes.len().saturating_sub(3)).find_map(|i| {
        let window = &bytes[i..i + 4];
        let bounded_left = i == 0 || !bytes[i - 1].is_ascii_digit();
        let bounded_right = i + 4 == bytes.len() || !bytes[i + 4].is_ascii_digit();
        if bounded_left && bounded_right && window.iter().all(|b| b.is_ascii_digit()) {
            std::str::from_utf8(window)
                .ok()?
                .parse()
                .ok()
                .filter(|y| (1000..=2999).contains(y))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_roundtrip() {
        let ts = Utc::now();
        let parsed = parse_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(parsed.timestamp(), ts.timestamp());
        assert!(parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("2021"), Some(2021));
        assert_eq!(extract_year("2021-05-03"), Some(2021));
        assert_eq!(extract_year("May 2019"), Some(2019));
        assert_eq!(extract_year("12345"), None);
        assert_eq!(extract_year("n.d."), None);
    }
}
