/// Utility functions

/// 32-bit rolling string hash: `h = h * 31 + unit` over UTF-16 code units,
/// wrapping on overflow. Identical input always yields the identical value.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Non-negative photo id derived from an upstream string identifier
pub fn stable_photo_id(s: &str) -> i64 {
    (string_hash(s) as i64).abs()
}

/// Date portion of an ISO-8601 timestamp (`2024-01-15T10:30:00Z` -> `2024-01-15`)
pub fn date_part(ts: &str) -> &str {
    ts.split('T').next().unwrap_or_default()
}

/// Parse an optional numeric query parameter, naming it in the failure message
pub fn parse_opt<T: std::str::FromStr>(
    value: Option<&String>,
    name: &str,
) -> Result<Option<T>, String> {
    match value.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid {} parameter", name)),
    }
}
