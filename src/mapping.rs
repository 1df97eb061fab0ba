//! Mapping from vendor status strings to Prometheus gauge ordinals.

/// Map a site status string to its gauge ordinal.
///
/// Returns `None` for status strings outside the vendor's documented set;
/// callers skip the record rather than export a made-up value.
pub fn map_site_status(status: &str) -> Option<f64> {
    match status {
        "Site Healthy" => Some(0.0),
        "Degraded Availability" => Some(1.0),
        "Circuit Issues" => Some(2.0),
        "Site Offline" => Some(3.0),
        _ => None,
    }
}

/// Map a circuit status string to its gauge ordinal.
pub fn map_circuit_status(status: &str) -> Option<f64> {
    match status {
        "Healthy" => Some(0.0),
        "Issues" => Some(1.0),
        "Circuit Down" => Some(2.0),
        _ => None,
    }
}

/// Parse the vendor's latency string into a number.
///
/// The API reports latency as a number with a two-character unit suffix
/// ("482ms" -> 482). Returns `None` if the string is too short or the
/// remainder is not numeric.
pub fn parse_response_time(raw: &str) -> Option<f64> {
    if raw.len() <= 2 {
        return None;
    }

    let cut = raw.len() - 2;
    if !raw.is_char_boundary(cut) {
        return None;
    }

    raw[..cut].parse().ok()
}
