//! Date conversion to seconds since the Unix epoch.
//!
//! INTERNALDATE uses the IMAP `date-time` form (`17-Jul-1996 02:44:25 -0700`);
//! envelope dates are RFC 5322 header values, which in the wild often carry a
//! trailing comment such as `(PDT)` or an obsolete zone name.

use chrono::DateTime;

/// Parses an IMAP `date-time` string into epoch seconds.
#[must_use]
pub fn parse_internal_date(value: &str) -> Option<i64> {
    let value = value.trim();
    // The day may be space-padded: " 7-Feb-1994 21:52:25 -0800".
    DateTime::parse_from_str(value, "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.timestamp())
}

/// Parses an RFC 5322 `Date:` header value into epoch seconds.
#[must_use]
pub fn parse_header_date(value: &str) -> Option<i64> {
    let value = strip_comment(value.trim());
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }

    let value = normalize_zone(value);
    let value = value
        .split_once(',')
        .map_or(value.as_str(), |(_, rest)| rest.trim());
    ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.timestamp())
}

fn strip_comment(value: &str) -> &str {
    match value.rfind('(') {
        Some(i) if value.ends_with(')') => value[..i].trim_end(),
        _ => value,
    }
}

fn normalize_zone(value: &str) -> String {
    let Some((head, zone)) = value.rsplit_once(' ') else {
        return value.to_string();
    };
    let offset = match zone.to_ascii_uppercase().as_str() {
        "GMT" | "UT" | "UTC" | "Z" => "+0000",
        "EDT" => "-0400",
        "EST" | "CDT" => "-0500",
        "CST" | "MDT" => "-0600",
        "MST" | "PDT" => "-0700",
        "PST" => "-0800",
        _ => return value.to_string(),
    };
    format!("{head} {offset}")
}
