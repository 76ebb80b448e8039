use chrono::{DateTime, Datelike, SecondsFormat, SubsecRound, Utc};

// ============================================================================
// Registration Timestamp Format
// ============================================================================
//
// Stored form: yyyy-MM-ddTHH:mm:ss.SSSXXX
//   - exactly three fractional digits
//   - `Z` for UTC, otherwise a ±HH:MM offset
//
// Values are always written in UTC (`Z`). Offsets are accepted on read and
// normalised to UTC. Only years 0000 through 9999 fit the pattern.
//
// ============================================================================

/// Human-readable form of the stored pattern, used in error messages.
pub const PATTERN: &str = "yyyy-MM-ddTHH:mm:ss.SSSXXX";

const CHRONO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

/// `2024-05-01T09:30:15` is 19 characters; `.SSS` brings it to 23.
const FRACTION_END: usize = 23;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("timestamp {0:?} does not match {PATTERN}")]
pub struct MalformedTimestamp(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("year {0} cannot be written as {PATTERN}")]
pub struct YearOutOfRange(pub i32);

/// Current time truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Caller guarantees the year is in range; see `try_format`.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `format`, refusing values `parse` could not read back.
pub fn try_format(ts: &DateTime<Utc>) -> Result<String, YearOutOfRange> {
    match ts.year() {
        0..=9999 => Ok(format(ts)),
        year => Err(YearOutOfRange(year)),
    }
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, MalformedTimestamp> {
    let malformed = || MalformedTimestamp(raw.to_string());

    // chrono treats the fractional part as optional and of any length,
    // so the shape is checked up front.
    if !has_fixed_shape(raw) {
        return Err(malformed());
    }

    let normalised = match raw.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => raw.to_string(),
    };

    DateTime::parse_from_str(&normalised, CHRONO_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| malformed())
}

fn has_fixed_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() < FRACTION_END + 1 || bytes[10] != b'T' || bytes[19] != b'.' {
        return false;
    }
    if !bytes[20..FRACTION_END].iter().all(u8::is_ascii_digit) {
        return false;
    }

    match &bytes[FRACTION_END..] {
        b"Z" => true,
        [sign, h1, h2, b':', m1, m2] => {
            matches!(sign, b'+' | b'-')
                && [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Serde adapter so the JSON form of a customer carries the same string the
/// store does.
pub mod serde_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = super::try_format(ts).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&raw)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}
