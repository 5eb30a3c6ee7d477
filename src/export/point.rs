//! Line-protocol points.

use crate::metrics::Snapshot;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Tag carrying the item name of the record a point was built from.
pub const ITEM_NAME_TAG: &str = "item_name";

/// Field holding the accumulator value.
pub const VALUE_FIELD: &str = "value";

/// One time-series sample: measurement, sorted tags, float fields, timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Map a snapshot onto a point: the subcategory becomes the measurement,
    /// the item name and every combined tag become tags, the value becomes
    /// the `value` field.
    pub fn from_snapshot(snapshot: &Snapshot, timestamp: DateTime<Utc>) -> Self {
        let mut point = Self::new(snapshot.sub_category.as_str(), timestamp)
            .tag(ITEM_NAME_TAG, snapshot.item_name.as_str())
            .field(VALUE_FIELD, snapshot.value);
        for (name, value) in snapshot.tags() {
            point = point.tag(name, value);
        }
        point
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True when the point can be encoded: at least one field, every field
    /// finite, and no line break in any name or tag value. Line protocol has
    /// no escape for `\n` or `\r`.
    pub fn is_writable(&self) -> bool {
        let single_line = |text: &String| !text.contains(|c: char| matches!(c, '\n' | '\r'));
        !self.fields.is_empty()
            && self.fields.values().all(|value| value.is_finite())
            && single_line(&self.measurement)
            && self.tags.iter().all(|(key, value)| single_line(key) && single_line(value))
            && self.fields.keys().all(single_line)
    }

    /// Encode as one line of InfluxDB line protocol with a nanosecond
    /// timestamp. Tags with an empty value are omitted.
    pub fn to_line_protocol(&self) -> String {
        let mut line = String::with_capacity(64);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        let mut separator = ' ';
        for (key, value) in &self.fields {
            line.push(separator);
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            line.push_str(&format_float(*value));
            separator = ',';
        }

        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            line.push(' ');
            line.push_str(&nanos.to_string());
        }
        line
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for ch in raw.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Floats without a fractional part still need to read back as floats.
fn format_float(value: f64) -> String {
    let text = value.to_string();
    if text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        text
    } else {
        format!("{}.0", text)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "measurement: {}", self.measurement)?;
        for (key, value) in &self.tags {
            write!(f, ", {}={}", key, value)?;
        }
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        write!(
            f,
            ", time: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 5).unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            category: "system".to_string(),
            sub_category: "disk".to_string(),
            item_name: "disk_usage".to_string(),
            description: String::new(),
            tag_names: vec!["env".to_string(), "disk_path".to_string()],
            tag_values: vec!["production".to_string(), "/var/log".to_string()],
            value: 42.0,
        }
    }

    #[test]
    fn test_from_snapshot_line() {
        let point = Point::from_snapshot(&snapshot(), ts());
        assert_eq!(point.measurement(), "disk");
        assert_eq!(
            point.to_line_protocol(),
            "disk,disk_path=/var/log,env=production,item_name=disk_usage value=42.0 1700000000000000005"
        );
    }

    #[test]
    fn test_escaping() {
        let point = Point::new("net traffic,rx", ts())
            .tag("iface name", "eth=0,a")
            .field("bytes in", 1.5);
        assert_eq!(
            point.to_line_protocol(),
            r"net\ traffic\,rx,iface\ name=eth\=0\,a bytes\ in=1.5 1700000000000000005"
        );
    }

    #[test]
    fn test_empty_tag_values_are_omitted() {
        let point = Point::new("resource", ts()).tag("host", "").field(VALUE_FIELD, -3.0);
        assert_eq!(point.to_line_protocol(), "resource value=-3.0 1700000000000000005");
    }

    #[test]
    fn test_writable() {
        assert!(Point::new("m", ts()).field("value", 1.0).is_writable());
        assert!(!Point::new("m", ts()).is_writable());
        assert!(!Point::new("m", ts()).field("value", f64::NAN).is_writable());
        assert!(!Point::new("m", ts()).field("value", f64::INFINITY).is_writable());
    }

    #[test]
    fn test_line_breaks_are_not_writable() {
        let point = |measurement: &str, key: &str, value: &str| {
            Point::new(measurement, ts()).tag(key, value).field(VALUE_FIELD, 1.0)
        };
        assert!(point("disk", "path", "/var/log").is_writable());
        assert!(!point("disk", "path", "a\nb").is_writable());
        assert!(!point("disk", "path", "a\rb").is_writable());
        assert!(!point("disk", "pa\nth", "a").is_writable());
        assert!(!point("di\nsk", "path", "a").is_writable());
        assert!(!Point::new("disk", ts()).field("val\nue", 1.0).is_writable());
    }

    #[test]
    fn test_display_summary() {
        let text = Point::from_snapshot(&snapshot(), ts()).to_string();
        assert!(text.starts_with("measurement: disk, disk_path=/var/log"));
        assert!(text.ends_with("time: 2023-11-14T22:13:20Z"));
    }
}
