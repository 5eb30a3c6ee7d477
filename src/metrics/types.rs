//! Flattened readout of one accumulator.

use serde::{Deserialize, Serialize};

/// Point-in-time readout produced by a destructive `write`.
///
/// Tag names and values hold the constraint tags first, then the dynamic
/// tags, index-aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub category: String,
    pub sub_category: String,
    pub item_name: String,
    pub description: String,
    pub tag_names: Vec<String>,
    pub tag_values: Vec<String>,
    pub value: f64,
}

impl Snapshot {
    /// Iterate `(name, value)` tag pairs.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tag_names
            .iter()
            .map(String::as_str)
            .zip(self.tag_values.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_field_names() {
        let snapshot = Snapshot {
            category: "system".to_string(),
            sub_category: "disk".to_string(),
            item_name: "disk_usage".to_string(),
            description: String::new(),
            tag_names: vec!["env".to_string(), "disk_path".to_string()],
            tag_values: vec!["production".to_string(), "/".to_string()],
            value: 42.0,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sub_category"], "disk");
        assert_eq!(json["tag_values"][1], "/");

        let tags: Vec<_> = snapshot.tags().collect();
        assert_eq!(tags, vec![("env", "production"), ("disk_path", "/")]);
    }
}
