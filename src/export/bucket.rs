//! Per-cycle grouping of gathered records by destination bucket.

use crate::export::point::Point;
use crate::metrics::Metric;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Retention period of every bucket the flush task writes to.
pub const REALTIME: &str = "REALTIME";

/// Destination of a group of points: `(period, category)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub period: &'static str,
    pub category: String,
}

impl BucketKey {
    pub fn realtime(category: impl Into<String>) -> Self {
        Self {
            period: REALTIME,
            category: category.into(),
        }
    }

    /// Name of the sink bucket and of its backup file stem.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.period, self.category)
    }
}

/// Points of one gather cycle grouped by [`BucketKey`].
#[derive(Debug, Default)]
pub struct Bucket {
    items: BTreeMap<BucketKey, Vec<Point>>,
    skipped: usize,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `metric` (read-and-clear) and file its point under its category.
    ///
    /// Errored items and records line protocol cannot carry (non-finite
    /// values, line breaks in tags) are logged and counted as skipped.
    pub fn add(&mut self, metric: &dyn Metric, now: DateTime<Utc>) {
        let snapshot = match metric.write() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(metric = %metric.desc(), error = %err, "Skipping metric record");
                self.skipped += 1;
                return;
            },
        };

        let point = Point::from_snapshot(&snapshot, now);
        if !point.is_writable() {
            tracing::warn!(
                metric = %metric.desc(),
                value = snapshot.value,
                tags = ?snapshot.tag_values,
                "Skipping metric record that cannot be encoded"
            );
            self.skipped += 1;
            return;
        }

        self.items
            .entry(BucketKey::realtime(snapshot.category))
            .or_default()
            .push(point);
    }

    /// Number of destination buckets.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn get(&self, key: &BucketKey) -> Option<&[Point]> {
        self.items.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketKey, &[Point])> {
        self.items.iter().map(|(key, points)| (key, points.as_slice()))
    }

    /// Log what this cycle is about to write.
    pub fn summary(&self, now: DateTime<Utc>) {
        tracing::debug!(
            time = %now.to_rfc3339_opts(SecondsFormat::Secs, true),
            buckets = self.len(),
            points = self.point_count(),
            skipped = self.skipped,
            "Bucket summary"
        );
        for (key, points) in &self.items {
            tracing::debug!(bucket = %key, points = points.len(), "Bucket");
            for point in points {
                tracing::trace!(bucket = %key, "{}", point);
            }
        }
    }
}

impl IntoIterator for Bucket {
    type Item = (BucketKey, Vec<Point>);
    type IntoIter = std::collections::btree_map::IntoIter<BucketKey, Vec<Point>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
