//! The agent's own counters, exported through the same pipeline as
//! application metrics.

use crate::core::MetricError;
use crate::metrics::{Collector, Desc, Item, ItemOpts, Metric};
use crossbeam_channel::Sender;
use std::sync::Arc;

const CATEGORY: &str = "telemetry";
const SUB_CATEGORY: &str = "agent";

/// Per-interval agent counters. Like every item they are cleared by the
/// cycle that exports them, so each record is a delta.
#[derive(Debug, Clone)]
pub struct AgentStats {
    pub gather_cycles: Item,
    pub points_written: Item,
    pub skipped_records: Item,
    pub spilled_batches: Item,
    pub replayed_records: Item,
    pub replay_files: Item,
}

impl AgentStats {
    pub fn new() -> Result<Self, MetricError> {
        Ok(Self {
            gather_cycles: counter("gather_cycles", "Completed gather and flush cycles.")?,
            points_written: counter("points_written", "Points accepted by the sink.")?,
            skipped_records: counter("skipped_records", "Records dropped before encoding.")?,
            spilled_batches: counter("spilled_batches", "Batches appended to the backup store.")?,
            replayed_records: counter("replayed_records", "Backup records resent to the sink.")?,
            replay_files: counter("replay_files", "Backup files consumed by replay.")?,
        })
    }

    fn items(&self) -> [&Item; 6] {
        [
            &self.gather_cycles,
            &self.points_written,
            &self.skipped_records,
            &self.spilled_batches,
            &self.replayed_records,
            &self.replay_files,
        ]
    }
}

fn counter(name: &str, description: &str) -> Result<Item, MetricError> {
    Item::new(ItemOpts::new(CATEGORY, SUB_CATEGORY, name).description(description))
}

impl Collector for AgentStats {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        for item in self.items() {
            item.describe(descs);
        }
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        for item in self.items() {
            item.collect(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_counters() {
        let stats = AgentStats::new().unwrap();
        stats.gather_cycles.inc();
        stats.points_written.add(12.0);

        let (tx, rx) = crossbeam_channel::unbounded();
        stats.collect(&tx);
        drop(tx);

        let snapshots: Vec<_> = rx.iter().map(|m| m.write().unwrap()).collect();
        assert_eq!(snapshots.len(), 6);
        assert!(snapshots.iter().all(|s| s.category == "telemetry" && s.sub_category == "agent"));

        let written = snapshots.iter().find(|s| s.item_name == "points_written").unwrap();
        assert_eq!(written.value, 12.0);
        assert_eq!(stats.points_written.value(), 0.0);
    }
}
