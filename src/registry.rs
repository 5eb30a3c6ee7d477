//! Collector registry and the gather fan-in.

use crate::metrics::{Collector, Desc, Metric};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;

/// An ordered set of collectors gathered together.
///
/// Registration order is preserved, but nothing about gather output order is
/// guaranteed.
#[derive(Default)]
pub struct Registry {
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collector. Safe to call while a gather is running; the running
    /// gather does not see it.
    pub fn register<C: Collector + 'static>(&self, collector: C) {
        self.collectors.write().push(Arc::new(collector));
    }

    /// Add several collectors in order.
    pub fn registers<I>(&self, collectors: I)
    where
        I: IntoIterator<Item = Arc<dyn Collector>>,
    {
        self.collectors.write().extend(collectors);
    }

    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.read().is_empty()
    }

    /// Fan every collector into one flat list of metrics.
    ///
    /// A producer thread walks the collectors while this thread drains the
    /// channel; the call returns once every collector has finished.
    pub fn gather(&self) -> Vec<Arc<dyn Metric>> {
        let collectors = self.collectors.read().clone();
        let (tx, rx) = crossbeam_channel::unbounded();

        thread::scope(|scope| {
            scope.spawn(move || {
                for collector in &collectors {
                    collector.collect(&tx);
                }
            });
            rx.iter().collect()
        })
    }

    /// Descriptors of every registered family.
    pub fn descriptors(&self) -> Vec<Arc<Desc>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.describe(&tx);
        drop(tx);
        rx.iter().collect()
    }

    /// Call `reset` on every registered collector.
    pub fn reset_collectors(&self) {
        for collector in self.collectors.read().iter() {
            collector.reset();
        }
    }

    /// Call `evict_idle` on every registered collector.
    pub fn evict_idle_collectors(&self) {
        for collector in self.collectors.read().iter() {
            collector.evict_idle();
        }
    }
}

impl Collector for Registry {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        for collector in self.collectors.read().iter() {
            collector.describe(descs);
        }
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        let collectors = self.collectors.read().clone();
        for collector in &collectors {
            collector.collect(metrics);
        }
    }

    fn reset(&self) {
        self.reset_collectors();
    }

    fn evict_idle(&self) {
        self.evict_idle_collectors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ConstraintTags, Item, ItemOpts, ItemVec, Snapshot};
    use std::collections::HashSet;

    fn memory() -> Item {
        Item::new(
            ItemOpts::new("system", "resource", "memory_usage")
                .constraint_tags(ConstraintTags::new(["env"], ["production"])),
        )
        .unwrap()
    }

    fn disk() -> ItemVec {
        ItemVec::new(ItemOpts::new("system", "disk", "disk_usage"), ["disk_path"]).unwrap()
    }

    fn key(snapshot: &Snapshot) -> (String, Vec<String>) {
        (
            format!("{}.{}.{}", snapshot.category, snapshot.sub_category, snapshot.item_name),
            snapshot.tag_values.clone(),
        )
    }

    #[test]
    fn test_gather_scalar_and_vector() {
        let registry = Registry::new();
        let memory = memory();
        let disk = disk();
        registry.register(memory.clone());
        registry.register(disk.clone());

        memory.add(512.0);
        disk.with_tag_values(&["/"]).add(10.0);
        disk.with_tag_values(&["/var"]).add(20.0);

        let snapshots: Vec<Snapshot> =
            registry.gather().iter().map(|m| m.write().unwrap()).collect();
        assert_eq!(snapshots.len(), 3);

        let got: HashSet<_> = snapshots.iter().map(key).collect();
        let want: HashSet<_> = [
            ("system.resource.memory_usage".to_string(), vec!["production".to_string()]),
            ("system.disk.disk_usage".to_string(), vec!["/".to_string()]),
            ("system.disk.disk_usage".to_string(), vec!["/var".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(got, want);

        let total: f64 = snapshots.iter().map(|s| s.value).sum();
        assert_eq!(total, 542.0);
    }

    #[test]
    fn test_empty_registry_gathers_nothing() {
        assert!(Registry::new().gather().is_empty());
    }

    #[test]
    fn test_nested_registry() {
        let inner = Arc::new(Registry::new());
        inner.register(memory());

        let outer = Registry::new();
        outer.register(Arc::clone(&inner));
        outer.registers([Arc::new(disk()) as Arc<dyn Collector>]);

        assert_eq!(outer.len(), 2);
        assert_eq!(outer.gather().len(), 1);
        assert_eq!(outer.descriptors().len(), 2);
    }

    #[test]
    fn test_reset_collectors_clears_vectors() {
        let registry = Registry::new();
        let disk = disk();
        registry.register(disk.clone());
        disk.with_tag_values(&["/"]).inc();

        registry.reset_collectors();
        assert!(disk.is_empty());
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn test_evict_idle_keeps_held_and_updated_tuples() {
        let registry = Registry::new();
        let disk = disk();
        registry.register(disk.clone());

        let root = disk.with_tag_values(&["/"]);
        disk.with_tag_values(&["/var"]).inc();
        disk.with_tag_values(&["/tmp"]).inc();
        for metric in registry.gather() {
            metric.write().unwrap();
        }

        disk.with_tag_values(&["/tmp"]).inc();
        registry.evict_idle_collectors();

        // "/var" was written and is held by nobody; "/tmp" changed after gather
        assert_eq!(disk.len(), 2);
        root.inc();
        assert!(Item::ptr_eq(&root, &disk.with_tag_values(&["/"])));
    }
}
