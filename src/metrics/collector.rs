//! The capability shared by items, vectors, registries and external sources.

use crate::core::MetricError;
use crate::metrics::{Desc, Snapshot};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// A single readable accumulator.
pub trait Metric: Send + Sync {
    /// Descriptor of the family this metric belongs to.
    fn desc(&self) -> &Arc<Desc>;

    /// Read the current value and reset it to zero in one atomic step.
    ///
    /// This is an export-and-clear, never a peek.
    fn write(&self) -> Result<Snapshot, MetricError>;
}

/// Anything that can emit metrics into a gather cycle.
///
/// Implementations push onto the given sender; a closed receiver is not an
/// error for the collector.
pub trait Collector: Send + Sync {
    /// Emit the descriptors of every family this collector owns.
    fn describe(&self, descs: &Sender<Arc<Desc>>);

    /// Emit every live metric.
    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>);

    /// Forget per-cycle state. Vectors drop all their tag tuples; scalar
    /// items keep nothing beyond their value, which `write` already clears.
    fn reset(&self) {}

    /// Drop state nobody can observe any more. Vectors drop tuples that have
    /// no outside handle and saw no update since the last `write`.
    fn evict_idle(&self) {}
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        (**self).describe(descs);
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        (**self).collect(metrics);
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn evict_idle(&self) {
        (**self).evict_idle();
    }
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        (**self).describe(descs);
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        (**self).collect(metrics);
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn evict_idle(&self) {
        (**self).evict_idle();
    }
}
