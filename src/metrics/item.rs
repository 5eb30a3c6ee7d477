//! Lock-free `f64` accumulator.
//!
//! The value lives in an `AtomicU64` as raw `f64` bits. `add`, `min` and
//! `max` run compare-and-swap loops over those bits; `write` swaps them back
//! to the empty state. Concurrent updates carry no ordering guarantee beyond
//! the atomics themselves: an `add` racing a `write` lands in either this
//! cycle's snapshot or the next one.
//!
//! The empty state reads as zero everywhere, but `min`/`max` treat it as "no
//! watermark yet" so the first candidate of an interval always wins.

use crate::core::MetricError;
use crate::metrics::{Collector, Desc, ItemOpts, Metric, Snapshot};
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A quiet NaN with a payload arithmetic never produces. Marks an
/// accumulator with no update since creation or the last `write`.
const EMPTY: u64 = 0x7ff8_0000_0000_e417;

fn decode(bits: u64) -> f64 {
    if bits == EMPTY {
        0.0
    } else {
        f64::from_bits(bits)
    }
}

/// Handle to one accumulator. Clones share the same value.
#[derive(Clone)]
pub struct Item {
    core: Arc<ItemCore>,
}

struct ItemCore {
    bits: AtomicU64,
    desc: Arc<Desc>,
    tag_values: Vec<String>,
    err: Option<MetricError>,
}

impl Item {
    /// Create a scalar item.
    ///
    /// Invalid options are a setup error; no item is produced.
    pub fn new(opts: ItemOpts) -> Result<Self, MetricError> {
        let desc = Desc::new(opts, Vec::<String>::new())?;
        Ok(Self::with_tag_values(Arc::new(desc), Vec::new()))
    }

    pub(crate) fn with_tag_values(desc: Arc<Desc>, tag_values: Vec<String>) -> Self {
        Self {
            core: Arc::new(ItemCore {
                bits: AtomicU64::new(EMPTY),
                desc,
                tag_values,
                err: None,
            }),
        }
    }

    /// An item that reports `err` on every `write`.
    pub(crate) fn errored(desc: Arc<Desc>, err: MetricError) -> Self {
        Self {
            core: Arc::new(ItemCore {
                bits: AtomicU64::new(EMPTY),
                desc,
                tag_values: Vec::new(),
                err: Some(err),
            }),
        }
    }

    pub fn set(&self, value: f64) {
        self.core.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }

    pub fn add(&self, value: f64) {
        let bits = &self.core.bits;
        let mut current = bits.load(Ordering::Acquire);
        loop {
            let next = (decode(current) + value).to_bits();
            match bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn sub(&self, value: f64) {
        self.add(-value);
    }

    /// Lower the value to `value` if it is smaller than the current one.
    pub fn min(&self, value: f64) {
        self.update_if(value, |candidate, current| candidate < current);
    }

    /// Raise the value to `value` if it is larger than the current one.
    pub fn max(&self, value: f64) {
        self.update_if(value, |candidate, current| candidate > current);
    }

    fn update_if(&self, candidate: f64, improves: impl Fn(f64, f64) -> bool) {
        let bits = &self.core.bits;
        let mut current = bits.load(Ordering::Acquire);
        loop {
            if current != EMPTY && !improves(candidate, f64::from_bits(current)) {
                return;
            }
            match bits.compare_exchange_weak(
                current,
                candidate.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Current value without resetting it.
    pub fn value(&self) -> f64 {
        decode(self.core.bits.load(Ordering::Acquire))
    }

    /// Export the value and reset it to zero.
    pub fn write(&self) -> Result<Snapshot, MetricError> {
        self.core.write()
    }

    pub fn desc(&self) -> &Arc<Desc> {
        &self.core.desc
    }

    pub fn tag_values(&self) -> &[String] {
        &self.core.tag_values
    }

    pub fn is_error(&self) -> bool {
        self.core.err.is_some()
    }

    pub fn error(&self) -> Option<MetricError> {
        self.core.err
    }

    /// True when no handle besides this one exists and nothing has updated
    /// the value since the last `write`.
    pub(crate) fn is_idle(&self) -> bool {
        Arc::strong_count(&self.core) == 1 && self.core.bits.load(Ordering::Acquire) == EMPTY
    }

    /// True when both handles point at the same accumulator.
    pub fn ptr_eq(a: &Item, b: &Item) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }
}

impl Metric for ItemCore {
    fn desc(&self) -> &Arc<Desc> {
        &self.desc
    }

    fn write(&self) -> Result<Snapshot, MetricError> {
        if let Some(err) = self.err {
            return Err(err);
        }

        let value = decode(self.bits.swap(EMPTY, Ordering::AcqRel));

        let desc = &self.desc;
        let mut tag_values =
            Vec::with_capacity(desc.constraint_tags.tag_values.len() + self.tag_values.len());
        tag_values.extend_from_slice(&desc.constraint_tags.tag_values);
        tag_values.extend_from_slice(&self.tag_values);

        Ok(Snapshot {
            category: desc.category.clone(),
            sub_category: desc.sub_category.clone(),
            item_name: desc.item_name.clone(),
            description: desc.description.clone(),
            tag_names: desc.tag_names_with_constraint(),
            tag_values,
            value,
        })
    }
}

impl Collector for Item {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        let _ = descs.send(Arc::clone(&self.core.desc));
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        let metric: Arc<dyn Metric> = Arc::<ItemCore>::clone(&self.core);
        let _ = metrics.send(metric);
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("desc", &self.core.desc.fq_name())
            .field("tag_values", &self.core.tag_values)
            .field("value", &self.value())
            .field("err", &self.core.err)
            .finish()
    }
}
