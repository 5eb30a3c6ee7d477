//! Tag-indexed family of items.
//!
//! Items are created lazily per distinct dynamic tag-value tuple. The index
//! maps a hash of the tuple to a collision chain; identity is exact tuple
//! equality, so two tuples sharing a hash never share an accumulator.

use crate::core::MetricError;
use crate::metrics::{Collector, Desc, Item, ItemOpts, Metric};
use crossbeam_channel::Sender;
use fnv::FnvHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

/// Written between successive tag values so `("a", "bc")` and `("ab", "c")`
/// hash differently.
const SEPARATOR_BYTE: u8 = 0xff;

type HashFn = fn(&[&str]) -> u64;

/// FNV-1a over each value's bytes, each followed by [`SEPARATOR_BYTE`].
pub(crate) fn hash_tag_values(tag_values: &[&str]) -> u64 {
    let mut hasher = FnvHasher::default();
    for value in tag_values {
        hasher.write(value.as_bytes());
        hasher.write_u8(SEPARATOR_BYTE);
    }
    hasher.finish()
}

struct Entry {
    tag_values: Vec<String>,
    item: Item,
}

impl Entry {
    fn matches(&self, tag_values: &[&str]) -> bool {
        self.tag_values.len() == tag_values.len()
            && self.tag_values.iter().zip(tag_values).all(|(a, b)| a == b)
    }
}

struct MetricMap {
    desc: Arc<Desc>,
    items: RwLock<HashMap<u64, Vec<Entry>>>,
    hash: HashFn,
}

/// A vector of items sharing one descriptor, keyed by dynamic tag values.
///
/// Cloning the vector clones a handle; all clones share one index.
#[derive(Clone)]
pub struct ItemVec {
    map: Arc<MetricMap>,
}

impl ItemVec {
    /// Create a vector with the given dynamic tag names.
    ///
    /// At least one tag name is required; use [`Item::new`] for scalars.
    pub fn new<I>(opts: ItemOpts, tag_names: I) -> Result<Self, MetricError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let desc = Desc::new(opts, tag_names)?;
        if desc.tag_names.is_empty() {
            return Err(MetricError::RequiredTagNames);
        }
        Ok(Self::with_hasher(Arc::new(desc), hash_tag_values))
    }

    fn with_hasher(desc: Arc<Desc>, hash: HashFn) -> Self {
        Self {
            map: Arc::new(MetricMap {
                desc,
                items: RwLock::new(HashMap::new()),
                hash,
            }),
        }
    }

    pub fn desc(&self) -> &Arc<Desc> {
        &self.map.desc
    }

    /// Get the item for `tag_values`, creating it on first use.
    ///
    /// Repeated calls with the same tuple return the same accumulator. A tuple
    /// whose length differs from the tag name count yields an item whose
    /// `write` fails with [`MetricError::InvalidTagValues`].
    pub fn with_tag_values(&self, tag_values: &[&str]) -> Item {
        if tag_values.len() != self.map.desc.tag_names.len() {
            return Item::errored(Arc::clone(&self.map.desc), MetricError::InvalidTagValues);
        }

        let hash = (self.map.hash)(tag_values);
        if let Some(item) = self.map.find(hash, tag_values) {
            return item;
        }
        self.map.get_or_create(hash, tag_values)
    }

    /// Remove the item for `tag_values`. Returns whether one was removed.
    pub fn delete_tag_values(&self, tag_values: &[&str]) -> bool {
        if tag_values.len() != self.map.desc.tag_names.len() {
            return false;
        }

        let hash = (self.map.hash)(tag_values);
        let mut items = self.map.items.write();
        let Some(chain) = items.get_mut(&hash) else {
            return false;
        };
        let Some(index) = chain.iter().position(|entry| entry.matches(tag_values)) else {
            return false;
        };

        chain.remove(index);
        if chain.is_empty() {
            items.remove(&hash);
        }
        true
    }

    /// Forget every tag tuple; later lookups start fresh items.
    pub fn reset(&self) {
        self.map.items.write().clear();
    }

    /// Drop tuples with no outside handle and no update since their last
    /// `write`. Held or freshly updated tuples stay, so cached handles keep
    /// exporting.
    pub fn evict_idle(&self) {
        self.map.items.write().retain(|_, chain| {
            chain.retain(|entry| !entry.item.is_idle());
            !chain.is_empty()
        });
    }

    /// Number of live tag tuples.
    pub fn len(&self) -> usize {
        self.map.items.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.items.read().is_empty()
    }
}

impl MetricMap {
    fn find(&self, hash: u64, tag_values: &[&str]) -> Option<Item> {
        self.items
            .read()
            .get(&hash)?
            .iter()
            .find(|entry| entry.matches(tag_values))
            .map(|entry| entry.item.clone())
    }

    fn get_or_create(&self, hash: u64, tag_values: &[&str]) -> Item {
        let mut items = self.items.write();
        let chain = items.entry(hash).or_default();

        // Another writer may have inserted the tuple since our read lookup.
        if let Some(entry) = chain.iter().find(|entry| entry.matches(tag_values)) {
            return entry.item.clone();
        }

        let owned: Vec<String> = tag_values.iter().map(|v| (*v).to_string()).collect();
        let item = Item::with_tag_values(Arc::clone(&self.desc), owned.clone());
        chain.push(Entry {
            tag_values: owned,
            item: item.clone(),
        });
        item
    }
}

impl Collector for ItemVec {
    fn describe(&self, descs: &Sender<Arc<Desc>>) {
        let _ = descs.send(Arc::clone(&self.map.desc));
    }

    fn collect(&self, metrics: &Sender<Arc<dyn Metric>>) {
        let items = self.map.items.read();
        for entry in items.values().flatten() {
            entry.item.collect(metrics);
        }
    }

    fn reset(&self) {
        ItemVec::reset(self);
    }

    fn evict_idle(&self) {
        ItemVec::evict_idle(self);
    }
}

impl std::fmt::Debug for ItemVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemVec")
            .field("desc", &self.map.desc.fq_name())
            .field("len", &self.len())
            .finish()
    }
}
