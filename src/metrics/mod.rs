//! Lock-free scalar accumulators and their tag-indexed vectors.
//!
//! - `Item`: one atomically mutated `f64`, exported destructively by `write`
//! - `ItemVec`: lazily created items keyed by dynamic tag values
//! - `Collector`: the capability items, vectors and registries share

pub mod collector;
pub mod desc;
pub mod item;
pub mod types;
pub mod vec;

pub use collector::{Collector, Metric};
pub use desc::{ConstraintTags, Desc, ItemOpts};
pub use item::Item;
pub use types::Snapshot;
pub use vec::ItemVec;
