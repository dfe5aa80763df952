pub mod entry_ref;
pub mod rcu;
pub mod array_store;

pub use array_store::{ArrayStore, CompactionSpec, StoreReader};
pub use entry_ref::EntryRef;
pub use rcu::{AtomicValue, RcuBox, RcuVector};
