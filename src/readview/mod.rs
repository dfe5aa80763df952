pub mod stash;
pub mod source;
pub mod views;

use crate::core::types::{DocId, WeightedValue};

pub use source::{EnumDecoded, MultiSource, SingleDirectSource, SingleEnumIndexSource, ValueSource};
pub use stash::Stash;
pub use views::{
    DirectArrayView, EnumHandleView, EnumValueView, EnumWeightedHandleView, EnumWeightedView,
    ValueCopyView, WeightedCopyView,
};

/// Per-document values of a multi-value attribute.
///
/// The returned slice is valid until the next call; the view itself stays valid for as
/// long as the generation guard it was created under.
pub trait ArrayReadView<T> {
    fn get_values(&mut self, doc: DocId) -> &[T];
}

/// Per-document (value, weight) pairs of a multi-value attribute
pub trait WeightedSetReadView<T> {
    fn get_values(&mut self, doc: DocId) -> &[WeightedValue<T>];
}
