//! Expression nodes reading attribute values per document, the consumers of
//! read views in grouping and ranking expressions.
//!
//! A node is resolved against an [`AttributeContext`](crate::attribute::AttributeContext)
//! by name, then prepared once per query against guarded attributes and a [`Stash`]
//! holding its read views. The prepared [`AttributeEvaluator`] is executed per document.

pub mod result;
pub mod attribute_node;
pub mod map_lookup;

use std::sync::Arc;
use crate::attribute::{AttributeContext, AttributeVector};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::generation::GenerationGuard;

pub use attribute_node::AttributeNode;
pub use map_lookup::{AttributeMapLookupNode, MapLookupAttributes};
pub use result::ResultValue;

/// An attribute together with a guard pinning its current generation
pub struct GuardedAttribute<'a> {
    pub attr: &'a AttributeVector,
    pub guard: GenerationGuard<'a>,
}

impl<'a> GuardedAttribute<'a> {
    pub fn new(attr: &'a AttributeVector) -> Self {
        GuardedAttribute { attr, guard: attr.take_guard() }
    }
}

pub(crate) fn find_attribute(ctx: &dyn AttributeContext, name: &str) -> Result<Arc<AttributeVector>> {
    ctx.get_attribute(name).ok_or_else(|| {
        Error::new(ErrorKind::NotFound, format!("failed locating attribute vector '{}'", name))
    })
}

/// Produces the result of a prepared node for one document
pub(crate) trait ResultHandler {
    fn handle(&mut self, doc: DocId) -> ResultValue;
}

/// Prepared expression node; read views stay valid until the stash is dropped.
pub struct AttributeEvaluator<'s> {
    handler: Box<dyn ResultHandler + 's>,
    current_index: Option<usize>,
    uses_current_index: bool,
}

impl<'s> AttributeEvaluator<'s> {
    pub(crate) fn new(handler: Box<dyn ResultHandler + 's>, uses_current_index: bool) -> Self {
        AttributeEvaluator { handler, current_index: None, uses_current_index }
    }

    /// Element to pick from multi-value results. Ignored unless the node was prepared
    /// for index lookups.
    pub fn set_current_index(&mut self, index: usize) {
        self.current_index = Some(index);
    }

    pub fn execute(&mut self, doc: DocId) -> ResultValue {
        let result = self.handler.handle(doc);
        match (self.uses_current_index, self.current_index, result) {
            // beyond the array end there is nothing to pick, never the last element
            (true, Some(index), ResultValue::Array(mut values)) if index < values.len() => values.swap_remove(index),
            (true, _, ResultValue::Array(_)) => ResultValue::Null,
            (_, _, result) => result,
        }
    }
}
