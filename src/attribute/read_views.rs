use crate::attribute::kind::AttributeKind;
use crate::attribute::vector::AttributeVector;
use crate::core::types::EnumHandle;
use crate::generation::GenerationGuard;
use crate::readview::{ArrayReadView, Stash, WeightedSetReadView};

/// Element types an attribute can hand out array and weighted-set read views for.
///
/// Implemented for `bool`, the integer and float types, `&str` and [`EnumHandle`]. The
/// views are placed in the stash and bounded by the attribute's committed doc id limit.
pub trait ArrayViewType<'a>: Sized + 'a {
    fn array_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<Self> + 'a)>;

    fn weighted_set_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<Self> + 'a)>;
}

macro_rules! numeric_view_type {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> ArrayViewType<'a> for $t {
                fn array_view<'s>(
                    attr: &'a AttributeVector,
                    guard: &'a GenerationGuard<'_>,
                    stash: &'s Stash<'a>,
                ) -> Option<&'s mut (dyn ArrayReadView<$t> + 'a)> {
                    match attr.kind() {
                        AttributeKind::$variant(s) => s.array_view(guard, attr.committed_doc_id_limit(), stash),
                        _ => None,
                    }
                }

                fn weighted_set_view<'s>(
                    attr: &'a AttributeVector,
                    guard: &'a GenerationGuard<'_>,
                    stash: &'s Stash<'a>,
                ) -> Option<&'s mut (dyn WeightedSetReadView<$t> + 'a)> {
                    match attr.kind() {
                        AttributeKind::$variant(s) => s.weighted_set_view(guard, attr.committed_doc_id_limit(), stash),
                        _ => None,
                    }
                }
            }
        )*
    };
}

numeric_view_type!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
);

impl<'a> ArrayViewType<'a> for &'a str {
    fn array_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<&'a str> + 'a)> {
        match attr.kind() {
            AttributeKind::String(s) => s.array_view(guard, attr.committed_doc_id_limit(), stash),
            _ => None,
        }
    }

    fn weighted_set_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<&'a str> + 'a)> {
        match attr.kind() {
            AttributeKind::String(s) => s.weighted_set_view(guard, attr.committed_doc_id_limit(), stash),
            _ => None,
        }
    }
}

/// Enum handles of any enumerated multi-value attribute
impl<'a> ArrayViewType<'a> for EnumHandle {
    fn array_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<EnumHandle> + 'a)> {
        attr.kind().enum_handle_view(guard, attr.committed_doc_id_limit(), stash)
    }

    fn weighted_set_view<'s>(
        attr: &'a AttributeVector,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<EnumHandle> + 'a)> {
        attr.kind().enum_weighted_handle_view(guard, attr.committed_doc_id_limit(), stash)
    }
}
