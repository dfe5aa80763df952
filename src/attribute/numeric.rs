use roaring::RoaringBitmap;
use crate::attribute::storage::{MultiDirect, MultiEnum, SingleDirect, SingleEnum, Storage};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{CollectionType, DocId, EnumHandle, WeightedValue};
use crate::enumstore::{EnumIndex, EnumReader, EnumStore, NumericType};
use crate::generation::GenerationGuard;
use crate::readview::{
    ArrayReadView, DirectArrayView, EnumDecoded, EnumHandleView, EnumValueView, EnumWeightedHandleView,
    EnumWeightedView, MultiSource, SingleDirectSource, SingleEnumIndexSource, Stash, ValueCopyView, ValueSource,
    WeightedCopyView, WeightedSetReadView,
};
use crate::search::dictionary::{numeric_ordinals, postings_of};
use crate::search::{AttributeSearchContext, NeverMatch, NumericRange, QueryTerm, SearchContext};
use crate::sort::{MissingPolicy, NumericSortBlobWriter, SortBlobWriter};

/// Storage layouts of a numeric attribute, chosen once from the config
pub(crate) enum NumericStorage<T: NumericType> {
    Single(SingleDirect<T>),
    SingleEnum(SingleEnum<T>),
    Array(MultiDirect<T>),
    WeightedSet(MultiDirect<WeightedValue<T>>),
    ArrayEnum(MultiEnum<T, EnumIndex>),
    WeightedSetEnum(MultiEnum<T, WeightedValue<EnumIndex>>),
}

pub(crate) fn stash_array<'a, 's, T, W>(stash: &'s Stash<'a>, view: W) -> &'s mut (dyn ArrayReadView<T> + 'a)
where
    W: ArrayReadView<T> + 'a,
{
    stash.create(view)
}

pub(crate) fn stash_weighted<'a, 's, T, W>(
    stash: &'s Stash<'a>,
    view: W,
) -> &'s mut (dyn WeightedSetReadView<T> + 'a)
where
    W: WeightedSetReadView<T> + 'a,
{
    stash.create(view)
}

pub(crate) fn boxed_sort_writer<'a, W: SortBlobWriter + 'a>(writer: W) -> Box<dyn SortBlobWriter + 'a> {
    Box::new(writer)
}

fn range_context<'a, T, S>(
    source: S,
    range: Option<NumericRange<T>>,
    hint: Option<Vec<&'a RoaringBitmap>>,
) -> Box<dyn SearchContext + 'a>
where
    T: NumericType,
    S: ValueSource<Value = T> + 'a,
{
    match range {
        Some(range) => Box::new(AttributeSearchContext::new(source, range, hint)),
        None => Box::new(AttributeSearchContext::invalid(source, NeverMatch)),
    }
}

/// Posting lists of the dictionary entries inside `range`, when the store keeps postings
fn range_hint<'a, T: NumericType>(
    enums: &EnumStore<T>,
    reader: EnumReader<'a, T>,
    range: Option<&NumericRange<T>>,
) -> Option<Vec<&'a RoaringBitmap>> {
    let range = range?;
    if !enums.has_postings() {
        return None;
    }
    let dict = reader.dictionary();
    Some(postings_of(dict, &numeric_ordinals(dict, range)))
}

impl<T: NumericType> NumericStorage<T> {
    pub(crate) fn new(config: &Config) -> Self {
        match (config.collection_type, config.is_enumerated()) {
            (CollectionType::Array, false) => NumericStorage::Array(MultiDirect::new(config)),
            (CollectionType::Array, true) => NumericStorage::ArrayEnum(MultiEnum::new(config)),
            (CollectionType::WeightedSet, false) => NumericStorage::WeightedSet(MultiDirect::new(config)),
            (CollectionType::WeightedSet, true) => NumericStorage::WeightedSetEnum(MultiEnum::new(config)),
            (_, true) => NumericStorage::SingleEnum(SingleEnum::new(config)),
            (_, false) => NumericStorage::Single(SingleDirect::new(config)),
        }
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        match self {
            NumericStorage::Single(s) => s,
            NumericStorage::SingleEnum(s) => s,
            NumericStorage::Array(s) => s,
            NumericStorage::WeightedSet(s) => s,
            NumericStorage::ArrayEnum(s) => s,
            NumericStorage::WeightedSetEnum(s) => s,
        }
    }

    /// Committed single value, `None` when undefined or multi-value
    pub(crate) fn get_single(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<T> {
        match self {
            NumericStorage::Single(s) => s.values.get(guard, doc as usize).filter(|v| !v.is_undefined()),
            NumericStorage::SingleEnum(s) => {
                let idx = s.refs.get(guard, doc as usize).filter(|idx| !idx.is_empty())?;
                Some(s.enums.get_value(guard, idx))
            }
            _ => None,
        }
    }

    pub(crate) fn create_search_context<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        term: &QueryTerm,
        limit: DocId,
    ) -> Box<dyn SearchContext + 'a> {
        let range = if term.is_numeric_compatible() { NumericRange::<T>::parse(&term.term) } else { None };
        match self {
            NumericStorage::Single(s) => {
                range_context(SingleDirectSource::<T>::new(s.values.acquire_slots(guard), limit), range, None)
            }
            NumericStorage::SingleEnum(s) => {
                let reader = s.enums.reader(guard);
                let hint = range_hint(&s.enums, reader, range.as_ref());
                let source = SingleEnumIndexSource::new(s.refs.acquire_slots(guard), limit);
                range_context(EnumDecoded::new(source, reader), range, hint)
            }
            NumericStorage::Array(s) => range_context(MultiSource::new(s.mapping.make_read_view(guard, limit)), range, None),
            NumericStorage::WeightedSet(s) => {
                range_context(MultiSource::new(s.mapping.make_read_view(guard, limit)), range, None)
            }
            NumericStorage::ArrayEnum(s) => {
                let reader = s.enums.reader(guard);
                let hint = range_hint(&s.enums, reader, range.as_ref());
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                range_context(EnumDecoded::new(source, reader), range, hint)
            }
            NumericStorage::WeightedSetEnum(s) => {
                let reader = s.enums.reader(guard);
                let hint = range_hint(&s.enums, reader, range.as_ref());
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                range_context(EnumDecoded::new(source, reader), range, hint)
            }
        }
    }

    pub(crate) fn make_sort_blob_writer<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        ascending: bool,
        policy: &MissingPolicy,
    ) -> Result<Box<dyn SortBlobWriter + 'a>> {
        Ok(match self {
            NumericStorage::Single(s) => {
                let source = SingleDirectSource::<T>::new(s.values.acquire_slots(guard), limit);
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
            NumericStorage::SingleEnum(s) => {
                let source = SingleEnumIndexSource::new(s.refs.acquire_slots(guard), limit);
                let source = EnumDecoded::<_, T>::new(source, s.enums.reader(guard));
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
            NumericStorage::Array(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
            NumericStorage::WeightedSet(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
            NumericStorage::ArrayEnum(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                let source = EnumDecoded::<_, T>::new(source, s.enums.reader(guard));
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
            NumericStorage::WeightedSetEnum(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                let source = EnumDecoded::<_, T>::new(source, s.enums.reader(guard));
                boxed_sort_writer(NumericSortBlobWriter::new(source, ascending, policy)?)
            }
        })
    }

    pub(crate) fn array_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<T> + 'a)> {
        match self {
            NumericStorage::Array(s) => Some(stash_array(stash, DirectArrayView::new(s.mapping.make_read_view(guard, limit)))),
            NumericStorage::WeightedSet(s) => {
                Some(stash_array(stash, ValueCopyView::new(s.mapping.make_read_view(guard, limit))))
            }
            NumericStorage::ArrayEnum(s) => {
                let view = EnumValueView::<T, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_array(stash, view))
            }
            NumericStorage::WeightedSetEnum(s) => {
                let view = EnumValueView::<T, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_array(stash, view))
            }
            NumericStorage::Single(_) | NumericStorage::SingleEnum(_) => None,
        }
    }

    pub(crate) fn weighted_set_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<T> + 'a)> {
        match self {
            NumericStorage::WeightedSet(s) => {
                Some(stash_weighted(stash, DirectArrayView::new(s.mapping.make_read_view(guard, limit))))
            }
            NumericStorage::Array(s) => {
                Some(stash_weighted(stash, WeightedCopyView::new(s.mapping.make_read_view(guard, limit))))
            }
            NumericStorage::WeightedSetEnum(s) => {
                let view = EnumWeightedView::<T, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_weighted(stash, view))
            }
            NumericStorage::ArrayEnum(s) => {
                let view = EnumWeightedView::<T, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_weighted(stash, view))
            }
            NumericStorage::Single(_) | NumericStorage::SingleEnum(_) => None,
        }
    }

    pub(crate) fn enum_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<EnumHandle> + 'a)> {
        match self {
            NumericStorage::ArrayEnum(s) => {
                Some(stash_array(stash, EnumHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            NumericStorage::WeightedSetEnum(s) => {
                Some(stash_array(stash, EnumHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            _ => None,
        }
    }

    pub(crate) fn enum_weighted_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<EnumHandle> + 'a)> {
        match self {
            NumericStorage::ArrayEnum(s) => {
                Some(stash_weighted(stash, EnumWeightedHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            NumericStorage::WeightedSetEnum(s) => {
                Some(stash_weighted(stash, EnumWeightedHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::change::{ChangeKind, WeightedSetFlags};
    use crate::core::types::{BasicType, Value};
    use crate::generation::GenerationHandler;

    fn filled(config: &Config, docs: &[&[i64]]) -> (NumericStorage<i32>, GenerationHandler) {
        let storage = NumericStorage::<i32>::new(config);
        let handler = GenerationHandler::new();
        let s = storage.storage();
        s.add_docs(docs.len());
        for (doc, values) in docs.iter().enumerate() {
            let changes: Vec<ChangeKind> = if config.is_multi_value() {
                values.iter().map(|v| ChangeKind::Append(Value::Int(*v), 1)).collect()
            } else {
                values.iter().map(|v| ChangeKind::Update(Value::Int(*v))).collect()
            };
            s.apply(doc as DocId, &changes, WeightedSetFlags::default()).unwrap();
        }
        s.freeze().unwrap();
        s.assign_generation(handler.current_generation());
        handler.inc_generation();
        (storage, handler)
    }

    fn hits(ctx: &dyn SearchContext) -> Vec<DocId> {
        ctx.create_iterator().collect()
    }

    #[test]
    fn layout_follows_config() {
        let config = Config::new(BasicType::Int32, CollectionType::Array).with_fast_search(true);
        assert!(matches!(NumericStorage::<i32>::new(&config), NumericStorage::ArrayEnum(_)));
        let config = Config::new(BasicType::Int32, CollectionType::Single);
        assert!(matches!(NumericStorage::<i32>::new(&config), NumericStorage::Single(_)));
    }

    #[test]
    fn range_search_over_every_layout() {
        let docs: &[&[i64]] = &[&[5], &[10], &[], &[20]];
        for collection in [CollectionType::Single, CollectionType::Array, CollectionType::WeightedSet] {
            for fast_search in [false, true] {
                let config = Config::new(BasicType::Int32, collection).with_fast_search(fast_search);
                let (storage, handler) = filled(&config, docs);
                let guard = handler.take_guard();
                let mut ctx = storage.create_search_context(&guard, &QueryTerm::word("[6;20]"), 4);
                assert!(ctx.valid());
                assert_eq!(hits(ctx.as_ref()), vec![1, 3], "{:?} fast_search={}", collection, fast_search);
                ctx.fetch_postings();
                assert_eq!(hits(ctx.as_ref()), vec![1, 3]);
            }
        }
    }

    #[test]
    fn non_numeric_term_gives_invalid_context() {
        let config = Config::new(BasicType::Int32, CollectionType::Single);
        let (storage, handler) = filled(&config, &[&[1]]);
        let guard = handler.take_guard();
        let ctx = storage.create_search_context(&guard, &QueryTerm::word("abc"), 1);
        assert!(!ctx.valid());
        assert_eq!(ctx.matches(0), None);
    }

    #[test]
    fn views_are_created_in_the_stash() {
        let config = Config::new(BasicType::Int32, CollectionType::WeightedSet).with_fast_search(true);
        let (storage, handler) = filled(&config, &[&[3, 4]]);
        let guard = handler.take_guard();
        let stash = Stash::new();
        let array = storage.array_view(&guard, 1, &stash).unwrap();
        assert_eq!(array.get_values(0), &[3, 4]);
        let handles = storage.enum_handle_view(&guard, 1, &stash).unwrap();
        assert_eq!(handles.get_values(0).len(), 2);
        assert_eq!(stash.len(), 2);
    }
}
