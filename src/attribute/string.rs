use roaring::RoaringBitmap;
use crate::attribute::numeric::{boxed_sort_writer, stash_array, stash_weighted};
use crate::attribute::storage::{MultiEnum, SingleEnum, Storage};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{CollectionType, DocId, EnumHandle, WeightedValue};
use crate::enumstore::{EnumIndex, EnumReader, EnumStore};
use crate::generation::GenerationGuard;
use crate::readview::{
    ArrayReadView, EnumDecoded, EnumHandleView, EnumValueView, EnumWeightedHandleView, EnumWeightedView,
    MultiSource, SingleEnumIndexSource, Stash, ValueSource, WeightedSetReadView,
};
use crate::search::dictionary::{postings_of, string_ordinals};
use crate::search::{AttributeSearchContext, EnumSet, NeverMatch, QueryTerm, SearchContext};
use crate::sort::{BlobConverter, MissingPolicy, SortBlobWriter, StringSortBlobWriter};

/// String attributes are always enumerated
pub(crate) enum StringStorage {
    Single(SingleEnum<str>),
    Array(MultiEnum<str, EnumIndex>),
    WeightedSet(MultiEnum<str, WeightedValue<EnumIndex>>),
}

/// Dictionary matches of a string term, with postings when the store keeps them
struct DictionaryMatch<'a> {
    set: Option<EnumSet>,
    hint: Option<Vec<&'a RoaringBitmap>>,
}

impl<'a> DictionaryMatch<'a> {
    fn lookup(enums: &EnumStore<str>, reader: EnumReader<'a, str>, term: &QueryTerm) -> Self {
        let dict = reader.dictionary();
        match string_ordinals(dict, term, enums.is_folded()) {
            Some(ordinals) => DictionaryMatch {
                set: Some(EnumSet::new(ordinals.iter().map(|o| dict.index(*o)))),
                hint: enums.has_postings().then(|| postings_of(dict, &ordinals)),
            },
            None => DictionaryMatch { set: None, hint: None },
        }
    }

    fn into_context<S>(self, source: S) -> Box<dyn SearchContext + 'a>
    where
        S: ValueSource<Value = EnumIndex> + 'a,
    {
        match self.set {
            Some(set) => Box::new(AttributeSearchContext::new(source, set, self.hint)),
            None => Box::new(AttributeSearchContext::invalid(source, NeverMatch)),
        }
    }
}

impl StringStorage {
    pub(crate) fn new(config: &Config) -> Self {
        match config.collection_type {
            CollectionType::Array => StringStorage::Array(MultiEnum::new(config)),
            CollectionType::WeightedSet => StringStorage::WeightedSet(MultiEnum::new(config)),
            _ => StringStorage::Single(SingleEnum::new(config)),
        }
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        match self {
            StringStorage::Single(s) => s,
            StringStorage::Array(s) => s,
            StringStorage::WeightedSet(s) => s,
        }
    }

    fn enums(&self) -> &EnumStore<str> {
        match self {
            StringStorage::Single(s) => &s.enums,
            StringStorage::Array(s) => &s.enums,
            StringStorage::WeightedSet(s) => &s.enums,
        }
    }

    pub(crate) fn get_single<'a>(&'a self, guard: &'a GenerationGuard<'_>, doc: DocId) -> Option<&'a str> {
        match self {
            StringStorage::Single(s) => {
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
        let enums = self.enums();
        let matched = DictionaryMatch::lookup(enums, enums.reader(guard), term);
        match self {
            StringStorage::Single(s) => matched.into_context(SingleEnumIndexSource::new(s.refs.acquire_slots(guard), limit)),
            StringStorage::Array(s) => matched.into_context(MultiSource::new(s.mapping.make_read_view(guard, limit))),
            StringStorage::WeightedSet(s) => {
                matched.into_context(MultiSource::new(s.mapping.make_read_view(guard, limit)))
            }
        }
    }

    pub(crate) fn make_sort_blob_writer<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        ascending: bool,
        policy: &MissingPolicy,
        converter: Option<&'a dyn BlobConverter>,
    ) -> Result<Box<dyn SortBlobWriter + 'a>> {
        Ok(match self {
            StringStorage::Single(s) => {
                let source = SingleEnumIndexSource::new(s.refs.acquire_slots(guard), limit);
                let source = EnumDecoded::<_, str>::new(source, s.enums.reader(guard));
                boxed_sort_writer(StringSortBlobWriter::new(source, ascending, policy, converter)?)
            }
            StringStorage::Array(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                let source = EnumDecoded::<_, str>::new(source, s.enums.reader(guard));
                boxed_sort_writer(StringSortBlobWriter::new(source, ascending, policy, converter)?)
            }
            StringStorage::WeightedSet(s) => {
                let source = MultiSource::new(s.mapping.make_read_view(guard, limit));
                let source = EnumDecoded::<_, str>::new(source, s.enums.reader(guard));
                boxed_sort_writer(StringSortBlobWriter::new(source, ascending, policy, converter)?)
            }
        })
    }

    pub(crate) fn array_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<&'a str> + 'a)> {
        match self {
            StringStorage::Array(s) => {
                let view = EnumValueView::<str, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_array(stash, view))
            }
            StringStorage::WeightedSet(s) => {
                let view = EnumValueView::<str, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_array(stash, view))
            }
            StringStorage::Single(_) => None,
        }
    }

    pub(crate) fn weighted_set_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<&'a str> + 'a)> {
        match self {
            StringStorage::WeightedSet(s) => {
                let view =
                    EnumWeightedView::<str, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_weighted(stash, view))
            }
            StringStorage::Array(s) => {
                let view =
                    EnumWeightedView::<str, _>::new(s.mapping.make_read_view(guard, limit), s.enums.reader(guard));
                Some(stash_weighted(stash, view))
            }
            StringStorage::Single(_) => None,
        }
    }

    pub(crate) fn enum_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<EnumHandle> + 'a)> {
        match self {
            StringStorage::Array(s) => Some(stash_array(stash, EnumHandleView::new(s.mapping.make_read_view(guard, limit)))),
            StringStorage::WeightedSet(s) => {
                Some(stash_array(stash, EnumHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            StringStorage::Single(_) => None,
        }
    }

    pub(crate) fn enum_weighted_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<EnumHandle> + 'a)> {
        match self {
            StringStorage::Array(s) => {
                Some(stash_weighted(stash, EnumWeightedHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            StringStorage::WeightedSet(s) => {
                Some(stash_weighted(stash, EnumWeightedHandleView::new(s.mapping.make_read_view(guard, limit))))
            }
            StringStorage::Single(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::change::{ChangeKind, WeightedSetFlags};
    use crate::core::types::{BasicType, Value};
    use crate::generation::GenerationHandler;

    fn filled(config: &Config, docs: &[&[&str]]) -> (StringStorage, GenerationHandler) {
        let storage = StringStorage::new(config);
        let handler = GenerationHandler::new();
        let s = storage.storage();
        s.add_docs(docs.len());
        for (doc, values) in docs.iter().enumerate() {
            let changes: Vec<ChangeKind> = if config.is_multi_value() {
                values.iter().map(|v| ChangeKind::Append(Value::from(*v), 1)).collect()
            } else {
                values.iter().map(|v| ChangeKind::Update(Value::from(*v))).collect()
            };
            s.apply(doc as DocId, &changes, WeightedSetFlags::default()).unwrap();
        }
        s.freeze().unwrap();
        s.assign_generation(handler.current_generation());
        handler.inc_generation();
        (storage, handler)
    }

    #[test]
    fn uncased_word_search_with_and_without_postings() {
        for fast_search in [false, true] {
            let config = Config::new(BasicType::String, CollectionType::Array).with_fast_search(fast_search);
            let (storage, handler) = filled(&config, &[&["Foo", "bar"], &[], &["FOO"]]);
            let guard = handler.take_guard();
            let mut ctx = storage.create_search_context(&guard, &QueryTerm::word("foo"), 3);
            ctx.fetch_postings();
            let hits: Vec<DocId> = ctx.create_iterator().collect();
            assert_eq!(hits, vec![0, 2]);
            assert_eq!(ctx.matches(0), Some(1));
        }
    }

    #[test]
    fn bad_regex_gives_invalid_context() {
        let config = Config::new(BasicType::String, CollectionType::Single);
        let (storage, handler) = filled(&config, &[&["abc"]]);
        let guard = handler.take_guard();
        let ctx = storage.create_search_context(&guard, &QueryTerm::regex("(unclosed"), 1);
        assert!(!ctx.valid());
    }

    #[test]
    fn sort_writer_uses_converter() {
        let config = Config::new(BasicType::String, CollectionType::Single).with_match(crate::core::config::Match::Cased);
        let (storage, handler) = filled(&config, &[&["B"], &["a"]]);
        let guard = handler.take_guard();
        let converter = crate::sort::LowercaseConverter;
        let mut writer = storage
            .make_sort_blob_writer(&guard, 2, true, &MissingPolicy::Default, Some(&converter))
            .unwrap();
        let mut buf = [0u8; 8];
        let n = writer.write(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"b\0");
    }
}
