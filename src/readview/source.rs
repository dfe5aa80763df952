use crate::core::types::DocId;
use crate::datastore::{AtomicValue, EntryRef};
use crate::enumstore::{EnumIndex, EnumReader, EnumValue, NumericType};
use crate::multivalue::{MultiValueEntry, MultiValueReadView};

/// Uniform per-document value access shared by search contexts and sort blob writers.
///
/// Sources are snapshots taken under a generation guard. Documents at or past
/// `doc_id_limit` have no values.
pub trait ValueSource {
    type Value: Copy;

    fn doc_id_limit(&self) -> DocId;

    fn is_multi_value(&self) -> bool;

    /// Weighted sets report per-value weights; everything else reports 1
    fn is_weighted(&self) -> bool {
        false
    }

    /// Calls `f` with every defined value of `doc` and its weight
    fn for_each<F: FnMut(Self::Value, i32)>(&self, doc: DocId, f: F);
}

/// Single-value numeric attribute without a dictionary
pub struct SingleDirectSource<'g, T: NumericType> {
    slots: &'g [T::Atomic],
    limit: DocId,
}

impl<'g, T: NumericType> SingleDirectSource<'g, T> {
    pub fn new(slots: &'g [T::Atomic], limit: DocId) -> Self {
        SingleDirectSource { slots, limit }
    }
}

impl<T: NumericType> ValueSource for SingleDirectSource<'_, T> {
    type Value = T;

    fn doc_id_limit(&self) -> DocId {
        self.limit
    }

    fn is_multi_value(&self) -> bool {
        false
    }

    fn for_each<F: FnMut(T, i32)>(&self, doc: DocId, mut f: F) {
        if doc >= self.limit {
            return;
        }
        if let Some(slot) = self.slots.get(doc as usize) {
            let value = T::load(slot);
            if !value.is_undefined() {
                f(value, 1);
            }
        }
    }
}

/// Single-value enumerated attribute, yielding enum indices
pub struct SingleEnumIndexSource<'g> {
    slots: &'g [<EntryRef as AtomicValue>::Atomic],
    limit: DocId,
}

impl<'g> SingleEnumIndexSource<'g> {
    pub fn new(slots: &'g [<EntryRef as AtomicValue>::Atomic], limit: DocId) -> Self {
        SingleEnumIndexSource { slots, limit }
    }
}

impl ValueSource for SingleEnumIndexSource<'_> {
    type Value = EnumIndex;

    fn doc_id_limit(&self) -> DocId {
        self.limit
    }

    fn is_multi_value(&self) -> bool {
        false
    }

    fn for_each<F: FnMut(EnumIndex, i32)>(&self, doc: DocId, mut f: F) {
        if doc >= self.limit {
            return;
        }
        if let Some(slot) = self.slots.get(doc as usize) {
            let idx = EntryRef::load(slot);
            if !idx.is_empty() {
                f(idx, 1);
            }
        }
    }
}

/// Multi-value attribute, yielding the stored entry values
pub struct MultiSource<'g, M: MultiValueEntry> {
    view: MultiValueReadView<'g, M>,
}

impl<'g, M: MultiValueEntry> MultiSource<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        MultiSource { view }
    }
}

impl<M: MultiValueEntry> ValueSource for MultiSource<'_, M> {
    type Value = M::Value;

    fn doc_id_limit(&self) -> DocId {
        self.view.doc_id_limit()
    }

    fn is_multi_value(&self) -> bool {
        true
    }

    fn is_weighted(&self) -> bool {
        M::WEIGHTED
    }

    fn for_each<F: FnMut(M::Value, i32)>(&self, doc: DocId, mut f: F) {
        for entry in self.view.get(doc) {
            f(entry.value(), entry.weight());
        }
    }
}

/// Decodes the enum indices of another source into values
pub struct EnumDecoded<'g, S, V: ?Sized + EnumValue> {
    inner: S,
    reader: EnumReader<'g, V>,
}

impl<'g, S, V: ?Sized + EnumValue> EnumDecoded<'g, S, V> {
    pub fn new(inner: S, reader: EnumReader<'g, V>) -> Self {
        EnumDecoded { inner, reader }
    }
}

impl<'g, S, V> ValueSource for EnumDecoded<'g, S, V>
where
    S: ValueSource<Value = EnumIndex>,
    V: ?Sized + EnumValue,
{
    type Value = V::Ref<'g>;

    fn doc_id_limit(&self) -> DocId {
        self.inner.doc_id_limit()
    }

    fn is_multi_value(&self) -> bool {
        self.inner.is_multi_value()
    }

    fn is_weighted(&self) -> bool {
        self.inner.is_weighted()
    }

    fn for_each<F: FnMut(V::Ref<'g>, i32)>(&self, doc: DocId, mut f: F) {
        let reader = self.reader;
        self.inner.for_each(doc, |idx, weight| f(reader.get_value(idx), weight));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DictionaryType, GrowStrategy};
    use crate::core::types::WeightedValue;
    use crate::datastore::RcuVector;
    use crate::enumstore::EnumStore;
    use crate::generation::GenerationHandler;
    use crate::multivalue::MultiValueMapping;

    fn collect<S: ValueSource>(source: &S, doc: DocId) -> Vec<(S::Value, i32)> {
        let mut out = Vec::new();
        source.for_each(doc, |v, w| out.push((v, w)));
        out
    }

    #[test]
    fn single_direct_skips_undefined_and_uncommitted() {
        let handler = GenerationHandler::new();
        let values = RcuVector::new(GrowStrategy::default(), i32::undefined());
        values.ensure_size(3);
        values.set(0, 7);
        values.set(2, 9);
        let guard = handler.take_guard();
        let source = SingleDirectSource::<i32>::new(values.acquire_slots(&guard), 2);
        assert_eq!(collect(&source, 0), vec![(7, 1)]);
        assert!(collect(&source, 1).is_empty());
        assert!(collect(&source, 2).is_empty());
    }

    #[test]
    fn decoded_multi_value_source() {
        let handler = GenerationHandler::new();
        let store: EnumStore<str> = EnumStore::new(DictionaryType::Btree, false, false, 16, 256);
        let mapping = MultiValueMapping::<WeightedValue<EnumIndex>>::new(GrowStrategy::default(), 16);
        let doc = mapping.add_doc();
        let a = store.find_or_insert("a").unwrap();
        let b = store.find_or_insert("b").unwrap();
        mapping.replace(doc, &[WeightedValue::new(a, 3), WeightedValue::new(b, -1)]).unwrap();
        store.freeze_dictionary().unwrap();

        let guard = handler.take_guard();
        let source = EnumDecoded::new(MultiSource::new(mapping.make_read_view(&guard, 1)), store.reader(&guard));
        assert!(source.is_weighted());
        assert_eq!(collect(&source, doc), vec![("a", 3), ("b", -1)]);
    }
}
