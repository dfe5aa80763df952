use crate::core::types::{DocId, EnumHandle, WeightedValue};
use crate::enumstore::{EnumIndex, EnumReader, EnumValue, NumericType};
use crate::multivalue::{MultiValueEntry, MultiValueReadView};
use crate::readview::{ArrayReadView, WeightedSetReadView};

/// Zero-copy view when the stored entries already have the requested layout
pub struct DirectArrayView<'g, M> {
    view: MultiValueReadView<'g, M>,
}

impl<'g, M> DirectArrayView<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        DirectArrayView { view }
    }
}

impl<T: NumericType> ArrayReadView<T> for DirectArrayView<'_, T> {
    fn get_values(&mut self, doc: DocId) -> &[T] {
        self.view.get(doc)
    }
}

impl<T: NumericType> WeightedSetReadView<T> for DirectArrayView<'_, WeightedValue<T>> {
    fn get_values(&mut self, doc: DocId) -> &[WeightedValue<T>] {
        self.view.get(doc)
    }
}

/// Entry values without their weights
pub struct ValueCopyView<'g, M: MultiValueEntry> {
    view: MultiValueReadView<'g, M>,
    scratch: Vec<M::Value>,
}

impl<'g, M: MultiValueEntry> ValueCopyView<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        ValueCopyView { view, scratch: Vec::new() }
    }
}

impl<M: MultiValueEntry> ArrayReadView<M::Value> for ValueCopyView<'_, M> {
    fn get_values(&mut self, doc: DocId) -> &[M::Value] {
        self.scratch.clear();
        self.scratch.extend(self.view.get(doc).iter().map(MultiValueEntry::value));
        &self.scratch
    }
}

/// Entries as weighted values; plain arrays get weight 1
pub struct WeightedCopyView<'g, M: MultiValueEntry> {
    view: MultiValueReadView<'g, M>,
    scratch: Vec<WeightedValue<M::Value>>,
}

impl<'g, M: MultiValueEntry> WeightedCopyView<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        WeightedCopyView { view, scratch: Vec::new() }
    }
}

impl<M: MultiValueEntry> WeightedSetReadView<M::Value> for WeightedCopyView<'_, M> {
    fn get_values(&mut self, doc: DocId) -> &[WeightedValue<M::Value>] {
        self.scratch.clear();
        self.scratch
            .extend(self.view.get(doc).iter().map(|e| WeightedValue::new(e.value(), e.weight())));
        &self.scratch
    }
}

/// Enumerated entries decoded to their values
pub struct EnumValueView<'g, V: ?Sized + EnumValue, M> {
    view: MultiValueReadView<'g, M>,
    reader: EnumReader<'g, V>,
    scratch: Vec<V::Ref<'g>>,
}

impl<'g, V: ?Sized + EnumValue, M> EnumValueView<'g, V, M> {
    pub fn new(view: MultiValueReadView<'g, M>, reader: EnumReader<'g, V>) -> Self {
        EnumValueView { view, reader, scratch: Vec::new() }
    }
}

impl<'g, V, M> ArrayReadView<V::Ref<'g>> for EnumValueView<'g, V, M>
where
    V: ?Sized + EnumValue,
    M: MultiValueEntry<Value = EnumIndex>,
{
    fn get_values(&mut self, doc: DocId) -> &[V::Ref<'g>] {
        let reader = self.reader;
        self.scratch.clear();
        self.scratch.extend(self.view.get(doc).iter().map(|e| reader.get_value(e.value())));
        &self.scratch
    }
}

/// Enumerated entries decoded to weighted values
pub struct EnumWeightedView<'g, V: ?Sized + EnumValue, M> {
    view: MultiValueReadView<'g, M>,
    reader: EnumReader<'g, V>,
    scratch: Vec<WeightedValue<V::Ref<'g>>>,
}

impl<'g, V: ?Sized + EnumValue, M> EnumWeightedView<'g, V, M> {
    pub fn new(view: MultiValueReadView<'g, M>, reader: EnumReader<'g, V>) -> Self {
        EnumWeightedView { view, reader, scratch: Vec::new() }
    }
}

impl<'g, V, M> WeightedSetReadView<V::Ref<'g>> for EnumWeightedView<'g, V, M>
where
    V: ?Sized + EnumValue,
    M: MultiValueEntry<Value = EnumIndex>,
{
    fn get_values(&mut self, doc: DocId) -> &[WeightedValue<V::Ref<'g>>] {
        let reader = self.reader;
        self.scratch.clear();
        self.scratch.extend(
            self.view
                .get(doc)
                .iter()
                .map(|e| WeightedValue::new(reader.get_value(e.value()), e.weight())),
        );
        &self.scratch
    }
}

/// Enumerated entries as opaque enum handles
pub struct EnumHandleView<'g, M> {
    view: MultiValueReadView<'g, M>,
    scratch: Vec<EnumHandle>,
}

impl<'g, M> EnumHandleView<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        EnumHandleView { view, scratch: Vec::new() }
    }
}

impl<M: MultiValueEntry<Value = EnumIndex>> ArrayReadView<EnumHandle> for EnumHandleView<'_, M> {
    fn get_values(&mut self, doc: DocId) -> &[EnumHandle] {
        self.scratch.clear();
        self.scratch.extend(self.view.get(doc).iter().map(|e| e.value().raw()));
        &self.scratch
    }
}

pub struct EnumWeightedHandleView<'g, M> {
    view: MultiValueReadView<'g, M>,
    scratch: Vec<WeightedValue<EnumHandle>>,
}

impl<'g, M> EnumWeightedHandleView<'g, M> {
    pub fn new(view: MultiValueReadView<'g, M>) -> Self {
        EnumWeightedHandleView { view, scratch: Vec::new() }
    }
}

impl<M: MultiValueEntry<Value = EnumIndex>> WeightedSetReadView<EnumHandle> for EnumWeightedHandleView<'_, M> {
    fn get_values(&mut self, doc: DocId) -> &[WeightedValue<EnumHandle>] {
        self.scratch.clear();
        self.scratch
            .extend(self.view.get(doc).iter().map(|e| WeightedValue::new(e.value().raw(), e.weight())));
        &self.scratch
    }
}
