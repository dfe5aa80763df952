use std::sync::atomic::{AtomicU64, Ordering};
use crate::core::config::{CompactionStrategy, GrowStrategy};
use crate::core::error::{Error, Result};
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::core::types::{DocId, WeightedValue};
use crate::datastore::{ArrayStore, AtomicValue, EntryRef, RcuVector, StoreReader};
use crate::enumstore::{EnumIndex, NumericType};
use crate::generation::{Generation, GenerationGuard};

/// Element of a multi-value array: a plain value, or a value with a weight
pub trait MultiValueEntry: Copy + Send + Sync + 'static {
    type Value: Copy + Send + Sync + 'static;
    /// Whether entries carry their own weight
    const WEIGHTED: bool;

    fn value(&self) -> Self::Value;
    fn weight(&self) -> i32;
    fn from_parts(value: Self::Value, weight: i32) -> Self;
}

impl<T: NumericType> MultiValueEntry for T {
    type Value = T;
    const WEIGHTED: bool = false;

    fn value(&self) -> T {
        *self
    }

    fn weight(&self) -> i32 {
        1
    }

    fn from_parts(value: T, _weight: i32) -> Self {
        value
    }
}

impl MultiValueEntry for EnumIndex {
    type Value = EnumIndex;
    const WEIGHTED: bool = false;

    fn value(&self) -> EnumIndex {
        *self
    }

    fn weight(&self) -> i32 {
        1
    }

    fn from_parts(value: EnumIndex, _weight: i32) -> Self {
        value
    }
}

impl<T: Copy + Send + Sync + 'static> MultiValueEntry for WeightedValue<T> {
    type Value = T;
    const WEIGHTED: bool = true;

    fn value(&self) -> T {
        self.value
    }

    fn weight(&self) -> i32 {
        self.weight
    }

    fn from_parts(value: T, weight: i32) -> Self {
        WeightedValue::new(value, weight)
    }
}

/// Per-document variable-length arrays.
///
/// Each document owns one entry ref into an array store. Replacing a document's values
/// writes a fresh array and swaps the ref, so a reader always sees either the old or the
/// new array in full.
pub struct MultiValueMapping<M: Copy + Send + Sync + 'static> {
    indices: RcuVector<EntryRef>,
    store: ArrayStore<M>,
    total_values: AtomicU64,
}

impl<M: Copy + Send + Sync + 'static> MultiValueMapping<M> {
    pub fn new(grow: GrowStrategy, max_buffers: usize) -> Self {
        MultiValueMapping {
            indices: RcuVector::new(grow, EntryRef::EMPTY),
            store: ArrayStore::new(max_buffers, grow.buffer_elems as usize),
            total_values: AtomicU64::new(0),
        }
    }

    pub fn add_doc(&self) -> DocId {
        let doc = self.indices.len() as DocId;
        self.indices.push(EntryRef::EMPTY);
        doc
    }

    pub fn ensure_docs(&self, num_docs: usize) {
        self.indices.ensure_size(num_docs);
    }

    pub fn num_docs(&self) -> usize {
        self.indices.len()
    }

    pub fn get<'g>(&'g self, guard: &'g GenerationGuard<'_>, doc: DocId) -> &'g [M] {
        match self.indices.get(guard, doc as usize) {
            Some(r) => self.store.get(guard, r),
            None => &[],
        }
    }

    pub fn writer_get(&self, doc: DocId, out: &mut Vec<M>) -> Result<()> {
        match self.indices.writer_get(doc as usize) {
            Some(r) => self.store.writer_read(r, out),
            None => Ok(()),
        }
    }

    pub fn value_count(&self, doc: DocId) -> u32 {
        self.indices.writer_get(doc as usize).map(|r| r.len()).unwrap_or(0)
    }

    /// Swaps in a new array for `doc`; the old array is held until readers move on.
    pub fn replace(&self, doc: DocId, values: &[M]) -> Result<()> {
        let old = self
            .indices
            .writer_get(doc as usize)
            .ok_or_else(|| Error::invalid_argument(format!("doc {} is outside the mapping", doc)))?;
        let fresh = self.store.add(values)?;
        self.indices.set(doc as usize, fresh);
        self.store.remove(old);
        self.total_values.fetch_add(values.len() as u64, Ordering::Relaxed);
        self.total_values.fetch_sub(old.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn make_read_view<'g>(&'g self, guard: &'g GenerationGuard<'_>, doc_id_limit: DocId) -> MultiValueReadView<'g, M> {
        MultiValueReadView {
            slots: self.indices.acquire_slots(guard),
            store: self.store.reader(guard),
            limit: doc_id_limit,
        }
    }

    /// Moves live arrays out of the sparsest buffers. Returns whether anything was compacted.
    pub fn compact_worst(&self, strategy: &CompactionStrategy) -> Result<bool> {
        let spec = match self.store.start_compaction(strategy) {
            Some(spec) => spec,
            None => return Ok(false),
        };
        let mut moved = 0usize;
        for doc in 0..self.indices.len() {
            if let Some(r) = self.indices.writer_get(doc) {
                if spec.contains(r) {
                    let fresh = match self.store.move_entry(r) {
                        Ok(fresh) => fresh,
                        Err(err) => {
                            self.store.cancel_compaction(spec);
                            return Err(err);
                        }
                    };
                    self.indices.set(doc, fresh);
                    moved += 1;
                }
            }
        }
        log::debug!(
            "multi-value compaction moved {} arrays out of buffers {:?}",
            moved,
            spec.buffer_ids()
        );
        self.store.finish_compaction(spec);
        Ok(true)
    }

    /// Whether every document holding an entry matched by `affected` can get a fresh array.
    pub fn can_rewrite(&self, affected: impl Fn(&M) -> bool) -> Result<bool> {
        let mut lens = Vec::new();
        let mut values = Vec::new();
        for doc in 0..self.indices.len() {
            values.clear();
            self.writer_get(doc as DocId, &mut values)?;
            if values.iter().any(&affected) {
                lens.push(values.len());
            }
        }
        Ok(self.store.has_room(lens))
    }

    /// Rewrites every document whose entries `f` changes. Used after enum compaction.
    pub fn rewrite_entries(&self, mut f: impl FnMut(&mut M) -> bool) -> Result<usize> {
        let mut rewritten = 0;
        let mut values = Vec::new();
        for doc in 0..self.indices.len() {
            values.clear();
            self.writer_get(doc as DocId, &mut values)?;
            let mut changed = false;
            for entry in values.iter_mut() {
                changed |= f(entry);
            }
            if changed {
                self.replace(doc as DocId, &values)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    /// Clears and drops documents at or above `num_docs`.
    pub fn shrink(&self, num_docs: usize) -> Result<()> {
        for doc in num_docs..self.indices.len() {
            self.replace(doc as DocId, &[])?;
        }
        self.indices.shrink(num_docs);
        Ok(())
    }

    pub fn total_value_count(&self) -> u64 {
        self.total_values.load(Ordering::Relaxed)
    }

    pub fn assign_generation(&self, current: Generation) {
        self.indices.assign_generation(current);
        self.store.assign_generation(current);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) {
        self.indices.reclaim_memory(oldest_used);
        self.store.reclaim_memory(oldest_used);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.indices.memory_usage();
        usage += self.store.memory_usage();
        usage
    }

    pub fn address_space(&self) -> AddressSpace {
        self.store.address_space()
    }
}

/// Snapshot access to a mapping, limited to the documents committed at creation time.
pub struct MultiValueReadView<'g, M> {
    slots: &'g [<EntryRef as AtomicValue>::Atomic],
    store: StoreReader<'g, M>,
    limit: DocId,
}

impl<M> Clone for MultiValueReadView<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for MultiValueReadView<'_, M> {}

impl<'g, M: Copy> MultiValueReadView<'g, M> {
    pub fn get(&self, doc: DocId) -> &'g [M] {
        if doc >= self.limit {
            return &[];
        }
        match self.slots.get(doc as usize) {
            Some(slot) => self.store.get(EntryRef::load(slot)),
            None => &[],
        }
    }

    pub fn doc_id_limit(&self) -> DocId {
        self.limit
    }
}
