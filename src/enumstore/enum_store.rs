use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde::Serialize;
use crate::core::config::{CompactionStrategy, DictionaryType};
use crate::core::error::Result;
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::core::types::DocId;
use crate::datastore::{ArrayStore, CompactionSpec, RcuBox, StoreReader};
use crate::enumstore::dictionary::{EnumIndex, FrozenDictionary, WriterDictionary};
use crate::enumstore::value::EnumValue;
use crate::generation::{Generation, GenerationGuard, GenerationHoldList};

/// Statistics reported by the explorer
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EnumStoreStats {
    pub num_uniques: usize,
    pub values_memory: MemoryUsage,
    pub dictionary_memory: usize,
    pub btree_memory: usize,
    pub hash_memory: usize,
}

/// Indices moved by a value compaction. The owner rewrites its references and then
/// calls [`EnumStore::finish_compaction`].
pub struct EnumCompaction {
    spec: CompactionSpec,
    remap: HashMap<EnumIndex, EnumIndex>,
}

impl EnumCompaction {
    pub fn remap(&self, idx: EnumIndex) -> EnumIndex {
        self.remap.get(&idx).copied().unwrap_or(idx)
    }

    pub fn moved(&self) -> usize {
        self.remap.len()
    }
}

struct EnumWriter<V: ?Sized + EnumValue> {
    dict: WriterDictionary<V::Key>,
    ref_counts: HashMap<EnumIndex, u32>,
    postings: HashMap<EnumIndex, Arc<RoaringBitmap>>,
    dirty: bool,
    frozen_hold: GenerationHoldList<Box<FrozenDictionary<V::Key>>>,
    scratch: Vec<V::Elem>,
}

/// Deduplicating value store with a sorted dictionary.
///
/// The writer mutates the dictionary under its own lock; readers only see the frozen
/// snapshot published by [`freeze_dictionary`](EnumStore::freeze_dictionary) and the
/// immutable value buffers.
pub struct EnumStore<V: ?Sized + EnumValue> {
    values: ArrayStore<V::Elem>,
    frozen: RcuBox<FrozenDictionary<V::Key>>,
    writer: Mutex<EnumWriter<V>>,
    folded: bool,
    fast_search: bool,
    dictionary_type: DictionaryType,
}

impl<V: ?Sized + EnumValue> EnumStore<V> {
    pub fn new(
        dictionary_type: DictionaryType,
        folded: bool,
        fast_search: bool,
        max_buffers: usize,
        buffer_elems: usize,
    ) -> Self {
        EnumStore {
            values: ArrayStore::new(max_buffers, buffer_elems),
            frozen: RcuBox::new(FrozenDictionary::empty()),
            writer: Mutex::new(EnumWriter {
                dict: WriterDictionary::new(dictionary_type),
                ref_counts: HashMap::new(),
                postings: HashMap::new(),
                dirty: false,
                frozen_hold: GenerationHoldList::new(),
                scratch: Vec::new(),
            }),
            folded,
            fast_search,
            dictionary_type,
        }
    }

    pub fn is_folded(&self) -> bool {
        self.folded
    }

    pub fn has_postings(&self) -> bool {
        self.fast_search
    }

    pub fn make_key(&self, value: V::Ref<'_>) -> V::Key {
        V::make_key(value, self.folded)
    }

    /// Returns the index of `value`, inserting it if needed. Always takes one reference.
    pub fn find_or_insert(&self, value: V::Ref<'_>) -> Result<EnumIndex> {
        let key = self.make_key(value);
        let mut guard = self.writer.lock();
        let w = &mut *guard;
        if let Some(idx) = w.dict.find(&key) {
            *w.ref_counts.entry(idx).or_insert(0) += 1;
            return Ok(idx);
        }
        w.scratch.clear();
        V::encode(value, &mut w.scratch);
        let idx = self.values.add(&w.scratch)?;
        w.dict.insert(key, idx);
        w.ref_counts.insert(idx, 1);
        w.dirty = true;
        Ok(idx)
    }

    /// Lookup in the writer's dictionary, including values not yet frozen.
    pub fn writer_find(&self, value: V::Ref<'_>) -> Option<EnumIndex> {
        let key = self.make_key(value);
        self.writer.lock().dict.find(&key)
    }

    /// Lookup in the committed dictionary.
    pub fn find(&self, guard: &GenerationGuard<'_>, value: V::Ref<'_>) -> Option<EnumIndex> {
        let key = self.make_key(value);
        let frozen = self.frozen.load(guard);
        frozen.find(&key).map(|ordinal| frozen.index(ordinal))
    }

    pub fn get_value<'g>(&'g self, guard: &'g GenerationGuard<'_>, idx: EnumIndex) -> V::Ref<'g> {
        V::decode(self.values.get(guard, idx))
    }

    pub fn reader<'g>(&'g self, guard: &'g GenerationGuard<'_>) -> EnumReader<'g, V> {
        EnumReader {
            values: self.values.reader(guard),
            frozen: self.frozen.load(guard),
            folded: self.folded,
        }
    }

    /// Copy of the value as the writer sees it
    pub fn writer_value(&self, idx: EnumIndex) -> Result<V::Owned> {
        let mut elems = Vec::new();
        self.values.writer_read(idx, &mut elems)?;
        Ok(V::to_owned_value(V::decode(&elems)))
    }

    pub fn ref_count(&self, idx: EnumIndex) -> u32 {
        self.writer.lock().ref_counts.get(&idx).copied().unwrap_or(0)
    }

    /// Drops one reference. At zero the value leaves the dictionary and its storage goes
    /// on hold; it is reused only after every reader that could see it is gone.
    pub fn decrement_ref(&self, idx: EnumIndex) -> Result<()> {
        let mut guard = self.writer.lock();
        let w = &mut *guard;
        let remaining = match w.ref_counts.get_mut(&idx) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return Ok(()),
        };
        if remaining > 0 {
            return Ok(());
        }
        w.ref_counts.remove(&idx);
        w.scratch.clear();
        self.values.writer_read(idx, &mut w.scratch)?;
        let key = V::make_key(V::decode(&w.scratch), self.folded);
        w.dict.remove(&key);
        w.postings.remove(&idx);
        self.values.remove(idx);
        w.dirty = true;
        Ok(())
    }

    pub fn add_posting(&self, idx: EnumIndex, doc: DocId) {
        if !self.fast_search {
            return;
        }
        let mut w = self.writer.lock();
        Arc::make_mut(w.postings.entry(idx).or_default()).insert(doc);
        w.dirty = true;
    }

    pub fn remove_posting(&self, idx: EnumIndex, doc: DocId) {
        if !self.fast_search {
            return;
        }
        let mut w = self.writer.lock();
        if let Some(bitmap) = w.postings.get_mut(&idx) {
            Arc::make_mut(bitmap).remove(doc);
            w.dirty = true;
        }
    }

    /// Publishes a sorted snapshot of the dictionary if it changed since the last call.
    pub fn freeze_dictionary(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let w = &mut *guard;
        if !w.dirty {
            return Ok(());
        }
        let postings = &w.postings;
        let frozen = FrozenDictionary::build(
            w.dict.sorted_entries(),
            |idx| postings.get(&idx).filter(|bitmap| !bitmap.is_empty()).cloned(),
            self.dictionary_type.has_hash(),
            V::key_bytes,
        )?;
        log::debug!("froze dictionary with {} unique values", frozen.len());
        let old = self.frozen.replace(frozen);
        let bytes = old.memory_usage(V::key_heap_bytes);
        w.frozen_hold.insert(old, bytes);
        w.dirty = false;
        Ok(())
    }

    /// Moves values out of sparse buffers. Returns `None` when nothing needed moving.
    pub fn compact_values(&self, strategy: &CompactionStrategy) -> Result<Option<EnumCompaction>> {
        self.compact_values_if(strategy, |_| true)
    }

    /// Like [`compact_values`](Self::compact_values), but gives up before moving anything
    /// when `fits` says the owner cannot rewrite the references into the selected buffers.
    pub fn compact_values_if(
        &self,
        strategy: &CompactionStrategy,
        fits: impl FnOnce(&CompactionSpec) -> bool,
    ) -> Result<Option<EnumCompaction>> {
        let spec = match self.values.start_compaction(strategy) {
            Some(spec) => spec,
            None => return Ok(None),
        };
        if !fits(&spec) {
            self.values.cancel_compaction(spec);
            return Ok(None);
        }
        let mut guard = self.writer.lock();
        let w = &mut *guard;
        // copy everything first so a failure leaves the dictionary untouched
        let mut copies = Vec::new();
        for (key, idx) in w.dict.sorted_entries() {
            if !spec.contains(idx) {
                continue;
            }
            match self.values.copy_entry(idx) {
                Ok(moved) => copies.push((key, idx, moved)),
                Err(err) => {
                    for (_, _, moved) in copies {
                        self.values.remove(moved);
                    }
                    self.values.cancel_compaction(spec);
                    return Err(err);
                }
            }
        }
        let mut remap = HashMap::new();
        for (key, idx, moved) in copies {
            self.values.remove(idx);
            w.dict.insert(key, moved);
            if let Some(count) = w.ref_counts.remove(&idx) {
                w.ref_counts.insert(moved, count);
            }
            if let Some(bitmap) = w.postings.remove(&idx) {
                w.postings.insert(moved, bitmap);
            }
            remap.insert(idx, moved);
        }
        w.dirty = true;
        log::debug!("enum store compaction moved {} values", remap.len());
        Ok(Some(EnumCompaction { spec, remap }))
    }

    pub fn finish_compaction(&self, compaction: EnumCompaction) {
        self.values.finish_compaction(compaction.spec);
    }

    pub fn num_uniques(&self) -> usize {
        self.writer.lock().dict.len()
    }

    pub fn assign_generation(&self, current: Generation) {
        self.values.assign_generation(current);
        self.writer.lock().frozen_hold.assign_generation(current);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) {
        self.values.reclaim_memory(oldest_used);
        self.writer.lock().frozen_hold.reclaim(oldest_used);
    }

    pub fn stats(&self) -> EnumStoreStats {
        let w = self.writer.lock();
        let (btree_memory, hash_memory) = w.dict.memory_usage(V::key_heap_bytes);
        let postings: usize = w.postings.values().map(|bitmap| bitmap.serialized_size()).sum();
        let frozen = self.frozen.writer_ref().memory_usage(V::key_heap_bytes);
        let mut values_memory = self.values.memory_usage();
        values_memory.inc_on_hold(w.frozen_hold.held_bytes());
        EnumStoreStats {
            num_uniques: w.dict.len(),
            values_memory,
            dictionary_memory: btree_memory + hash_memory + frozen + postings,
            btree_memory,
            hash_memory,
        }
    }

    pub fn address_space(&self) -> AddressSpace {
        self.values.address_space()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let stats = self.stats();
        let mut usage = stats.values_memory;
        usage.inc_allocated(stats.dictionary_memory);
        usage.inc_used(stats.dictionary_memory);
        usage
    }
}

/// Read access to values and the committed dictionary under one guard
pub struct EnumReader<'g, V: ?Sized + EnumValue> {
    values: StoreReader<'g, V::Elem>,
    frozen: &'g FrozenDictionary<V::Key>,
    folded: bool,
}

impl<V: ?Sized + EnumValue> Clone for EnumReader<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ?Sized + EnumValue> Copy for EnumReader<'_, V> {}

impl<'g, V: ?Sized + EnumValue> EnumReader<'g, V> {
    pub fn get_value(&self, idx: EnumIndex) -> V::Ref<'g> {
        V::decode(self.values.get(idx))
    }

    pub fn dictionary(&self) -> &'g FrozenDictionary<V::Key> {
        self.frozen
    }

    pub fn make_key(&self, value: V::Ref<'_>) -> V::Key {
        V::make_key(value, self.folded)
    }

    pub fn find(&self, value: V::Ref<'_>) -> Option<EnumIndex> {
        let key = self.make_key(value);
        self.frozen.find(&key).map(|ordinal| self.frozen.index(ordinal))
    }

    pub fn is_folded(&self) -> bool {
        self.folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationHandler;

    fn string_store(folded: bool) -> EnumStore<str> {
        EnumStore::new(DictionaryType::Btree, folded, false, 16, 256)
    }

    fn commit<V: ?Sized + EnumValue>(store: &EnumStore<V>, handler: &GenerationHandler) {
        store.freeze_dictionary().unwrap();
        store.assign_generation(handler.current_generation());
        handler.inc_generation();
        store.reclaim_memory(handler.oldest_used_generation());
    }

    #[test]
    fn equal_values_share_one_index() {
        let handler = GenerationHandler::new();
        let store = string_store(false);
        let a = store.find_or_insert("foo").unwrap();
        let b = store.find_or_insert("foo").unwrap();
        let c = store.find_or_insert("bar").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.ref_count(a), 2);
        commit(&store, &handler);
        let guard = handler.take_guard();
        assert_eq!(store.get_value(&guard, a), "foo");
        assert_eq!(store.find(&guard, "bar"), Some(c));
        assert_eq!(store.find(&guard, "FOO"), None);
    }

    #[test]
    fn uncased_store_folds_case_variants() {
        let handler = GenerationHandler::new();
        let store = string_store(true);
        let a = store.find_or_insert("Foo").unwrap();
        let b = store.find_or_insert("FOO").unwrap();
        let c = store.find_or_insert("foo").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(store.num_uniques(), 1);
        commit(&store, &handler);
        let guard = handler.take_guard();
        // first spelling is the stored representative
        assert_eq!(store.get_value(&guard, a), "Foo");
        assert_eq!(store.find(&guard, "fOo"), Some(a));
    }

    #[test]
    fn frozen_dictionary_lags_until_freeze() {
        let handler = GenerationHandler::new();
        let store: EnumStore<i32> = EnumStore::new(DictionaryType::Hash, false, false, 16, 256);
        let idx = store.find_or_insert(5).unwrap();
        let guard = handler.take_guard();
        assert_eq!(store.find(&guard, 5), None);
        assert_eq!(store.writer_find(5), Some(idx));
        drop(guard);
        commit(&store, &handler);
        let guard = handler.take_guard();
        assert_eq!(store.find(&guard, 5), Some(idx));
        assert_eq!(store.reader(&guard).dictionary().len(), 1);
    }

    #[test]
    fn decrement_defers_reuse_while_readers_exist() {
        let handler = GenerationHandler::new();
        let store = string_store(false);
        let a = store.find_or_insert("gone").unwrap();
        commit(&store, &handler);

        let guard = handler.take_guard();
        store.decrement_ref(a).unwrap();
        assert_eq!(store.writer_find("gone"), None);
        commit(&store, &handler);
        // same length value must not land in the slot the reader can still see
        let b = store.find_or_insert("here").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get_value(&guard, a), "gone");

        drop(guard);
        commit(&store, &handler);
        let c = store.find_or_insert("back").unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn postings_follow_values() {
        let handler = GenerationHandler::new();
        let store: EnumStore<i64> = EnumStore::new(DictionaryType::Btree, false, true, 16, 256);
        let idx = store.find_or_insert(10).unwrap();
        store.add_posting(idx, 3);
        store.add_posting(idx, 7);
        commit(&store, &handler);
        let guard = handler.take_guard();
        let dict = store.reader(&guard).dictionary();
        let ordinal = dict.find(&store.make_key(10)).unwrap();
        assert_eq!(dict.postings(ordinal).unwrap().iter().collect::<Vec<_>>(), vec![3, 7]);
    }

    #[test]
    fn compaction_remaps_live_values() {
        let handler = GenerationHandler::new();
        let store = string_store(false);
        let keep = store.find_or_insert("keep").unwrap();
        let drops: Vec<EnumIndex> = (0..20)
            .map(|i| store.find_or_insert(format!("value-{}", i).as_str()).unwrap())
            .collect();
        for idx in drops {
            store.decrement_ref(idx).unwrap();
        }
        commit(&store, &handler);

        let compaction = store.compact_values(&CompactionStrategy::default()).unwrap().unwrap();
        let moved = compaction.remap(keep);
        assert_ne!(moved, keep);
        assert_eq!(compaction.moved(), 1);
        store.finish_compaction(compaction);
        commit(&store, &handler);

        let guard = handler.take_guard();
        assert_eq!(store.find(&guard, "keep"), Some(moved));
        assert_eq!(store.get_value(&guard, moved), "keep");
        assert_eq!(store.ref_count(moved), 1);
    }

    #[test]
    fn declined_compaction_leaves_values_in_place() {
        let handler = GenerationHandler::new();
        let store = string_store(false);
        let keep = store.find_or_insert("keep").unwrap();
        let drops: Vec<EnumIndex> = (0..20)
            .map(|i| store.find_or_insert(format!("value-{}", i).as_str()).unwrap())
            .collect();
        for idx in drops {
            store.decrement_ref(idx).unwrap();
        }
        commit(&store, &handler);

        let declined = store
            .compact_values_if(&CompactionStrategy::default(), |spec| {
                assert!(spec.contains(keep));
                false
            })
            .unwrap();
        assert!(declined.is_none());
        let guard = handler.take_guard();
        assert_eq!(store.find(&guard, "keep"), Some(keep));
        drop(guard);

        // the buffers are eligible again
        let compaction = store.compact_values(&CompactionStrategy::default()).unwrap().unwrap();
        assert_ne!(compaction.remap(keep), keep);
        store.finish_compaction(compaction);
    }
}
