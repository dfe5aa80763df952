use std::cmp::Ordering;
use std::collections::HashSet;
use serde::Serialize;
use crate::attribute::change::{ChangeKind, WeightedSetFlags, apply_multi_changes, apply_single_changes};
use crate::core::config::{CompactionStrategy, Config};
use crate::core::error::Result;
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::core::types::{DocId, Value};
use crate::datastore::{ArrayStore, EntryRef, RcuVector};
use crate::enumstore::{EnumIndex, EnumStore, EnumStoreStats, EnumValue, NumericType};
use crate::generation::{Generation, GenerationGuard};
use crate::multivalue::{MultiValueEntry, MultiValueMapping};

/// Multi-value mapping figures reported by the explorer
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MultiValueStats {
    pub total_values: u64,
    pub memory: MemoryUsage,
    pub address_space: AddressSpace,
}

/// Operations every storage layout provides. Writer methods run under the owning
/// attribute's writer lock; readers only use the guard-taking methods.
pub(crate) trait Storage: Send + Sync {
    fn add_docs(&self, num_docs: usize);

    /// Whether `value` converts to the stored type
    fn accepts(&self, value: &Value) -> bool;

    /// Applies one document's changes; returns how many were rejected.
    fn apply(&self, doc: DocId, changes: &[ChangeKind], flags: WeightedSetFlags) -> Result<usize>;

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>);

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32;

    fn freeze(&self) -> Result<()> {
        Ok(())
    }

    fn compact(&self, _strategy: &CompactionStrategy) -> Result<bool> {
        Ok(false)
    }

    /// Clears and drops documents at or above `num_docs`
    fn shrink(&self, num_docs: usize) -> Result<()>;

    fn assign_generation(&self, current: Generation);

    fn reclaim_memory(&self, oldest_used: Generation);

    fn memory_usage(&self) -> MemoryUsage;

    fn address_space(&self) -> AddressSpace {
        AddressSpace::default()
    }

    fn num_values(&self, num_docs: DocId) -> u64 {
        num_docs as u64
    }

    fn enum_stats(&self) -> Option<EnumStoreStats> {
        None
    }

    fn multi_value_stats(&self) -> Option<MultiValueStats> {
        None
    }

    fn find_enum(&self, _guard: &GenerationGuard<'_>, _value: &Value) -> Option<EnumIndex> {
        None
    }

    /// Enum index of the document's first value
    fn first_enum(&self, _guard: &GenerationGuard<'_>, _doc: DocId) -> Option<EnumIndex> {
        None
    }
}

pub(crate) fn new_enum_store<V: ?Sized + EnumValue>(config: &Config) -> EnumStore<V> {
    EnumStore::new(
        config.dictionary.dictionary_type,
        !config.is_cased(),
        config.fast_search,
        config.max_buffers as usize,
        config.grow_strategy.buffer_elems as usize,
    )
}

/// One value per document, stored in place
pub(crate) struct SingleDirect<T: NumericType> {
    pub(crate) values: RcuVector<T>,
}

impl<T: NumericType> SingleDirect<T> {
    pub(crate) fn new(config: &Config) -> Self {
        SingleDirect { values: RcuVector::new(config.grow_strategy, T::undefined()) }
    }
}

impl<T: NumericType> Storage for SingleDirect<T> {
    fn add_docs(&self, num_docs: usize) {
        self.values.ensure_size(num_docs);
    }

    fn accepts(&self, value: &Value) -> bool {
        T::from_value(value).is_some()
    }

    fn apply(&self, doc: DocId, changes: &[ChangeKind], _flags: WeightedSetFlags) -> Result<usize> {
        let current = self.values.writer_get(doc as usize).filter(|v| !v.is_undefined());
        let (value, rejected) =
            apply_single_changes(current, changes, T::from_value, |v, op, operand| Some(v.apply(op, operand)));
        self.values.set(doc as usize, value.unwrap_or_else(T::undefined));
        Ok(rejected)
    }

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>) {
        if let Some(v) = self.values.get(guard, doc as usize) {
            if !v.is_undefined() {
                out.push((v.to_value(), 1));
            }
        }
    }

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32 {
        match self.values.get(guard, doc as usize) {
            Some(v) if !v.is_undefined() => 1,
            _ => 0,
        }
    }

    fn shrink(&self, num_docs: usize) -> Result<()> {
        self.values.shrink(num_docs);
        Ok(())
    }

    fn assign_generation(&self, current: Generation) {
        self.values.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.values.reclaim_memory(oldest_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.values.memory_usage()
    }
}

/// One enum index per document. Undefined values are stored as the empty ref.
pub(crate) struct SingleEnum<V: ?Sized + EnumValue> {
    pub(crate) refs: RcuVector<EntryRef>,
    pub(crate) enums: EnumStore<V>,
}

impl<V: ?Sized + EnumValue> SingleEnum<V> {
    pub(crate) fn new(config: &Config) -> Self {
        SingleEnum {
            refs: RcuVector::new(config.grow_strategy, EntryRef::EMPTY),
            enums: new_enum_store(config),
        }
    }

    fn release(&self, doc: DocId, idx: EnumIndex) -> Result<()> {
        if idx.is_empty() {
            return Ok(());
        }
        self.enums.remove_posting(idx, doc);
        self.enums.decrement_ref(idx)
    }
}

impl<V: ?Sized + EnumValue> Storage for SingleEnum<V> {
    fn add_docs(&self, num_docs: usize) {
        self.refs.ensure_size(num_docs);
    }

    fn accepts(&self, value: &Value) -> bool {
        V::owned_from_value(value).is_some()
    }

    fn apply(&self, doc: DocId, changes: &[ChangeKind], _flags: WeightedSetFlags) -> Result<usize> {
        let old = self.refs.writer_get(doc as usize).unwrap_or(EntryRef::EMPTY);
        let current = if old.is_empty() { None } else { Some(self.enums.writer_value(old)?) };
        let (value, rejected) =
            apply_single_changes(current.clone(), changes, V::owned_from_value, V::apply_arithmetic);
        let value = value.filter(|v| !V::is_undefined_value(V::borrow_owned(v)));

        let unchanged = match (&current, &value) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                self.enums.make_key(V::borrow_owned(a)) == self.enums.make_key(V::borrow_owned(b))
            }
            _ => false,
        };
        if unchanged {
            return Ok(rejected);
        }
        let fresh = match &value {
            Some(v) => self.enums.find_or_insert(V::borrow_owned(v))?,
            None => EntryRef::EMPTY,
        };
        self.refs.set(doc as usize, fresh);
        self.release(doc, old)?;
        if !fresh.is_empty() {
            self.enums.add_posting(fresh, doc);
        }
        Ok(rejected)
    }

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>) {
        if let Some(idx) = self.first_enum(guard, doc) {
            out.push((V::to_value(self.enums.get_value(guard, idx)), 1));
        }
    }

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32 {
        self.first_enum(guard, doc).is_some() as u32
    }

    fn freeze(&self) -> Result<()> {
        self.enums.freeze_dictionary()
    }

    fn compact(&self, strategy: &CompactionStrategy) -> Result<bool> {
        let Some(compaction) = self.enums.compact_values(strategy)? else {
            return Ok(false);
        };
        for doc in 0..self.refs.len() {
            if let Some(idx) = self.refs.writer_get(doc) {
                let moved = compaction.remap(idx);
                if moved != idx {
                    self.refs.set(doc, moved);
                }
            }
        }
        self.enums.finish_compaction(compaction);
        Ok(true)
    }

    fn shrink(&self, num_docs: usize) -> Result<()> {
        for doc in num_docs..self.refs.len() {
            if let Some(idx) = self.refs.writer_get(doc) {
                self.release(doc as DocId, idx)?;
            }
        }
        self.refs.shrink(num_docs);
        Ok(())
    }

    fn assign_generation(&self, current: Generation) {
        self.refs.assign_generation(current);
        self.enums.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.refs.reclaim_memory(oldest_used);
        self.enums.reclaim_memory(oldest_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.refs.memory_usage();
        usage += self.enums.memory_usage();
        usage
    }

    fn address_space(&self) -> AddressSpace {
        self.enums.address_space()
    }

    fn enum_stats(&self) -> Option<EnumStoreStats> {
        Some(self.enums.stats())
    }

    fn find_enum(&self, guard: &GenerationGuard<'_>, value: &Value) -> Option<EnumIndex> {
        let owned = V::owned_from_value(value)?;
        self.enums.find(guard, V::borrow_owned(&owned))
    }

    fn first_enum(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<EnumIndex> {
        self.refs.get(guard, doc as usize).filter(|idx| !idx.is_empty())
    }
}

/// Numeric arrays and weighted sets stored by value
pub(crate) struct MultiDirect<M: MultiValueEntry> {
    pub(crate) mapping: MultiValueMapping<M>,
}

impl<M: MultiValueEntry> MultiDirect<M> {
    pub(crate) fn new(config: &Config) -> Self {
        MultiDirect { mapping: MultiValueMapping::new(config.grow_strategy, config.max_buffers as usize) }
    }
}

impl<M> Storage for MultiDirect<M>
where
    M: MultiValueEntry,
    M::Value: NumericType,
{
    fn add_docs(&self, num_docs: usize) {
        self.mapping.ensure_docs(num_docs);
    }

    fn accepts(&self, value: &Value) -> bool {
        <M::Value as NumericType>::from_value(value).is_some()
    }

    fn apply(&self, doc: DocId, changes: &[ChangeKind], flags: WeightedSetFlags) -> Result<usize> {
        let mut entries = Vec::new();
        self.mapping.writer_get(doc, &mut entries)?;
        let mut current: Vec<(M::Value, i32)> = entries.iter().map(|e| (e.value(), e.weight())).collect();
        let rejected = apply_multi_changes(
            &mut current,
            changes,
            M::WEIGHTED,
            flags,
            <M::Value as NumericType>::from_value,
            |a, b| a.total_cmp(b) == Ordering::Equal,
        );
        let fresh: Vec<M> = current.into_iter().map(|(v, w)| M::from_parts(v, w)).collect();
        self.mapping.replace(doc, &fresh)?;
        Ok(rejected)
    }

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>) {
        out.extend(self.mapping.get(guard, doc).iter().map(|e| (e.value().to_value(), e.weight())));
    }

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32 {
        self.mapping.get(guard, doc).len() as u32
    }

    fn compact(&self, strategy: &CompactionStrategy) -> Result<bool> {
        self.mapping.compact_worst(strategy)
    }

    fn shrink(&self, num_docs: usize) -> Result<()> {
        self.mapping.shrink(num_docs)
    }

    fn assign_generation(&self, current: Generation) {
        self.mapping.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.mapping.reclaim_memory(oldest_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.mapping.memory_usage()
    }

    fn address_space(&self) -> AddressSpace {
        self.mapping.address_space()
    }

    fn num_values(&self, _num_docs: DocId) -> u64 {
        self.mapping.total_value_count()
    }

    fn multi_value_stats(&self) -> Option<MultiValueStats> {
        Some(MultiValueStats {
            total_values: self.mapping.total_value_count(),
            memory: self.mapping.memory_usage(),
            address_space: self.mapping.address_space(),
        })
    }
}

/// Arrays and weighted sets of enum indices
pub(crate) struct MultiEnum<V: ?Sized + EnumValue, M: MultiValueEntry> {
    pub(crate) mapping: MultiValueMapping<M>,
    pub(crate) enums: EnumStore<V>,
}

impl<V: ?Sized + EnumValue, M: MultiValueEntry<Value = EnumIndex>> MultiEnum<V, M> {
    pub(crate) fn new(config: &Config) -> Self {
        MultiEnum {
            mapping: MultiValueMapping::new(config.grow_strategy, config.max_buffers as usize),
            enums: new_enum_store(config),
        }
    }

    fn release(&self, entries: &[M]) -> Result<()> {
        for entry in entries {
            self.enums.decrement_ref(entry.value())?;
        }
        Ok(())
    }

    fn update_postings(&self, doc: DocId, old: &[M], fresh: &[M]) {
        if !self.enums.has_postings() {
            return;
        }
        let old: HashSet<EnumIndex> = old.iter().map(|e| e.value()).collect();
        let fresh: HashSet<EnumIndex> = fresh.iter().map(|e| e.value()).collect();
        for idx in old.difference(&fresh) {
            self.enums.remove_posting(*idx, doc);
        }
        for idx in fresh.difference(&old) {
            self.enums.add_posting(*idx, doc);
        }
    }
}

impl<V, M> Storage for MultiEnum<V, M>
where
    V: ?Sized + EnumValue,
    M: MultiValueEntry<Value = EnumIndex>,
{
    fn add_docs(&self, num_docs: usize) {
        self.mapping.ensure_docs(num_docs);
    }

    fn accepts(&self, value: &Value) -> bool {
        V::owned_from_value(value).is_some()
    }

    fn apply(&self, doc: DocId, changes: &[ChangeKind], flags: WeightedSetFlags) -> Result<usize> {
        let mut entries = Vec::new();
        self.mapping.writer_get(doc, &mut entries)?;
        let mut current = Vec::with_capacity(entries.len());
        for entry in &entries {
            current.push((self.enums.writer_value(entry.value())?, entry.weight()));
        }
        let folded = self.enums.is_folded();
        let rejected = apply_multi_changes(
            &mut current,
            changes,
            M::WEIGHTED,
            flags,
            V::owned_from_value,
            |a, b| V::make_key(V::borrow_owned(a), folded) == V::make_key(V::borrow_owned(b), folded),
        );

        // every new entry holds its own reference before the old ones are dropped
        let mut fresh = Vec::with_capacity(current.len());
        for (value, weight) in &current {
            match self.enums.find_or_insert(V::borrow_owned(value)) {
                Ok(idx) => fresh.push(M::from_parts(idx, *weight)),
                Err(err) => {
                    self.release(&fresh)?;
                    return Err(err);
                }
            }
        }
        if let Err(err) = self.mapping.replace(doc, &fresh) {
            self.release(&fresh)?;
            return Err(err);
        }
        self.update_postings(doc, &entries, &fresh);
        self.release(&entries)?;
        Ok(rejected)
    }

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>) {
        let reader = self.enums.reader(guard);
        out.extend(
            self.mapping
                .get(guard, doc)
                .iter()
                .map(|e| (V::to_value(reader.get_value(e.value())), e.weight())),
        );
    }

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32 {
        self.mapping.get(guard, doc).len() as u32
    }

    fn freeze(&self) -> Result<()> {
        self.enums.freeze_dictionary()
    }

    fn compact(&self, strategy: &CompactionStrategy) -> Result<bool> {
        let mut compacted = false;
        let mut rewritable = Ok(true);
        let compaction = self.enums.compact_values_if(strategy, |spec| {
            rewritable = self.mapping.can_rewrite(|entry| spec.contains(entry.value()));
            matches!(rewritable, Ok(true))
        })?;
        if !rewritable? {
            log::debug!("enum compaction deferred, no room to rewrite the documents");
        }
        if let Some(compaction) = compaction {
            let rewritten = self.mapping.rewrite_entries(|entry| {
                let moved = compaction.remap(entry.value());
                if moved == entry.value() {
                    return false;
                }
                *entry = M::from_parts(moved, entry.weight());
                true
            })?;
            log::debug!("rewrote {} documents after moving {} values", rewritten, compaction.moved());
            self.enums.finish_compaction(compaction);
            compacted = true;
        }
        compacted |= self.mapping.compact_worst(strategy)?;
        Ok(compacted)
    }

    fn shrink(&self, num_docs: usize) -> Result<()> {
        let mut entries = Vec::new();
        for doc in num_docs..self.mapping.num_docs() {
            entries.clear();
            self.mapping.writer_get(doc as DocId, &mut entries)?;
            self.update_postings(doc as DocId, &entries, &[]);
            self.release(&entries)?;
        }
        self.mapping.shrink(num_docs)
    }

    fn assign_generation(&self, current: Generation) {
        self.mapping.assign_generation(current);
        self.enums.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.mapping.reclaim_memory(oldest_used);
        self.enums.reclaim_memory(oldest_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.mapping.memory_usage();
        usage += self.enums.memory_usage();
        usage
    }

    fn address_space(&self) -> AddressSpace {
        let mapping = self.mapping.address_space();
        let enums = self.enums.address_space();
        if enums.usage() > mapping.usage() { enums } else { mapping }
    }

    fn num_values(&self, _num_docs: DocId) -> u64 {
        self.mapping.total_value_count()
    }

    fn enum_stats(&self) -> Option<EnumStoreStats> {
        Some(self.enums.stats())
    }

    fn multi_value_stats(&self) -> Option<MultiValueStats> {
        Some(MultiValueStats {
            total_values: self.mapping.total_value_count(),
            memory: self.mapping.memory_usage(),
            address_space: self.mapping.address_space(),
        })
    }

    fn find_enum(&self, guard: &GenerationGuard<'_>, value: &Value) -> Option<EnumIndex> {
        let owned = V::owned_from_value(value)?;
        self.enums.find(guard, V::borrow_owned(&owned))
    }

    fn first_enum(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<EnumIndex> {
        self.mapping.get(guard, doc).first().map(|e| e.value())
    }
}

/// Single raw (byte string) values, one array store entry per document
pub(crate) struct RawStorage {
    pub(crate) refs: RcuVector<EntryRef>,
    pub(crate) store: ArrayStore<u8>,
}

impl RawStorage {
    pub(crate) fn new(config: &Config) -> Self {
        RawStorage {
            refs: RcuVector::new(config.grow_strategy, EntryRef::EMPTY),
            store: ArrayStore::new(config.max_buffers as usize, config.grow_strategy.buffer_elems as usize),
        }
    }

    pub(crate) fn get<'g>(&'g self, guard: &'g GenerationGuard<'_>, doc: DocId) -> &'g [u8] {
        match self.refs.get(guard, doc as usize) {
            Some(r) => self.store.get(guard, r),
            None => &[],
        }
    }
}

impl Storage for RawStorage {
    fn add_docs(&self, num_docs: usize) {
        self.refs.ensure_size(num_docs);
    }

    fn accepts(&self, value: &Value) -> bool {
        value.as_bytes().is_some()
    }

    fn apply(&self, doc: DocId, changes: &[ChangeKind], _flags: WeightedSetFlags) -> Result<usize> {
        let old = self.refs.writer_get(doc as usize).unwrap_or(EntryRef::EMPTY);
        let current = if old.is_empty() {
            None
        } else {
            let mut bytes = Vec::new();
            self.store.writer_read(old, &mut bytes)?;
            Some(bytes)
        };
        let (value, rejected) =
            apply_single_changes(current, changes, |v| v.as_bytes().map(<[u8]>::to_vec), |_, _, _| None);
        let fresh = match value {
            Some(bytes) => self.store.add(&bytes)?,
            None => EntryRef::EMPTY,
        };
        self.refs.set(doc as usize, fresh);
        self.store.remove(old);
        Ok(rejected)
    }

    fn read_values(&self, guard: &GenerationGuard<'_>, doc: DocId, out: &mut Vec<(Value, i32)>) {
        let bytes = self.get(guard, doc);
        if !bytes.is_empty() {
            out.push((Value::Raw(bytes.to_vec()), 1));
        }
    }

    fn value_count(&self, guard: &GenerationGuard<'_>, doc: DocId) -> u32 {
        !self.get(guard, doc).is_empty() as u32
    }

    fn compact(&self, strategy: &CompactionStrategy) -> Result<bool> {
        let Some(spec) = self.store.start_compaction(strategy) else {
            return Ok(false);
        };
        for doc in 0..self.refs.len() {
            if let Some(r) = self.refs.writer_get(doc) {
                if spec.contains(r) {
                    let moved = match self.store.move_entry(r) {
                        Ok(moved) => moved,
                        Err(err) => {
                            self.store.cancel_compaction(spec);
                            return Err(err);
                        }
                    };
                    self.refs.set(doc, moved);
                }
            }
        }
        self.store.finish_compaction(spec);
        Ok(true)
    }

    fn shrink(&self, num_docs: usize) -> Result<()> {
        for doc in num_docs..self.refs.len() {
            if let Some(r) = self.refs.writer_get(doc) {
                self.store.remove(r);
            }
        }
        self.refs.shrink(num_docs);
        Ok(())
    }

    fn assign_generation(&self, current: Generation) {
        self.refs.assign_generation(current);
        self.store.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.refs.reclaim_memory(oldest_used);
        self.store.reclaim_memory(oldest_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.refs.memory_usage();
        usage += self.store.memory_usage();
        usage
    }

    fn address_space(&self) -> AddressSpace {
        self.store.address_space()
    }
}
