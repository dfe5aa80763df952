use std::sync::atomic::{AtomicU32, Ordering};
use chrono::Utc;
use parking_lot::Mutex;
use crate::attribute::change::{ChangeKind, ChangeVector, WeightedSetFlags};
use crate::attribute::kind::AttributeKind;
use crate::attribute::read_views::ArrayViewType;
use crate::core::config::{CompactionStrategy, Config};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::Status;
use crate::core::types::{ArithmeticOp, BasicType, CollectionType, DocId, EnumHandle, Value};
use crate::generation::{GenerationGuard, GenerationHandler};
use crate::readview::{ArrayReadView, Stash, WeightedSetReadView};
use crate::search::{QueryTerm, SearchContext};
use crate::sort::{BlobConverter, MissingPolicy, SortBlobWriter};

// compaction used when a buffer space runs out in the middle of a commit
const EMERGENCY_COMPACTION: CompactionStrategy = CompactionStrategy {
    max_dead_bytes_ratio: 0.0,
    max_dead_address_space_ratio: 0.0,
};

struct WriterState {
    changes: ChangeVector,
    rejected_changes: u64,
}

/// Column of per-document values for one field.
///
/// One writer thread enqueues changes and commits them; any number of reader threads
/// read concurrently without locks. Readers see documents below the committed doc id
/// limit, and every structure they reach stays valid for as long as they hold a guard
/// from [`take_guard`](AttributeVector::take_guard).
///
/// ```text
///   writer: update/append/... --> change vector --commit--> apply --> freeze dictionary
///                                                              --> publish limit --> bump generation
///   reader: take_guard --> accessors, read views, search contexts, sort blob writers
/// ```
pub struct AttributeVector {
    name: String,
    config: Config,
    kind: AttributeKind,
    generation: GenerationHandler,
    writer: Mutex<WriterState>,
    num_docs: AtomicU32,
    committed_doc_id_limit: AtomicU32,
    status: Mutex<Status>,
}

impl AttributeVector {
    /// Creates an empty attribute; rejects configs the store can not serve.
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self> {
        config.validate()?;
        let kind = AttributeKind::new(&config)?;
        let name = name.into();
        log::debug!("created attribute '{}' of type {}", name, config.type_string());
        Ok(AttributeVector {
            name,
            config,
            kind,
            generation: GenerationHandler::new(),
            writer: Mutex::new(WriterState {
                changes: ChangeVector::new(),
                rejected_changes: 0,
            }),
            num_docs: AtomicU32::new(0),
            committed_doc_id_limit: AtomicU32::new(0),
            status: Mutex::new(Status::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn basic_type(&self) -> BasicType {
        self.config.basic_type
    }

    pub fn collection_type(&self) -> CollectionType {
        self.config.collection_type
    }

    pub fn is_multi_value(&self) -> bool {
        self.config.is_multi_value()
    }

    pub fn is_enumerated(&self) -> bool {
        self.config.is_enumerated()
    }

    pub(crate) fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn generation_handler(&self) -> &GenerationHandler {
        &self.generation
    }

    /// Documents added so far, committed or not
    pub fn num_docs(&self) -> DocId {
        self.num_docs.load(Ordering::Acquire)
    }

    /// Documents visible to readers
    pub fn committed_doc_id_limit(&self) -> DocId {
        self.committed_doc_id_limit.load(Ordering::Acquire)
    }

    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    pub fn pending_changes(&self) -> usize {
        self.writer.lock().changes.len()
    }

    pub(crate) fn pending_change_stats(&self) -> (usize, usize, u64) {
        let writer = self.writer.lock();
        (writer.changes.len(), writer.changes.memory_usage(), writer.rejected_changes)
    }

    fn weighted_set_flags(&self) -> WeightedSetFlags {
        WeightedSetFlags {
            create_if_nonexistent: self.config.create_if_nonexistent,
            remove_if_zero: self.config.remove_if_zero,
        }
    }

    // ---- writer side ----

    pub fn add_doc(&self) -> Result<DocId> {
        self.add_docs(1)
    }

    /// Adds `count` empty documents and returns the id of the first one. The new
    /// documents become visible at the next commit.
    pub fn add_docs(&self, count: u32) -> Result<DocId> {
        let _writer = self.writer.lock();
        let first = self.num_docs.load(Ordering::Acquire);
        let total = first
            .checked_add(count)
            .filter(|total| *total < u32::MAX)
            .ok_or_else(|| Error::exhausted(format!("attribute '{}' ran out of doc ids", self.name)))?;
        self.kind.storage().add_docs(total as usize);
        self.num_docs.store(total, Ordering::Release);
        Ok(first)
    }

    pub fn update(&self, doc: DocId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.require_single("update")?;
        self.check_value(&value)?;
        self.enqueue(doc, [ChangeKind::Update(value)])
    }

    /// Appends to an array, or sets the weight of an element in a weighted set
    pub fn append(&self, doc: DocId, value: impl Into<Value>, weight: i32) -> Result<()> {
        let value = value.into();
        self.require_multi("append")?;
        self.check_value(&value)?;
        self.enqueue(doc, [ChangeKind::Append(value, weight)])
    }

    /// Removes every element equal to `value`
    pub fn remove(&self, doc: DocId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.require_multi("remove")?;
        self.check_value(&value)?;
        self.enqueue(doc, [ChangeKind::Remove(value)])
    }

    pub fn apply_arithmetic(&self, doc: DocId, op: ArithmeticOp, operand: f64) -> Result<()> {
        self.require_single("arithmetic")?;
        let bt = self.basic_type();
        if !bt.is_numeric() || bt == BasicType::Bool {
            return Err(Error::invalid_argument(format!(
                "arithmetic is not supported on {} attribute '{}'",
                bt, self.name
            )));
        }
        self.enqueue(doc, [ChangeKind::Arithmetic(op, operand)])
    }

    pub fn apply_weight(&self, doc: DocId, value: impl Into<Value>, op: ArithmeticOp, operand: f64) -> Result<()> {
        let value = value.into();
        if self.collection_type() != CollectionType::WeightedSet {
            return Err(Error::invalid_argument(format!(
                "weight updates need a weighted set, '{}' is {}",
                self.name,
                self.config.type_string()
            )));
        }
        self.check_value(&value)?;
        self.enqueue(doc, [ChangeKind::ApplyWeight(value, op, operand)])
    }

    pub fn clear_doc(&self, doc: DocId) -> Result<()> {
        self.enqueue(doc, [ChangeKind::ClearDoc])
    }

    /// Replaces all values of `doc`. Single-value attributes take at most one value;
    /// weights are ignored unless the attribute is a weighted set.
    pub fn set_values(&self, doc: DocId, values: &[(Value, i32)]) -> Result<()> {
        for (value, _) in values {
            self.check_value(value)?;
        }
        if !self.is_multi_value() {
            return match values {
                [] => self.clear_doc(doc),
                [(value, _)] => self.enqueue(doc, [ChangeKind::Update(value.clone())]),
                _ => Err(Error::invalid_argument(format!(
                    "single-value attribute '{}' got {} values",
                    self.name,
                    values.len()
                ))),
            };
        }
        let changes = std::iter::once(ChangeKind::ClearDoc)
            .chain(values.iter().map(|(value, weight)| ChangeKind::Append(value.clone(), *weight)));
        self.enqueue(doc, changes)
    }

    fn require_single(&self, op: &str) -> Result<()> {
        if self.is_multi_value() {
            return Err(Error::invalid_argument(format!(
                "{} is not supported on multi-value attribute '{}'",
                op, self.name
            )));
        }
        Ok(())
    }

    fn require_multi(&self, op: &str) -> Result<()> {
        if !self.is_multi_value() {
            return Err(Error::invalid_argument(format!(
                "{} is not supported on single-value attribute '{}'",
                op, self.name
            )));
        }
        Ok(())
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if !self.kind.storage().accepts(value) {
            return Err(Error::invalid_argument(format!(
                "{} value '{}' does not fit {} attribute '{}'",
                value.type_name(),
                value,
                self.config.type_string(),
                self.name
            )));
        }
        Ok(())
    }

    fn enqueue(&self, doc: DocId, changes: impl IntoIterator<Item = ChangeKind>) -> Result<()> {
        let mut writer = self.writer.lock();
        let num_docs = self.num_docs.load(Ordering::Acquire);
        if doc >= num_docs {
            return Err(Error::invalid_argument(format!(
                "doc {} is outside attribute '{}' ({} docs)",
                doc, self.name, num_docs
            )));
        }
        for change in changes {
            writer.changes.push(doc, change);
        }
        Ok(())
    }

    /// Applies pending changes and makes them and every added document visible.
    ///
    /// The dictionary is frozen, compaction runs if the strategy asks for it, the doc id
    /// limit is published, and memory held for earlier generations is released once no
    /// reader can see it. When applying or compacting fails the changes applied so far
    /// are still published, the remaining ones are dropped and the error is returned.
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        let grouped = writer.changes.take_grouped();
        let num_changes: usize = grouped.iter().map(|(_, changes)| changes.len()).sum();

        let applied = self.apply_changes(&grouped);
        let published = self.publish();
        self.refresh_status(matches!(published, Ok(true)));
        published?;

        let rejected = applied?;
        if rejected > 0 {
            writer.rejected_changes += rejected as u64;
            log::warn!(
                "attribute '{}': {} of {} changes did not apply",
                self.name,
                rejected,
                num_changes
            );
        }
        log::debug!(
            "attribute '{}' committed {} changes, limit {}, generation {}",
            self.name,
            num_changes,
            self.committed_doc_id_limit(),
            self.generation.current_generation()
        );
        Ok(())
    }

    fn apply_changes(&self, grouped: &[(DocId, Vec<ChangeKind>)]) -> Result<usize> {
        let storage = self.kind.storage();
        let flags = self.weighted_set_flags();
        let mut rejected = 0;
        for (doc, changes) in grouped {
            rejected += match storage.apply(*doc, changes, flags) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::ResourceExhausted => {
                    log::warn!("attribute '{}': {}, compacting before retrying doc {}", self.name, err, doc);
                    self.reclaim_and_compact()?;
                    storage.apply(*doc, changes, flags).inspect_err(|err| {
                        log::error!("attribute '{}' is out of space: {}", self.name, err);
                    })?
                }
                Err(err) => return Err(err),
            };
        }
        Ok(rejected)
    }

    fn reclaim_and_compact(&self) -> Result<()> {
        let storage = self.kind.storage();
        storage.freeze()?;
        self.bump_generation();
        if storage.compact(&EMERGENCY_COMPACTION)? {
            self.status.lock().compactions += 1;
        }
        storage.freeze()?;
        self.bump_generation();
        Ok(())
    }

    /// Changes applied so far are published even when compaction fails; the compaction
    /// error is still returned.
    fn publish(&self) -> Result<bool> {
        let storage = self.kind.storage();
        let compacted = storage.compact(&self.config.compaction_strategy);
        storage.freeze()?;
        self.committed_doc_id_limit
            .store(self.num_docs.load(Ordering::Acquire), Ordering::Release);
        self.bump_generation();
        compacted.inspect_err(|err| log::error!("attribute '{}': compaction failed: {}", self.name, err))
    }

    fn bump_generation(&self) {
        let storage = self.kind.storage();
        storage.assign_generation(self.generation.current_generation());
        self.generation.inc_generation();
        storage.reclaim_memory(self.generation.oldest_used_generation());
    }

    fn refresh_status(&self, compacted: bool) {
        let storage = self.kind.storage();
        let limit = self.committed_doc_id_limit();
        let mut status = self.status.lock();
        status.num_docs = limit;
        status.num_values = storage.num_values(limit);
        status.num_unique_values = storage.enum_stats().map(|s| s.num_uniques as u64).unwrap_or(0);
        status.memory = storage.memory_usage();
        status.last_commit = Some(Utc::now());
        status.commits += 1;
        if compacted {
            status.compactions += 1;
        }
    }

    /// Drops documents at or above `num_docs`. Pending changes must be committed first.
    pub fn shrink_doc_id_space(&self, num_docs: DocId) -> Result<()> {
        let writer = self.writer.lock();
        if !writer.changes.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("attribute '{}' has uncommitted changes", self.name),
            ));
        }
        if num_docs >= self.num_docs.load(Ordering::Acquire) {
            return Ok(());
        }
        self.committed_doc_id_limit.fetch_min(num_docs, Ordering::AcqRel);
        self.num_docs.store(num_docs, Ordering::Release);
        let storage = self.kind.storage();
        storage.shrink(num_docs as usize)?;
        storage.freeze()?;
        self.bump_generation();
        self.refresh_status(false);
        log::debug!("attribute '{}' shrunk to {} docs", self.name, num_docs);
        Ok(())
    }

    // ---- reader side ----

    /// Pins the current generation; everything read through the guard stays valid
    /// until it is dropped.
    pub fn take_guard(&self) -> GenerationGuard<'_> {
        self.generation.take_guard()
    }

    fn is_visible(&self, doc: DocId) -> bool {
        doc < self.committed_doc_id_limit()
    }

    /// Committed (value, weight) pairs of `doc`; weight is 1 outside weighted sets.
    pub fn get_values(&self, doc: DocId) -> Vec<(Value, i32)> {
        let mut out = Vec::new();
        if self.is_visible(doc) {
            let guard = self.take_guard();
            self.kind.storage().read_values(&guard, doc, &mut out);
        }
        out
    }

    pub fn value_count(&self, doc: DocId) -> u32 {
        if !self.is_visible(doc) {
            return 0;
        }
        let guard = self.take_guard();
        self.kind.storage().value_count(&guard, doc)
    }

    fn first_value(&self, doc: DocId) -> Option<Value> {
        self.get_values(doc).into_iter().next().map(|(value, _)| value)
    }

    /// Value returned by [`get_int`](Self::get_int) for documents without one
    pub fn undefined_int(&self) -> i64 {
        match self.basic_type() {
            BasicType::Bool => 0,
            BasicType::Int8 => i8::MIN as i64,
            BasicType::Int16 => i16::MIN as i64,
            BasicType::Int32 => i32::MIN as i64,
            _ => i64::MIN,
        }
    }

    /// First value of `doc` as an integer; multi-value attributes report their first element.
    pub fn get_int(&self, doc: DocId) -> i64 {
        if !self.is_visible(doc) {
            return self.undefined_int();
        }
        let value = if self.is_multi_value() {
            self.first_value(doc).and_then(|v| match v {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_i64(),
            })
        } else {
            let guard = self.take_guard();
            self.kind.get_int(&guard, doc)
        };
        value.unwrap_or_else(|| self.undefined_int())
    }

    pub fn get_float(&self, doc: DocId) -> f64 {
        let undefined = if self.basic_type() == BasicType::Bool { 0.0 } else { f64::NAN };
        if !self.is_visible(doc) {
            return undefined;
        }
        let value = if self.is_multi_value() {
            self.first_value(doc).and_then(|v| match v {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_f64(),
            })
        } else {
            let guard = self.take_guard();
            self.kind.get_float(&guard, doc)
        };
        value.unwrap_or(undefined)
    }

    /// First value of `doc` as a string, `""` when there is none
    pub fn get_string(&self, doc: DocId) -> String {
        if !self.is_visible(doc) {
            return String::new();
        }
        if self.is_multi_value() {
            return self.first_value(doc).map(|v| v.to_string()).unwrap_or_default();
        }
        let guard = self.take_guard();
        self.kind.get_string(&guard, doc).unwrap_or_default()
    }

    pub fn get_raw(&self, doc: DocId) -> Vec<u8> {
        match self.first_value(doc) {
            Some(Value::Raw(bytes)) => bytes,
            Some(Value::String(s)) => s.into_bytes(),
            Some(other) => other.to_string().into_bytes(),
            None => Vec::new(),
        }
    }

    /// Enum handle of a committed value, for enumerated attributes
    pub fn find_enum(&self, value: impl Into<Value>) -> Option<EnumHandle> {
        let value = value.into();
        let guard = self.take_guard();
        self.kind.storage().find_enum(&guard, &value).map(|idx| idx.raw())
    }

    /// Enum handle of the first value of `doc`
    pub fn get_enum(&self, doc: DocId) -> Option<EnumHandle> {
        if !self.is_visible(doc) {
            return None;
        }
        let guard = self.take_guard();
        self.kind.storage().first_enum(&guard, doc).map(|idx| idx.raw())
    }

    /// Search context for `term` over the documents committed now. Raw attributes
    /// fail with `UnsupportedQuery`.
    pub fn create_search_context<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        term: &QueryTerm,
    ) -> Result<Box<dyn SearchContext + 'a>> {
        self.kind.create_search_context(guard, term, self.committed_doc_id_limit())
    }

    pub fn make_sort_blob_writer<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        ascending: bool,
        policy: &MissingPolicy,
        converter: Option<&'a dyn BlobConverter>,
    ) -> Result<Box<dyn SortBlobWriter + 'a>> {
        self.kind
            .make_sort_blob_writer(guard, self.committed_doc_id_limit(), ascending, policy, converter)
    }

    /// Array view over elements of type `T`, or `None` when the attribute is single-value
    /// or stores another type.
    pub fn make_array_read_view<'a, 's, T: ArrayViewType<'a>>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<T> + 'a)> {
        T::array_view(self, guard, stash)
    }

    pub fn make_weighted_set_read_view<'a, 's, T: ArrayViewType<'a>>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<T> + 'a)> {
        T::weighted_set_view(self, guard, stash)
    }
}

impl std::fmt::Debug for AttributeVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeVector")
            .field("name", &self.name)
            .field("type", &self.config.type_string())
            .field("num_docs", &self.num_docs())
            .field("committed_doc_id_limit", &self.committed_doc_id_limit())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{GrowStrategy, Match};

    fn attribute(basic_type: BasicType, collection_type: CollectionType) -> AttributeVector {
        AttributeVector::new("test", Config::new(basic_type, collection_type)).unwrap()
    }

    #[test]
    fn documents_become_visible_on_commit() {
        let attr = attribute(BasicType::Int32, CollectionType::Single);
        let doc = attr.add_doc().unwrap();
        attr.update(doc, 42).unwrap();
        assert_eq!(attr.committed_doc_id_limit(), 0);
        assert_eq!(attr.get_int(doc), i32::MIN as i64);
        attr.commit().unwrap();
        assert_eq!(attr.committed_doc_id_limit(), 1);
        assert_eq!(attr.get_int(doc), 42);
        assert_eq!(attr.status().commits, 1);
    }

    #[test]
    fn undefined_values_per_type() {
        let ints = attribute(BasicType::Int8, CollectionType::Single);
        let floats = attribute(BasicType::Double, CollectionType::Single);
        let strings = attribute(BasicType::String, CollectionType::Single);
        let bools = attribute(BasicType::Bool, CollectionType::Single);
        for attr in [&ints, &floats, &strings, &bools] {
            attr.add_doc().unwrap();
            attr.commit().unwrap();
        }
        assert_eq!(ints.get_int(0), i8::MIN as i64);
        assert!(floats.get_float(0).is_nan());
        assert_eq!(strings.get_string(0), "");
        assert_eq!(bools.get_int(0), 0);
        assert_eq!(ints.value_count(0), 0);
        assert_eq!(bools.value_count(0), 1);
    }

    #[test]
    fn enqueue_validation() {
        let attr = attribute(BasicType::Int32, CollectionType::Array);
        attr.add_doc().unwrap();
        assert_eq!(attr.update(0, 1).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(attr.append(1, 1, 1).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(attr.append(0, "x", 1).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            attr.apply_weight(0, 1, ArithmeticOp::Add, 1.0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        attr.append(0, "17", 1).unwrap();
        attr.commit().unwrap();
        assert_eq!(attr.get_values(0), vec![(Value::Int(17), 1)]);
    }

    #[test]
    fn arithmetic_updates() {
        let attr = attribute(BasicType::Int64, CollectionType::Single);
        attr.add_docs(2).unwrap();
        attr.update(0, 10).unwrap();
        attr.apply_arithmetic(0, ArithmeticOp::Mul, 3.0).unwrap();
        attr.apply_arithmetic(1, ArithmeticOp::Add, 3.0).unwrap();
        attr.commit().unwrap();
        assert_eq!(attr.get_int(0), 30);
        assert_eq!(attr.get_int(1), i64::MIN);
        let strings = attribute(BasicType::String, CollectionType::Single);
        strings.add_doc().unwrap();
        assert!(strings.apply_arithmetic(0, ArithmeticOp::Add, 1.0).is_err());
    }

    #[test]
    fn set_values_replaces_everything() {
        let attr = attribute(BasicType::String, CollectionType::WeightedSet);
        attr.add_doc().unwrap();
        attr.append(0, "a", 1).unwrap();
        attr.commit().unwrap();
        attr.set_values(0, &[(Value::from("b"), 4), (Value::from("c"), 5)]).unwrap();
        attr.commit().unwrap();
        assert_eq!(
            attr.get_values(0),
            vec![(Value::from("b"), 4), (Value::from("c"), 5)]
        );
        assert_eq!(attr.status().num_unique_values, 2);
    }

    #[test]
    fn enum_handles_are_shared_between_docs() {
        let config = Config::new(BasicType::String, CollectionType::Single).with_match(Match::Uncased);
        let attr = AttributeVector::new("tags", config).unwrap();
        attr.add_docs(2).unwrap();
        attr.update(0, "Foo").unwrap();
        attr.update(1, "foo").unwrap();
        attr.commit().unwrap();
        assert_eq!(attr.get_enum(0), attr.get_enum(1));
        assert_eq!(attr.find_enum("FOO"), attr.get_enum(0));
        assert_eq!(attr.get_string(1), "Foo");
    }

    #[test]
    fn shrink_drops_trailing_documents() {
        let attr = attribute(BasicType::Int32, CollectionType::Array);
        attr.add_docs(3).unwrap();
        for doc in 0..3 {
            attr.append(doc, doc as i64, 1).unwrap();
        }
        attr.commit().unwrap();
        attr.shrink_doc_id_space(1).unwrap();
        assert_eq!(attr.committed_doc_id_limit(), 1);
        assert_eq!(attr.value_count(2), 0);
        assert_eq!(attr.status().num_values, 1);
        assert_eq!(attr.add_doc().unwrap(), 1);
    }

    #[test]
    fn raw_rejects_search_and_sort() {
        let attr = attribute(BasicType::Raw, CollectionType::Single);
        attr.add_doc().unwrap();
        attr.update(0, vec![1u8, 2]).unwrap();
        attr.commit().unwrap();
        assert_eq!(attr.get_raw(0), vec![1, 2]);
        let guard = attr.take_guard();
        let err = attr.create_search_context(&guard, &QueryTerm::word("x")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedQuery);
        assert!(attr.make_sort_blob_writer(&guard, true, &MissingPolicy::Default, None).is_err());
    }

    #[test]
    fn read_views_dispatch_on_element_type() {
        let attr = attribute(BasicType::Int16, CollectionType::Array);
        attr.add_doc().unwrap();
        attr.append(0, 3, 1).unwrap();
        attr.append(0, 4, 1).unwrap();
        attr.commit().unwrap();
        let guard = attr.take_guard();
        let stash = Stash::new();
        let view = attr.make_array_read_view::<i16>(&guard, &stash).unwrap();
        assert_eq!(view.get_values(0), &[3, 4]);
        assert_eq!(view.get_values(7), &[] as &[i16]);
        assert!(attr.make_array_read_view::<i32>(&guard, &stash).is_none());
        assert!(attr.make_array_read_view::<EnumHandle>(&guard, &stash).is_none());
        let weighted = attr.make_weighted_set_read_view::<i16>(&guard, &stash).unwrap();
        assert_eq!(weighted.get_values(0)[1].weight, 1);
    }

    #[test]
    fn full_address_space_recycles_freed_slots() {
        let config = Config::new(BasicType::Int32, CollectionType::Array)
            .with_max_buffers(2)
            .with_grow_strategy(GrowStrategy { buffer_elems: 16, ..GrowStrategy::default() });
        let attr = AttributeVector::new("tight", config).unwrap();
        attr.add_docs(16).unwrap();
        for doc in 0..16u32 {
            attr.set_values(doc, &[(Value::Int(doc as i64), 1), (Value::Int(-1), 1)]).unwrap();
        }
        attr.commit().unwrap();

        // both buffers are full, there is nowhere to compact into
        for doc in 0..4 {
            attr.clear_doc(doc).unwrap();
        }
        attr.commit().unwrap();
        attr.commit().unwrap();

        attr.set_values(0, &[(Value::Int(7), 1), (Value::Int(8), 1)]).unwrap();
        attr.commit().unwrap();
        assert_eq!(attr.get_values(0), vec![(Value::Int(7), 1), (Value::Int(8), 1)]);
        for doc in 4..16u32 {
            assert_eq!(attr.get_values(doc)[0], (Value::Int(doc as i64), 1));
        }
    }

    #[test]
    fn commit_out_of_buffer_ids_is_an_error() {
        let config = Config::new(BasicType::Int32, CollectionType::Array)
            .with_max_buffers(2)
            .with_grow_strategy(GrowStrategy { buffer_elems: 16, ..GrowStrategy::default() });
        let attr = AttributeVector::new("tight", config).unwrap();
        attr.add_docs(17).unwrap();
        for doc in 0..16u32 {
            attr.set_values(doc, &[(Value::Int(1), 1), (Value::Int(2), 1)]).unwrap();
        }
        attr.commit().unwrap();

        attr.set_values(16, &[(Value::Int(3), 1), (Value::Int(4), 1), (Value::Int(5), 1)]).unwrap();
        let err = attr.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(attr.get_values(16).is_empty());
        assert_eq!(attr.get_values(15), vec![(Value::Int(1), 1), (Value::Int(2), 1)]);
        assert_eq!(attr.status().commits, 2);
    }
}
