pub mod core;
pub mod generation;
pub mod datastore;
pub mod enumstore;
pub mod multivalue;
pub mod readview;
pub mod search;
pub mod sort;
pub mod attribute;
pub mod expression;

pub use crate::attribute::{AttributeContext, AttributeManager, AttributeVector, AttributeVectorExplorer};
pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{ArithmeticOp, BasicType, CollectionType, DocId, EnumHandle, Value, WeightedValue};
pub use crate::generation::{GenerationGuard, GenerationHandler};
pub use crate::readview::{ArrayReadView, Stash, WeightedSetReadView};
pub use crate::search::{QueryTerm, SearchContext};
pub use crate::sort::{BlobConverter, MissingPolicy, SortBlobWriter};

/*
┌──────────────────────────────────────────────────────────────────────────────────────┐
│                              ATTRSTORE STRUCT ARCHITECTURE                            │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── struct AttributeVector ─────────────────────────────┐
│  name, config: Config                                                                │
│  kind: AttributeKind            // typed storage, picked once from the config       │
│  generation: GenerationHandler  // reader guards, oldest used generation            │
│  writer: Mutex<WriterState>     // ChangeVector of pending changes                  │
│  num_docs, committed_doc_id_limit: AtomicU32                                        │
│  status: Mutex<Status>                                                               │
└──────────────────────────────────────────────────────────────────────────────────────┘
                                          │
          ┌───────────────────────────────┼───────────────────────────────┐
          ▼                               ▼                               ▼
┌─────────────────────┐       ┌──────────────────────────┐      ┌─────────────────────┐
│ SingleDirect<T>     │       │ SingleEnum<V>            │      │ RawStorage          │
│  RcuVector<T>       │       │  RcuVector<EntryRef>     │      │  RcuVector<EntryRef>│
└─────────────────────┘       │  EnumStore<V>            │      │  ArrayStore<u8>     │
┌─────────────────────┐       └──────────────────────────┘      └─────────────────────┘
│ MultiDirect<M>      │       ┌──────────────────────────┐
│  MultiValueMapping  │       │ MultiEnum<V, M>          │
└─────────────────────┘       │  MultiValueMapping<M>    │
                              │  EnumStore<V>            │
                              └──────────────────────────┘

┌─────────────────────────── struct EnumStore<V> ──────────────────────────┐
│  values: ArrayStore<V::Elem>      // one entry per unique value          │
│  writer: Mutex<EnumWriter<V>>     // btree and/or hash, ref counts       │
│  frozen: RcuBox<FrozenDictionary> // sorted, postings, fst index         │
└──────────────────────────────────────────────────────────────────────────┘

┌──────────────────────── struct MultiValueMapping<M> ─────────────────────┐
│  indices: RcuVector<EntryRef>     // per document                        │
│  store: ArrayStore<M>             // immutable arrays, held on replace   │
└──────────────────────────────────────────────────────────────────────────┘

COMMIT (writer thread):
    ChangeVector::take_grouped ─► Storage::apply per doc ─► compact if dead ratio high
        ─► freeze dictionary ─► publish committed_doc_id_limit
        ─► assign_generation(current) ─► inc_generation ─► reclaim_memory(oldest_used)

READ (any thread, lock-free):
    take_guard ─► get_* accessors
               ─► make_array_read_view / make_weighted_set_read_view (in a Stash)
               ─► create_search_context ─► matches(doc) / create_iterator()
               ─► make_sort_blob_writer ─► write(doc, buf)
               ─► AttributeNode / AttributeMapLookupNode ─► execute(doc)
*/
