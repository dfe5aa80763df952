use crate::attribute::numeric::NumericStorage;
use crate::attribute::storage::{RawStorage, Storage};
use crate::attribute::string::StringStorage;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BasicType, DocId, EnumHandle};
use crate::enumstore::NumericType;
use crate::generation::GenerationGuard;
use crate::readview::{ArrayReadView, Stash, WeightedSetReadView};
use crate::search::{QueryTerm, SearchContext};
use crate::sort::{BlobConverter, MissingPolicy, SortBlobWriter};

/// Typed storage of one attribute
pub(crate) enum AttributeKind {
    Bool(NumericStorage<bool>),
    Int8(NumericStorage<i8>),
    Int16(NumericStorage<i16>),
    Int32(NumericStorage<i32>),
    Int64(NumericStorage<i64>),
    Float(NumericStorage<f32>),
    Double(NumericStorage<f64>),
    String(StringStorage),
    Raw(RawStorage),
}

/// Runs `$body` with `$s` bound to the numeric storage of any numeric kind
macro_rules! with_numeric {
    ($kind:expr, $s:ident => $body:expr, $other:pat => $fallback:expr) => {
        match $kind {
            AttributeKind::Bool($s) => $body,
            AttributeKind::Int8($s) => $body,
            AttributeKind::Int16($s) => $body,
            AttributeKind::Int32($s) => $body,
            AttributeKind::Int64($s) => $body,
            AttributeKind::Float($s) => $body,
            AttributeKind::Double($s) => $body,
            $other => $fallback,
        }
    };
}

impl AttributeKind {
    /// Picks the layout for a validated config
    pub(crate) fn new(config: &Config) -> Result<Self> {
        Ok(match config.basic_type {
            BasicType::Bool => AttributeKind::Bool(NumericStorage::new(config)),
            BasicType::Int8 => AttributeKind::Int8(NumericStorage::new(config)),
            BasicType::Int16 => AttributeKind::Int16(NumericStorage::new(config)),
            BasicType::Int32 => AttributeKind::Int32(NumericStorage::new(config)),
            BasicType::Int64 => AttributeKind::Int64(NumericStorage::new(config)),
            BasicType::Float => AttributeKind::Float(NumericStorage::new(config)),
            BasicType::Double => AttributeKind::Double(NumericStorage::new(config)),
            BasicType::String => AttributeKind::String(StringStorage::new(config)),
            BasicType::Raw => AttributeKind::Raw(RawStorage::new(config)),
            BasicType::Tensor => return Err(Error::config("tensor attributes are not supported by this store")),
        })
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        match self {
            AttributeKind::Bool(s) => s.storage(),
            AttributeKind::Int8(s) => s.storage(),
            AttributeKind::Int16(s) => s.storage(),
            AttributeKind::Int32(s) => s.storage(),
            AttributeKind::Int64(s) => s.storage(),
            AttributeKind::Float(s) => s.storage(),
            AttributeKind::Double(s) => s.storage(),
            AttributeKind::String(s) => s.storage(),
            AttributeKind::Raw(s) => s,
        }
    }

    pub(crate) fn get_int(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<i64> {
        with_numeric!(self, s => s.get_single(guard, doc).map(|v| v.to_i64()), other => match other {
            AttributeKind::String(s) => s.get_single(guard, doc).and_then(|v| v.trim().parse().ok()),
            _ => None,
        })
    }

    pub(crate) fn get_float(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<f64> {
        with_numeric!(self, s => s.get_single(guard, doc).map(|v| v.to_f64()), other => match other {
            AttributeKind::String(s) => s.get_single(guard, doc).and_then(|v| v.trim().parse().ok()),
            _ => None,
        })
    }

    pub(crate) fn get_string(&self, guard: &GenerationGuard<'_>, doc: DocId) -> Option<String> {
        with_numeric!(self, s => s.get_single(guard, doc).map(|v| v.to_string()), other => match other {
            AttributeKind::String(s) => s.get_single(guard, doc).map(str::to_string),
            AttributeKind::Raw(s) => {
                let bytes = s.get(guard, doc);
                (!bytes.is_empty()).then(|| String::from_utf8_lossy(bytes).into_owned())
            }
            _ => None,
        })
    }

    pub(crate) fn create_search_context<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        term: &QueryTerm,
        limit: DocId,
    ) -> Result<Box<dyn SearchContext + 'a>> {
        with_numeric!(self, s => Ok(s.create_search_context(guard, term, limit)), other => match other {
            AttributeKind::String(s) => Ok(s.create_search_context(guard, term, limit)),
            _ => Err(Error::new(
                ErrorKind::UnsupportedQuery,
                format!("raw attributes can not be searched (term '{}')", term),
            )),
        })
    }

    pub(crate) fn make_sort_blob_writer<'a>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        ascending: bool,
        policy: &MissingPolicy,
        converter: Option<&'a dyn BlobConverter>,
    ) -> Result<Box<dyn SortBlobWriter + 'a>> {
        with_numeric!(self, s => s.make_sort_blob_writer(guard, limit, ascending, policy), other => match other {
            AttributeKind::String(s) => s.make_sort_blob_writer(guard, limit, ascending, policy, converter),
            _ => Err(Error::config("raw attributes can not be sorted on")),
        })
    }

    pub(crate) fn enum_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn ArrayReadView<EnumHandle> + 'a)> {
        with_numeric!(self, s => s.enum_handle_view(guard, limit, stash), other => match other {
            AttributeKind::String(s) => s.enum_handle_view(guard, limit, stash),
            _ => None,
        })
    }

    pub(crate) fn enum_weighted_handle_view<'a, 's>(
        &'a self,
        guard: &'a GenerationGuard<'_>,
        limit: DocId,
        stash: &'s Stash<'a>,
    ) -> Option<&'s mut (dyn WeightedSetReadView<EnumHandle> + 'a)> {
        with_numeric!(self, s => s.enum_weighted_handle_view(guard, limit, stash), other => match other {
            AttributeKind::String(s) => s.enum_weighted_handle_view(guard, limit, stash),
            _ => None,
        })
    }
}
