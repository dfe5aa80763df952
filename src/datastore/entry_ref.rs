use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Serialize, Deserialize};
use crate::datastore::rcu::AtomicValue;

const LEN_BITS: u32 = 24;
const OFFSET_BITS: u32 = 28;
const BUFFER_BITS: u32 = 12;

pub const MAX_BUFFERS: usize = 1 << BUFFER_BITS;
pub const MAX_BUFFER_ELEMS: usize = 1 << OFFSET_BITS;
pub const MAX_ARRAY_LEN: usize = (1 << LEN_BITS) - 1;

/// Reference to an immutable array in an array store.
///
/// Layout: `buffer_id (12) | offset (28) | len (24)`. The zero value is the empty array;
/// stored arrays are never empty, so a valid ref is never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntryRef(u64);

impl EntryRef {
    pub const EMPTY: EntryRef = EntryRef(0);

    pub fn new(buffer_id: u32, offset: u32, len: u32) -> Self {
        debug_assert!((buffer_id as usize) < MAX_BUFFERS);
        debug_assert!((offset as usize) < MAX_BUFFER_ELEMS);
        debug_assert!((len as usize) <= MAX_ARRAY_LEN);
        EntryRef(((buffer_id as u64) << (OFFSET_BITS + LEN_BITS)) | ((offset as u64) << LEN_BITS) | len as u64)
    }

    pub fn buffer_id(&self) -> u32 {
        (self.0 >> (OFFSET_BITS + LEN_BITS)) as u32
    }

    pub fn offset(&self) -> u32 {
        ((self.0 >> LEN_BITS) & ((1 << OFFSET_BITS) - 1)) as u32
    }

    pub fn len(&self) -> u32 {
        (self.0 & ((1 << LEN_BITS) - 1)) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        EntryRef(raw)
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("EntryRef(empty)");
        }
        write!(f, "EntryRef({}:{}+{})", self.buffer_id(), self.offset(), self.len())
    }
}

impl AtomicValue for EntryRef {
    type Atomic = AtomicU64;

    fn new_atomic(value: Self) -> AtomicU64 {
        AtomicU64::new(value.0)
    }

    fn load(atomic: &AtomicU64) -> Self {
        EntryRef(atomic.load(Ordering::Acquire))
    }

    fn store(atomic: &AtomicU64, value: Self) {
        atomic.store(value.0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks() {
        let r = EntryRef::new(4095, (1 << 28) - 1, 17);
        assert_eq!(r.buffer_id(), 4095);
        assert_eq!(r.offset(), (1 << 28) - 1);
        assert_eq!(r.len(), 17);
        assert!(r.is_valid());
        assert_eq!(EntryRef::from_raw(r.raw()), r);
    }

    #[test]
    fn first_slot_of_first_buffer_is_not_empty() {
        let r = EntryRef::new(0, 0, 1);
        assert!(r.is_valid());
        assert!(!EntryRef::EMPTY.is_valid());
        assert!(EntryRef::EMPTY.is_empty());
    }
}
