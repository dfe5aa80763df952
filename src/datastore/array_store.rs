use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicPtr, Ordering};
use parking_lot::Mutex;
use crate::core::config::CompactionStrategy;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::datastore::entry_ref::{EntryRef, MAX_ARRAY_LEN};
use crate::generation::{Generation, GenerationGuard, GenerationHoldList};

/// Fixed-capacity element buffer. Ranges are written once by the writer before a ref to
/// them is published, and never written again until the ref has been reclaimed.
struct Buffer<E> {
    elems: Box<[UnsafeCell<MaybeUninit<E>>]>,
}

// SAFETY: readers only touch ranges published through an atomic ref, the writer only
// touches ranges no published ref covers.
unsafe impl<E: Send> Send for Buffer<E> {}
unsafe impl<E: Send + Sync> Sync for Buffer<E> {}

impl<E: Copy> Buffer<E> {
    fn new(capacity: usize) -> Box<Self> {
        let elems = (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        Box::new(Buffer { elems })
    }

    fn capacity(&self) -> usize {
        self.elems.len()
    }

    /// SAFETY: `[offset, offset + values.len())` must be in bounds and unobservable by readers.
    unsafe fn write(&self, offset: usize, values: &[E]) {
        debug_assert!(offset + values.len() <= self.capacity());
        unsafe {
            let dst = UnsafeCell::raw_get(self.elems.as_ptr().add(offset)) as *mut E;
            std::ptr::copy_nonoverlapping(values.as_ptr(), dst, values.len());
        }
    }

    /// SAFETY: the range must have been fully written before its ref was published.
    unsafe fn read(&self, offset: usize, len: usize) -> &[E] {
        if offset + len > self.capacity() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.elems.as_ptr().add(offset) as *const E, len) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    Free,
    Active,
    Filled,
    Compacting,
    Hold,
}

#[derive(Debug, Clone, Copy)]
struct BufferMeta {
    state: BufferState,
    capacity: usize,
    used: usize,
    dead: usize,
    dedicated: bool,
}

impl BufferMeta {
    const FREE: BufferMeta = BufferMeta {
        state: BufferState::Free,
        capacity: 0,
        used: 0,
        dead: 0,
        dedicated: false,
    };
}

struct StoreState {
    meta: Vec<BufferMeta>,
    free_ids: Vec<u32>,
    active: Option<u32>,
    free_lists: HashMap<u32, Vec<EntryRef>>,
    hold_entries: GenerationHoldList<EntryRef>,
    hold_buffers: GenerationHoldList<u32>,
    buffer_elems: usize,
}

/// Buffers selected for compaction
#[derive(Debug, Clone)]
pub struct CompactionSpec {
    ids: Vec<u32>,
    mask: Vec<bool>,
    // free slots taken out of the selected buffers, given back on cancel
    parked: Vec<EntryRef>,
}

impl CompactionSpec {
    pub fn contains(&self, r: EntryRef) -> bool {
        r.is_valid() && self.mask.get(r.buffer_id() as usize).copied().unwrap_or(false)
    }

    pub fn buffer_ids(&self) -> &[u32] {
        &self.ids
    }
}

/// Store of immutable arrays of `E`, addressed by [`EntryRef`].
///
/// Small arrays are packed into shared buffers; arrays above a quarter of a buffer get a
/// buffer of their own. Freed arrays go through a generation hold list before their
/// slots are reused, so a reader holding an old ref never sees the slot rewritten.
pub struct ArrayStore<E: Copy + Send + Sync + 'static> {
    slots: Box<[AtomicPtr<Buffer<E>>]>,
    state: Mutex<StoreState>,
}

impl<E: Copy + Send + Sync + 'static> ArrayStore<E> {
    pub fn new(max_buffers: usize, buffer_elems: usize) -> Self {
        let slots = (0..max_buffers).map(|_| AtomicPtr::new(std::ptr::null_mut())).collect();
        ArrayStore {
            slots,
            state: Mutex::new(StoreState {
                meta: vec![BufferMeta::FREE; max_buffers],
                free_ids: (0..max_buffers as u32).rev().collect(),
                active: None,
                free_lists: HashMap::new(),
                hold_entries: GenerationHoldList::new(),
                hold_buffers: GenerationHoldList::new(),
                buffer_elems,
            }),
        }
    }

    pub fn reader<'g>(&'g self, _guard: &'g GenerationGuard<'_>) -> StoreReader<'g, E> {
        StoreReader { slots: &self.slots }
    }

    pub fn get<'g>(&'g self, guard: &'g GenerationGuard<'_>, r: EntryRef) -> &'g [E] {
        self.reader(guard).get(r)
    }

    /// Copies the array behind `r` as the writer sees it.
    pub fn writer_read(&self, r: EntryRef, out: &mut Vec<E>) -> Result<()> {
        if !r.is_valid() {
            return Ok(());
        }
        let buffer = self.writer_buffer(r.buffer_id())?;
        // SAFETY: the writer never reads a range it has not written
        out.extend_from_slice(unsafe { buffer.read(r.offset() as usize, r.len() as usize) });
        Ok(())
    }

    pub fn add(&self, values: &[E]) -> Result<EntryRef> {
        if values.is_empty() {
            return Ok(EntryRef::EMPTY);
        }
        if values.len() > MAX_ARRAY_LEN {
            return Err(Error::exhausted(format!(
                "array of {} elements exceeds the maximum of {}",
                values.len(),
                MAX_ARRAY_LEN
            )));
        }
        let len = values.len();
        let mut state = self.state.lock();

        if let Some(r) = state.free_lists.get_mut(&(len as u32)).and_then(Vec::pop) {
            let buffer = self.writer_buffer(r.buffer_id())?;
            // SAFETY: the slot came back from the hold list, no reader can reach it
            unsafe { buffer.write(r.offset() as usize, values) };
            state.meta[r.buffer_id() as usize].dead -= len;
            return Ok(r);
        }

        if len > state.buffer_elems / 4 {
            let id = self.open_buffer(&mut state, len, true)?;
            let buffer = self.writer_buffer(id)?;
            // SAFETY: freshly allocated buffer
            unsafe { buffer.write(0, values) };
            state.meta[id as usize].used = len;
            return Ok(EntryRef::new(id, 0, len as u32));
        }

        let active = state.active;
        let id = match active {
            Some(id) if state.meta[id as usize].capacity - state.meta[id as usize].used >= len => id,
            previous => {
                if let Some(previous) = previous {
                    state.meta[previous as usize].state = BufferState::Filled;
                }
                state.active = None;
                let capacity = state.buffer_elems;
                let id = self.open_buffer(&mut state, capacity, false)?;
                state.active = Some(id);
                id
            }
        };
        let offset = state.meta[id as usize].used;
        let buffer = self.writer_buffer(id)?;
        // SAFETY: past the used mark of the active buffer, nothing references it yet
        unsafe { buffer.write(offset, values) };
        state.meta[id as usize].used += len;
        Ok(EntryRef::new(id, offset as u32, len as u32))
    }

    /// Marks the array dead; its slot is recycled once readers have moved on.
    pub fn remove(&self, r: EntryRef) {
        if !r.is_valid() {
            return;
        }
        let mut state = self.state.lock();
        let len = r.len() as usize;
        state.meta[r.buffer_id() as usize].dead += len;
        state.hold_entries.insert(r, len * std::mem::size_of::<E>());
    }

    fn open_buffer(&self, state: &mut StoreState, capacity: usize, dedicated: bool) -> Result<u32> {
        let id = state.free_ids.pop().ok_or_else(|| {
            Error::exhausted(format!(
                "array store has no free buffer ids ({} in use)",
                self.slots.len()
            ))
        })?;
        let buffer = Box::into_raw(Buffer::<E>::new(capacity));
        self.slots[id as usize].store(buffer, Ordering::Release);
        state.meta[id as usize] = BufferMeta {
            state: if dedicated { BufferState::Filled } else { BufferState::Active },
            capacity,
            used: 0,
            dead: 0,
            dedicated,
        };
        Ok(id)
    }

    fn writer_buffer(&self, id: u32) -> Result<&Buffer<E>> {
        let ptr = self
            .slots
            .get(id as usize)
            .map(|slot| slot.load(Ordering::Acquire))
            .unwrap_or(std::ptr::null_mut());
        if ptr.is_null() {
            return Err(Error::new(ErrorKind::InvalidState, format!("buffer {} is not allocated", id)));
        }
        // SAFETY: buffers are only freed by `release_buffer`, called from the writer itself
        Ok(unsafe { &*ptr })
    }

    fn release_buffer(&self, state: &mut StoreState, id: u32) {
        let ptr = self.slots[id as usize].swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !ptr.is_null() {
            // SAFETY: every reader that could reach this buffer has released its guard
            drop(unsafe { Box::from_raw(ptr) });
        }
        if state.active == Some(id) {
            state.active = None;
        }
        state.meta[id as usize] = BufferMeta::FREE;
        state.free_ids.push(id);
    }

    pub fn assign_generation(&self, current: Generation) {
        let mut state = self.state.lock();
        state.hold_entries.assign_generation(current);
        state.hold_buffers.assign_generation(current);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut freed = Vec::new();
        state.hold_entries.reclaim_with(oldest_used, |r| freed.push(r));
        for r in freed {
            let id = r.buffer_id();
            let meta = state.meta[id as usize];
            match meta.state {
                BufferState::Filled if meta.dedicated => self.release_buffer(state, id),
                BufferState::Active | BufferState::Filled => {
                    state.free_lists.entry(r.len()).or_default().push(r);
                }
                // the slot goes away with its buffer
                BufferState::Compacting | BufferState::Hold | BufferState::Free => {}
            }
        }
        let mut retired = Vec::new();
        state.hold_buffers.reclaim_with(oldest_used, |id| retired.push(id));
        for id in retired {
            self.release_buffer(state, id);
        }
    }

    /// Picks the buffers worth compacting. Returns `None` when nothing qualifies.
    ///
    /// Only buffers whose live arrays fit in the space left (free buffer ids plus the
    /// tail of the active buffer) are picked, so moving them cannot run out of buffer ids.
    pub fn start_compaction(&self, strategy: &CompactionStrategy) -> Option<CompactionSpec> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let in_use = self.slots.len() - state.free_ids.len();
        // under address space pressure any buffer with dead space is worth moving
        let address_space_pressure =
            in_use as f64 > self.slots.len() as f64 * (1.0 - strategy.max_dead_address_space_ratio);

        let mut candidates: Vec<(usize, u32)> = state
            .meta
            .iter()
            .enumerate()
            .filter(|(_, m)| matches!(m.state, BufferState::Active | BufferState::Filled) && !m.dedicated)
            .filter(|(_, m)| m.dead > 0)
            .filter(|(_, m)| {
                address_space_pressure || m.dead as f64 / m.used.max(1) as f64 > strategy.max_dead_bytes_ratio
            })
            .map(|(id, m)| (m.dead, id as u32))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        candidates.truncate(4.max(in_use / 8));

        // a fresh buffer may waste up to one maximal small array at its tail
        let max_small = state.buffer_elems / 4;
        let per_buffer = state.buffer_elems - max_small;
        let active_tail = state
            .active
            .map(|id| {
                let m = state.meta[id as usize];
                (m.capacity - m.used).saturating_sub(max_small)
            })
            .unwrap_or(0);
        let mut room = state.free_ids.len() * per_buffer + active_tail;
        let mut selected = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            let meta = state.meta[id as usize];
            let live = meta.used - meta.dead;
            let is_active = state.active == Some(id);
            let available = if is_active { room.saturating_sub(active_tail) } else { room };
            if live > available {
                log::debug!("array store: no room to move {} live elements out of buffer {}", live, id);
                continue;
            }
            room -= live;
            if is_active {
                room = room.saturating_sub(active_tail);
            }
            selected.push(id);
        }
        if selected.is_empty() {
            return None;
        }

        let mut mask = vec![false; self.slots.len()];
        for &id in &selected {
            mask[id as usize] = true;
            state.meta[id as usize].state = BufferState::Compacting;
            if state.active == Some(id) {
                state.active = None;
            }
        }
        let mut parked = Vec::new();
        for list in state.free_lists.values_mut() {
            let (inside, outside): (Vec<EntryRef>, Vec<EntryRef>) =
                list.drain(..).partition(|r| mask[r.buffer_id() as usize]);
            *list = outside;
            parked.extend(inside);
        }
        Some(CompactionSpec { ids: selected, mask, parked })
    }

    /// Whether arrays of the given lengths can be added without running out of buffer ids.
    /// Free slots are not counted.
    pub fn has_room(&self, lens: impl IntoIterator<Item = usize>) -> bool {
        let state = self.state.lock();
        let max_small = state.buffer_elems / 4;
        let (mut small, mut dedicated) = (0usize, 0usize);
        for len in lens.into_iter().filter(|len| *len > 0) {
            if len > max_small {
                dedicated += 1;
            } else {
                small += len;
            }
        }
        let Some(shared) = state.free_ids.len().checked_sub(dedicated) else {
            return false;
        };
        let active_tail = state
            .active
            .map(|id| {
                let m = state.meta[id as usize];
                (m.capacity - m.used).saturating_sub(max_small)
            })
            .unwrap_or(0);
        small <= shared * (state.buffer_elems - max_small) + active_tail
    }

    /// Copies a live array into space outside the compacting buffers. The source stays live.
    pub fn copy_entry(&self, r: EntryRef) -> Result<EntryRef> {
        let mut values = Vec::with_capacity(r.len() as usize);
        self.writer_read(r, &mut values)?;
        self.add(&values)
    }

    /// Copies a live array out of a compacting buffer and retires the old copy.
    pub fn move_entry(&self, r: EntryRef) -> Result<EntryRef> {
        let moved = self.copy_entry(r)?;
        self.remove(r);
        Ok(moved)
    }

    /// Hands the compacted buffers to the hold list; memory is freed once readers are gone.
    pub fn finish_compaction(&self, spec: CompactionSpec) {
        let mut state = self.state.lock();
        for id in spec.ids {
            let meta = &mut state.meta[id as usize];
            meta.state = BufferState::Hold;
            let bytes = meta.capacity * std::mem::size_of::<E>();
            state.hold_buffers.insert(id, bytes);
        }
    }

    /// Gives up a compaction after a failed move. Arrays already moved keep their new
    /// copies, the old ones are dead in their buffer and get recycled like any removal.
    pub fn cancel_compaction(&self, spec: CompactionSpec) {
        let mut state = self.state.lock();
        for &id in &spec.ids {
            state.meta[id as usize].state = BufferState::Filled;
        }
        for r in spec.parked {
            state.free_lists.entry(r.len()).or_default().push(r);
        }
        log::debug!("array store: compaction of buffers {:?} cancelled", spec.ids);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let state = self.state.lock();
        let elem = std::mem::size_of::<E>();
        let mut usage = MemoryUsage::default();
        for meta in state.meta.iter().filter(|m| m.state != BufferState::Free) {
            usage.allocated_bytes += meta.capacity * elem;
            usage.used_bytes += meta.used * elem;
            usage.dead_bytes += meta.dead * elem;
        }
        usage.allocated_bytes_on_hold = state.hold_entries.held_bytes() + state.hold_buffers.held_bytes();
        usage
    }

    pub fn address_space(&self) -> AddressSpace {
        let state = self.state.lock();
        AddressSpace {
            used: self.slots.len() - state.free_ids.len(),
            dead: state.meta.iter().filter(|m| m.state == BufferState::Hold).count(),
            limit: self.slots.len(),
        }
    }
}

impl<E: Copy + Send + Sync + 'static> Drop for ArrayStore<E> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let ptr = *slot.get_mut();
            if !ptr.is_null() {
                // SAFETY: exclusive access, no guards can outlive the store
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

/// Read access to an array store, bound to a generation guard.
pub struct StoreReader<'g, E> {
    slots: &'g [AtomicPtr<Buffer<E>>],
}

impl<E> Clone for StoreReader<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for StoreReader<'_, E> {}

impl<'g, E: Copy> StoreReader<'g, E> {
    pub fn get(&self, r: EntryRef) -> &'g [E] {
        if !r.is_valid() {
            return &[];
        }
        let ptr = match self.slots.get(r.buffer_id() as usize) {
            Some(slot) => slot.load(Ordering::Acquire),
            None => return &[],
        };
        if ptr.is_null() {
            return &[];
        }
        // SAFETY: `r` was published after its range was written, and the buffer is not
        // released while the guard this reader was created from is alive
        unsafe { (*ptr).read(r.offset() as usize, r.len() as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationHandler;

    fn commit(store: &ArrayStore<i32>, handler: &GenerationHandler) {
        store.assign_generation(handler.current_generation());
        handler.inc_generation();
        store.reclaim_memory(handler.oldest_used_generation());
    }

    #[test]
    fn add_and_get() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(16, 64);
        let a = store.add(&[1, 2, 3]).unwrap();
        let b = store.add(&[4]).unwrap();
        assert_eq!(store.add(&[]).unwrap(), EntryRef::EMPTY);
        let guard = handler.take_guard();
        assert_eq!(store.get(&guard, a), &[1, 2, 3]);
        assert_eq!(store.get(&guard, b), &[4]);
        assert!(store.get(&guard, EntryRef::EMPTY).is_empty());
    }

    #[test]
    fn removed_slot_is_reused_only_after_readers_leave() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(16, 64);
        let a = store.add(&[7, 7]).unwrap();
        commit(&store, &handler);

        let guard = handler.take_guard();
        store.remove(a);
        commit(&store, &handler);
        let b = store.add(&[8, 8]).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(&guard, a), &[7, 7]);

        drop(guard);
        commit(&store, &handler);
        let c = store.add(&[9, 9]).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn large_arrays_get_dedicated_buffers() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(8, 64);
        let big: Vec<i32> = (0..100).collect();
        let r = store.add(&big).unwrap();
        assert_eq!(store.address_space().used, 1);
        {
            let guard = handler.take_guard();
            assert_eq!(store.get(&guard, r), big.as_slice());
        }
        store.remove(r);
        commit(&store, &handler);
        assert_eq!(store.address_space().used, 0);
    }

    #[test]
    fn running_out_of_buffer_ids_is_resource_exhaustion() {
        let store = ArrayStore::<i32>::new(2, 16);
        store.add(&[0; 10]).unwrap();
        store.add(&[0; 10]).unwrap();
        let err = store.add(&[0; 10]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    }

    #[test]
    fn compaction_moves_live_entries() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(16, 64);
        let live = store.add(&[1, 2]).unwrap();
        let dead: Vec<EntryRef> = (0..10).map(|i| store.add(&[i, i, i]).unwrap()).collect();
        for r in &dead {
            store.remove(*r);
        }
        commit(&store, &handler);

        let guard = handler.take_guard();
        let spec = store.start_compaction(&CompactionStrategy::default()).unwrap();
        assert!(spec.contains(live));
        let moved = store.move_entry(live).unwrap();
        assert!(!spec.contains(moved));
        store.finish_compaction(spec);
        commit(&store, &handler);

        // old copy still readable by the old guard
        assert_eq!(store.get(&guard, live), &[1, 2]);
        assert_eq!(store.get(&guard, moved), &[1, 2]);
        drop(guard);
        commit(&store, &handler);
        assert_eq!(store.address_space().used, 1);
        assert_eq!(store.memory_usage().dead_bytes, 0);
    }

    #[test]
    fn cancelled_compaction_gives_buffers_back() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(3, 16);
        let refs: Vec<EntryRef> = (0..8).map(|i| store.add(&[i, i]).unwrap()).collect();
        for r in &refs[..4] {
            store.remove(*r);
        }
        commit(&store, &handler);

        let spec = store.start_compaction(&CompactionStrategy::default()).unwrap();
        assert_eq!(spec.buffer_ids(), &[0]);
        // the remaining ids go to arrays big enough for buffers of their own
        store.add(&[0; 10]).unwrap();
        store.add(&[0; 10]).unwrap();
        let err = store.move_entry(refs[4]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
        store.cancel_compaction(spec);

        let reused = store.add(&[9, 9]).unwrap();
        assert_eq!(reused.buffer_id(), 0);
        let guard = handler.take_guard();
        assert_eq!(store.get(&guard, reused), &[9, 9]);
        for (i, r) in refs.iter().enumerate().skip(4) {
            assert_eq!(store.get(&guard, *r), &[i as i32, i as i32]);
        }
        drop(guard);

        // nothing can be moved without a free buffer id
        assert!(!store.has_room([2]));
        assert!(store.start_compaction(&CompactionStrategy::default()).is_none());
        assert_eq!(store.address_space().used, 3);
    }

    #[test]
    fn compaction_only_picks_buffers_that_fit() {
        let handler = GenerationHandler::new();
        let store = ArrayStore::<i32>::new(2, 16);
        let refs: Vec<EntryRef> = (0..16).map(|i| store.add(&[i, i]).unwrap()).collect();
        for r in &refs[..2] {
            store.remove(*r);
        }
        commit(&store, &handler);
        assert!(store.start_compaction(&CompactionStrategy::default()).is_none());

        // an all-dead buffer needs no room and frees its id
        for r in &refs[2..8] {
            store.remove(*r);
        }
        commit(&store, &handler);
        let spec = store.start_compaction(&CompactionStrategy::default()).unwrap();
        assert_eq!(spec.buffer_ids(), &[0]);
        store.finish_compaction(spec);
        commit(&store, &handler);
        assert_eq!(store.address_space().used, 1);
        assert!(store.has_room([2, 2, 4]));
    }
}
