use std::marker::PhantomData;
use std::sync::atomic::{
    AtomicBool, AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicPtr, AtomicU32, AtomicU64, Ordering,
};
use parking_lot::Mutex;
use crate::core::config::GrowStrategy;
use crate::core::stats::MemoryUsage;
use crate::generation::{Generation, GenerationGuard, GenerationHoldList};

/// Plain values that can live in a lock-free slot
pub trait AtomicValue: Copy + Send + Sync + 'static {
    type Atomic: Send + Sync + 'static;

    fn new_atomic(value: Self) -> Self::Atomic;
    fn load(atomic: &Self::Atomic) -> Self;
    fn store(atomic: &Self::Atomic, value: Self);
}

macro_rules! impl_atomic_value {
    ($($t:ty => $atomic:ty),* $(,)?) => {
        $(
            impl AtomicValue for $t {
                type Atomic = $atomic;

                fn new_atomic(value: Self) -> $atomic {
                    <$atomic>::new(value)
                }

                fn load(atomic: &$atomic) -> Self {
                    atomic.load(Ordering::Acquire)
                }

                fn store(atomic: &$atomic, value: Self) {
                    atomic.store(value, Ordering::Release)
                }
            }
        )*
    };
}

impl_atomic_value!(
    bool => AtomicBool,
    i8 => AtomicI8,
    i16 => AtomicI16,
    i32 => AtomicI32,
    i64 => AtomicI64,
    u32 => AtomicU32,
    u64 => AtomicU64,
);

impl AtomicValue for f32 {
    type Atomic = AtomicU32;

    fn new_atomic(value: Self) -> AtomicU32 {
        AtomicU32::new(value.to_bits())
    }

    fn load(atomic: &AtomicU32) -> Self {
        f32::from_bits(atomic.load(Ordering::Acquire))
    }

    fn store(atomic: &AtomicU32, value: Self) {
        atomic.store(value.to_bits(), Ordering::Release)
    }
}

impl AtomicValue for f64 {
    type Atomic = AtomicU64;

    fn new_atomic(value: Self) -> AtomicU64 {
        AtomicU64::new(value.to_bits())
    }

    fn load(atomic: &AtomicU64) -> Self {
        f64::from_bits(atomic.load(Ordering::Acquire))
    }

    fn store(atomic: &AtomicU64, value: Self) {
        atomic.store(value.to_bits(), Ordering::Release)
    }
}

/// Owning pointer that readers dereference under a generation guard.
///
/// The writer swaps in a new value with [`replace`](RcuBox::replace) and must park the
/// returned box on a hold list; it is freed once no guard can still observe it.
pub struct RcuBox<T> {
    ptr: AtomicPtr<T>,
    _owns: PhantomData<Box<T>>,
}

impl<T> RcuBox<T> {
    pub fn new(value: T) -> Self {
        RcuBox {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _owns: PhantomData,
        }
    }

    pub fn load<'g>(&'g self, _guard: &'g GenerationGuard<'_>) -> &'g T {
        // SAFETY: a replaced value is held until every guard taken before the swap is gone
        unsafe { &*self.ptr.load(Ordering::Acquire) }
    }

    /// Current value as seen by the writer. Valid until the writer reclaims held memory.
    pub(crate) fn writer_ref(&self) -> &T {
        // SAFETY: only the writer replaces, and it never frees the current value
        unsafe { &*self.ptr.load(Ordering::Acquire) }
    }

    #[must_use = "the previous value must be held until readers are done with it"]
    pub(crate) fn replace(&self, value: T) -> Box<T> {
        let fresh = Box::into_raw(Box::new(value));
        let old = self.ptr.swap(fresh, Ordering::AcqRel);
        // SAFETY: `old` came from Box::into_raw and is no longer reachable through `ptr`
        unsafe { Box::from_raw(old) }
    }
}

impl<T> Drop for RcuBox<T> {
    fn drop(&mut self) {
        // SAFETY: exclusive access, the pointer always holds a live box
        drop(unsafe { Box::from_raw(*self.ptr.get_mut()) });
    }
}

/// Vector of atomic slots with copy-on-grow, one slot per document.
pub struct RcuVector<T: AtomicValue> {
    array: RcuBox<Box<[T::Atomic]>>,
    state: Mutex<RcuVectorState<T>>,
}

struct RcuVectorState<T: AtomicValue> {
    size: usize,
    fill: T,
    grow: GrowStrategy,
    hold: GenerationHoldList<Box<Box<[T::Atomic]>>>,
}

fn allocate<T: AtomicValue>(capacity: usize, fill: T) -> Box<[T::Atomic]> {
    (0..capacity).map(|_| T::new_atomic(fill)).collect()
}

impl<T: AtomicValue> RcuVector<T> {
    pub fn new(grow: GrowStrategy, fill: T) -> Self {
        RcuVector {
            array: RcuBox::new(allocate(grow.initial_docs as usize, fill)),
            state: Mutex::new(RcuVectorState {
                size: 0,
                fill,
                grow,
                hold: GenerationHoldList::new(),
            }),
        }
    }

    /// Slots visible to a reader. Slots past the committed limit may hold uncommitted data.
    pub fn acquire_slots<'g>(&'g self, guard: &'g GenerationGuard<'_>) -> &'g [T::Atomic] {
        self.array.load(guard)
    }

    pub fn get(&self, guard: &GenerationGuard<'_>, idx: usize) -> Option<T> {
        self.array.load(guard).get(idx).map(T::load)
    }

    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.array.writer_ref().len()
    }

    pub fn writer_get(&self, idx: usize) -> Option<T> {
        let state = self.state.lock();
        if idx >= state.size {
            return None;
        }
        self.array.writer_ref().get(idx).map(T::load)
    }

    pub fn push(&self, value: T) {
        let mut state = self.state.lock();
        let idx = state.size;
        self.reserve(&mut state, idx + 1);
        T::store(&self.array.writer_ref()[idx], value);
        state.size = idx + 1;
    }

    /// Returns false when `idx` is outside the vector.
    pub fn set(&self, idx: usize, value: T) -> bool {
        let state = self.state.lock();
        if idx >= state.size {
            return false;
        }
        T::store(&self.array.writer_ref()[idx], value);
        true
    }

    pub fn ensure_size(&self, size: usize) {
        let mut state = self.state.lock();
        if size <= state.size {
            return;
        }
        self.reserve(&mut state, size);
        let fill = state.fill;
        let slots = self.array.writer_ref();
        for slot in &slots[state.size..size] {
            T::store(slot, fill);
        }
        state.size = size;
    }

    /// Shrinks the logical size; trailing slots are reset for later reuse.
    pub fn shrink(&self, size: usize) {
        let mut state = self.state.lock();
        if size >= state.size {
            return;
        }
        let fill = state.fill;
        let slots = self.array.writer_ref();
        for slot in &slots[size..state.size] {
            T::store(slot, fill);
        }
        state.size = size;
    }

    fn reserve(&self, state: &mut RcuVectorState<T>, needed: usize) {
        let current = self.array.writer_ref();
        if needed <= current.len() {
            return;
        }
        let capacity = state.grow.next_capacity(current.len(), needed);
        let grown = allocate(capacity, state.fill);
        for (dst, src) in grown.iter().zip(current.iter()).take(state.size) {
            T::store(dst, T::load(src));
        }
        let old = self.array.replace(grown);
        let bytes = old.len() * std::mem::size_of::<T::Atomic>();
        state.hold.insert(old, bytes);
    }

    pub fn assign_generation(&self, current: Generation) {
        self.state.lock().hold.assign_generation(current);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) {
        self.state.lock().hold.reclaim(oldest_used);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let state = self.state.lock();
        let elem = std::mem::size_of::<T::Atomic>();
        let allocated = self.array.writer_ref().len() * elem;
        let on_hold = state.hold.held_bytes();
        MemoryUsage::new(allocated + on_hold, state.size * elem, 0, on_hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationHandler;

    fn small_grow() -> GrowStrategy {
        GrowStrategy {
            initial_docs: 4,
            ..GrowStrategy::default()
        }
    }

    #[test]
    fn old_array_survives_growth_while_guarded() {
        let handler = GenerationHandler::new();
        let vector = RcuVector::new(small_grow(), -1i32);
        for i in 0..4 {
            vector.push(i);
        }
        let guard = handler.take_guard();
        let before = vector.acquire_slots(&guard);
        assert_eq!(before.len(), 4);

        for i in 4..100 {
            vector.push(i);
        }
        vector.assign_generation(handler.current_generation());
        handler.inc_generation();
        vector.reclaim_memory(handler.oldest_used_generation());

        // the reader still sees the array it loaded
        assert_eq!(i32::load(&before[3]), 3);
        assert!(vector.memory_usage().allocated_bytes_on_hold > 0);

        drop(guard);
        handler.update_oldest_used_generation();
        vector.reclaim_memory(handler.oldest_used_generation());
        assert_eq!(vector.memory_usage().allocated_bytes_on_hold, 0);

        let guard = handler.take_guard();
        assert_eq!(vector.get(&guard, 99), Some(99));
        assert_eq!(vector.len(), 100);
    }

    #[test]
    fn ensure_size_and_shrink_use_fill() {
        let vector = RcuVector::new(small_grow(), f64::NAN);
        vector.ensure_size(3);
        assert!(vector.set(1, 2.5));
        assert!(!vector.set(3, 1.0));
        assert_eq!(vector.writer_get(1), Some(2.5));
        assert!(vector.writer_get(0).unwrap().is_nan());
        vector.shrink(1);
        assert_eq!(vector.len(), 1);
        vector.ensure_size(2);
        assert!(vector.writer_get(1).unwrap().is_nan());
    }

    #[test]
    fn rcu_box_replace_returns_previous() {
        let handler = GenerationHandler::new();
        let cell = RcuBox::new(String::from("a"));
        let guard = handler.take_guard();
        assert_eq!(cell.load(&guard), "a");
        let old = cell.replace(String::from("b"));
        assert_eq!(*old, "a");
        assert_eq!(cell.load(&guard), "b");
    }
}
