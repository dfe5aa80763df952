use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

pub type Generation = u64;

// Low bit of `refs` marks the hold readers may still join; the count lives above it.
const VALID: u32 = 1;
const REF_UNIT: u32 = 2;

/// Reader count for one generation
struct GenerationHold {
    refs: AtomicU32,
    generation: AtomicU64,
}

impl GenerationHold {
    fn new() -> Self {
        GenerationHold {
            refs: AtomicU32::new(0),
            generation: AtomicU64::new(0),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut refs = self.refs.load(Ordering::SeqCst);
        loop {
            if refs & VALID == 0 {
                return false;
            }
            match self.refs.compare_exchange_weak(refs, refs + REF_UNIT, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(actual) => refs = actual,
            }
        }
    }

    fn acquire_again(&self) {
        self.refs.fetch_add(REF_UNIT, Ordering::SeqCst);
    }

    fn release(&self) {
        self.refs.fetch_sub(REF_UNIT, Ordering::SeqCst);
    }

    fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::SeqCst) / REF_UNIT
    }

    fn is_valid(&self) -> bool {
        self.refs.load(Ordering::SeqCst) & VALID != 0
    }

    /// Only called on a hold with no readers that is not reachable from `last`.
    fn activate(&self, generation: Generation) {
        self.generation.store(generation, Ordering::Relaxed);
        self.refs.store(VALID, Ordering::SeqCst);
    }

    fn invalidate(&self) {
        self.refs.fetch_and(!VALID, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy)]
struct HoldPtr(NonNull<GenerationHold>);

// Holds are heap allocations owned by the handler; the pointer is only shared with guards.
unsafe impl Send for HoldPtr {}

impl HoldPtr {
    fn allocate() -> Self {
        let boxed = Box::new(GenerationHold::new());
        HoldPtr(NonNull::from(Box::leak(boxed)))
    }

    fn hold(&self) -> &GenerationHold {
        // SAFETY: holds are freed only when the handler is dropped
        unsafe { self.0.as_ref() }
    }
}

struct HoldRing {
    in_use: VecDeque<HoldPtr>,   // oldest first, back is `last`
    free: Vec<HoldPtr>,
    all: Vec<HoldPtr>,
}

/// Tracks which generations readers are still inside.
///
/// Readers call [`take_guard`](GenerationHandler::take_guard), which never blocks and never
/// allocates. The single writer bumps the generation after publishing new state and asks
/// for [`oldest_used_generation`](GenerationHandler::oldest_used_generation) before it
/// frees anything removed earlier.
pub struct GenerationHandler {
    current: CachePadded<AtomicU64>,
    oldest_used: CachePadded<AtomicU64>,
    last: CachePadded<AtomicPtr<GenerationHold>>,
    holds: Mutex<HoldRing>,
}

impl GenerationHandler {
    pub fn new() -> Self {
        let first = HoldPtr::allocate();
        first.hold().activate(0);
        GenerationHandler {
            current: CachePadded::new(AtomicU64::new(0)),
            oldest_used: CachePadded::new(AtomicU64::new(0)),
            last: CachePadded::new(AtomicPtr::new(first.0.as_ptr())),
            holds: Mutex::new(HoldRing {
                in_use: VecDeque::from([first]),
                free: Vec::new(),
                all: vec![first],
            }),
        }
    }

    /// Pins the current generation until the guard is dropped.
    pub fn take_guard(&self) -> GenerationGuard<'_> {
        loop {
            let ptr = self.last.load(Ordering::SeqCst);
            // SAFETY: every pointer ever stored in `last` stays allocated for the handler's lifetime
            let hold = unsafe { &*ptr };
            if hold.try_acquire() {
                return GenerationGuard { hold };
            }
            std::hint::spin_loop();
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.current.load(Ordering::Acquire)
    }

    pub fn next_generation(&self) -> Generation {
        self.current_generation() + 1
    }

    /// Everything held at a generation below this value is invisible to every reader.
    pub fn oldest_used_generation(&self) -> Generation {
        self.oldest_used.load(Ordering::Acquire)
    }

    /// Publishes a new generation. Called by the writer after its changes are visible.
    pub fn inc_generation(&self) {
        let mut ring = self.holds.lock();
        let next = self.current.load(Ordering::Relaxed) + 1;
        let fresh = match ring.free.pop() {
            Some(hold) => hold,
            None => {
                let hold = HoldPtr::allocate();
                ring.all.push(hold);
                hold
            }
        };
        fresh.hold().activate(next);
        let previous = self.last.swap(fresh.0.as_ptr(), Ordering::SeqCst);
        // SAFETY: `previous` came from `last` and is still owned by the ring
        unsafe { &*previous }.invalidate();
        ring.in_use.push_back(fresh);
        self.current.store(next, Ordering::Release);
        self.collect(&mut ring);
    }

    pub fn update_oldest_used_generation(&self) {
        let mut ring = self.holds.lock();
        self.collect(&mut ring);
    }

    fn collect(&self, ring: &mut HoldRing) {
        while ring.in_use.len() > 1 {
            let front = ring.in_use[0].hold();
            if front.is_valid() || front.ref_count() != 0 {
                break;
            }
            if let Some(done) = ring.in_use.pop_front() {
                ring.free.push(done);
            }
        }
        let oldest = ring.in_use[0].hold().generation.load(Ordering::Relaxed);
        self.oldest_used.store(oldest, Ordering::Release);
    }

    /// Readers currently pinning `generation`
    pub fn generation_ref_count(&self, generation: Generation) -> u32 {
        let ring = self.holds.lock();
        ring.in_use
            .iter()
            .map(HoldPtr::hold)
            .filter(|hold| hold.generation.load(Ordering::Relaxed) == generation)
            .map(GenerationHold::ref_count)
            .sum()
    }

    pub fn has_readers(&self) -> bool {
        let ring = self.holds.lock();
        ring.in_use.iter().any(|hold| hold.hold().ref_count() != 0)
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GenerationHandler {
    fn drop(&mut self) {
        let ring = self.holds.get_mut();
        for hold in ring.all.drain(..) {
            // SAFETY: guards borrow the handler, so none can outlive it
            drop(unsafe { Box::from_raw(hold.0.as_ptr()) });
        }
    }
}

/// Pins one generation; memory removed at or after it stays valid while the guard lives.
pub struct GenerationGuard<'a> {
    hold: &'a GenerationHold,
}

impl<'a> GenerationGuard<'a> {
    pub fn generation(&self) -> Generation {
        self.hold.generation.load(Ordering::Relaxed)
    }
}

impl Clone for GenerationGuard<'_> {
    fn clone(&self) -> Self {
        self.hold.acquire_again();
        GenerationGuard { hold: self.hold }
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.hold.release();
    }
}

impl std::fmt::Debug for GenerationGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGuard").field("generation", &self.generation()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_used_follows_guards() {
        let handler = GenerationHandler::new();
        assert_eq!(handler.current_generation(), 0);
        assert_eq!(handler.oldest_used_generation(), 0);

        let g0 = handler.take_guard();
        assert_eq!(g0.generation(), 0);
        handler.inc_generation();
        handler.inc_generation();
        assert_eq!(handler.current_generation(), 2);
        assert_eq!(handler.oldest_used_generation(), 0);

        let g2 = handler.take_guard();
        assert_eq!(g2.generation(), 2);
        drop(g0);
        handler.update_oldest_used_generation();
        assert_eq!(handler.oldest_used_generation(), 2);
        assert_eq!(handler.generation_ref_count(2), 1);

        drop(g2);
        handler.inc_generation();
        assert_eq!(handler.oldest_used_generation(), 3);
        assert!(!handler.has_readers());
    }

    #[test]
    fn cloned_guard_keeps_generation_pinned() {
        let handler = GenerationHandler::new();
        let guard = handler.take_guard();
        let copy = guard.clone();
        drop(guard);
        handler.inc_generation();
        assert_eq!(handler.oldest_used_generation(), 0);
        assert_eq!(handler.generation_ref_count(0), 1);
        drop(copy);
        handler.update_oldest_used_generation();
        assert_eq!(handler.oldest_used_generation(), 1);
    }

    #[test]
    fn holds_are_recycled() {
        let handler = GenerationHandler::new();
        for _ in 0..100 {
            let guard = handler.take_guard();
            drop(guard);
            handler.inc_generation();
        }
        assert_eq!(handler.current_generation(), 100);
        assert_eq!(handler.oldest_used_generation(), 100);
        assert!(handler.holds.lock().all.len() <= 2);
    }
}
