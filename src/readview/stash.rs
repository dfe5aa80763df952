use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

struct StashEntry {
    ptr: NonNull<u8>,
    drop_fn: unsafe fn(NonNull<u8>),
}

unsafe fn drop_boxed<T>(ptr: NonNull<u8>) {
    // SAFETY: `ptr` came from `Box::leak` of a `Box<T>` in `Stash::create`
    drop(unsafe { Box::from_raw(ptr.cast::<T>().as_ptr()) });
}

/// Arena for objects created while serving one query.
///
/// Read views and their scratch buffers are placed here so callers can hold plain
/// `&mut dyn` references instead of boxes. Everything is dropped together when the stash
/// goes out of scope, newest first. The lifetime is invariant: objects may borrow data
/// that outlives the stash, never the other way around.
pub struct Stash<'a> {
    entries: RefCell<Vec<StashEntry>>,
    _marker: PhantomData<fn(&'a ()) -> &'a ()>,
}

impl<'a> Stash<'a> {
    pub fn new() -> Self {
        Stash {
            entries: RefCell::new(Vec::new()),
            _marker: PhantomData,
        }
    }

    /// Moves `value` into the stash; it lives until the stash is dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn create<T: 'a>(&self, value: T) -> &mut T {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        self.entries.borrow_mut().push(StashEntry {
            ptr: ptr.cast(),
            drop_fn: drop_boxed::<T>,
        });
        // SAFETY: each call allocates a fresh box that only the stash frees, and the stash
        // cannot be dropped while the returned borrow of `self` is alive
        unsafe { &mut *ptr.as_ptr() }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Stash<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Stash<'_> {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().drain(..).rev() {
            // SAFETY: every entry was created by `create` with the matching drop function
            unsafe { (entry.drop_fn)(entry.ptr) }
        }
    }
}
