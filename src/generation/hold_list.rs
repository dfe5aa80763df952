use std::collections::VecDeque;
use crate::generation::handler::Generation;

/// Items removed by the writer, kept alive until no reader can see them.
///
/// Items are first inserted as pending, then stamped with the generation that was
/// current when they were removed (`assign_generation`), and finally released by
/// `reclaim` once the oldest used generation has moved past that stamp.
pub struct GenerationHoldList<T> {
    pending: Vec<(usize, T)>,
    held: VecDeque<(Generation, usize, T)>,
    held_bytes: usize,
}

impl<T> GenerationHoldList<T> {
    pub fn new() -> Self {
        GenerationHoldList {
            pending: Vec::new(),
            held: VecDeque::new(),
            held_bytes: 0,
        }
    }

    pub fn insert(&mut self, item: T, bytes: usize) {
        self.held_bytes += bytes;
        self.pending.push((bytes, item));
    }

    pub fn assign_generation(&mut self, current: Generation) {
        for (bytes, item) in self.pending.drain(..) {
            self.held.push_back((current, bytes, item));
        }
    }

    /// Drops every item held at a generation below `oldest_used`.
    pub fn reclaim(&mut self, oldest_used: Generation) {
        self.reclaim_with(oldest_used, drop);
    }

    pub fn reclaim_with(&mut self, oldest_used: Generation, mut f: impl FnMut(T)) {
        while let Some((generation, _, _)) = self.held.front() {
            if *generation >= oldest_used {
                break;
            }
            if let Some((_, bytes, item)) = self.held.pop_front() {
                self.held_bytes -= bytes;
                f(item);
            }
        }
    }

    /// Releases everything, pending items included. Only valid without readers.
    pub fn reclaim_all(&mut self, mut f: impl FnMut(T)) {
        for (_, _, item) in self.held.drain(..) {
            f(item);
        }
        for (_, item) in self.pending.drain(..) {
            f(item);
        }
        self.held_bytes = 0;
    }

    pub fn held_bytes(&self) -> usize {
        self.held_bytes
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for GenerationHoldList<T> {
    fn default() -> Self {
        Self::new()
    }
}
