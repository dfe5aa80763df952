use std::ops::AddAssign;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Memory accounting for one data structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub allocated_bytes: usize,
    pub used_bytes: usize,
    pub dead_bytes: usize,
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    pub fn new(allocated_bytes: usize, used_bytes: usize, dead_bytes: usize, on_hold: usize) -> Self {
        MemoryUsage {
            allocated_bytes,
            used_bytes,
            dead_bytes,
            allocated_bytes_on_hold: on_hold,
        }
    }

    pub fn inc_allocated(&mut self, bytes: usize) {
        self.allocated_bytes += bytes;
    }

    pub fn inc_used(&mut self, bytes: usize) {
        self.used_bytes += bytes;
    }

    pub fn inc_on_hold(&mut self, bytes: usize) {
        self.allocated_bytes_on_hold += bytes;
    }

    pub fn dead_ratio(&self) -> f64 {
        if self.used_bytes == 0 {
            0.0
        } else {
            self.dead_bytes as f64 / self.used_bytes as f64
        }
    }
}

impl AddAssign for MemoryUsage {
    fn add_assign(&mut self, rhs: MemoryUsage) {
        self.allocated_bytes += rhs.allocated_bytes;
        self.used_bytes += rhs.used_bytes;
        self.dead_bytes += rhs.dead_bytes;
        self.allocated_bytes_on_hold += rhs.allocated_bytes_on_hold;
    }
}

/// Usage of a bounded id space (buffer ids of an array store)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    pub used: usize,
    pub dead: usize,
    pub limit: usize,
}

impl AddressSpace {
    pub fn usage(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.used as f64 / self.limit as f64
        }
    }
}

/// Attribute status, refreshed on every commit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    pub num_docs: u32,
    pub num_values: u64,
    pub num_unique_values: u64,
    pub memory: MemoryUsage,
    pub last_commit: Option<DateTime<Utc>>,
    pub commits: u64,
    pub compactions: u64,
}
