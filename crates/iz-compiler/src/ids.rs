//! Platform rule ID allocation
//!
//! Dynamic rules live in one bounded sub-range of the platform ID space
//! so they can never collide with statically packaged rules. A rule keeps
//! the ID it was given last time whenever it still can; removing and
//! re-adding a rule under a new ID is visible to in-flight requests.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::platform::{PLATFORM_ID_MAX, PLATFORM_ID_MIN};

/// Error allocating a platform rule ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("No free rule ID left in {start}..={end}")]
    RangeExhausted { start: u32, end: u32 },
    #[error("Invalid dynamic ID range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },
}

// =============================================================================
// ID Range
// =============================================================================

/// Inclusive range of IDs reserved for dynamically managed rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    /// 1000..=9999; 1..1000 is left to packaged rules.
    pub const DEFAULT: Self = Self { start: 1000, end: 9999 };

    pub fn new(start: u32, end: u32) -> Result<Self, AllocError> {
        if start < PLATFORM_ID_MIN || end > PLATFORM_ID_MAX || start > end {
            return Err(AllocError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        (self.start..=self.end).contains(&id)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn exhausted(&self) -> AllocError {
        AllocError::RangeExhausted {
            start: self.start,
            end: self.end,
        }
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// =============================================================================
// Allocator
// =============================================================================

/// Hands out IDs from an [`IdRange`].
///
/// The scan cursor persists across calls so a batch of fresh allocations
/// does not rescan the IDs it just handed out; it wraps at the range end.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    range: IdRange,
    cursor: u32,
}

impl IdAllocator {
    pub fn new(range: IdRange) -> Self {
        Self {
            range,
            cursor: range.start,
        }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    /// Pick an ID not in `existing`.
    ///
    /// `preferred` is kept when it is free and inside the range. The
    /// caller owns `existing` and must insert the returned ID before the
    /// next call if it is to stay unique.
    pub fn allocate(&mut self, existing: &HashSet<u32>, preferred: Option<u32>) -> Result<u32, AllocError> {
        if let Some(id) = preferred {
            if self.range.contains(id) && !existing.contains(&id) {
                return Ok(id);
            }
        }

        for _ in 0..self.range.len() {
            let candidate = self.cursor;
            self.cursor = if candidate >= self.range.end {
                self.range.start
            } else {
                candidate + 1
            };
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(self.range.exhausted())
    }
}

/// Allocate from the default range, scanning from its start.
pub fn allocate(existing: &HashSet<u32>, preferred: Option<u32>) -> Result<u32, AllocError> {
    IdAllocator::new(IdRange::DEFAULT).allocate(existing, preferred)
}
