//! Per-bucket translation id allocation.

use crate::nat::flow::Bucket;
use crate::{Error, Result};
use std::collections::HashMap;

/// Cursor value a fresh bucket starts from; the first id issued is
/// `INITIAL_CURSOR + 1`.
const INITIAL_CURSOR: u16 = 8000;

/// Round-robin id allocator with one rolling cursor per bucket.
///
/// Scanning forward from the last issued value spreads reuse across the id
/// space instead of hammering the low range, so a just-freed id is unlikely
/// to be handed out again while the far side of the tunnel still references
/// it. Id 0 is reserved and never produced.
#[derive(Debug, Default)]
pub struct IdAllocator {
    cursors: HashMap<Bucket, u16>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next id in `bucket` not claimed by `in_use`.
    ///
    /// Scans forward from the cursor, wrapping past the 16-bit range back to
    /// 1. A full cycle with every value occupied (65535 live ids in the
    /// bucket) is [`Error::IdExhausted`]; the caller decides whether to
    /// retry or drop.
    pub fn allocate(&mut self, bucket: Bucket, mut in_use: impl FnMut(u16) -> bool) -> Result<u16> {
        let cursor = self.cursors.entry(bucket).or_insert(INITIAL_CURSOR);
        let start = *cursor;
        let mut candidate = start;
        loop {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !in_use(candidate) {
                *cursor = candidate;
                return Ok(candidate);
            }
            if candidate == start {
                return Err(Error::IdExhausted(bucket));
            }
        }
    }
}
