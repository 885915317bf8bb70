//! Scatter-gather (PRDT) construction.
//!
//! A transfer of `bytes` bytes starting at physical address `phys` is split
//! into entries of at most `entry_bytes` bytes each. Each slot's command table
//! has room for [`PRDT_ENTRIES_PER_SLOT`] entries; anything beyond that is cut
//! off and reported through [`PrdtLayout::truncated`].

use super::command::{PRDT_ENTRIES_PER_SLOT, PrdtEntry};

/// Result of building a PRDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrdtLayout {
    /// Entries written (the header's PRDTL).
    pub entries: usize,
    /// Bytes described by those entries.
    pub bytes: usize,
    /// `true` if the request did not fit and was clamped.
    pub truncated: bool,
}

/// Number of entries needed for `bytes` at `entry_bytes` per entry.
#[must_use]
pub const fn entries_needed(bytes: usize, entry_bytes: usize) -> usize {
    bytes.div_ceil(entry_bytes)
}

/// Fills `table` for a transfer of `bytes` bytes at `phys`.
///
/// Entries past the returned count are left zeroed.
pub fn build(
    table: &mut [PrdtEntry; PRDT_ENTRIES_PER_SLOT],
    phys: u64,
    bytes: usize,
    entry_bytes: usize,
) -> PrdtLayout {
    *table = [PrdtEntry::default(); PRDT_ENTRIES_PER_SLOT];

    let mut entries = entries_needed(bytes, entry_bytes);
    let mut total = bytes;
    let truncated = entries > PRDT_ENTRIES_PER_SLOT;
    if truncated {
        entries = PRDT_ENTRIES_PER_SLOT;
        total = PRDT_ENTRIES_PER_SLOT * entry_bytes;
    }

    let mut addr = phys;
    let mut remaining = total;
    for entry in table.iter_mut().take(entries) {
        let chunk = remaining.min(entry_bytes);
        *entry = PrdtEntry::new(addr, chunk as u32);
        addr += chunk as u64;
        remaining -= chunk;
    }

    PrdtLayout {
        entries,
        bytes: total,
        truncated,
    }
}
