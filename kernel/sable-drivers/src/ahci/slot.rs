//! Command slot selection.
//!
//! A slot is busy while its bit is set in PxSACT (NCQ tag outstanding) or
//! PxCI (command issued). The HBA clears CI itself on completion, so reading
//! both registers is the whole bookkeeping: no shadow state to drift.

/// Returns the lowest slot below `num_slots` that is clear in `sact | ci`.
#[must_use]
pub fn find_free_slot(sact: u32, ci: u32, num_slots: u8) -> Option<u8> {
    let implemented = match num_slots {
        0 => return None,
        n if n >= 32 => u32::MAX,
        n => (1u32 << n) - 1,
    };
    let free = !(sact | ci) & implemented;
    if free == 0 {
        None
    } else {
        Some(free.trailing_zeros() as u8)
    }
}
