//! IDENTIFY (PACKET) DEVICE response parsing.

/// Length of an IDENTIFY response in bytes.
pub const IDENTIFY_LEN: usize = 512;

/// Default ATA logical sector size.
pub const ATA_SECTOR_SIZE: usize = 512;

/// Word 106: physical/logical sector size information is valid.
const W106_VALID: u16 = 1 << 14;
/// Word 106: must be zero when the word is valid.
const W106_INVALID: u16 = 1 << 15;
/// Word 106: logical sector is longer than 256 words (see words 117-118).
const W106_LONG_LOGICAL: u16 = 1 << 12;

/// Parsed IDENTIFY data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Addressable sectors (48-bit LBA, words 100-103).
    pub sector_count: u64,
    /// Logical sector size in bytes.
    pub sector_size: usize,
    /// Model number, ATA byte order already swapped.
    pub model: [u8; 40],
    /// Serial number, ATA byte order already swapped.
    pub serial: [u8; 20],
}

impl DeviceIdentity {
    /// Parses a 512-byte IDENTIFY response.
    ///
    /// Returns `None` if `data` is shorter than [`IDENTIFY_LEN`].
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < IDENTIFY_LEN {
            return None;
        }
        let word = |idx: usize| u16::from_le_bytes([data[idx * 2], data[idx * 2 + 1]]);

        let sector_count = u64::from(word(100))
            | (u64::from(word(101)) << 16)
            | (u64::from(word(102)) << 32)
            | (u64::from(word(103)) << 48);

        let w106 = word(106);
        let sector_size = if w106 & (W106_VALID | W106_INVALID) == W106_VALID
            && w106 & W106_LONG_LOGICAL != 0
        {
            let words = u32::from(word(117)) | (u32::from(word(118)) << 16);
            match words as usize * 2 {
                0 => ATA_SECTOR_SIZE,
                bytes => bytes,
            }
        } else {
            ATA_SECTOR_SIZE
        };

        let mut model = [0u8; 40];
        swap_string(&mut model, |i| word(27 + i));
        let mut serial = [0u8; 20];
        swap_string(&mut serial, |i| word(10 + i));

        Some(Self {
            sector_count,
            sector_size,
            model,
            serial,
        })
    }

    /// Highest addressable LBA, or `None` for an empty device.
    #[must_use]
    pub const fn max_lba(&self) -> Option<u64> {
        self.sector_count.checked_sub(1)
    }

    /// Model number with ATA space padding removed.
    #[must_use]
    pub fn model_str(&self) -> &str {
        trimmed(&self.model)
    }

    /// Serial number with ATA space padding removed.
    #[must_use]
    pub fn serial_str(&self) -> &str {
        trimmed(&self.serial)
    }
}

fn swap_string(out: &mut [u8], word: impl Fn(usize) -> u16) {
    for (i, pair) in out.chunks_exact_mut(2).enumerate() {
        let [hi, lo] = word(i).to_be_bytes();
        pair[0] = hi;
        pair[1] = lo;
    }
}

fn trimmed(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes)
        .unwrap_or("")
        .trim_matches(|c: char| c == ' ' || c == '\0')
}
