//! Sector and dword conversions

use crate::transport::FIS_MAX_DWORDS;

/// Logical sector size in bytes
pub const LOGICAL_SECTOR_SIZE: u64 = 512;

/// 32-bit words per logical sector
pub const DWORDS_PER_SECTOR: u64 = LOGICAL_SECTOR_SIZE / 4;

/// Sectors needed to hold `dwords` words, rounded up
pub const fn dwords_to_sectors(dwords: u64) -> u64 {
    dwords.div_ceil(DWORDS_PER_SECTOR)
}

/// Words in `sectors` sectors, `None` on overflow
pub const fn sectors_to_dwords(sectors: u64) -> Option<u64> {
    sectors.checked_mul(DWORDS_PER_SECTOR)
}

/// Bytes in `dwords` words, `None` on overflow
pub const fn dwords_to_bytes(dwords: u64) -> Option<u64> {
    dwords.checked_mul(4)
}

/// DATA FIS needed to move `dwords` payload words
pub const fn data_fis_count(dwords: u64) -> u64 {
    dwords.div_ceil((FIS_MAX_DWORDS - 1) as u64)
}
