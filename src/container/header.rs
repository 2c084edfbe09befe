//! CFB header parsing.
//!
//! The header is always 512 bytes regardless of sector size; sector N starts
//! at byte offset `(N + 1) << sector_shift`.

use crate::error::{ExtractError, Result};

pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub const HEADER_LEN: usize = 512;
pub const DIR_ENTRY_LEN: usize = 128;
pub const MINI_SECTOR_LEN: usize = 64;

/// Number of DIFAT slots stored inside the header itself.
pub const HEADER_DIFAT_SLOTS: usize = 109;

// FAT sentinel values.
pub const FREESECT: u32 = 0xFFFF_FFFF;
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
pub const FATSECT: u32 = 0xFFFF_FFFD;
pub const DIFSECT: u32 = 0xFFFF_FFFC;

/// "No sibling / no child" marker in directory entries.
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

pub(super) fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub(super) fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(super) fn u64_at(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

#[derive(Debug, Clone)]
pub struct Header {
    pub major_version: u16,
    pub sector_len: usize,
    pub num_fat_sectors: u32,
    pub first_dir_sector: u32,
    pub mini_cutoff: u64,
    pub first_minifat_sector: u32,
    pub num_minifat_sectors: u32,
    pub first_difat_sector: u32,
    pub num_difat_sectors: u32,
    pub difat_head: Vec<u32>,
}

impl Header {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(ExtractError::ContainerFormat("truncated header".into()));
        }
        if buf[..8] != MAGIC {
            return Err(ExtractError::ContainerFormat("bad magic".into()));
        }

        let major_version = u16_at(buf, 26);
        let byte_order = u16_at(buf, 28);
        if byte_order != 0xFFFE {
            return Err(ExtractError::ContainerFormat(format!(
                "bad byte-order mark {:#06x}",
                byte_order
            )));
        }

        let sector_shift = u16_at(buf, 30);
        let sector_len = match (major_version, sector_shift) {
            (3, 9) => 512,
            (4, 12) => 4096,
            _ => {
                return Err(ExtractError::ContainerFormat(format!(
                    "unsupported version {} / sector shift {}",
                    major_version, sector_shift
                )))
            }
        };

        let mini_shift = u16_at(buf, 32);
        if mini_shift != 6 {
            return Err(ExtractError::ContainerFormat(format!(
                "unsupported mini sector shift {}",
                mini_shift
            )));
        }

        let mut difat_head = Vec::with_capacity(HEADER_DIFAT_SLOTS);
        for i in 0..HEADER_DIFAT_SLOTS {
            let v = u32_at(buf, 76 + i * 4);
            if v == FREESECT {
                break;
            }
            difat_head.push(v);
        }

        Ok(Header {
            major_version,
            sector_len,
            num_fat_sectors: u32_at(buf, 44),
            first_dir_sector: u32_at(buf, 48),
            mini_cutoff: u32_at(buf, 56) as u64,
            first_minifat_sector: u32_at(buf, 60),
            num_minifat_sectors: u32_at(buf, 64),
            first_difat_sector: u32_at(buf, 68),
            num_difat_sectors: u32_at(buf, 72),
            difat_head,
        })
    }

    /// Absolute file offset of a sector. Sector 0 starts one full sector
    /// into the file; for v4 that is 4096, past the 512-byte header and
    /// its zero padding.
    pub fn sector_offset(&self, sector: u32) -> u64 {
        (sector as u64 + 1) * self.sector_len as u64
    }
}
