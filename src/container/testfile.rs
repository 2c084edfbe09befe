//! Test-only builder that writes real CFB v3 bytes: header, FAT, miniFAT,
//! directory and both stream layouts (mini stream below the 4096-byte
//! cutoff, regular FAT chains above it). Keeps container tests honest by
//! exercising the same byte format the reader parses.

use super::header::{
    DIR_ENTRY_LEN, ENDOFCHAIN, FATSECT, FREESECT, HEADER_DIFAT_SLOTS, HEADER_LEN, MAGIC,
    MINI_SECTOR_LEN, NOSTREAM,
};
use super::directory::{TYPE_ROOT, TYPE_STREAM};

const SECTOR: usize = 512;
const MINI_CUTOFF: usize = 4096;
const FAT_PER_SECTOR: usize = SECTOR / 4;

pub struct CfbBuilder {
    streams: Vec<(String, Vec<u8>)>,
}

impl CfbBuilder {
    pub fn new() -> Self {
        Self { streams: Vec::new() }
    }

    pub fn stream(mut self, name: &str, data: Vec<u8>) -> Self {
        self.streams.push((name.to_string(), data));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut sectors: Vec<Vec<u8>> = Vec::new();
        let mut fat: Vec<u32> = Vec::new();

        // Appends `data` as a chain of full sectors, returns the start index.
        fn alloc_chain(sectors: &mut Vec<Vec<u8>>, fat: &mut Vec<u32>, data: &[u8]) -> u32 {
            let start = sectors.len() as u32;
            let n = data.len().div_ceil(SECTOR).max(1);
            for i in 0..n {
                let mut sector = vec![0u8; SECTOR];
                let lo = i * SECTOR;
                let hi = (lo + SECTOR).min(data.len());
                if lo < data.len() {
                    sector[..hi - lo].copy_from_slice(&data[lo..hi]);
                }
                sectors.push(sector);
                fat.push(if i + 1 == n {
                    ENDOFCHAIN
                } else {
                    start + i as u32 + 1
                });
            }
            start
        }

        // Big streams get regular chains; small ones are packed into the
        // mini stream with a miniFAT chain each.
        let mut mini_stream: Vec<u8> = Vec::new();
        let mut minifat: Vec<u32> = Vec::new();
        let mut starts: Vec<u32> = Vec::new(); // per-stream start sector (regular or mini)

        for (_, data) in &self.streams {
            if data.len() >= MINI_CUTOFF {
                starts.push(alloc_chain(&mut sectors, &mut fat, data));
            } else {
                let first = minifat.len() as u32;
                let n = data.len().div_ceil(MINI_SECTOR_LEN).max(1);
                for i in 0..n {
                    minifat.push(if i + 1 == n {
                        ENDOFCHAIN
                    } else {
                        first + i as u32 + 1
                    });
                }
                let mut padded = data.clone();
                padded.resize(n * MINI_SECTOR_LEN, 0);
                mini_stream.extend_from_slice(&padded);
                starts.push(first);
            }
        }

        let mini_stream_start = if mini_stream.is_empty() {
            ENDOFCHAIN
        } else {
            alloc_chain(&mut sectors, &mut fat, &mini_stream)
        };

        let (minifat_start, num_minifat_sectors) = if minifat.is_empty() {
            (ENDOFCHAIN, 0u32)
        } else {
            let bytes: Vec<u8> = minifat.iter().flat_map(|v| v.to_le_bytes()).collect();
            let start = alloc_chain(&mut sectors, &mut fat, &bytes);
            (start, bytes.len().div_ceil(SECTOR) as u32)
        };

        // Directory: root entry, then one entry per stream chained via the
        // right-sibling pointer.
        let mut dir_data = Vec::new();
        let root_child = if self.streams.is_empty() { NOSTREAM } else { 1 };
        dir_data.extend_from_slice(&dir_entry(
            "Root Entry",
            TYPE_ROOT,
            NOSTREAM,
            root_child,
            mini_stream_start,
            mini_stream.len() as u64,
        ));
        for (i, (name, data)) in self.streams.iter().enumerate() {
            let right = if i + 1 == self.streams.len() {
                NOSTREAM
            } else {
                i as u32 + 2
            };
            dir_data.extend_from_slice(&dir_entry(
                name,
                TYPE_STREAM,
                right,
                NOSTREAM,
                starts[i],
                data.len() as u64,
            ));
        }
        let first_dir_sector = alloc_chain(&mut sectors, &mut fat, &dir_data);

        // FAT sectors go last so every content sector already has its entry.
        let mut num_fat_sectors = 1usize;
        while fat.len() + num_fat_sectors > num_fat_sectors * FAT_PER_SECTOR {
            num_fat_sectors += 1;
        }
        let fat_start = sectors.len() as u32;
        for _ in 0..num_fat_sectors {
            fat.push(FATSECT);
        }
        fat.resize(num_fat_sectors * FAT_PER_SECTOR, FREESECT);
        let fat_bytes: Vec<u8> = fat.iter().flat_map(|v| v.to_le_bytes()).collect();
        for i in 0..num_fat_sectors {
            sectors.push(fat_bytes[i * SECTOR..(i + 1) * SECTOR].to_vec());
        }

        let mut out = header(
            num_fat_sectors as u32,
            first_dir_sector,
            minifat_start,
            num_minifat_sectors,
            fat_start,
        );
        for sector in sectors {
            out.extend_from_slice(&sector);
        }
        out
    }
}

fn dir_entry(name: &str, obj_type: u8, right: u32, child: u32, start: u32, size: u64) -> Vec<u8> {
    let mut e = vec![0u8; DIR_ENTRY_LEN];
    let units: Vec<u16> = name.encode_utf16().collect();
    assert!(units.len() <= 31, "name too long for a directory entry");
    for (i, u) in units.iter().enumerate() {
        e[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
    }
    e[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
    e[66] = obj_type;
    e[67] = 1; // black
    e[68..72].copy_from_slice(&NOSTREAM.to_le_bytes()); // left
    e[72..76].copy_from_slice(&right.to_le_bytes());
    e[76..80].copy_from_slice(&child.to_le_bytes());
    e[116..120].copy_from_slice(&start.to_le_bytes());
    e[120..128].copy_from_slice(&size.to_le_bytes());
    e
}

fn header(
    num_fat_sectors: u32,
    first_dir_sector: u32,
    first_minifat_sector: u32,
    num_minifat_sectors: u32,
    fat_start: u32,
) -> Vec<u8> {
    let mut h = vec![0u8; HEADER_LEN];
    h[..8].copy_from_slice(&MAGIC);
    h[24..26].copy_from_slice(&0x3Eu16.to_le_bytes()); // minor version
    h[26..28].copy_from_slice(&3u16.to_le_bytes());
    h[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    h[30..32].copy_from_slice(&9u16.to_le_bytes());
    h[32..34].copy_from_slice(&6u16.to_le_bytes());
    h[44..48].copy_from_slice(&num_fat_sectors.to_le_bytes());
    h[48..52].copy_from_slice(&first_dir_sector.to_le_bytes());
    h[56..60].copy_from_slice(&(MINI_CUTOFF as u32).to_le_bytes());
    h[60..64].copy_from_slice(&first_minifat_sector.to_le_bytes());
    h[64..68].copy_from_slice(&num_minifat_sectors.to_le_bytes());
    h[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes()); // no DIFAT overflow
    for i in 0..HEADER_DIFAT_SLOTS {
        let v = if (i as u32) < num_fat_sectors {
            fat_start + i as u32
        } else {
            FREESECT
        };
        h[76 + i * 4..80 + i * 4].copy_from_slice(&v.to_le_bytes());
    }
    h
}
