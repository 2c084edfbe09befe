//! Compound-container (OLE/CFB) reader.
//!
//! Family files are CFB containers holding named streams under a directory
//! tree. The reader parses the header, DIFAT/FAT/miniFAT and directory
//! eagerly at open, then fetches stream bytes on demand. It opens the source
//! with shared-read semantics and never mutates it; other processes may hold
//! or even rewrite the file while we read, which surfaces as a retryable
//! `Io` error rather than a parse failure.

mod directory;
mod header;
#[cfg(test)]
pub(crate) mod testfile;

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub use directory::ContainerEntry;
use directory::{DirEntry, TYPE_STREAM};
use header::{Header, DIFSECT, DIR_ENTRY_LEN, ENDOFCHAIN, FREESECT, HEADER_LEN, MINI_SECTOR_LEN};

use crate::error::{ExtractError, Result};

/// A parsed compound file. One instance per open; the entry tree is
/// read-only after parse.
pub struct CompoundFile {
    file: File,
    header: Header,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    dir: Vec<Option<DirEntry>>,
    root: ContainerEntry,
}

impl CompoundFile {
    /// Open and parse a container with a shared-read handle.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = open_shared(path)?;

        let mut head = vec![0u8; HEADER_LEN];
        read_exact_or_format(&mut file, &mut head, "header")?;
        let header = Header::parse(&head)?;

        let mut this = CompoundFile {
            file,
            header,
            fat: Vec::new(),
            minifat: Vec::new(),
            dir: Vec::new(),
            root: ContainerEntry {
                name: String::new(),
                is_stream: false,
                size: 0,
                children: Vec::new(),
                dir_index: 0,
            },
        };
        this.load_fat()?;
        this.load_minifat()?;
        this.load_directory()?;
        this.root = directory::build_tree(&this.dir)?;
        Ok(this)
    }

    /// Root of the parsed entry tree.
    pub fn root(&self) -> &ContainerEntry {
        &self.root
    }

    /// Exact-name lookup of a root-level stream.
    pub fn stream(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .root
            .children
            .iter()
            .find(|e| e.is_stream && e.name == name)
            .cloned()
            .ok_or_else(|| ExtractError::StreamNotFound(name.to_string()))?;
        self.read_entry(&entry)
    }

    /// Walk entries under the root, depth-first. With `recursive == false`
    /// only root-level entries are visited.
    pub fn visit_entries<F>(&self, recursive: bool, mut f: F)
    where
        F: FnMut(&ContainerEntry),
    {
        fn walk<F: FnMut(&ContainerEntry)>(nodes: &[ContainerEntry], recursive: bool, f: &mut F) {
            for node in nodes {
                f(node);
                if recursive {
                    walk(&node.children, recursive, f);
                }
            }
        }
        walk(&self.root.children, recursive, &mut f);
    }

    /// Fetch the bytes of a stream entry previously discovered via
    /// [`CompoundFile::root`] or [`CompoundFile::visit_entries`].
    pub fn read_entry(&mut self, entry: &ContainerEntry) -> Result<Vec<u8>> {
        if !entry.is_stream {
            return Err(ExtractError::StreamNotFound(entry.name.clone()));
        }
        let dir_entry = self
            .dir
            .get(entry.dir_index as usize)
            .and_then(|e| e.clone())
            .filter(|e| e.obj_type == TYPE_STREAM)
            .ok_or_else(|| ExtractError::StreamNotFound(entry.name.clone()))?;

        if dir_entry.size == 0 {
            return Ok(Vec::new());
        }
        if dir_entry.size < self.header.mini_cutoff {
            self.read_mini_stream(&dir_entry)
        } else {
            self.read_chain_data(dir_entry.start_sector, dir_entry.size)
        }
    }

    fn load_fat(&mut self) -> Result<()> {
        let mut fat_sectors: Vec<u32> = self.header.difat_head.clone();

        // DIFAT overflow sectors chain through their last slot. The walk is
        // bounded by how many sectors the file can physically hold, not by
        // the header's own sector count, which a malformed file can inflate.
        let max_difat_sectors = self.file.metadata()?.len() / self.header.sector_len as u64;
        let mut visited: HashSet<u32> = HashSet::new();
        let mut difat_sector = self.header.first_difat_sector;
        while difat_sector != ENDOFCHAIN && difat_sector != FREESECT {
            if !visited.insert(difat_sector) {
                return Err(ExtractError::ContainerFormat("DIFAT chain cycles".into()));
            }
            if visited.len() as u64 > max_difat_sectors {
                return Err(ExtractError::ContainerFormat(
                    "DIFAT chain longer than the file".into(),
                ));
            }
            let raw = self.read_sector(difat_sector)?;
            let slots = self.header.sector_len / 4 - 1;
            for i in 0..slots {
                let v = header::u32_at(&raw, i * 4);
                if v != FREESECT {
                    fat_sectors.push(v);
                }
            }
            difat_sector = header::u32_at(&raw, slots * 4);
        }

        if fat_sectors.len() != self.header.num_fat_sectors as usize {
            return Err(ExtractError::ContainerFormat(format!(
                "DIFAT lists {} FAT sectors, header says {}",
                fat_sectors.len(),
                self.header.num_fat_sectors
            )));
        }

        let entries_per_sector = self.header.sector_len / 4;
        let mut fat = Vec::with_capacity(fat_sectors.len() * entries_per_sector);
        for sector in fat_sectors {
            let raw = self.read_sector(sector)?;
            for i in 0..entries_per_sector {
                fat.push(header::u32_at(&raw, i * 4));
            }
        }
        self.fat = fat;
        Ok(())
    }

    fn load_minifat(&mut self) -> Result<()> {
        if self.header.num_minifat_sectors == 0 {
            return Ok(());
        }
        let chain = self.chain(self.header.first_minifat_sector)?;
        let mut minifat = Vec::with_capacity(chain.len() * (self.header.sector_len / 4));
        for sector in chain {
            let raw = self.read_sector(sector)?;
            for i in 0..self.header.sector_len / 4 {
                minifat.push(header::u32_at(&raw, i * 4));
            }
        }
        self.minifat = minifat;
        Ok(())
    }

    fn load_directory(&mut self) -> Result<()> {
        let chain = self.chain(self.header.first_dir_sector)?;
        let per_sector = self.header.sector_len / DIR_ENTRY_LEN;
        let mut dir = Vec::with_capacity(chain.len() * per_sector);
        for sector in chain {
            let raw = self.read_sector(sector)?;
            for i in 0..per_sector {
                dir.push(DirEntry::parse(
                    &raw[i * DIR_ENTRY_LEN..(i + 1) * DIR_ENTRY_LEN],
                    self.header.major_version,
                )?);
            }
        }
        self.dir = dir;
        Ok(())
    }

    /// Walk a FAT chain from `start`, cycle-guarded by table length.
    fn chain(&self, start: u32) -> Result<Vec<u32>> {
        let mut sectors = Vec::new();
        let mut current = start;
        while current != ENDOFCHAIN {
            if sectors.len() > self.fat.len() {
                return Err(ExtractError::ContainerFormat("cycle in FAT chain".into()));
            }
            let next = *self.fat.get(current as usize).ok_or_else(|| {
                ExtractError::ContainerFormat(format!("FAT index {} out of range", current))
            })?;
            sectors.push(current);
            current = next;
        }
        Ok(sectors)
    }

    fn read_chain_data(&mut self, start: u32, size: u64) -> Result<Vec<u8>> {
        let chain = self.chain(start)?;
        if (chain.len() as u64) * (self.header.sector_len as u64) < size {
            return Err(ExtractError::ContainerFormat(
                "stream chain shorter than declared size".into(),
            ));
        }
        let mut data = Vec::with_capacity(chain.len() * self.header.sector_len);
        for sector in chain {
            data.extend_from_slice(&self.read_sector(sector)?);
        }
        data.truncate(size as usize);
        Ok(data)
    }

    /// Small streams live in the mini stream (the root entry's chain),
    /// addressed in 64-byte mini sectors through the miniFAT.
    fn read_mini_stream(&mut self, entry: &DirEntry) -> Result<Vec<u8>> {
        let root = self
            .dir
            .first()
            .and_then(|e| e.clone())
            .ok_or_else(|| ExtractError::ContainerFormat("missing root entry".into()))?;
        let mini_stream = self.read_chain_data(root.start_sector, root.size)?;

        let mut data = Vec::with_capacity(entry.size as usize);
        let mut current = entry.start_sector;
        let mut steps = 0usize;
        while current != ENDOFCHAIN {
            if steps > self.minifat.len() {
                return Err(ExtractError::ContainerFormat("cycle in miniFAT chain".into()));
            }
            let off = current as usize * MINI_SECTOR_LEN;
            let end = off + MINI_SECTOR_LEN;
            if end > mini_stream.len() {
                return Err(ExtractError::ContainerFormat(format!(
                    "mini sector {} beyond mini stream",
                    current
                )));
            }
            data.extend_from_slice(&mini_stream[off..end]);
            current = *self.minifat.get(current as usize).ok_or_else(|| {
                ExtractError::ContainerFormat(format!("miniFAT index {} out of range", current))
            })?;
            steps += 1;
        }
        if (data.len() as u64) < entry.size {
            return Err(ExtractError::ContainerFormat(
                "mini chain shorter than declared size".into(),
            ));
        }
        data.truncate(entry.size as usize);
        Ok(data)
    }

    fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
        if sector >= DIFSECT {
            return Err(ExtractError::ContainerFormat(format!(
                "sentinel {:#010x} used as sector number",
                sector
            )));
        }
        let mut buf = vec![0u8; self.header.sector_len];
        self.file
            .seek(SeekFrom::Start(self.header.sector_offset(sector)))?;
        read_exact_or_format(&mut self.file, &mut buf, "sector")?;
        Ok(buf)
    }
}

/// Open for reading without demanding exclusivity. The host application or
/// a sync client may hold the file; on Windows the share mode must allow
/// concurrent readers, writers and deleters.
fn open_shared(path: &Path) -> Result<File> {
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        const SHARE_ALL: u32 = 0x1 | 0x2 | 0x4; // read | write | delete
        Ok(std::fs::OpenOptions::new()
            .read(true)
            .share_mode(SHARE_ALL)
            .open(path)?)
    }
    #[cfg(not(windows))]
    {
        Ok(File::open(path)?)
    }
}

/// A short read of structural data means the file is not (or no longer) a
/// whole container; report it as a format error so callers fall back to raw
/// scanning instead of retrying.
fn read_exact_or_format(file: &mut File, buf: &mut [u8], what: &str) -> Result<()> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            ExtractError::ContainerFormat(format!("truncated {}", what)),
        ),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::testfile::CfbBuilder;
    use super::*;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn small_stream_round_trips_through_mini_stream() {
        let payload = b"hello mini stream".to_vec();
        let file = write_temp(
            &CfbBuilder::new()
                .stream("BasicFileInfo", payload.clone())
                .build(),
        );
        let mut cf = CompoundFile::open(file.path()).unwrap();
        assert_eq!(cf.stream("BasicFileInfo").unwrap(), payload);
    }

    #[test]
    fn large_stream_round_trips_through_fat_chain() {
        // Above the 4096-byte mini cutoff, spanning several sectors.
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = write_temp(&CfbBuilder::new().stream("Contents", payload.clone()).build());
        let mut cf = CompoundFile::open(file.path()).unwrap();
        assert_eq!(cf.stream("Contents").unwrap(), payload);
    }

    #[test]
    fn several_streams_coexist() {
        let file = write_temp(
            &CfbBuilder::new()
                .stream("Alpha", b"aaa".to_vec())
                .stream("Beta", vec![0x42; 5000])
                .stream("Gamma", b"ggg".to_vec())
                .build(),
        );
        let mut cf = CompoundFile::open(file.path()).unwrap();
        assert_eq!(cf.stream("Alpha").unwrap(), b"aaa");
        assert_eq!(cf.stream("Beta").unwrap(), vec![0x42; 5000]);
        assert_eq!(cf.stream("Gamma").unwrap(), b"ggg");
    }

    #[test]
    fn missing_stream_is_not_found() {
        let file = write_temp(&CfbBuilder::new().stream("A", b"x".to_vec()).build());
        let mut cf = CompoundFile::open(file.path()).unwrap();
        assert!(matches!(
            cf.stream("Nope"),
            Err(ExtractError::StreamNotFound(_))
        ));
    }

    #[test]
    fn non_container_bytes_are_a_format_error() {
        let file = write_temp(b"just some text, definitely not CFB");
        assert!(matches!(
            CompoundFile::open(file.path()),
            Err(ExtractError::ContainerFormat(_))
        ));
    }

    #[test]
    fn zero_length_file_is_a_format_error() {
        let file = write_temp(b"");
        assert!(matches!(
            CompoundFile::open(file.path()),
            Err(ExtractError::ContainerFormat(_))
        ));
    }

    #[test]
    fn visit_entries_sees_root_level_streams() {
        let file = write_temp(
            &CfbBuilder::new()
                .stream("RevitPreview4.0", vec![1, 2, 3])
                .stream("PartAtom", b"<xml/>".to_vec())
                .build(),
        );
        let cf = CompoundFile::open(file.path()).unwrap();
        let mut names = Vec::new();
        cf.visit_entries(false, |e| names.push(e.name.clone()));
        names.sort();
        assert_eq!(names, vec!["PartAtom", "RevitPreview4.0"]);
    }

    #[test]
    fn cyclic_difat_chain_is_rejected_quickly() {
        // Two DIFAT sectors chaining to each other while the header claims
        // u32::MAX of them; the walk must fail on structure, not trust the
        // header's count.
        let mut bytes = vec![0u8; HEADER_LEN + 2 * 512];
        bytes[..8].copy_from_slice(&header::MAGIC);
        bytes[26..28].copy_from_slice(&3u16.to_le_bytes());
        bytes[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
        bytes[30..32].copy_from_slice(&9u16.to_le_bytes());
        bytes[32..34].copy_from_slice(&6u16.to_le_bytes());
        bytes[56..60].copy_from_slice(&4096u32.to_le_bytes());
        bytes[68..72].copy_from_slice(&0u32.to_le_bytes()); // first DIFAT sector
        bytes[72..76].copy_from_slice(&u32::MAX.to_le_bytes()); // claimed count
        for i in 0..109 {
            bytes[76 + i * 4..80 + i * 4].copy_from_slice(&FREESECT.to_le_bytes());
        }
        for off in (HEADER_LEN..HEADER_LEN + 1024).step_by(4) {
            bytes[off..off + 4].copy_from_slice(&FREESECT.to_le_bytes());
        }
        // Sector 0 chains to sector 1 and back.
        bytes[HEADER_LEN + 508..HEADER_LEN + 512].copy_from_slice(&1u32.to_le_bytes());
        bytes[HEADER_LEN + 1020..HEADER_LEN + 1024].copy_from_slice(&0u32.to_le_bytes());

        let file = write_temp(&bytes);
        assert!(matches!(
            CompoundFile::open(file.path()),
            Err(ExtractError::ContainerFormat(_))
        ));
    }

    #[test]
    fn corrupt_fat_chain_is_detected() {
        let mut bytes = CfbBuilder::new().stream("A", vec![7; 5000]).build();
        // Stomp the FAT so the stream chain points at a bogus sector. FAT
        // sector is the last one in the builder's layout.
        let fat_off = bytes.len() - 512;
        bytes[fat_off..fat_off + 4].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        let file = write_temp(&bytes);
        match CompoundFile::open(file.path()) {
            // Depending on which chain hits the stomped entry first, open
            // itself or the stream read fails; both must be format errors.
            Err(ExtractError::ContainerFormat(_)) => {}
            Ok(mut cf) => {
                assert!(matches!(
                    cf.stream("A"),
                    Err(ExtractError::ContainerFormat(_))
                ));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
