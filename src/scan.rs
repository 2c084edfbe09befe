//! Raw byte-signature scanning.
//!
//! The resilience fallback for files whose container structure is absent or
//! mangled: slide a bounded window over the file prefix looking for image
//! magic bytes, then carve a delimited image out of the raw bytes. Reads are
//! buffered; at every buffer boundary the next read backs up by
//! `longest signature - 1` bytes so a signature split across two reads is
//! never missed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::config::{PipelineConfig, DEFAULT_SCAN_BUF, DEFAULT_SCAN_CAP};
use crate::error::{ExtractError, Result};

pub const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
pub const BMP_SIGNATURE: &[u8] = &[0x42, 0x4D];
/// PNG trailer chunk tag; the chunk is the tag plus a 4-byte CRC.
pub const PNG_IEND: &[u8] = &[0x49, 0x45, 0x4E, 0x44];

const IEND_TAIL: u64 = 8; // tag + CRC

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Bmp,
}

/// A self-contained image carved out of raw bytes.
#[derive(Debug, Clone)]
pub struct CarvedImage {
    pub kind: ImageKind,
    /// Absolute offset of the signature in the source.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Bounded sliding-window scanner. Stateless; safe to share across calls.
#[derive(Debug, Clone, Copy)]
pub struct SignatureScanner {
    cap: u64,
    buffer: usize,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self {
            cap: DEFAULT_SCAN_CAP,
            buffer: DEFAULT_SCAN_BUF,
        }
    }
}

impl SignatureScanner {
    pub fn new(cap: u64, buffer: usize) -> Self {
        // A window smaller than a signature cannot make progress.
        Self {
            cap,
            buffer: buffer.max(16),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.scan_cap_bytes, cfg.scan_buffer_bytes)
    }

    /// Scan a file for the first embedded image and carve it out.
    pub fn scan_file(&self, path: &Path) -> Result<CarvedImage> {
        let mut file = File::open(path)?;
        self.scan(&mut file)
    }

    /// Scan any seekable byte source within the prefix cap.
    pub fn scan<R: Read + Seek>(&self, source: &mut R) -> Result<CarvedImage> {
        let hit = self.find_first(source, &[PNG_SIGNATURE, BMP_SIGNATURE], 0)?;
        let (offset, kind) = match hit {
            Some((off, 0)) => (off, ImageKind::Png),
            Some((off, _)) => (off, ImageKind::Bmp),
            None => {
                return Err(ExtractError::SignatureNotFound {
                    scanned: self.scanned_len(source)?,
                })
            }
        };

        let end = match kind {
            ImageKind::Png => {
                // Carve through IEND + CRC; fall back to the scanned window
                // remainder when the terminator never shows up (truncated
                // previews are still worth returning).
                match self.find_first(source, &[PNG_IEND], offset + PNG_SIGNATURE.len() as u64)? {
                    Some((iend, _)) => iend + IEND_TAIL,
                    None => {
                        debug!(offset, "PNG terminator not found within cap, best-effort carve");
                        self.cap
                    }
                }
            }
            // BMP has no terminator convention: take the signature to the
            // end of the scanned window.
            ImageKind::Bmp => self.cap,
        };

        let bytes = read_range(source, offset, end.saturating_sub(offset))?;
        debug!(?kind, offset, len = bytes.len(), "carved embedded image");
        Ok(CarvedImage {
            kind,
            offset,
            bytes,
        })
    }

    /// Find the earliest occurrence of any of `needles` at or after `start`,
    /// limited to the scan cap. Returns the absolute offset and the index of
    /// the needle that matched.
    fn find_first<R: Read + Seek>(
        &self,
        source: &mut R,
        needles: &[&[u8]],
        start: u64,
    ) -> Result<Option<(u64, usize)>> {
        let overlap = needles.iter().map(|n| n.len()).max().unwrap_or(1) - 1;
        let mut pos = start;
        let mut buf = vec![0u8; self.buffer];

        while pos < self.cap {
            source.seek(SeekFrom::Start(pos))?;
            let want = (self.cap - pos).min(self.buffer as u64) as usize;
            let got = fill(source, &mut buf[..want])?;
            if got == 0 {
                break;
            }

            let window = &buf[..got];
            let mut best: Option<(usize, usize)> = None;
            for (i, needle) in needles.iter().enumerate() {
                if let Some(at) = find_pattern(window, needle) {
                    if best.map_or(true, |(b, _)| at < b) {
                        best = Some((at, i));
                    }
                }
            }
            if let Some((at, which)) = best {
                return Ok(Some((pos + at as u64, which)));
            }

            if got < want || got <= overlap {
                break; // EOF or cap exhausted inside the window
            }
            // Back up so a needle straddling this boundary is re-examined.
            pos += (got - overlap) as u64;
        }
        Ok(None)
    }

    fn scanned_len<R: Seek>(&self, source: &mut R) -> Result<u64> {
        let len = source.seek(SeekFrom::End(0))?;
        Ok(len.min(self.cap))
    }
}

fn find_pattern(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read up to `max_len` bytes from `start`; short reads at EOF are fine.
fn read_range<R: Read + Seek>(source: &mut R, start: u64, max_len: u64) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(start))?;
    let mut out = Vec::new();
    source.take(max_len).read_to_end(&mut out)?;
    Ok(out)
}

fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        let n = source.read(&mut buf[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    Ok(got)
}
