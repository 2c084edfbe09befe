//! Directory entry parsing and entry-tree construction.
//!
//! Directory sectors hold 128-byte entries whose left/right/child indices
//! form a sibling tree under the root storage. Index fields from the file are
//! untrusted; every walk is bounded and cycle-guarded.

use std::collections::HashSet;

use super::header::{u16_at, u32_at, u64_at, DIR_ENTRY_LEN, NOSTREAM};
use crate::error::{ExtractError, Result};

pub const TYPE_STORAGE: u8 = 1;
pub const TYPE_STREAM: u8 = 2;
pub const TYPE_ROOT: u8 = 5;

/// Raw directory entry as stored in the container.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub obj_type: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub start_sector: u32,
    pub size: u64,
}

impl DirEntry {
    /// Parse one 128-byte slot. Returns `None` for free slots.
    pub fn parse(raw: &[u8], major_version: u16) -> Result<Option<Self>> {
        debug_assert!(raw.len() >= DIR_ENTRY_LEN);

        let obj_type = raw[66];
        if obj_type == 0 {
            return Ok(None);
        }

        let name_len = u16_at(raw, 64) as usize;
        if name_len < 2 || name_len > 64 || name_len % 2 != 0 {
            return Err(ExtractError::ContainerFormat(format!(
                "bad directory name length {}",
                name_len
            )));
        }
        let units: Vec<u16> = (0..name_len / 2 - 1).map(|i| u16_at(raw, i * 2)).collect();
        let name = String::from_utf16_lossy(&units);

        let mut size = u64_at(raw, 120);
        if major_version == 3 {
            // v3 writers leave garbage in the high half of the size field.
            size &= 0xFFFF_FFFF;
        }

        Ok(Some(DirEntry {
            name,
            obj_type,
            left: u32_at(raw, 68),
            right: u32_at(raw, 72),
            child: u32_at(raw, 76),
            start_sector: u32_at(raw, 116),
            size,
        }))
    }
}

/// One node of the parsed container tree, read-only after parse.
#[derive(Debug, Clone)]
pub struct ContainerEntry {
    pub name: String,
    pub is_stream: bool,
    pub size: u64,
    pub children: Vec<ContainerEntry>,
    /// Index into the directory table; used to fetch stream bytes.
    pub(super) dir_index: u32,
}

/// Build the public entry tree rooted at directory entry 0.
pub fn build_tree(dir: &[Option<DirEntry>]) -> Result<ContainerEntry> {
    let root = dir
        .first()
        .and_then(|e| e.as_ref())
        .ok_or_else(|| ExtractError::ContainerFormat("empty directory".into()))?;
    if root.obj_type != TYPE_ROOT {
        return Err(ExtractError::ContainerFormat(
            "first directory entry is not the root storage".into(),
        ));
    }

    let mut visited = HashSet::new();
    let children = build_children(dir, root.child, &mut visited)?;
    Ok(ContainerEntry {
        name: root.name.clone(),
        is_stream: false,
        size: root.size,
        children,
        dir_index: 0,
    })
}

fn build_children(
    dir: &[Option<DirEntry>],
    child: u32,
    visited: &mut HashSet<u32>,
) -> Result<Vec<ContainerEntry>> {
    let mut siblings = Vec::new();
    collect_siblings(dir, child, visited, &mut siblings)?;

    let mut nodes = Vec::with_capacity(siblings.len());
    for idx in siblings {
        let entry = lookup(dir, idx)?;
        let children = if entry.obj_type == TYPE_STORAGE {
            build_children(dir, entry.child, visited)?
        } else {
            Vec::new()
        };
        nodes.push(ContainerEntry {
            name: entry.name.clone(),
            is_stream: entry.obj_type == TYPE_STREAM,
            size: entry.size,
            children,
            dir_index: idx,
        });
    }
    Ok(nodes)
}

/// In-order walk of the left/right sibling tree starting at `idx`.
fn collect_siblings(
    dir: &[Option<DirEntry>],
    idx: u32,
    visited: &mut HashSet<u32>,
    out: &mut Vec<u32>,
) -> Result<()> {
    if idx == NOSTREAM {
        return Ok(());
    }
    if !visited.insert(idx) {
        return Err(ExtractError::ContainerFormat(
            "cycle in directory sibling tree".into(),
        ));
    }
    let entry = lookup(dir, idx)?;
    collect_siblings(dir, entry.left, visited, out)?;
    out.push(idx);
    collect_siblings(dir, entry.right, visited, out)?;
    Ok(())
}

fn lookup(dir: &[Option<DirEntry>], idx: u32) -> Result<&DirEntry> {
    dir.get(idx as usize)
        .and_then(|e| e.as_ref())
        .ok_or_else(|| {
            ExtractError::ContainerFormat(format!("directory index {} out of range", idx))
        })
}
