//! Walks the main directory chain and the sub-directory tables it points
//! at, producing the flat list of chunks the dispatcher will visit and the
//! declared slice extent of every volume it saw referenced.

use std::collections::HashMap;

use crate::byte_reader::ByteReader;
use crate::error::{Error, Result};
use crate::records::{Header, MainDirectory, SubDirectory};

/// A reference to an out-of-line chunk discovered while scanning the
/// sub-directory tables.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRef {
    pub start: u64,
}

/// The result of walking the whole directory chain.
pub struct DirectoryScan {
    pub chunk_refs: Vec<ChunkRef>,
    /// Per volume id, the largest `slice_id / 2` declared by any
    /// sub-directory entry referencing it. Used to size a volume's slot
    /// array before any image chunk has actually been visited.
    pub declared_slice_extent: HashMap<String, f64>,
}

/// Reads the file header, the main directory chain, and every sub-directory
/// table it references.
///
/// Mirrors the source reader's structural scan: a malformed header or
/// directory node is fatal (there would be nothing trustworthy left to
/// traverse), while an individual out-of-line chunk's own payload is only
/// ever validated later, by [`crate::chunk`], where failure just means
/// skipping that chunk.
pub fn scan(reader: &mut ByteReader) -> Result<DirectoryScan> {
    let raw = reader.read_at(0, Header::SIZE)?;
    Header::decode(&raw).map_err(|e| Error::MalformedHeader(e.0))?;

    let raw = reader.read_at(36, MainDirectory::SIZE)?;
    let root = MainDirectory::decode(&raw).map_err(|e| Error::MalformedHeader(e.0))?;

    let mut positions = Vec::new();
    let mut current = root.current as u64;
    while current != 0 {
        positions.push(current);
        let raw = reader.read_at(current, MainDirectory::SIZE)?;
        let directory = MainDirectory::decode(&raw).map_err(|e| Error::MalformedHeader(e.0))?;
        current = directory.prev as u64;
    }

    let mut chunk_refs = Vec::new();
    let mut declared_slice_extent: HashMap<String, f64> = HashMap::new();

    for position in positions {
        reader.seek(position)?;
        let raw = reader.read_exact(MainDirectory::SIZE)?;
        let directory = MainDirectory::decode(&raw).map_err(|e| Error::MalformedHeader(e.0))?;

        for _ in 0..directory.num_entries {
            let raw = reader.read_exact(SubDirectory::SIZE)?;
            let entry = SubDirectory::decode(&raw).map_err(|e| Error::MalformedHeader(e.0))?;

            let half = entry.slice_id as f64 / 2.0;
            declared_slice_extent
                .entry(entry.volume_id())
                .and_modify(|max| {
                    if half > *max {
                        *max = half;
                    }
                })
                .or_insert(half);

            if entry.start > entry.pos {
                chunk_refs.push(ChunkRef {
                    start: entry.start as u64,
                });
            }
        }
    }

    Ok(DirectoryScan {
        chunk_refs,
        declared_slice_extent,
    })
}
