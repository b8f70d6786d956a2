//! Bounds-checked, positioned random access over a `.e2e` file.
//!
//! The rest of the parser never touches [`std::fs::File`] directly; every
//! fixed-offset record and every chunk payload is read through a
//! [`ByteReader`], which turns short reads into [`Error::Io`] rather than
//! returning a truncated buffer.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// A positioned view over the container file.
pub struct ByteReader {
    file: File,
}

impl ByteReader {
    /// Opens `path` for reading, mapping a missing file to
    /// [`Error::FileNotFound`] rather than the generic I/O error `File::open`
    /// would otherwise produce.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;
        Ok(Self { file })
    }

    /// Repositions the cursor to an absolute offset from the start of the file.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Reads exactly `len` bytes from the current cursor position.
    ///
    /// Short reads (the file ends before `len` bytes are available) surface
    /// as [`Error::Io`] — callers at fixed mandatory offsets (header, main
    /// directory chain, sub-directory table, chunk header) propagate this as
    /// fatal; the chunk dispatcher instead treats it as a per-chunk decode
    /// failure and keeps going.
    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Seeks to `offset` and reads exactly `len` bytes, a convenience for the
    /// directory walker and chunk dispatcher which address the file purely
    /// by absolute offset.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.seek(offset)?;
        self.read_exact(len)
    }

    /// Reads up to `len` bytes from the current cursor position, returning
    /// fewer if the file ends first instead of erroring.
    ///
    /// Chunk payloads are declared by untrusted in-file sizes; a chunk that
    /// claims more data than the file actually holds must be treated as a
    /// malformed chunk (logged and skipped), not a fatal I/O error. Every
    /// per-chunk read in [`crate::chunk`] goes through this instead of
    /// [`Self::read_exact`]. `len` is never pre-reserved in one shot — a
    /// corrupt `width × height` can claim gigabytes that the file doesn't
    /// actually hold, so this reads in bounded steps and stops the moment
    /// the file runs dry.
    pub fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>> {
        const STEP: usize = 64 * 1024;
        let mut buffer = Vec::new();
        let mut remaining = len;
        let mut step = [0u8; STEP];
        while remaining > 0 {
            let want = remaining.min(STEP);
            let got = self.file.read(&mut step[..want])?;
            if got == 0 {
                break; // short read: file ended before `len` bytes were available
            }
            buffer.extend_from_slice(&step[..got]);
            remaining -= got;
        }
        Ok(buffer)
    }
}
