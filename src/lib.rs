//! A reader for Heidelberg Engineering `.e2e` OCT capture files.
//!
//! An `.e2e` file is a linked list of directory nodes, each holding a table
//! of entries that point at out-of-line chunks elsewhere in the file. Chunks
//! carry patient demographics, B-scan metadata, segmentation contours, and
//! either OCT B-scan slices or fundus (en-face) photographs, all tagged with
//! a `(patient_id, study_id, series_id, slice_id)` quadruple.
//!
//! [`read_oct_volumes`] assembles the B-scan slices into volumes; pixel
//! values are decoded from the vendor's custom 16-bit float (see
//! [`ufloat16`]) and gamma-corrected the way the source reader does.
//! [`read_fundus_images`] extracts the accompanying fundus photographs.
//! Both walk the directory chain independently and make their own full pass
//! over the chunk references — there is no shared state between the two
//! calls.

pub mod byte_reader;
pub mod chunk;
pub mod dates;
pub mod directory;
pub mod error;
pub mod records;
pub mod ufloat16;
pub mod volume;

use std::path::Path;

pub use error::{Error, Result};
pub use volume::{FundusImage, FundusPixels, Laterality, OctSlice, OctVolume};

use byte_reader::ByteReader;
use chunk::ParseState;
use ufloat16::UFloat16Lut;

/// Parses every OCT B-scan volume out of the `.e2e` file at `path`.
///
/// Each distinct `(patient_id, study_id, series_id)` triple declared by the
/// directory scan becomes one [`OctVolume`], provided at least its first
/// slice was actually filled by an image chunk; triples seen only on image
/// chunks (never declared by a sub-directory entry) are returned as
/// additional orphan volumes.
pub fn read_oct_volumes(path: &Path) -> Result<Vec<OctVolume>> {
    let mut reader = ByteReader::open(path)?;
    let scan = directory::scan(&mut reader)?;
    let lut = UFloat16Lut::new();
    let mut state = ParseState::new(&scan.declared_slice_extent);
    chunk::dispatch_for_oct(&mut reader, &scan.chunk_refs, &lut, &mut state)?;
    Ok(volume::assemble_oct_volumes(state, &scan.declared_slice_extent))
}

/// Parses every fundus (en-face) photograph out of the `.e2e` file at
/// `path`.
pub fn read_fundus_images(path: &Path) -> Result<Vec<FundusImage>> {
    let mut reader = ByteReader::open(path)?;
    let scan = directory::scan(&mut reader)?;
    let mut state = ParseState::new(&scan.declared_slice_extent);
    chunk::dispatch_for_fundus(&mut reader, &scan.chunk_refs, &mut state)?;
    Ok(volume::assemble_fundus_images(state))
}
