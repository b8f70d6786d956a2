//! Visits every referenced chunk and accumulates their contents into a
//! [`ParseState`].
//!
//! A chunk whose own header or payload fails to decode is logged and
//! skipped — it never aborts the rest of the parse. The one exception is an
//! image chunk declaring zero pixels, which ends the scan early (preserved
//! from the source reader, see SPEC_FULL.md §9).

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::byte_reader::ByteReader;
use crate::directory::ChunkRef;
use crate::error::Result;
use crate::records::{
    BScanMetadata, ChunkHeader, ContourHeader, ImageHeader, LateralityRecord, PatientRecord,
};
use crate::ufloat16::UFloat16Lut;
use crate::volume::{FundusPixels, Laterality, OctSlice};

const CHUNK_TYPE_PATIENT: u32 = 9;
const CHUNK_TYPE_BSCAN_METADATA: u32 = 10004;
const CHUNK_TYPE_LATERALITY: u32 = 11;
const CHUNK_TYPE_CONTOUR: u32 = 10019;
const CHUNK_TYPE_IMAGE: u32 = 1_073_741_824;

const IMAGE_KIND_FUNDUS: u16 = 0;
const IMAGE_KIND_OCT: u16 = 1;

/// The single mutable record threaded through one full dispatch pass over
/// the chunk references, replacing a bag of loose running fields with one
/// explicit value.
#[derive(Default)]
pub struct ParseState {
    pub patient_id: Option<String>,
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub sex: Option<String>,
    pub acquisition_date: Option<NaiveDate>,

    /// The most recently decoded laterality chunk, carried forward until
    /// overwritten or invalidated by a later one.
    laterality: Option<Laterality>,

    pub volume_slices: HashMap<String, Vec<Option<OctSlice>>>,
    pub volume_slices_extra: HashMap<String, Vec<OctSlice>>,
    pub volume_laterality: HashMap<String, Laterality>,
    pub contours: HashMap<String, HashMap<String, HashMap<i64, Vec<f32>>>>,

    pub fundus_pixels: HashMap<String, FundusPixels>,
    pub fundus_laterality: HashMap<String, Option<Laterality>>,
}

impl ParseState {
    /// Pre-sizes every declared volume's slot array so a slice chunk can be
    /// placed by index without reallocating the volume underneath it.
    pub fn new(declared_slice_extent: &HashMap<String, f64>) -> Self {
        let mut state = ParseState::default();
        for (volume_id, max_half) in declared_slice_extent {
            if *max_half > 0.0 {
                let len = max_half.trunc() as i64 + 1;
                state
                    .volume_slices
                    .insert(volume_id.clone(), vec![None; len.max(0) as usize]);
            }
        }
        state
    }
}

fn half_index(slice_id: i32) -> i64 {
    (slice_id as f64 / 2.0).trunc() as i64
}

fn decode_patient(state: &mut ParseState, raw: &[u8]) {
    if let Ok(patient) = PatientRecord::decode(raw) {
        state.sex = Some(patient.sex);
        state.first_name = Some(patient.first_name);
        state.surname = Some(patient.surname);
        state.patient_id = Some(patient.patient_id);
    }
    // A corrupt patient record is silently ignored: it must not abort the
    // rest of the parse, and the demographic fields it would have filled
    // just stay absent.
}

fn decode_bscan_metadata(state: &mut ParseState, raw: &[u8]) {
    match BScanMetadata::decode(raw) {
        Ok(meta) if state.acquisition_date.is_none() => {
            state.acquisition_date = Some(crate::dates::acquisition_datetime(meta.acquisition_time).date());
        }
        Ok(_) => {}
        Err(e) => log::warn!("could not decode B-scan metadata: {e}"),
    }
}

fn decode_laterality(state: &mut ParseState, raw: &[u8]) {
    state.laterality = LateralityRecord::decode(raw)
        .ok()
        .and_then(|record| Laterality::from_code(record.laterality_code));
}

fn decode_contour(state: &mut ParseState, reader: &mut ByteReader, header: &ChunkHeader, raw: &[u8]) -> Result<()> {
    let contour = match ContourHeader::decode(raw) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("could not decode contour header: {e}");
            return Ok(());
        }
    };
    if contour.width == 0 {
        return Ok(());
    }

    let expected_bytes = contour.width as usize * 4;
    let float_bytes = reader.read_up_to(expected_bytes)?;
    if float_bytes.len() != expected_bytes {
        log::warn!(
            "contour {} truncated: expected {expected_bytes} bytes, got {}",
            contour.id,
            float_bytes.len()
        );
        return Ok(());
    }

    let values: Vec<f32> = float_bytes
        .chunks_exact(4)
        .map(|raw_value| {
            let value = f32::from_le_bytes(raw_value.try_into().unwrap());
            // The vendor encodes "no data here" as either a near-zero
            // sentinel or saturated f32::MAX.
            if value.abs() < 1e-9 || value == f32::MAX {
                f32::NAN
            } else {
                value
            }
        })
        .collect();

    let slice_index = half_index(header.slice_id) - 1;
    state
        .contours
        .entry(header.volume_id())
        .or_default()
        .entry(format!("contour{}", contour.id))
        .or_default()
        .insert(slice_index, values);
    Ok(())
}

fn decode_oct_image(
    state: &mut ParseState,
    reader: &mut ByteReader,
    header: &ChunkHeader,
    image: &ImageHeader,
    lut: &UFloat16Lut,
) -> Result<()> {
    let count = image.pixel_count();
    let expected_bytes = count * 2;
    let raw = reader.read_up_to(expected_bytes)?;
    let volume_id = header.volume_id();

    if raw.len() != expected_bytes {
        log::warn!(
            "OCT image for {volume_id} truncated: expected {expected_bytes} bytes, got {}",
            raw.len()
        );
        return Ok(());
    }

    let pixels: Vec<f32> = raw
        .chunks_exact(2)
        .map(|b| {
            let raw_pixel = u16::from_le_bytes(b.try_into().unwrap());
            256.0 * lut.get(raw_pixel).powf(1.0 / 2.4)
        })
        .collect();

    let slice = OctSlice {
        width: image.width as usize,
        height: image.height as usize,
        pixels,
    };
    let slot = half_index(header.slice_id) - 1;

    match state.volume_slices.get_mut(&volume_id) {
        Some(slots) => match usize::try_from(slot) {
            Ok(index) if index < slots.len() => slots[index] = Some(slice),
            _ => log::warn!("slice index {slot} out of range for volume {volume_id}"),
        },
        None => state
            .volume_slices_extra
            .entry(volume_id.clone())
            .or_default()
            .push(slice),
    }

    if let Some(laterality) = state.laterality {
        state.volume_laterality.entry(volume_id).or_insert(laterality);
    }

    Ok(())
}

fn decode_fundus_image(
    state: &mut ParseState,
    reader: &mut ByteReader,
    header: &ChunkHeader,
    image: &ImageHeader,
) -> Result<()> {
    let count = image.pixel_count();
    let raw = reader.read_up_to(count)?;
    let image_id = header.volume_id();

    if raw.len() != count {
        log::warn!(
            "fundus image {image_id} truncated: expected {count} bytes, got {}",
            raw.len()
        );
        return Ok(());
    }

    state.fundus_pixels.insert(
        image_id.clone(),
        FundusPixels {
            width: image.width as usize,
            height: image.height as usize,
            pixels: raw,
        },
    );
    state.fundus_laterality.insert(image_id, state.laterality);
    Ok(())
}

/// Visits every chunk reference, decoding patient, B-scan metadata,
/// laterality, contour, and OCT image chunks into `state`.
pub fn dispatch_for_oct(
    reader: &mut ByteReader,
    chunk_refs: &[ChunkRef],
    lut: &UFloat16Lut,
    state: &mut ParseState,
) -> Result<()> {
    for chunk_ref in chunk_refs {
        reader.seek(chunk_ref.start)?;
        let raw = reader.read_up_to(ChunkHeader::SIZE)?;
        let header = match ChunkHeader::decode(&raw) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("could not decode chunk header at {}: {e}", chunk_ref.start);
                continue;
            }
        };

        match header.kind {
            CHUNK_TYPE_PATIENT => {
                let raw = reader.read_up_to(PatientRecord::SIZE)?;
                decode_patient(state, &raw);
            }
            CHUNK_TYPE_BSCAN_METADATA => {
                let raw = reader.read_up_to(BScanMetadata::SIZE)?;
                decode_bscan_metadata(state, &raw);
            }
            CHUNK_TYPE_LATERALITY => {
                let raw = reader.read_up_to(LateralityRecord::CHUNK_READ_SIZE)?;
                decode_laterality(state, &raw);
            }
            CHUNK_TYPE_CONTOUR => {
                let raw = reader.read_up_to(ContourHeader::SIZE)?;
                decode_contour(state, reader, &header, &raw)?;
            }
            CHUNK_TYPE_IMAGE => {
                let raw = reader.read_up_to(ImageHeader::SIZE)?;
                let image = match ImageHeader::decode(&raw) {
                    Ok(image) => image,
                    Err(e) => {
                        log::warn!("could not decode image header: {e}");
                        continue;
                    }
                };
                if image.pixel_count() == 0 {
                    log::debug!("zero-sized image chunk; stopping directory scan");
                    break;
                }
                if header.ind == IMAGE_KIND_OCT {
                    decode_oct_image(state, reader, &header, &image, lut)?;
                }
                // ind == 0 (fundus) chunks encountered while scanning for
                // OCT volumes are left untouched.
            }
            _ => {}
        }
    }
    Ok(())
}

/// Visits every chunk reference, decoding patient, laterality, and fundus
/// image chunks into `state`.
pub fn dispatch_for_fundus(
    reader: &mut ByteReader,
    chunk_refs: &[ChunkRef],
    state: &mut ParseState,
) -> Result<()> {
    for chunk_ref in chunk_refs {
        reader.seek(chunk_ref.start)?;
        let raw = reader.read_up_to(ChunkHeader::SIZE)?;
        let header = match ChunkHeader::decode(&raw) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("could not decode chunk header at {}: {e}", chunk_ref.start);
                continue;
            }
        };

        match header.kind {
            CHUNK_TYPE_PATIENT => {
                let raw = reader.read_up_to(PatientRecord::SIZE)?;
                decode_patient(state, &raw);
            }
            CHUNK_TYPE_LATERALITY => {
                let raw = reader.read_up_to(LateralityRecord::CHUNK_READ_SIZE)?;
                decode_laterality(state, &raw);
            }
            CHUNK_TYPE_IMAGE => {
                let raw = reader.read_up_to(ImageHeader::SIZE)?;
                let image = match ImageHeader::decode(&raw) {
                    Ok(image) => image,
                    Err(e) => {
                        log::warn!("could not decode image header: {e}");
                        continue;
                    }
                };
                if image.pixel_count() == 0 {
                    log::debug!("zero-sized image chunk; stopping directory scan");
                    break;
                }
                if header.ind == IMAGE_KIND_FUNDUS {
                    decode_fundus_image(state, reader, &header, &image)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_index_truncates_toward_zero() {
        assert_eq!(half_index(0), 0);
        assert_eq!(half_index(1), 0);
        assert_eq!(half_index(2), 1);
        assert_eq!(half_index(3), 1);
        assert_eq!(half_index(5), 2);
    }

    #[test]
    fn parse_state_presizes_declared_volumes() {
        let mut declared = HashMap::new();
        declared.insert("1_2_3".to_string(), 2.0);
        let state = ParseState::new(&declared);
        assert_eq!(state.volume_slices.get("1_2_3").unwrap().len(), 3);
    }

    #[test]
    fn parse_state_routes_zero_extent_triples_to_orphan_bucket() {
        let mut declared = HashMap::new();
        declared.insert("1_2_3".to_string(), 0.0);
        let state = ParseState::new(&declared);
        assert!(state.volume_slices.get("1_2_3").is_none());
    }
}
