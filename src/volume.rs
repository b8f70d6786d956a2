//! Output entities and final assembly of a [`crate::chunk::ParseState`] into
//! volumes and fundus images.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::chunk::ParseState;

/// Which eye an image was captured from. Absent rather than a third
/// variant: not every chunk stream carries a recognized laterality code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Laterality {
    Left,
    Right,
}

impl Laterality {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'R' => Some(Laterality::Right),
            b'L' => Some(Laterality::Left),
            _ => None,
        }
    }
}

/// One decoded B-scan cross-section.
///
/// Pixels are stored in the order they were read off disk: `width` rows of
/// `height` elements each. This is the format's native orientation, the
/// transpose of the usual (rows, columns) image convention — see
/// [`Self::get`].
#[derive(Debug, Clone, Serialize)]
pub struct OctSlice {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl OctSlice {
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * self.height + col]
    }
}

/// One decoded fundus (en-face) image, stored row-major as `height` rows of
/// `width` elements each — the usual image convention.
#[derive(Debug, Clone, Serialize)]
pub struct FundusPixels {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl FundusPixels {
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * self.width + col]
    }
}

/// One assembled OCT volume: every slice sharing a `patient_id_study_id_series_id`
/// triple, plus whatever patient metadata and contours were captured for it.
#[derive(Debug, Clone, Serialize)]
pub struct OctVolume {
    pub volume_id: String,
    pub patient_id: Option<String>,
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub sex: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub laterality: Option<Laterality>,
    /// One entry per declared slice position, `None` where that slot was
    /// never filled by an image chunk. Only slot 0 being absent drops the
    /// whole volume (see [`assemble_oct_volumes`]); a hole elsewhere in the
    /// sequence — a sparse acquisition — is kept rather than silently
    /// shrinking the volume's length.
    pub slices: Vec<Option<OctSlice>>,
    /// Named contour sequences (e.g. `"contour0"`), one entry per slice
    /// index, `None` where no contour chunk was captured for that slice.
    pub contours: HashMap<String, Vec<Option<Vec<f32>>>>,
}

impl OctVolume {
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }
}

/// One assembled fundus image.
#[derive(Debug, Clone, Serialize)]
pub struct FundusImage {
    pub image_id: String,
    pub patient_id: Option<String>,
    pub laterality: Option<Laterality>,
    pub image: FundusPixels,
}

/// Turns the accumulated parse state into the final volume list.
///
/// A volume whose first slot was never filled never received any image
/// data at all and is dropped entirely, the same check the source reader
/// makes (it tests whether slot 0 is still its placeholder). Any other
/// unfilled slot is kept as `None` rather than dropped — a declared volume
/// always comes back at its declared length. Chunks whose triple was never
/// declared by the directory scan are returned as additional volumes, one
/// per distinct triple, in the order their first slice was encountered.
pub fn assemble_oct_volumes(state: ParseState, declared_slice_extent: &HashMap<String, f64>) -> Vec<OctVolume> {
    let ParseState {
        patient_id,
        first_name,
        surname,
        sex,
        acquisition_date,
        volume_slices,
        volume_slices_extra,
        volume_laterality,
        contours,
        ..
    } = state;

    let mut volumes = Vec::new();

    for (volume_id, slots) in volume_slices {
        if slots.first().map(Option::is_none).unwrap_or(true) {
            continue;
        }
        volumes.push(OctVolume {
            volume_id: volume_id.clone(),
            patient_id: patient_id.clone(),
            first_name: first_name.clone(),
            surname: surname.clone(),
            sex: sex.clone(),
            acquisition_date,
            laterality: volume_laterality.get(&volume_id).copied(),
            slices: slots,
            contours: materialize_contours(&volume_id, &contours, declared_slice_extent),
        });
    }

    for (volume_id, slices) in volume_slices_extra {
        volumes.push(OctVolume {
            volume_id: volume_id.clone(),
            patient_id: patient_id.clone(),
            first_name: first_name.clone(),
            surname: surname.clone(),
            sex: sex.clone(),
            acquisition_date,
            laterality: volume_laterality.get(&volume_id).copied(),
            slices: slices.into_iter().map(Some).collect(),
            contours: materialize_contours(&volume_id, &contours, declared_slice_extent),
        });
    }

    volumes
}

fn materialize_contours(
    volume_id: &str,
    contours: &HashMap<String, HashMap<String, HashMap<i64, Vec<f32>>>>,
    declared_slice_extent: &HashMap<String, f64>,
) -> HashMap<String, Vec<Option<Vec<f32>>>> {
    let Some(by_name) = contours.get(volume_id) else {
        return HashMap::new();
    };

    let declared_len = declared_slice_extent.get(volume_id).map(|max_half| max_half.trunc() as i64 + 1);

    by_name
        .iter()
        .map(|(name, by_slice)| {
            let len = declared_len.unwrap_or_else(|| by_slice.keys().copied().max().map(|m| m + 1).unwrap_or(0));
            let mut sequence = vec![None; len.max(0) as usize];
            for (slice_index, values) in by_slice {
                if *slice_index >= 0 && (*slice_index as usize) < sequence.len() {
                    sequence[*slice_index as usize] = Some(values.clone());
                }
            }
            (name.clone(), sequence)
        })
        .collect()
}

/// Turns the accumulated parse state into the final fundus image list.
pub fn assemble_fundus_images(state: ParseState) -> Vec<FundusImage> {
    let ParseState {
        patient_id,
        fundus_pixels,
        fundus_laterality,
        ..
    } = state;

    fundus_pixels
        .into_iter()
        .map(|(image_id, image)| {
            let laterality = fundus_laterality.get(&image_id).copied().flatten();
            FundusImage {
                image_id: image_id.clone(),
                patient_id: patient_id.clone(),
                laterality,
                image,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laterality_from_code() {
        assert_eq!(Laterality::from_code(b'R'), Some(Laterality::Right));
        assert_eq!(Laterality::from_code(b'L'), Some(Laterality::Left));
        assert_eq!(Laterality::from_code(b'X'), None);
    }

    #[test]
    fn oct_slice_indexes_width_major() {
        let slice = OctSlice {
            width: 2,
            height: 3,
            pixels: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        };
        assert_eq!(slice.get(1, 0), 3.0);
        assert_eq!(slice.get(0, 2), 2.0);
    }

    fn tiny_slice() -> OctSlice {
        OctSlice {
            width: 1,
            height: 1,
            pixels: vec![1.0],
        }
    }

    #[test]
    fn volume_dropped_when_first_slot_unfilled() {
        let mut state = ParseState::default();
        state
            .volume_slices
            .insert("1_2_3".to_string(), vec![None, Some(tiny_slice()), Some(tiny_slice())]);

        let volumes = assemble_oct_volumes(state, &HashMap::new());
        assert!(volumes.is_empty());
    }

    #[test]
    fn volume_keeps_declared_length_with_interior_hole() {
        let mut state = ParseState::default();
        state.volume_slices.insert(
            "1_2_3".to_string(),
            vec![Some(tiny_slice()), None, Some(tiny_slice())],
        );

        let volumes = assemble_oct_volumes(state, &HashMap::new());
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].num_slices(), 3);
        assert!(volumes[0].slices[0].is_some());
        assert!(volumes[0].slices[1].is_none());
        assert!(volumes[0].slices[2].is_some());
    }

    #[test]
    fn orphan_slices_are_all_present() {
        let mut state = ParseState::default();
        state
            .volume_slices_extra
            .insert("9_9_9".to_string(), vec![tiny_slice(), tiny_slice()]);

        let volumes = assemble_oct_volumes(state, &HashMap::new());
        assert_eq!(volumes.len(), 1);
        assert!(volumes[0].slices.iter().all(Option::is_some));
    }
}
