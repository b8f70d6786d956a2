//! Fixed-layout record decoders.
//!
//! Every structure here is a little-endian, byte-packed record read straight
//! off disk — no alignment padding, no derive machinery. [`Cursor`] is the
//! shared primitive; each record type owns a `SIZE` constant and a `decode`
//! function that consumes exactly that many bytes (or fewer, for records fed
//! a short/truncated buffer by the lenient chunk reader).

/// A decode failure local to one record. Distinct from [`crate::error::Error`]:
/// callers decide per record whether a `DecodeError` is fatal (directory
/// structure) or just a reason to skip one chunk (everything in
/// [`crate::chunk`]).
#[derive(Debug)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DecodeError {}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// A forward-only reader over an in-memory byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(DecodeError(format!(
                "short record: need {n} bytes at offset {}, have {}",
                self.pos,
                self.data.len() - self.pos.min(self.data.len())
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.take(n)?;
        Ok(())
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> DecodeResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> DecodeResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Reads a fixed-width field and trims it at the first NUL, the way the
    /// vendor pads its ASCII fields.
    fn ascii(&mut self, n: usize) -> DecodeResult<String> {
        let raw = self.take(n)?;
        let trimmed = match raw.iter().position(|&b| b == 0) {
            Some(nul) => &raw[..nul],
            None => raw,
        };
        Ok(String::from_utf8_lossy(trimmed).into_owned())
    }
}

/// The 36-byte file header: a 12-byte magic, a version, and unused padding.
pub struct Header {
    pub magic: String,
    pub version: u32,
}

impl Header {
    pub const SIZE: usize = 36;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        let magic = c.ascii(12)?;
        let version = c.u32()?;
        c.skip(20)?;
        Ok(Self { magic, version })
    }
}

/// One node of the main directory chain: how many sub-directory entries
/// follow it in the file, and the offset of the previous node (`0` ends the
/// chain).
pub struct MainDirectory {
    pub num_entries: u32,
    pub current: u32,
    pub prev: u32,
}

impl MainDirectory {
    pub const SIZE: usize = 52;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(12)?; // magic
        c.skip(4)?; // version
        c.skip(20)?; // reserved
        let num_entries = c.u32()?;
        let current = c.u32()?;
        let prev = c.u32()?;
        c.skip(4)?; // reserved
        Ok(Self {
            num_entries,
            current,
            prev,
        })
    }
}

/// A 44-byte sub-directory table entry: identifies a volume triple and
/// points at an out-of-line chunk.
pub struct SubDirectory {
    pub pos: u32,
    pub start: u32,
    pub size: u32,
    pub patient_id: u32,
    pub study_id: u32,
    pub series_id: u32,
    pub slice_id: i32,
    pub kind: u32,
}

impl SubDirectory {
    pub const SIZE: usize = 44;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        let pos = c.u32()?;
        let start = c.u32()?;
        let size = c.u32()?;
        c.skip(4)?; // reserved
        let patient_id = c.u32()?;
        let study_id = c.u32()?;
        let series_id = c.u32()?;
        let slice_id = c.i32()?;
        c.skip(2)?; // reserved
        c.skip(2)?; // reserved
        let kind = c.u32()?;
        c.skip(4)?; // reserved
        Ok(Self {
            pos,
            start,
            size,
            patient_id,
            study_id,
            series_id,
            slice_id,
            kind,
        })
    }

    pub fn volume_id(&self) -> String {
        format!("{}_{}_{}", self.patient_id, self.study_id, self.series_id)
    }
}

/// The 60-byte header in front of every out-of-line chunk payload.
pub struct ChunkHeader {
    pub patient_id: u32,
    pub study_id: u32,
    pub series_id: u32,
    pub slice_id: i32,
    pub ind: u16,
    pub kind: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 60;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(12)?; // magic
        c.skip(4)?; // unknown
        c.skip(4)?; // unknown
        c.skip(4)?; // pos
        c.skip(4)?; // size
        c.skip(4)?; // unknown
        let patient_id = c.u32()?;
        let study_id = c.u32()?;
        let series_id = c.u32()?;
        let slice_id = c.i32()?;
        let ind = c.u16()?;
        c.skip(2)?; // reserved
        let kind = c.u32()?;
        c.skip(4)?; // reserved
        Ok(Self {
            patient_id,
            study_id,
            series_id,
            slice_id,
            ind,
            kind,
        })
    }

    pub fn volume_id(&self) -> String {
        format!("{}_{}_{}", self.patient_id, self.study_id, self.series_id)
    }
}

/// The 20-byte image chunk header preceding a pixel payload.
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
}

impl ImageHeader {
    pub const SIZE: usize = 20;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(4)?; // size
        c.skip(4)?; // kind
        c.skip(4)?; // unknown
        let width = c.u32()?;
        let height = c.u32()?;
        Ok(Self { width, height })
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// The 127-byte patient demographics record.
pub struct PatientRecord {
    pub first_name: String,
    pub surname: String,
    pub birthdate_raw: u32,
    pub sex: String,
    pub patient_id: String,
}

impl PatientRecord {
    pub const SIZE: usize = 127;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        let first_name = c.ascii(31)?;
        let surname = c.ascii(66)?;
        let birthdate_raw = c.u32()?;
        let sex = c.ascii(1)?;
        let patient_id = c.ascii(25)?;
        Ok(Self {
            first_name,
            surname,
            birthdate_raw,
            sex,
            patient_id,
        })
    }
}

/// The laterality record. The source reads 20 bytes off the wire but only
/// the first 16 are structurally meaningful; [`Self::decode`] accepts either
/// length as long as it covers that prefix.
pub struct LateralityRecord {
    pub laterality_code: u8,
}

impl LateralityRecord {
    /// Bytes actually consumed from the stream for this chunk.
    pub const CHUNK_READ_SIZE: usize = 20;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(14)?; // unknown
        let laterality_code = c.u8()?;
        Ok(Self { laterality_code })
    }
}

/// The 16-byte header preceding one contour's float array.
pub struct ContourHeader {
    pub id: u32,
    pub width: u32,
}

impl ContourHeader {
    pub const SIZE: usize = 16;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(4)?; // unknown
        let id = c.u32()?;
        c.skip(4)?; // unknown
        let width = c.u32()?;
        Ok(Self { id, width })
    }
}

/// The 104-byte B-scan metadata record. Only the fields the parser actually
/// surfaces are named; the rest are vendor-internal scan parameters skipped
/// in place.
pub struct BScanMetadata {
    pub img_size_x: u32,
    pub img_size_y: u32,
    pub num_images: u32,
    pub scan_type: u32,
    pub centre_pos_x: f32,
    pub centre_pos_y: f32,
    pub acquisition_time: u64,
    pub img_quality: f32,
}

impl BScanMetadata {
    pub const SIZE: usize = 104;

    pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
        let mut c = Cursor::new(buf);
        c.skip(4)?; // unknown
        let img_size_x = c.u32()?;
        let img_size_y = c.u32()?;
        c.skip(4)?; // posX1
        c.skip(4)?; // posX2
        c.skip(4)?; // posY1
        c.skip(4)?; // posY2
        c.skip(4)?; // zero
        c.skip(4)?; // unknown
        c.skip(4)?; // scaleY
        c.skip(4)?; // unknown
        c.skip(4)?; // zero
        c.skip(8)?; // unknown[2]
        c.skip(4)?; // zero
        c.skip(4)?; // declared image width (redundant with ImageHeader)
        let num_images = c.u32()?;
        c.skip(4)?; // current image index
        let scan_type = c.u32()?;
        let centre_pos_x = c.f32()?;
        let centre_pos_y = c.f32()?;
        c.skip(4)?; // unknown
        let acquisition_time = c.u64()?;
        c.skip(4)?; // average count
        let img_quality = c.f32()?;
        Ok(Self {
            img_size_x,
            img_size_y,
            num_images,
            scan_type,
            centre_pos_x,
            centre_pos_y,
            acquisition_time,
            img_quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_trims_at_first_nul_only() {
        let mut buf = b"Jane\0\0\0\0\0\0".to_vec();
        buf.resize(10, 0);
        let mut c = Cursor::new(&buf);
        assert_eq!(c.ascii(10).unwrap(), "Jane");
    }

    #[test]
    fn ascii_keeps_interior_and_trailing_whitespace() {
        let mut buf = b" Jane Doe \0".to_vec();
        buf.resize(16, 0);
        let mut c = Cursor::new(&buf);
        assert_eq!(c.ascii(16).unwrap(), " Jane Doe ");
    }

    #[test]
    fn cursor_errors_on_short_take() {
        let buf = [0u8; 3];
        let mut c = Cursor::new(&buf);
        assert!(c.u32().is_err());
    }

    #[test]
    fn sub_directory_round_trip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_le_bytes()); // pos
        buf.extend_from_slice(&200u32.to_le_bytes()); // start
        buf.extend_from_slice(&300u32.to_le_bytes()); // size
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // patient_id
        buf.extend_from_slice(&2u32.to_le_bytes()); // study_id
        buf.extend_from_slice(&3u32.to_le_bytes()); // series_id
        buf.extend_from_slice(&4i32.to_le_bytes()); // slice_id
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&9u32.to_le_bytes()); // kind
        buf.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(buf.len(), SubDirectory::SIZE);

        let sub = SubDirectory::decode(&buf).unwrap();
        assert_eq!(sub.volume_id(), "1_2_3");
        assert_eq!(sub.slice_id, 4);
        assert_eq!(sub.start, 200);
    }
}
