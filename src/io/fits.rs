//! FITS access through `fitsio`.
//!
//! Files are loaded into a small in-memory model ([`FitsFile`] holding
//! [`Hdu`]s) so that readers can look at every extension after the file is
//! closed. Image shapes follow `fitsio`: C order, `NAXIS1` is the last
//! (fastest-varying) array axis.
//!
//! Only the keywords the cube model uses (`EXTNAME`, `BUNIT` and the
//! coordinate keywords) are copied into a [`Header`].

use std::io::Write;
use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use ndarray::{ArrayD, IxDyn};

use crate::error::{CubeError, Result};

const MAGIC: &[u8] = b"SIMPLE  =";

/// Highest axis number searched for per-axis coordinate keywords.
pub const MAX_WCS_AXES: usize = 9;

/// Value of a header keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Real(v) => Some(*v),
            HeaderValue::Integer(v) => Some(*v as f64),
            HeaderValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form used when copying headers into metadata.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            HeaderValue::Integer(i) => serde_json::Value::from(*i),
            HeaderValue::Real(v) => serde_json::Value::from(*v),
            HeaderValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Integer(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Real(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

/// A keyword and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: HeaderValue,
}

impl Card {
    pub fn new(keyword: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        Self {
            keyword: keyword.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of header cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyword, replacing an existing card with the same keyword.
    pub fn set(&mut self, keyword: &str, value: impl Into<HeaderValue>) {
        let value = value.into();
        match self.cards.iter_mut().find(|c| c.keyword == keyword) {
            Some(card) => card.value = value,
            None => self.cards.push(Card::new(keyword, value)),
        }
    }

    pub fn extend(&mut self, cards: impl IntoIterator<Item = Card>) {
        for card in cards {
            self.set(&card.keyword, card.value);
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(HeaderValue::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(HeaderValue::as_str)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Keyword/value map for metadata.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.cards
            .iter()
            .map(|c| (c.keyword.clone(), c.value.to_json()))
            .collect()
    }
}

/// Payload of an HDU.
#[derive(Debug, Clone, PartialEq)]
pub enum HduData {
    Empty,
    /// Written as `Double`; every image is read back into this
    F64(ArrayD<f64>),
    /// Written as `Long`
    I32(ArrayD<i32>),
}

impl HduData {
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            HduData::Empty => None,
            HduData::F64(a) => Some(a.shape()),
            HduData::I32(a) => Some(a.shape()),
        }
    }

    /// Floating view of any payload.
    pub fn to_f64(&self) -> Option<ArrayD<f64>> {
        match self {
            HduData::Empty => None,
            HduData::F64(a) => Some(a.clone()),
            HduData::I32(a) => Some(a.mapv(f64::from)),
        }
    }

    fn image_type(&self) -> ImageType {
        match self {
            HduData::I32(_) => ImageType::Long,
            HduData::Empty | HduData::F64(_) => ImageType::Double,
        }
    }

    fn write(&self, fptr: &mut fitsio::FitsFile, hdu: &FitsHdu) -> Result<()> {
        match self {
            HduData::Empty => {}
            HduData::F64(array) => {
                let flat: Vec<f64> = array.iter().copied().collect();
                hdu.write_image(fptr, &flat)?;
            }
            HduData::I32(array) => {
                let flat: Vec<i32> = array.iter().copied().collect();
                hdu.write_image(fptr, &flat)?;
            }
        }
        Ok(())
    }
}

/// Kind of HDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduKind {
    Primary,
    Image,
    Table,
}

/// Header and payload of one HDU.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub kind: HduKind,
    pub header: Header,
    pub data: HduData,
}

impl Hdu {
    /// Primary HDU without data, carrying `cards`.
    pub fn primary(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut header = Header::new();
        header.extend(cards);
        Self {
            kind: HduKind::Primary,
            header,
            data: HduData::Empty,
        }
    }

    /// Named IMAGE extension.
    pub fn image(name: &str, data: HduData) -> Self {
        let mut header = Header::new();
        header.set("EXTNAME", name);
        Self {
            kind: HduKind::Image,
            header,
            data,
        }
    }

    /// `EXTNAME`, if present.
    pub fn name(&self) -> Option<&str> {
        self.header.get_str("EXTNAME")
    }

    /// `EXTNAME`, or `PRIMARY` / the HDU index when unnamed.
    pub fn label(&self, index: usize) -> String {
        match self.name() {
            Some(name) => name.trim().to_string(),
            None if self.kind == HduKind::Primary => "PRIMARY".to_string(),
            None => index.to_string(),
        }
    }

    /// Primary or IMAGE HDU carrying a data array.
    pub fn is_image(&self) -> bool {
        matches!(self.kind, HduKind::Primary | HduKind::Image)
            && !matches!(self.data, HduData::Empty)
    }

    fn write_header(&self, fptr: &mut fitsio::FitsFile, hdu: &FitsHdu) -> Result<()> {
        for card in self.header.cards() {
            // create_image has already written it
            if self.kind == HduKind::Image && card.keyword == "EXTNAME" {
                continue;
            }
            match &card.value {
                HeaderValue::Integer(v) => hdu.write_key(fptr, &card.keyword, *v)?,
                HeaderValue::Real(v) => hdu.write_key(fptr, &card.keyword, *v)?,
                HeaderValue::Text(s) => hdu.write_key(fptr, &card.keyword, s.as_str())?,
            }
        }
        Ok(())
    }
}

/// An ordered list of HDUs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsFile {
    hdus: Vec<Hdu>,
}

impl FitsFile {
    pub fn new(hdus: Vec<Hdu>) -> Self {
        Self { hdus }
    }

    /// Check for the `SIMPLE` keyword at the start of the stream.
    pub fn is_fits(bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC)
    }

    /// Read every HDU of the file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file_len = std::fs::metadata(path)?.len();
        let mut fptr = fitsio::FitsFile::open(path)?;

        let mut hdus = Vec::new();
        let mut index = 0;
        while let Ok(hdu) = fptr.hdu(index) {
            hdus.push(read_hdu(&mut fptr, &hdu, index, file_len)?);
            index += 1;
        }
        log::trace!("Read {} HDUs from {:?}", hdus.len(), path);
        Ok(Self { hdus })
    }

    /// Read every HDU of an in-memory file.
    ///
    /// `fitsio` only reads from disk, so the bytes are spilled to a
    /// temporary file first.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !Self::is_fits(bytes) {
            return Err(CubeError::fits("missing SIMPLE keyword"));
        }
        let mut spill = tempfile::NamedTempFile::new()?;
        spill.write_all(bytes)?;
        spill.flush()?;
        Self::open(spill.path())
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn primary(&self) -> Option<&Hdu> {
        self.hdus.first()
    }

    /// Find an HDU by `EXTNAME`, case-insensitively.
    pub fn get_by_name(&self, name: &str) -> Option<(usize, &Hdu)> {
        self.hdus
            .iter()
            .enumerate()
            .find(|(_, h)| h.name().is_some_and(|n| n.trim().eq_ignore_ascii_case(name)))
    }

    /// Write all HDUs to `path`, replacing any existing file.
    ///
    /// The first HDU becomes the primary array; every other HDU must be an
    /// image.
    pub fn write(&self, path: &Path) -> Result<()> {
        let (primary, extensions) = match self.hdus.split_first() {
            Some((first, rest)) if first.kind == HduKind::Primary => (Some(first), rest),
            _ => (None, self.hdus.as_slice()),
        };

        let primary_shape = primary
            .and_then(|h| h.data.shape())
            .map(<[usize]>::to_vec)
            .unwrap_or_default();
        let primary_description = ImageDescription {
            data_type: primary.map_or(ImageType::Double, |h| h.data.image_type()),
            dimensions: &primary_shape,
        };
        let builder = fitsio::FitsFile::create(path).overwrite();
        let mut fptr = if primary_shape.is_empty() {
            builder.open()?
        } else {
            builder.with_custom_primary(&primary_description).open()?
        };

        if let Some(primary) = primary {
            let hdu = fptr.primary_hdu()?;
            primary.write_header(&mut fptr, &hdu)?;
            primary.data.write(&mut fptr, &hdu)?;
        }

        for (i, extension) in extensions.iter().enumerate() {
            if extension.kind != HduKind::Image {
                return Err(CubeError::fits(format!(
                    "only image extensions can be written (HDU {})",
                    i + 1
                )));
            }
            let shape = extension.data.shape().map(<[usize]>::to_vec).unwrap_or_default();
            let description = ImageDescription {
                data_type: extension.data.image_type(),
                dimensions: &shape,
            };
            let hdu = fptr.create_image(extension.label(i + 1), &description)?;
            extension.write_header(&mut fptr, &hdu)?;
            extension.data.write(&mut fptr, &hdu)?;
        }

        log::trace!("Wrote {} HDUs to {:?}", self.hdus.len(), path);
        Ok(())
    }

    /// Serialized file contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("buffer.fits");
        self.write(&path)?;
        Ok(std::fs::read(&path)?)
    }
}

/// Copy `EXTNAME`, `BUNIT` and the coordinate keywords of `hdu`.
fn read_header(fptr: &mut fitsio::FitsFile, hdu: &FitsHdu) -> Header {
    let mut header = Header::new();

    for key in ["EXTNAME", "BUNIT"] {
        read_text(fptr, hdu, &mut header, key);
    }
    if let Ok(value) = hdu.read_key::<i64>(fptr, "WCSAXES") {
        header.set("WCSAXES", value);
    }
    for n in 1..=MAX_WCS_AXES {
        read_text(fptr, hdu, &mut header, &format!("CUNIT{n}"));
        read_text(fptr, hdu, &mut header, &format!("CTYPE{n}"));
        for prefix in ["CRPIX", "CRVAL", "CDELT"] {
            read_real(fptr, hdu, &mut header, &format!("{prefix}{n}"));
        }
        for j in 1..=MAX_WCS_AXES {
            read_real(fptr, hdu, &mut header, &format!("CD{n}_{j}"));
        }
    }

    header
}

fn read_text(fptr: &mut fitsio::FitsFile, hdu: &FitsHdu, header: &mut Header, key: &str) {
    if let Ok(value) = hdu.read_key::<String>(fptr, key) {
        header.set(key, value.trim());
    }
}

fn read_real(fptr: &mut fitsio::FitsFile, hdu: &FitsHdu, header: &mut Header, key: &str) {
    if let Ok(value) = hdu.read_key::<f64>(fptr, key) {
        header.set(key, value);
    }
}

fn read_hdu(
    fptr: &mut fitsio::FitsFile,
    hdu: &FitsHdu,
    index: usize,
    file_len: u64,
) -> Result<Hdu> {
    let header = read_header(fptr, hdu);

    let (kind, data) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => {
            let kind = if index == 0 {
                HduKind::Primary
            } else {
                HduKind::Image
            };
            (kind, read_image(fptr, hdu, shape, index, file_len)?)
        }
        _ => (HduKind::Table, HduData::Empty),
    };

    Ok(Hdu { kind, header, data })
}

fn read_image(
    fptr: &mut fitsio::FitsFile,
    hdu: &FitsHdu,
    shape: &[usize],
    index: usize,
    file_len: u64,
) -> Result<HduData> {
    if shape.is_empty() {
        return Ok(HduData::Empty);
    }
    // Every element takes at least one byte on disk.
    let elements = shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .filter(|&n| n as u64 <= file_len)
        .ok_or_else(|| {
            CubeError::fits(format!(
                "HDU {index} declares shape {shape:?}, larger than the file"
            ))
        })?;
    if elements == 0 {
        return Ok(HduData::Empty);
    }

    let values: Vec<f64> = hdu.read_image(fptr)?;
    let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
    Ok(HduData::F64(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("two.fits");
        let cube = Array3::from_shape_fn((2, 3, 4), |(k, j, i)| (k * 100 + j * 10 + i) as f64);

        let mut flux = Hdu::image("FLUX", HduData::F64(cube.clone().into_dyn()));
        flux.header.set("BUNIT", "Jy");
        FitsFile::new(vec![
            Hdu::primary([Card::new("CRVAL3", 3600.0), Card::new("CTYPE3", "WAVE-LOG")]),
            flux,
            Hdu::image("MASK", HduData::I32(ArrayD::from_elem(IxDyn(&[2, 3, 4]), 1))),
        ])
        .write(&path)
        .unwrap();

        let fits = FitsFile::open(&path).unwrap();
        assert_eq!(fits.hdus().len(), 3);

        let primary = fits.primary().unwrap();
        assert_eq!(primary.kind, HduKind::Primary);
        assert!(!primary.is_image());
        assert_eq!(primary.header.get_f64("CRVAL3"), Some(3600.0));
        assert_eq!(primary.header.get_str("CTYPE3"), Some("WAVE-LOG"));
        assert_eq!(primary.label(0), "PRIMARY");

        let (index, flux) = fits.get_by_name("flux").unwrap();
        assert_eq!(index, 1);
        assert_eq!(flux.header.get_str("BUNIT"), Some("Jy"));
        assert_eq!(flux.data, HduData::F64(cube.into_dyn()));

        let (_, mask) = fits.get_by_name("MASK").unwrap();
        assert_eq!(mask.data.shape(), Some(&[2, 3, 4][..]));
        assert!(mask.data.to_f64().unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_from_bytes_matches_open() {
        let file = FitsFile::new(vec![
            Hdu::primary([]),
            Hdu::image("A", HduData::F64(ArrayD::from_elem(IxDyn(&[2, 2]), 0.5))),
        ]);
        let bytes = file.to_bytes().unwrap();
        assert!(FitsFile::is_fits(&bytes));

        let parsed = FitsFile::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.hdus().len(), 2);
        assert!(parsed.hdus()[1].is_image());
        assert_eq!(parsed.hdus()[1].label(1), "A");
    }

    #[test]
    fn test_rejects_non_fits_bytes() {
        let err = FitsFile::from_bytes(b"\x93NUMPY").unwrap_err();
        assert!(matches!(err, CubeError::Fits { .. }));
    }

    #[test]
    fn test_oversized_axes_are_an_error() {
        let mut header = String::new();
        for card in [
            "SIMPLE  =                    T",
            "BITPIX  =                  -64",
            "NAXIS   =                    2",
            "NAXIS1  =  4611686018427387904",
            "NAXIS2  =                    8",
            "END",
        ] {
            header.push_str(&format!("{card:<80}"));
        }
        let mut bytes = header.into_bytes();
        bytes.resize(2880, b' ');

        assert!(FitsFile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_header_set_replaces() {
        let mut header = Header::new();
        header.set("NAXIS", 2i64);
        header.set("NAXIS", 3i64);
        assert_eq!(header.cards().len(), 1);
        assert_eq!(header.get_i64("NAXIS"), Some(3));
        assert_eq!(header.get_f64("NAXIS"), Some(3.0));
        assert!(header.get_str("NAXIS").is_none());
    }
}
