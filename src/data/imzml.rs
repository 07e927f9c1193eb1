use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use thiserror::Error;

use super::model::{MsiDataset, Spectrum};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ImzmlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed imzML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("missing binary data file {0}")]
    MissingIbd(PathBuf),
    #[error("unsupported imzML feature: {0}")]
    Unsupported(String),
    #[error("malformed imzML: {0}")]
    Malformed(String),
    #[error("spectrum index {index} out of range ({len} spectra)")]
    IndexOutOfRange { index: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Controlled-vocabulary accessions used by the manifest
// ---------------------------------------------------------------------------

const ACC_MZ_ARRAY: &str = "MS:1000514";
const ACC_INTENSITY_ARRAY: &str = "MS:1000515";
const ACC_F32: &str = "MS:1000521";
const ACC_F64: &str = "MS:1000523";
const ACC_I32: &str = "MS:1000519";
const ACC_I64: &str = "MS:1000522";
const ACC_I16: &str = "IMS:1100001";
const ACC_ZLIB: &str = "MS:1000574";
const ACC_POSITION_X: &str = "IMS:1000050";
const ACC_POSITION_Y: &str = "IMS:1000051";
const ACC_POSITION_Z: &str = "IMS:1000052";
const ACC_EXTERNAL_OFFSET: &str = "IMS:1000102";
const ACC_EXTERNAL_ARRAY_LENGTH: &str = "IMS:1000103";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayKind {
    Mz,
    Intensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryDtype {
    F32,
    F64,
    I16,
    I32,
    I64,
}

impl BinaryDtype {
    fn from_accession(accession: &str) -> Option<Self> {
        match accession {
            ACC_F32 => Some(BinaryDtype::F32),
            ACC_F64 => Some(BinaryDtype::F64),
            ACC_I16 => Some(BinaryDtype::I16),
            ACC_I32 => Some(BinaryDtype::I32),
            ACC_I64 => Some(BinaryDtype::I64),
            _ => None,
        }
    }
}

/// Shared cvParams declared once in a referenceableParamGroup and
/// referenced from every spectrum's binary arrays.
#[derive(Debug, Default, Clone)]
struct ParamGroup {
    kind: Option<ArrayKind>,
    dtype: Option<BinaryDtype>,
    compressed: bool,
}

/// Where one array of one spectrum lives inside the .ibd file.
#[derive(Debug, Clone)]
struct ArrayLocation {
    offset: u64,
    array_length: usize,
    dtype: BinaryDtype,
}

#[derive(Debug, Clone)]
struct SpectrumEntry {
    position: (u32, u32, u32),
    mz: ArrayLocation,
    intensity: ArrayLocation,
}

// ---------------------------------------------------------------------------
// ImzmlFile – the open file pair
// ---------------------------------------------------------------------------

/// An opened imzML/.ibd pair. The XML manifest is parsed up front; the
/// binary arrays are read per spectrum on demand, so the shell can
/// report progress while loading.
pub struct ImzmlFile {
    path: PathBuf,
    entries: Vec<SpectrumEntry>,
    ibd: BufReader<File>,
}

impl ImzmlFile {
    /// Parse the manifest at `path` and open the sibling `.ibd`.
    pub fn open(path: &Path) -> Result<Self, ImzmlError> {
        let manifest = File::open(path)?;
        let entries = parse_manifest(BufReader::new(manifest))?;

        let ibd_path = path.with_extension("ibd");
        let ibd = File::open(&ibd_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImzmlError::MissingIbd(ibd_path.clone()),
            _ => ImzmlError::Io(e),
        })?;

        Ok(ImzmlFile {
            path: path.to_path_buf(),
            entries,
            ibd: BufReader::new(ibd),
        })
    }

    /// Total number of spectra in the file.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read one spectrum's m/z and intensity arrays plus its pixel
    /// position.
    pub fn spectrum(&mut self, index: usize) -> Result<Spectrum, ImzmlError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(ImzmlError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })?
            .clone();

        let mz = read_array(&mut self.ibd, &entry.mz)?;
        let intensity = read_array(&mut self.ibd, &entry.intensity)?;

        Ok(Spectrum {
            mz,
            intensity,
            position: entry.position,
        })
    }

    /// Read every spectrum in file order, reporting (done, total) after
    /// each one.
    pub fn read_all(
        mut self,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<MsiDataset, ImzmlError> {
        let total = self.len();
        let mut spectra = Vec::with_capacity(total);
        for index in 0..total {
            spectra.push(self.spectrum(index)?);
            on_progress(index + 1, total);
        }
        Ok(MsiDataset {
            spectra,
            source: self.path,
        })
    }
}

fn read_array(
    ibd: &mut BufReader<File>,
    location: &ArrayLocation,
) -> Result<Vec<f64>, ImzmlError> {
    ibd.seek(SeekFrom::Start(location.offset))?;
    let n = location.array_length;
    let mut values = Vec::with_capacity(n);
    match location.dtype {
        BinaryDtype::F32 => {
            let mut buf = vec![0f32; n];
            ibd.read_f32_into::<LittleEndian>(&mut buf)?;
            values.extend(buf.into_iter().map(f64::from));
        }
        BinaryDtype::F64 => {
            let mut buf = vec![0f64; n];
            ibd.read_f64_into::<LittleEndian>(&mut buf)?;
            values = buf;
        }
        BinaryDtype::I16 => {
            let mut buf = vec![0i16; n];
            ibd.read_i16_into::<LittleEndian>(&mut buf)?;
            values.extend(buf.into_iter().map(f64::from));
        }
        BinaryDtype::I32 => {
            let mut buf = vec![0i32; n];
            ibd.read_i32_into::<LittleEndian>(&mut buf)?;
            values.extend(buf.into_iter().map(f64::from));
        }
        BinaryDtype::I64 => {
            let mut buf = vec![0i64; n];
            ibd.read_i64_into::<LittleEndian>(&mut buf)?;
            values.extend(buf.into_iter().map(|v| v as f64));
        }
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Manifest parsing
// ---------------------------------------------------------------------------

/// Array metadata as collected while walking one binaryDataArray
/// element, before group references are resolved.
#[derive(Debug, Default, Clone)]
struct PendingArray {
    group: Option<String>,
    kind: Option<ArrayKind>,
    dtype: Option<BinaryDtype>,
    compressed: bool,
    offset: Option<u64>,
    array_length: Option<usize>,
}

#[derive(Debug, Default)]
struct PendingSpectrum {
    x: Option<u32>,
    y: Option<u32>,
    z: Option<u32>,
    arrays: Vec<PendingArray>,
}

fn parse_manifest<R: std::io::BufRead>(reader: R) -> Result<Vec<SpectrumEntry>, ImzmlError> {
    let mut xml = XmlReader::from_reader(reader);

    let mut groups: BTreeMap<String, ParamGroup> = BTreeMap::new();
    let mut current_group: Option<(String, ParamGroup)> = None;
    let mut current_spectrum: Option<PendingSpectrum> = None;
    let mut current_array: Option<PendingArray> = None;
    let mut entries = Vec::new();

    let mut buf = Vec::new();
    loop {
        // cvParam, referenceableParamGroupRef and binary are usually
        // self-closing, so Empty events carry payload too.
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                match e.name().as_ref() {
                    b"referenceableParamGroup" => {
                        if let Some(id) = attr(e, b"id") {
                            current_group = Some((id, ParamGroup::default()));
                        }
                    }
                    b"spectrum" => {
                        current_spectrum = Some(PendingSpectrum::default());
                    }
                    b"binaryDataArray" if current_spectrum.is_some() => {
                        current_array = Some(PendingArray::default());
                    }
                    b"referenceableParamGroupRef" => {
                        if let (Some(array), Some(group)) =
                            (current_array.as_mut(), attr(e, b"ref"))
                        {
                            array.group = Some(group);
                        }
                    }
                    b"cvParam" => {
                        handle_cv_param(
                            e,
                            &mut current_group,
                            &mut current_spectrum,
                            &mut current_array,
                        )?;
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"referenceableParamGroup" => {
                    if let Some((id, group)) = current_group.take() {
                        groups.insert(id, group);
                    }
                }
                b"binaryDataArray" => {
                    if let (Some(spectrum), Some(array)) =
                        (current_spectrum.as_mut(), current_array.take())
                    {
                        spectrum.arrays.push(array);
                    }
                }
                b"spectrum" => {
                    if let Some(pending) = current_spectrum.take() {
                        entries.push(resolve_spectrum(pending, &groups)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn handle_cv_param(
    e: &BytesStart,
    current_group: &mut Option<(String, ParamGroup)>,
    current_spectrum: &mut Option<PendingSpectrum>,
    current_array: &mut Option<PendingArray>,
) -> Result<(), ImzmlError> {
    let Some(accession) = attr(e, b"accession") else {
        return Ok(());
    };
    let value = attr(e, b"value");

    if let Some(array) = current_array.as_mut() {
        match accession.as_str() {
            ACC_EXTERNAL_OFFSET => array.offset = Some(parse_value(&accession, value)?),
            ACC_EXTERNAL_ARRAY_LENGTH => {
                array.array_length = Some(parse_value(&accession, value)?)
            }
            ACC_MZ_ARRAY => array.kind = Some(ArrayKind::Mz),
            ACC_INTENSITY_ARRAY => array.kind = Some(ArrayKind::Intensity),
            ACC_ZLIB => array.compressed = true,
            other => {
                if let Some(dtype) = BinaryDtype::from_accession(other) {
                    array.dtype = Some(dtype);
                }
            }
        }
        return Ok(());
    }

    if let Some(spectrum) = current_spectrum.as_mut() {
        match accession.as_str() {
            ACC_POSITION_X => spectrum.x = Some(parse_value(&accession, value)?),
            ACC_POSITION_Y => spectrum.y = Some(parse_value(&accession, value)?),
            ACC_POSITION_Z => spectrum.z = Some(parse_value(&accession, value)?),
            _ => {}
        }
        return Ok(());
    }

    if let Some((_, group)) = current_group.as_mut() {
        match accession.as_str() {
            ACC_MZ_ARRAY => group.kind = Some(ArrayKind::Mz),
            ACC_INTENSITY_ARRAY => group.kind = Some(ArrayKind::Intensity),
            ACC_ZLIB => group.compressed = true,
            other => {
                if let Some(dtype) = BinaryDtype::from_accession(other) {
                    group.dtype = Some(dtype);
                }
            }
        }
    }

    Ok(())
}

fn parse_value<T: std::str::FromStr>(
    accession: &str,
    value: Option<String>,
) -> Result<T, ImzmlError> {
    let value =
        value.ok_or_else(|| ImzmlError::Malformed(format!("{accession} has no value")))?;
    value.trim().parse::<T>().map_err(|_| {
        ImzmlError::Malformed(format!("{accession} value \"{value}\" is not numeric"))
    })
}

fn resolve_spectrum(
    pending: PendingSpectrum,
    groups: &BTreeMap<String, ParamGroup>,
) -> Result<SpectrumEntry, ImzmlError> {
    let index_hint = pending
        .x
        .zip(pending.y)
        .map(|(x, y)| format!("pixel ({x}, {y})"))
        .unwrap_or_else(|| "spectrum".to_string());

    let mut mz = None;
    let mut intensity = None;

    for array in pending.arrays {
        let group = array.group.as_ref().and_then(|id| groups.get(id));

        if array.compressed || group.is_some_and(|g| g.compressed) {
            return Err(ImzmlError::Unsupported(
                "compressed binary arrays".to_string(),
            ));
        }

        let kind = array
            .kind
            .or_else(|| group.and_then(|g| g.kind))
            .ok_or_else(|| {
                ImzmlError::Malformed(format!("{index_hint}: array of undeclared kind"))
            })?;
        let dtype = array
            .dtype
            .or_else(|| group.and_then(|g| g.dtype))
            .ok_or_else(|| {
                ImzmlError::Malformed(format!("{index_hint}: array without a binary data type"))
            })?;
        let offset = array.offset.ok_or_else(|| {
            ImzmlError::Malformed(format!("{index_hint}: array without an external offset"))
        })?;
        let array_length = array.array_length.ok_or_else(|| {
            ImzmlError::Malformed(format!("{index_hint}: array without an external length"))
        })?;

        let location = ArrayLocation {
            offset,
            array_length,
            dtype,
        };
        match kind {
            ArrayKind::Mz => mz = Some(location),
            ArrayKind::Intensity => intensity = Some(location),
        }
    }

    let mz = mz.ok_or_else(|| {
        ImzmlError::Malformed(format!("{index_hint}: no m/z array declared"))
    })?;
    let intensity = intensity.ok_or_else(|| {
        ImzmlError::Malformed(format!("{index_hint}: no intensity array declared"))
    })?;

    if mz.array_length != intensity.array_length {
        return Err(ImzmlError::Malformed(format!(
            "{index_hint}: m/z array has {} values but intensity array has {}",
            mz.array_length, intensity.array_length
        )));
    }

    let x = pending.x.ok_or_else(|| {
        ImzmlError::Malformed(format!("{index_hint}: missing position x"))
    })?;
    let y = pending.y.ok_or_else(|| {
        ImzmlError::Malformed(format!("{index_hint}: missing position y"))
    })?;
    // z is optional in most writers; a flat image sits on plane 1.
    let z = pending.z.unwrap_or(1);

    Ok(SpectrumEntry {
        position: (x, y, z),
        mz,
        intensity,
    })
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
