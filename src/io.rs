//! Safetensors-layout persistence.
//!
//! File layout: `u64` little-endian header length, a JSON header (padded
//! with spaces to a multiple of 8 bytes) mapping tensor names to
//! `{dtype, shape, data_offsets}`, then the concatenated little-endian
//! tensor bytes. String metadata lives under `__metadata__`.
//!
//! - [`save_recording`] / [`load_recording`]: cleaned-recording checkpoints.
//!   `data` is F64 `[C, T]`; `sfreq`, `channels`, `annotations` and
//!   `montage` are JSON strings in `__metadata__`.
//! - [`load_raw_session`]: raw `[C_raw, T]` session matrix (F32 or F64)
//!   and its `sfreq` (scalar tensor or metadata entry).
use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use ndarray::Array2;
use serde_json::{json, Map, Value};

use crate::error::{PrepError, Result};
use crate::montage::Montage;
use crate::recording::{Annotation, Channel, Recording};

const METADATA_KEY: &str = "__metadata__";

// ── Writer ────────────────────────────────────────────────────────────────────

/// Safetensors file writer for F32, F64, I32 and I64 tensors plus string
/// metadata.
///
/// ```rust,no_run
/// use exg_prep::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("signal", &[1.0, 2.0, 3.0], &[1, 3]);
/// w.add_metadata("sfreq", "250");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = Map::new();
        if !self.metadata.is_empty() {
            header_map.insert(METADATA_KEY.into(), json!(self.metadata));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes
            .into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        f.flush()?;
        debug!("wrote {} tensors ({} bytes) to {}", self.entries.len(), offset, path.display());
        Ok(())
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// An in-memory safetensors file.
pub struct StFile {
    header: Map<String, Value>,
    bytes: Vec<u8>,
    data_start: usize,
}

/// A tensor widened to `f64`.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

fn format_err(what: impl Into<String>) -> PrepError {
    PrepError::Format(what.into())
}

impl StFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes).map_err(|e| match e {
            PrepError::Format(msg) => format_err(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(format_err("safetensors file too small"));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        let end = 8usize
            .checked_add(n)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| format_err(format!("header length {n} exceeds file size")))?;
        let header: Map<String, Value> = serde_json::from_slice(&bytes[8..end])?;
        Ok(Self { header, bytes, data_start: end })
    }

    /// Tensor names, metadata excluded.
    pub fn names(&self) -> Vec<&str> {
        self.header
            .keys()
            .filter(|k| k.as_str() != METADATA_KEY)
            .map(String::as_str)
            .collect()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get(METADATA_KEY)?.get(key)?.as_str()
    }

    /// Metadata entry parsed as JSON.
    pub fn metadata_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.metadata(key)
            .map(|s| serde_json::from_str(s).map_err(PrepError::from))
            .transpose()
    }

    pub fn tensor(&self, name: &str) -> Result<Tensor> {
        let entry = self
            .header
            .get(name)
            .ok_or_else(|| format_err(format!("missing tensor '{name}'")))?;
        let dtype = entry["dtype"]
            .as_str()
            .ok_or_else(|| format_err(format!("tensor '{name}' has no dtype")))?;
        let shape: Vec<usize> = entry["shape"]
            .as_array()
            .ok_or_else(|| format_err(format!("tensor '{name}' has no shape")))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize))
            .collect::<Option<_>>()
            .ok_or_else(|| format_err(format!("tensor '{name}' has a malformed shape")))?;
        let offsets: Vec<usize> = entry["data_offsets"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_u64().map(|o| o as usize)).collect())
            .unwrap_or_default();
        let [s, e] = offsets[..] else {
            return Err(format_err(format!("tensor '{name}' has malformed data_offsets")));
        };
        if s > e || self.data_start + e > self.bytes.len() {
            return Err(format_err(format!("tensor '{name}' lies outside the file")));
        }
        let raw = &self.bytes[self.data_start + s..self.data_start + e];

        let width = match dtype {
            "F32" | "I32" => 4,
            "F64" | "I64" => 8,
            other => return Err(format_err(format!("tensor '{name}': unsupported dtype {other}"))),
        };
        let n_elem: usize = shape.iter().product();
        if raw.len() != n_elem * width {
            return Err(format_err(format!(
                "tensor '{name}': {} bytes for shape {shape:?} of {dtype}",
                raw.len()
            )));
        }
        let values: Vec<f64> = match dtype {
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "I32" => raw
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            _ => raw
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
                .collect(),
        };
        Ok(Tensor { dtype: dtype.to_string(), shape, values })
    }

    pub fn array2(&self, name: &str) -> Result<Array2<f64>> {
        let t = self.tensor(name)?;
        let [r, c] = t.shape[..] else {
            return Err(format_err(format!("tensor '{name}' has shape {:?}, expected 2-D", t.shape)));
        };
        Array2::from_shape_vec((r, c), t.values).map_err(|e| format_err(e.to_string()))
    }
}

// ── Recordings ────────────────────────────────────────────────────────────────

/// Persist `rec` as a checkpoint at `path`.
pub fn save_recording(rec: &Recording, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_arr2("data", &rec.data);
    w.add_metadata("sfreq", serde_json::to_string(&rec.sfreq())?);
    w.add_metadata("channels", serde_json::to_string(&rec.channels)?);
    w.add_metadata("annotations", serde_json::to_string(&rec.annotations)?);
    if let Some(m) = &rec.montage {
        w.add_metadata("montage", serde_json::to_string(m)?);
    }
    w.write(path)
}

/// Load a checkpoint written by [`save_recording`].
pub fn load_recording(path: &Path) -> Result<Recording> {
    let f = StFile::open(path)?;
    let data = f.array2("data")?;
    let sfreq: f64 = f
        .metadata_json("sfreq")?
        .ok_or_else(|| format_err(format!("{}: no sfreq metadata", path.display())))?;
    let channels: Vec<Channel> = f
        .metadata_json("channels")?
        .ok_or_else(|| format_err(format!("{}: no channel metadata", path.display())))?;
    let mut rec = Recording::new(data, sfreq, channels)?;
    rec.annotations = f.metadata_json::<Vec<Annotation>>("annotations")?.unwrap_or_default();
    rec.montage = f.metadata_json::<Montage>("montage")?;
    Ok(rec)
}

/// Load a raw session matrix and, when the file carries one, its sampling
/// rate.
pub fn load_raw_session(path: &Path) -> Result<(Array2<f64>, Option<f64>)> {
    let f = StFile::open(path)?;
    let data = f.array2("data")?;
    let sfreq = if f.names().contains(&"sfreq") {
        let t = f.tensor("sfreq")?;
        Some(*t.values.first().ok_or_else(|| format_err(format!("{}: empty sfreq tensor", path.display())))?)
    } else {
        f.metadata_json::<f64>("sfreq")?
    };
    debug!("{}: {} rows x {} samples @ {sfreq:?} Hz", path.display(), data.nrows(), data.ncols());
    Ok((data, sfreq))
}

/// Write a raw session file in the layout [`load_raw_session`] reads.
pub fn save_raw_session(data: &Array2<f64>, sfreq: f64, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_arr2("data", data);
    w.add_f64("sfreq", &[sfreq], &[]);
    w.write(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Channel;

    #[test]
    fn header_is_aligned_and_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.safetensors");
        let mut w = StWriter::new();
        w.add_i32("labels", &[3, 4, 3], &[3]);
        w.add_i64("perm", &[2, 0, 1], &[3]);
        w.add_f32("x", &[0.5, -1.5], &[2]);
        w.add_metadata("note", "hello");
        w.write(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);

        let f = StFile::from_bytes(bytes).unwrap();
        assert_eq!(f.tensor("labels").unwrap().values, vec![3.0, 4.0, 3.0]);
        assert_eq!(f.tensor("perm").unwrap().dtype, "I64");
        assert_eq!(f.tensor("x").unwrap().values, vec![0.5, -1.5]);
        assert_eq!(f.metadata("note"), Some("hello"));
        assert!(!f.names().contains(&METADATA_KEY));
    }

    #[test]
    fn recording_survives_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.safetensors");
        let data = Array2::from_shape_fn((2, 7), |(c, t)| c as f64 - t as f64 * 0.25);
        let mut ch = vec![Channel::eeg("ch_1"), Channel::eeg("ch_2")];
        ch[1].label = "Cz".into();
        ch[1].interpolated = true;
        let mut rec = Recording::new(data, 250.0, ch).unwrap();
        rec.annotations.push(Annotation { onset: 0.5, duration: 0.0, description: "imagery up".into() });
        rec.montage = Some(Montage([("Cz".to_string(), [0.0, 0.0, 1.0])].into_iter().collect()));

        save_recording(&rec, &path).unwrap();
        assert_eq!(load_recording(&path).unwrap(), rec);
    }

    #[test]
    fn raw_session_with_f32_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.safetensors");
        let mut w = StWriter::new();
        w.add_f32("data", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        w.add_metadata("sfreq", "500");
        w.write(&path).unwrap();

        let (data, sfreq) = load_raw_session(&path).unwrap();
        assert_eq!(data.dim(), (2, 3));
        assert_eq!(data[[1, 0]], 4.0);
        assert_eq!(sfreq, Some(500.0));
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        assert!(matches!(StFile::from_bytes(vec![1, 2, 3]), Err(PrepError::Format(_))));
        let mut bytes = 1000u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(matches!(StFile::from_bytes(bytes), Err(PrepError::Format(_))));
    }

    #[test]
    fn byte_count_must_match_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        let mut w = StWriter::new();
        w.add_f64("data", &[1.0, 2.0, 3.0], &[2, 2]);
        w.write(&path).unwrap();
        assert!(StFile::open(&path).unwrap().tensor("data").is_err());
    }
}
