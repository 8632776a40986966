//! `.regz` registration container handling.
//!
//! A `.regz` file is the hierarchical container emitted by the upstream
//! cross-session registration tool: a ZIP archive holding a
//! `registry.json` manifest plus raw little-endian dataset payloads.
//! The manifest groups everything under one top-level struct key:
//!
//! ```json
//! {
//!   "cell_registered": {
//!     "datasets":   { "cell_to_index_map": { "dtype": "f64", "shape": [5, 120], "path": "data/map.bin" } },
//!     "references": { "spatial_footprints_corrected": ["fp/0", "fp/1"],
//!                     "centroid_locations_corrected": ["cn/0", "cn/1"] },
//!     "handles":    { "fp/0": { "dtype": "f64", "shape": [50, 60, 12], "path": "data/fp0.bin" } }
//!   }
//! }
//! ```
//!
//! Reference handles are opaque strings; the order of a `references`
//! array is the canonical session order for the whole registry. The
//! [`ReferenceResolver`] trait is the seam between "which sessions
//! exist" (the handle arrays) and "how a session's data is fetched"
//! (this backend), so the container format can be swapped without
//! touching the compiler.

use crate::error::{DataFormatError, Result};
use ndarray::{Array2, ArrayD, Ix2, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Manifest entry name inside the archive.
pub const MANIFEST_NAME: &str = "registry.json";

/// Top-level struct key the registration tool writes everything under.
pub const TOP_LEVEL_STRUCT: &str = "cell_registered";

/// Dataset field holding the raw (sessions × cells) index map.
pub const INDEX_MAP_FIELD: &str = "cell_to_index_map";

/// Reference field holding per-session footprint handles.
pub const FOOTPRINT_REFS_FIELD: &str = "spatial_footprints_corrected";

/// Reference field holding per-session centroid handles.
pub const CENTROID_REFS_FIELD: &str = "centroid_locations_corrected";

/// Element type of a stored dataset payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    F64,
    F32,
    I64,
}

impl Dtype {
    /// Width of one element in bytes.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 => 4,
        }
    }
}

/// Location and layout of one raw dataset payload inside the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub path: String,
}

impl DatasetDescriptor {
    fn expected_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.width()
    }
}

/// Opaque per-session reference handle. Position in the containing
/// reference array defines the session's canonical index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef(String);

impl SessionRef {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The top-level registration struct as parsed from the manifest.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegisteredStruct {
    /// Inline datasets, keyed by field name.
    #[serde(default)]
    datasets: BTreeMap<String, DatasetDescriptor>,
    /// Ordered reference-handle arrays, keyed by field name.
    #[serde(default)]
    references: BTreeMap<String, Vec<String>>,
    /// Handle table: opaque handle → dataset descriptor.
    #[serde(default)]
    handles: BTreeMap<String, DatasetDescriptor>,
}

/// Dereferences per-session handles into concrete numeric arrays.
///
/// `session_refs` fixes the canonical session order; `resolve` fetches
/// one session's raw array on demand, widened to f64 regardless of the
/// stored dtype.
pub trait ReferenceResolver {
    /// Ordered reference handles under a named field.
    fn session_refs(&self, field: &str) -> Result<Vec<SessionRef>>;

    /// Dereference one handle into the raw array it points at.
    fn resolve(&mut self, reference: &SessionRef) -> Result<ArrayD<f64>>;
}

/// An opened registration container: parsed top-level struct plus the
/// backing archive. Opened once per compilation, read exhaustively,
/// then dropped; dropping releases the archive deterministically.
#[derive(Debug)]
pub struct RegistrationSource {
    strct: RegisteredStruct,
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
    source_path: PathBuf,
}

impl RegistrationSource {
    /// Open a `.regz` container from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, path.to_path_buf())
    }

    /// Open a container from in-memory bytes.
    pub fn from_bytes(bytes: Vec<u8>, source_path: PathBuf) -> Result<Self> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(DataFormatError::Archive)?;

        let manifest_str = {
            let mut entry = archive
                .by_name(MANIFEST_NAME)
                .map_err(|_| DataFormatError::MissingManifest)?;
            let mut buf = String::new();
            entry
                .read_to_string(&mut buf)
                .map_err(crate::error::Error::Io)?;
            buf
        };

        let mut manifest: BTreeMap<String, RegisteredStruct> =
            serde_json::from_str(&manifest_str).map_err(DataFormatError::Manifest)?;
        let strct = manifest
            .remove(TOP_LEVEL_STRUCT)
            .ok_or_else(|| DataFormatError::MissingField(TOP_LEVEL_STRUCT.to_string()))?;

        Ok(Self {
            strct,
            archive,
            source_path,
        })
    }

    /// The source path this container was opened from.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Read the raw (sessions × cells) index map exactly as stored.
    pub fn index_map(&mut self) -> Result<Array2<f64>> {
        let desc = self
            .strct
            .datasets
            .get(INDEX_MAP_FIELD)
            .ok_or_else(|| DataFormatError::MissingField(INDEX_MAP_FIELD.to_string()))?
            .clone();
        let raw = self.read_dataset(&desc)?;
        let got = raw.ndim();
        raw.into_dimensionality::<Ix2>()
            .map_err(|_| {
                DataFormatError::WrongRank {
                    path: desc.path.clone(),
                    want: 2,
                    got,
                }
                .into()
            })
    }

    /// Read and decode one dataset payload into a dynamic-dimension
    /// f64 array, in the container's own (row-major) storage order.
    fn read_dataset(&mut self, desc: &DatasetDescriptor) -> Result<ArrayD<f64>> {
        let bytes = {
            let mut entry = self
                .archive
                .by_name(&desc.path)
                .map_err(|_| DataFormatError::BrokenReference(desc.path.clone()))?;
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(crate::error::Error::Io)?;
            buf
        };

        let expected = desc.expected_len();
        if bytes.len() != expected {
            return Err(DataFormatError::Truncated {
                path: desc.path.clone(),
                expected,
                found: bytes.len(),
            }
            .into());
        }

        let values = decode_le(desc.dtype, &bytes);
        ArrayD::from_shape_vec(IxDyn(&desc.shape), values).map_err(|_| {
            DataFormatError::Truncated {
                path: desc.path.clone(),
                expected,
                found: bytes.len(),
            }
            .into()
        })
    }
}

impl ReferenceResolver for RegistrationSource {
    fn session_refs(&self, field: &str) -> Result<Vec<SessionRef>> {
        let handles = self
            .strct
            .references
            .get(field)
            .ok_or_else(|| DataFormatError::MissingField(field.to_string()))?;
        Ok(handles.iter().cloned().map(SessionRef).collect())
    }

    fn resolve(&mut self, reference: &SessionRef) -> Result<ArrayD<f64>> {
        let desc = self
            .strct
            .handles
            .get(reference.as_str())
            .ok_or_else(|| DataFormatError::BrokenReference(reference.as_str().to_string()))?
            .clone();
        self.read_dataset(&desc)
    }
}

/// Decode a little-endian payload into f64 values.
fn decode_le(dtype: Dtype, bytes: &[u8]) -> Vec<f64> {
    match dtype {
        Dtype::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                f64::from_le_bytes(b)
            })
            .collect(),
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| {
                let mut b = [0u8; 4];
                b.copy_from_slice(c);
                f64::from(f32::from_le_bytes(b))
            })
            .collect(),
        Dtype::I64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                i64::from_le_bytes(b) as f64
            })
            .collect(),
    }
}

/// Build a `.regz` container in memory, mirroring what the upstream
/// registration tool writes. Used by tests and exporter-side tooling.
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    strct: RegisteredStruct,
    payloads: Vec<(String, Vec<u8>)>,
    next_payload: usize,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the raw (sessions × cells) index map.
    #[must_use]
    pub fn index_map(mut self, map: &Array2<f64>) -> Self {
        let desc = self.store(map.shape(), map.iter().copied());
        self.strct
            .datasets
            .insert(INDEX_MAP_FIELD.to_string(), desc);
        self
    }

    /// Append one session's raw (H × W × cell) footprint array. Call
    /// order defines session order.
    #[must_use]
    pub fn footprints(self, raw: &ndarray::Array3<f64>) -> Self {
        let shape = raw.shape().to_vec();
        self.reference(FOOTPRINT_REFS_FIELD, "fp", &shape, raw.iter().copied())
    }

    /// Append one session's raw (2 × cell) centroid array. Call order
    /// defines session order.
    #[must_use]
    pub fn centroids(self, raw: &Array2<f64>) -> Self {
        let shape = raw.shape().to_vec();
        self.reference(CENTROID_REFS_FIELD, "cn", &shape, raw.iter().copied())
    }

    /// Register a dangling handle with no backing descriptor (for
    /// exercising broken-reference handling).
    #[must_use]
    pub fn dangling_reference(mut self, field: &str, handle: &str) -> Self {
        self.strct
            .references
            .entry(field.to_string())
            .or_default()
            .push(handle.to_string());
        self
    }

    fn reference(
        mut self,
        field: &str,
        prefix: &str,
        shape: &[usize],
        values: impl Iterator<Item = f64>,
    ) -> Self {
        let index = self
            .strct
            .references
            .get(field)
            .map_or(0, Vec::len);
        let handle = format!("{prefix}/{index}");
        let desc = self.store(shape, values);
        self.strct.handles.insert(handle.clone(), desc);
        self.strct
            .references
            .entry(field.to_string())
            .or_default()
            .push(handle);
        self
    }

    fn store(
        &mut self,
        shape: &[usize],
        values: impl Iterator<Item = f64>,
    ) -> DatasetDescriptor {
        let path = format!("data/{}.bin", self.next_payload);
        self.next_payload += 1;
        let mut bytes = Vec::with_capacity(shape.iter().product::<usize>() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.payloads.push((path.clone(), bytes));
        DatasetDescriptor {
            dtype: Dtype::F64,
            shape: shape.to_vec(),
            path,
        }
    }

    /// Build the `.regz` ZIP archive and return raw bytes.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut manifest = BTreeMap::new();
        manifest.insert(TOP_LEVEL_STRUCT, &self.strct);
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).map_err(DataFormatError::Manifest)?;

        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);

            writer
                .start_file(MANIFEST_NAME, options)
                .map_err(DataFormatError::Archive)?;
            std::io::Write::write_all(&mut writer, &manifest_json)
                .map_err(crate::error::Error::Io)?;

            for (path, bytes) in &self.payloads {
                writer
                    .start_file(path.as_str(), options)
                    .map_err(DataFormatError::Archive)?;
                std::io::Write::write_all(&mut writer, bytes)
                    .map_err(crate::error::Error::Io)?;
            }

            writer.finish().map_err(DataFormatError::Archive)?;
        }
        Ok(buf)
    }

    /// Build and write to a file path.
    pub fn write_to(self, path: &Path) -> Result<()> {
        let bytes = self.build()?;
        std::fs::write(path, &bytes)?;
        Ok(())
    }
}
