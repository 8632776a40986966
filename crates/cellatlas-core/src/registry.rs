//! Compiled registry artifacts and their on-disk MessagePack form.
//!
//! A compiled registry is published as three independently loadable
//! blobs beside the input container. MessagePack keeps the artifacts
//! readable from any language with a msgpack decoder; each blob is a
//! self-describing tagged array record (dtype, shape, row-major data),
//! so dtype, the `-1` sentinel, axis order, and session order survive
//! the round trip exactly.
//!
//! Writes are staged: all three blobs go to `.tmp` files first and are
//! renamed into place only once every one of them has been written, so
//! a failed run never leaves a registry with mismatched artifacts.

use crate::centroids::Centroid;
use crate::error::{Result, SerializationError};
use crate::footprints::Footprint;
use crate::match_map::MatchMap;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

/// Match-map artifact file name.
pub const MATCH_MAP_FILE: &str = "match_map.mpk";

/// Footprint-collection artifact file name.
pub const FOOTPRINTS_FILE: &str = "footprints.mpk";

/// Centroid-collection artifact file name.
pub const CENTROIDS_FILE: &str = "centroids.mpk";

/// Self-describing serialized array: dtype tag, shape, row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayBlob<T> {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

/// The aggregate of one compilation: one match map plus parallel
/// per-session footprint and centroid sequences, identical session
/// order across all three.
#[derive(Debug)]
pub struct Registry {
    pub match_map: MatchMap,
    pub footprints: Vec<Footprint>,
    pub centroids: Vec<Centroid>,
}

impl Registry {
    /// Number of sessions in the registry.
    #[must_use]
    pub fn num_sessions(&self) -> usize {
        self.footprints.len()
    }

    /// Serialize all three collections to `dir`.
    ///
    /// Every blob is staged as `<name>.tmp` and renamed into place only
    /// after all of them have been written successfully.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let match_blob = ArrayBlob {
            dtype: "i64".to_string(),
            shape: vec![self.match_map.num_cells(), self.match_map.num_sessions()],
            data: self.match_map.as_array().iter().copied().collect(),
        };
        let footprint_blobs: Vec<ArrayBlob<f32>> = self
            .footprints
            .iter()
            .map(|fp| ArrayBlob {
                dtype: "f32".to_string(),
                shape: fp.shape().to_vec(),
                data: fp.iter().copied().collect(),
            })
            .collect();
        let centroid_blobs: Vec<ArrayBlob<f64>> = self
            .centroids
            .iter()
            .map(|cn| ArrayBlob {
                dtype: "f64".to_string(),
                shape: cn.shape().to_vec(),
                data: cn.iter().copied().collect(),
            })
            .collect();

        let artifacts: [(&str, Vec<u8>); 3] = [
            (MATCH_MAP_FILE, encode("match map", &match_blob)?),
            (FOOTPRINTS_FILE, encode("footprints", &footprint_blobs)?),
            (CENTROIDS_FILE, encode("centroids", &centroid_blobs)?),
        ];

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(artifacts.len());
        for (name, bytes) in &artifacts {
            let tmp = dir.join(format!("{name}.tmp"));
            std::fs::write(&tmp, bytes).map_err(|source| SerializationError::Write {
                path: tmp.clone(),
                source,
            })?;
            staged.push((tmp, dir.join(name)));
        }
        for (tmp, target) in staged {
            std::fs::rename(&tmp, &target).map_err(|source| SerializationError::Rename {
                path: target.clone(),
                source,
            })?;
            tracing::info!(artifact = %target.display(), "published registry artifact");
        }
        Ok(())
    }
}

fn encode<T: Serialize>(artifact: &'static str, value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value)
        .map_err(|source| SerializationError::Encode { artifact, source }.into())
}

fn decode<T: DeserializeOwned>(artifact: &'static str, bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|source| SerializationError::Decode { artifact, source }.into())
}

/// Load a previously written match map.
pub fn load_match_map(dir: &Path) -> Result<MatchMap> {
    let bytes = std::fs::read(dir.join(MATCH_MAP_FILE))?;
    let blob: ArrayBlob<i64> = decode("match map", &bytes)?;
    let map = to_array2("match map", blob)?;
    Ok(MatchMap::from_corrected(map))
}

/// Load a previously written footprint collection, in session order.
pub fn load_footprints(dir: &Path) -> Result<Vec<Footprint>> {
    let bytes = std::fs::read(dir.join(FOOTPRINTS_FILE))?;
    let blobs: Vec<ArrayBlob<f32>> = decode("footprints", &bytes)?;
    blobs.into_iter().map(|b| to_array3("footprints", b)).collect()
}

/// Load a previously written centroid collection, in session order.
pub fn load_centroids(dir: &Path) -> Result<Vec<Centroid>> {
    let bytes = std::fs::read(dir.join(CENTROIDS_FILE))?;
    let blobs: Vec<ArrayBlob<f64>> = decode("centroids", &bytes)?;
    blobs.into_iter().map(|b| to_array2("centroids", b)).collect()
}

fn to_array2<T>(artifact: &'static str, blob: ArrayBlob<T>) -> Result<Array2<T>> {
    let [rows, cols] = blob.shape[..] else {
        return Err(SerializationError::ShapeMismatch {
            artifact,
            shape: blob.shape,
            len: blob.data.len(),
        }
        .into());
    };
    let len = blob.data.len();
    Array2::from_shape_vec((rows, cols), blob.data).map_err(|_| {
        SerializationError::ShapeMismatch {
            artifact,
            shape: vec![rows, cols],
            len,
        }
        .into()
    })
}

fn to_array3<T>(artifact: &'static str, blob: ArrayBlob<T>) -> Result<Array3<T>> {
    let [a, b, c] = blob.shape[..] else {
        return Err(SerializationError::ShapeMismatch {
            artifact,
            shape: blob.shape,
            len: blob.data.len(),
        }
        .into());
    };
    let len = blob.data.len();
    Array3::from_shape_vec((a, b, c), blob.data).map_err(|_| {
        SerializationError::ShapeMismatch {
            artifact,
            shape: vec![a, b, c],
            len,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_registry() -> Registry {
        let match_map = MatchMap::build(array![[1.0, 0.0, 2.0], [2.0, 1.0, 0.0]].view());
        let footprints = vec![
            Array3::from_elem((2, 3, 4), 0.5f32),
            Array3::from_elem((2, 3, 4), 0.25f32),
        ];
        let centroids = vec![
            array![[1.0, 2.0], [3.0, 4.0]],
            array![[5.0, 6.0], [7.0, 8.0]],
        ];
        Registry {
            match_map,
            footprints,
            centroids,
        }
    }

    #[test]
    fn match_map_roundtrip_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let registry = sample_registry();
        registry.write(dir.path()).unwrap();

        let loaded = load_match_map(dir.path()).unwrap();
        assert_eq!(loaded, registry.match_map);
        // Sentinel survives exactly.
        assert_eq!(loaded.as_array()[[1, 0]], MatchMap::UNMATCHED);
    }

    #[test]
    fn collections_roundtrip_in_session_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = sample_registry();
        registry.write(dir.path()).unwrap();

        let footprints = load_footprints(dir.path()).unwrap();
        let centroids = load_centroids(dir.path()).unwrap();
        assert_eq!(footprints.len(), 2);
        assert_eq!(centroids.len(), 2);
        assert_eq!(footprints[0], registry.footprints[0]);
        assert_eq!(footprints[1], registry.footprints[1]);
        assert_eq!(centroids[0], registry.centroids[0]);
        assert_eq!(centroids[1], registry.centroids[1]);
    }

    #[test]
    fn no_tmp_files_remain_after_write() {
        let dir = tempfile::tempdir().unwrap();
        sample_registry().write(dir.path()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stale staging files: {leftovers:?}");
    }

    #[test]
    fn rerun_overwrites_previous_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        sample_registry().write(dir.path()).unwrap();

        let second = Registry {
            match_map: MatchMap::build(array![[1.0]].view()),
            footprints: vec![Array3::from_elem((1, 3, 4), 9.0f32)],
            centroids: vec![array![[0.0, 0.0]]],
        };
        second.write(dir.path()).unwrap();

        let loaded = load_match_map(dir.path()).unwrap();
        assert_eq!(loaded.num_cells(), 1);
        assert_eq!(load_footprints(dir.path()).unwrap()[0][[0, 0, 0]], 9.0);
    }

    #[test]
    fn corrupt_blob_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MATCH_MAP_FILE), b"junk").unwrap();
        let err = load_match_map(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Serialization(SerializationError::Decode { .. })
        ));
    }
}
