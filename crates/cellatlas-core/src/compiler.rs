//! End-to-end registry compilation.
//!
//! One invocation: locate exactly one `.regz` container in the target
//! directory, open it, build the match map, assemble footprints and
//! centroids, drop the container handle, then publish the three
//! artifacts. Full recompute, full overwrite; no incremental state
//! survives between runs.

use crate::centroids;
use crate::container::{
    CENTROID_REFS_FIELD, FOOTPRINT_REFS_FIELD, ReferenceResolver, RegistrationSource,
};
use crate::error::{InputAmbiguityError, Result};
use crate::footprints;
use crate::match_map::MatchMap;
use crate::registry::Registry;
use std::path::{Path, PathBuf};

/// Glob the upstream registration tool's output must match. Exactly one
/// file per target directory.
pub const SOURCE_GLOB: &str = "cellreg*.regz";

/// Batch compiler for one target directory.
#[derive(Debug, Clone)]
pub struct RegistryCompiler {
    dir: PathBuf,
}

impl RegistryCompiler {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Compile and publish: `compile` followed by `Registry::write`
    /// into the same directory.
    pub fn run(&self) -> Result<Registry> {
        let registry = self.compile()?;
        registry.write(&self.dir)?;
        Ok(registry)
    }

    /// Compile the directory's container into an in-memory registry.
    pub fn compile(&self) -> Result<Registry> {
        let source_path = self.locate_source()?;
        tracing::info!(source = %source_path.display(), "compiling registration container");

        // The container handle lives only inside this scope; it is
        // released before any artifact is written, on success and on
        // every error path alike.
        let (match_map, footprints, centroids) = {
            let mut source = RegistrationSource::open(&source_path)?;

            let raw_map = source.index_map()?;
            let match_map = MatchMap::build(raw_map.view());

            let footprint_refs = source.session_refs(FOOTPRINT_REFS_FIELD)?;
            let centroid_refs = source.session_refs(CENTROID_REFS_FIELD)?;
            let footprints = footprints::assemble(&mut source, &footprint_refs)?;
            let centroids = centroids::assemble(&mut source, &centroid_refs)?;
            (match_map, footprints, centroids)
        };

        tracing::info!(
            cells = match_map.num_cells(),
            sessions = match_map.num_sessions(),
            "registry compiled"
        );
        Ok(Registry {
            match_map,
            footprints,
            centroids,
        })
    }

    /// The target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locate_source(&self) -> Result<PathBuf> {
        let pattern = self.dir.join(SOURCE_GLOB);
        let mut matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(InputAmbiguityError::Pattern)?
            .filter_map(std::result::Result::ok)
            .collect();
        matches.sort();

        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(InputAmbiguityError::NoSourceFile {
                dir: self.dir.clone(),
                pattern: SOURCE_GLOB.to_string(),
            }
            .into()),
            count => Err(InputAmbiguityError::MultipleSourceFiles {
                dir: self.dir.clone(),
                pattern: SOURCE_GLOB.to_string(),
                count,
            }
            .into()),
        }
    }
}
