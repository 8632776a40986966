//! End-to-end compilation tests: synthetic container in, published
//! artifacts out, with the cross-collection ordering invariants
//! checked against the re-loaded blobs.

use cellatlas_core::compiler::RegistryCompiler;
use cellatlas_core::container::ContainerBuilder;
use cellatlas_core::error::{Error, InputAmbiguityError};
use cellatlas_core::match_map::MatchMap;
use cellatlas_core::registry;
use ndarray::{Array2, Array3, array};
use std::path::Path;

const HEIGHT: usize = 6;
const WIDTH: usize = 7;

/// Two sessions, three global cells, two local cells per session.
/// Footprint values encode the session index so ordering mix-ups
/// surface as value mismatches.
fn write_container(dir: &Path) {
    let raw_map = array![[1.0, 0.0, 2.0], [2.0, 1.0, 0.0]];
    let fp0 = Array3::from_elem((HEIGHT, WIDTH, 2), 10.0);
    let fp1 = Array3::from_elem((HEIGHT, WIDTH, 2), 20.0);
    let cn0 = array![[1.0, 2.0], [10.0, 20.0]];
    let cn1 = array![[3.0, 4.0], [30.0, 40.0]];

    ContainerBuilder::new()
        .index_map(&raw_map)
        .footprints(&fp0)
        .footprints(&fp1)
        .centroids(&cn0)
        .centroids(&cn1)
        .write_to(&dir.join("cellreg_20260829.regz"))
        .unwrap();
}

#[test]
fn compiles_the_documented_scenario() {
    let dir = tempfile::tempdir().unwrap();
    write_container(dir.path());

    let registry = RegistryCompiler::new(dir.path()).compile().unwrap();

    assert_eq!(
        registry.match_map.as_array(),
        array![[0, 1], [-1, 0], [1, -1]].view()
    );
    assert_eq!(registry.num_sessions(), 2);
    assert_eq!(registry.footprints[0].dim(), (2, HEIGHT, WIDTH));
    assert_eq!(registry.footprints[1].dim(), (2, HEIGHT, WIDTH));
    assert_eq!(registry.centroids[0].dim(), (2, 2));
    assert_eq!(registry.centroids[1].dim(), (2, 2));
}

#[test]
fn non_sentinel_entries_stay_within_local_counts() {
    let dir = tempfile::tempdir().unwrap();
    write_container(dir.path());

    let registry = RegistryCompiler::new(dir.path()).compile().unwrap();
    let map = registry.match_map.as_array();

    for session in 0..registry.num_sessions() {
        let local_count = registry.footprints[session].dim().0;
        let mut seen = std::collections::HashSet::new();
        for cell in 0..registry.match_map.num_cells() {
            let v = map[[cell, session]];
            if v == MatchMap::UNMATCHED {
                continue;
            }
            assert!(
                (0..local_count as i64).contains(&v),
                "entry ({cell}, {session}) = {v} out of range"
            );
            assert!(seen.insert(v), "duplicate local index {v} in column {session}");
        }
    }
}

#[test]
fn run_publishes_reloadable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_container(dir.path());

    let registry = RegistryCompiler::new(dir.path()).run().unwrap();

    let match_map = registry::load_match_map(dir.path()).unwrap();
    let footprints = registry::load_footprints(dir.path()).unwrap();
    let centroids = registry::load_centroids(dir.path()).unwrap();

    // Bit-identical round trip of the integer grid.
    assert_eq!(match_map, registry.match_map);

    // Session order stability: position k of both sequences and column
    // k of the match map refer to the same session.
    assert_eq!(footprints[0][[0, 0, 0]], 10.0);
    assert_eq!(footprints[1][[0, 0, 0]], 20.0);
    assert_eq!(centroids[0][[0, 0]], 1.0);
    assert_eq!(centroids[1][[0, 0]], 3.0);
    assert_eq!(match_map.column_cardinality(0), 2);
    assert_eq!(match_map.column_cardinality(1), 2);
}

#[test]
fn field_of_view_is_constant_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    write_container(dir.path());

    let registry = RegistryCompiler::new(dir.path()).run().unwrap();
    let dims: Vec<(usize, usize)> = registry
        .footprints
        .iter()
        .map(|fp| (fp.dim().1, fp.dim().2))
        .collect();
    assert!(dims.iter().all(|&d| d == (HEIGHT, WIDTH)), "dims: {dims:?}");
}

#[test]
fn ambiguous_directories_abort_before_opening_anything() {
    let empty = tempfile::tempdir().unwrap();
    let err = RegistryCompiler::new(empty.path()).run().unwrap_err();
    assert!(matches!(
        err,
        Error::InputAmbiguity(InputAmbiguityError::NoSourceFile { .. })
    ));
    assert_eq!(err.phase(), "source discovery");

    let crowded = tempfile::tempdir().unwrap();
    write_container(crowded.path());
    ContainerBuilder::new()
        .index_map(&Array2::zeros((1, 1)))
        .write_to(&crowded.path().join("cellreg_stale.regz"))
        .unwrap();
    let err = RegistryCompiler::new(crowded.path()).run().unwrap_err();
    assert!(matches!(
        err,
        Error::InputAmbiguity(InputAmbiguityError::MultipleSourceFiles { count: 2, .. })
    ));

    // Neither failure may leave artifacts behind.
    for dir in [empty.path(), crowded.path()] {
        assert!(!dir.join(registry::MATCH_MAP_FILE).exists());
        assert!(!dir.join(registry::FOOTPRINTS_FILE).exists());
        assert!(!dir.join(registry::CENTROIDS_FILE).exists());
    }
}

#[test]
fn rerun_is_a_full_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    write_container(dir.path());

    RegistryCompiler::new(dir.path()).run().unwrap();

    // Replace the container with a smaller registration and recompile.
    std::fs::remove_file(dir.path().join("cellreg_20260829.regz")).unwrap();
    ContainerBuilder::new()
        .index_map(&array![[1.0]])
        .footprints(&Array3::from_elem((HEIGHT, WIDTH, 1), 99.0))
        .centroids(&array![[5.0], [6.0]])
        .write_to(&dir.path().join("cellreg_rev2.regz"))
        .unwrap();
    RegistryCompiler::new(dir.path()).run().unwrap();

    let match_map = registry::load_match_map(dir.path()).unwrap();
    assert_eq!(match_map.num_cells(), 1);
    assert_eq!(match_map.num_sessions(), 1);
    let footprints = registry::load_footprints(dir.path()).unwrap();
    assert_eq!(footprints.len(), 1);
    assert_eq!(footprints[0][[0, 0, 0]], 99.0);
}
