//! Per-session centroid assembly.

use crate::container::{ReferenceResolver, SessionRef};
use crate::error::{DataFormatError, Result};
use ndarray::{Array2, Ix2};

/// One session's centroid array: (cell, 2), spatially-corrected (x, y).
pub type Centroid = Array2<f64>;

/// Assemble centroid arrays in canonical session order.
///
/// Raw arrays arrive stored as (2, cell) and are transposed to
/// (cell, 2). No other numeric transform: spatial correction is already
/// applied by the upstream tool.
pub fn assemble(
    resolver: &mut dyn ReferenceResolver,
    refs: &[SessionRef],
) -> Result<Vec<Centroid>> {
    let mut centroids = Vec::with_capacity(refs.len());
    for (session, reference) in refs.iter().enumerate() {
        let raw = resolver.resolve(reference)?;
        let got = raw.ndim();
        let raw = raw
            .into_dimensionality::<Ix2>()
            .map_err(|_| DataFormatError::WrongRank {
                path: reference.as_str().to_string(),
                want: 2,
                got,
            })?;

        let transposed = raw.reversed_axes().as_standard_layout().into_owned();
        tracing::debug!(session, cells = transposed.nrows(), "assembled centroids");
        centroids.push(transposed);
    }
    Ok(centroids)
}
