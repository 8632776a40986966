//! Per-session spatial footprint assembly.
//!
//! Footprint stacks dominate the memory profile of a compilation, so
//! assembly is strictly session-by-session: one raw f64 stack is
//! materialized, reordered, and narrowed to f32 before the next
//! session's array is fetched.

use crate::container::{ReferenceResolver, SessionRef};
use crate::error::{DataFormatError, Result};
use ndarray::{Array3, Ix3};

/// One session's footprint stack: (cell, height, width), f32.
pub type Footprint = Array3<f32>;

/// Assemble footprint stacks in canonical session order.
///
/// Each raw array arrives stored as (height, width, cell); the axes are
/// reordered to (cell, height, width). Does not verify that the cell
/// count agrees with the match map's column cardinality; the upstream
/// tool offers no such guarantee and the check belongs to callers.
pub fn assemble(
    resolver: &mut dyn ReferenceResolver,
    refs: &[SessionRef],
) -> Result<Vec<Footprint>> {
    let mut footprints = Vec::with_capacity(refs.len());
    for (session, reference) in refs.iter().enumerate() {
        let raw = resolver.resolve(reference)?;
        let got = raw.ndim();
        let raw = raw
            .into_dimensionality::<Ix3>()
            .map_err(|_| DataFormatError::WrongRank {
                path: reference.as_str().to_string(),
                want: 3,
                got,
            })?;

        // (H, W, cell) -> (cell, H, W), narrowed immediately so the
        // only f64 copy alive is the current session's raw array.
        let stack: Footprint = raw.permuted_axes([2, 0, 1]).mapv(|v| v as f32);
        tracing::debug!(
            session,
            cells = stack.dim().0,
            height = stack.dim().1,
            width = stack.dim().2,
            "assembled footprint stack"
        );
        footprints.push(stack);
    }
    Ok(footprints)
}
