//! Circuit validation.

use crate::error::{NodalError, Result};
use crate::solver::Matrix;

/// Check that no set of voltage sources forms a loop.
///
/// The `gl` rows belonging to voltage source branches hold the source
/// incidence (+1/-1 per terminal). If those rows are linearly dependent,
/// some loop of sources (or a source shorted by a wire) over-determines its
/// node voltages.
pub fn check_voltage_source_loops(gl: &Matrix, branches: &[usize]) -> Result<()> {
    if branches.is_empty() {
        return Ok(());
    }

    let mut incidence = Matrix::new(branches.len(), gl.cols());
    for (row, &br) in branches.iter().enumerate() {
        incidence.row_mut(row).copy_from_slice(gl.row(br));
    }

    let rank = incidence.rank();
    if rank < branches.len() {
        return Err(NodalError::Topology {
            sources: branches.len(),
            rank,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_sources_rejected() {
        // Unknowns: node a, branch 1, branch 2; both sources from a to ground
        let mut gl = Matrix::new(3, 3);
        gl.stamp_branch(Some(0), None, 1);
        gl.stamp_branch(Some(0), None, 2);
        let err = check_voltage_source_loops(&gl, &[1, 2]).unwrap_err();
        assert!(matches!(err, NodalError::Topology { sources: 2, rank: 1 }));
    }

    #[test]
    fn test_shorted_source_rejected() {
        let mut gl = Matrix::new(2, 2);
        gl.stamp_branch(Some(0), Some(0), 1);
        assert!(check_voltage_source_loops(&gl, &[1]).is_err());
    }

    #[test]
    fn test_series_sources_accepted() {
        // Unknowns: a, b, branch 2 (a->b), branch 3 (b->gnd)
        let mut gl = Matrix::new(4, 4);
        gl.stamp_branch(Some(0), Some(1), 2);
        gl.stamp_branch(Some(1), None, 3);
        assert!(check_voltage_source_loops(&gl, &[2, 3]).is_ok());
        assert!(check_voltage_source_loops(&gl, &[]).is_ok());
    }
}
