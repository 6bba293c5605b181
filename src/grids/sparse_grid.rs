use std::io::Write;
use serde::{Deserialize, Serialize};
use crate::algorithms::coarsening::{self, CoarseningOptions};
use crate::algorithms::refinement::{BoundaryMode, RefinementEngine, RefinementFunctor, RefinementOptions};
use crate::errors::SGError;
use crate::generators;
use crate::refinement::surplus::SurplusRefinement;
use crate::serialization::SerializationFormat;
use crate::storage::{GridStorage, SequenceRemap};

///
/// Point storage together with a coefficient vector of `num_outputs` values
/// per point. The coefficient vector is kept aligned with the sequence numbers
/// through every refinement and removal.
///
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SparseGrid
{
    pub(crate) storage: GridStorage,
    pub(crate) boundary: BoundaryMode,
    pub(crate) num_outputs: usize,
    pub(crate) alpha: Vec<f64>,
}

impl SparseGrid
{
    pub fn new(num_inputs: usize, num_outputs: usize, boundary: BoundaryMode) -> Self
    {
        Self { storage: GridStorage::new(num_inputs), boundary, num_outputs, alpha: Vec::new() }
    }

    pub fn storage(&self) -> &GridStorage
    {
        &self.storage
    }

    pub fn alpha(&self) -> &[f64]
    {
        &self.alpha
    }

    pub fn alpha_mut(&mut self) -> &mut [f64]
    {
        &mut self.alpha
    }

    pub fn num_inputs(&self) -> usize
    {
        self.storage.num_inputs()
    }

    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    pub fn len(&self) -> usize
    {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.storage.is_empty()
    }

    pub fn has_boundary(&self) -> bool
    {
        self.boundary == BoundaryMode::Boundary
    }

    pub fn engine(&self) -> RefinementEngine
    {
        RefinementEngine(self.boundary)
    }

    fn sync_alpha(&mut self)
    {
        self.alpha.resize(self.storage.len() * self.num_outputs, 0.0);
    }

    ///
    /// Adds a regular sparse grid of level `level`, with boundary anchors if
    /// the grid has a boundary.
    ///
    pub fn sparse_grid(&mut self, level: u8) -> Result<(), SGError>
    {
        if self.has_boundary()
        {
            generators::regular_with_boundaries(&mut self.storage, level)?;
        }
        else
        {
            generators::regular(&mut self.storage, level)?;
        }
        self.sync_alpha();
        Ok(())
    }

    pub fn full_grid(&mut self, level: u8) -> Result<(), SGError>
    {
        if self.has_boundary()
        {
            generators::full_with_boundaries(&mut self.storage, level)?;
        }
        else
        {
            generators::full(&mut self.storage, level)?;
        }
        self.sync_alpha();
        Ok(())
    }

    ///
    /// Single refinement pass. New points get zero coefficients. Returns their
    /// sequence numbers.
    ///
    pub fn refine(&mut self, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        let indices = self.engine().refine(&mut self.storage, functor, options)?;
        self.sync_alpha();
        Ok(indices)
    }

    ///
    /// Ranked refinement of the `refinements_num` best points.
    ///
    pub fn refine_largest(&mut self, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        let indices = self.engine().refine_largest(&mut self.storage, functor, options)?;
        self.sync_alpha();
        Ok(indices)
    }

    ///
    /// Refines every point whose largest absolute coefficient exceeds `threshold`.
    ///
    pub fn refine_surplus(&mut self, threshold: f64, options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        let engine = self.engine();
        let functor = SurplusRefinement::new(&self.alpha, self.num_outputs, threshold);
        let indices = engine.refine(&mut self.storage, &functor, options)?;
        self.sync_alpha();
        Ok(indices)
    }

    pub fn coarsen(&mut self, functor: &dyn RefinementFunctor, options: &CoarseningOptions) -> Result<SequenceRemap, SGError>
    {
        let remap = coarsening::coarsen(&mut self.storage, functor, options)?;
        self.apply_remap(&remap)?;
        Ok(remap)
    }

    ///
    /// Removes the given points together with their coefficients.
    ///
    pub fn erase<I: IntoIterator<Item = usize>>(&mut self, sequences: I) -> Result<SequenceRemap, SGError>
    {
        let remap = self.storage.erase(sequences)?;
        self.apply_remap(&remap)?;
        Ok(remap)
    }

    fn apply_remap(&mut self, remap: &SequenceRemap) -> Result<(), SGError>
    {
        if !remap.is_identity()
        {
            self.alpha = remap.compact(&self.alpha, self.num_outputs)?;
        }
        Ok(())
    }

    pub fn write(&self, path: &str, format: SerializationFormat) -> Result<(), SGError>
    {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_| SGError::FileIOError)?);
        let buffer = crate::serialization::serialize(self, format)?;
        file.write_all(&buffer).map_err(|_| SGError::FileIOError)?;
        Ok(())
    }

    pub fn read_buffer(buffer: &[u8], format: SerializationFormat) -> Result<Self, SGError>
    {
        let grid: Self = crate::serialization::deserialize(buffer, format)?;
        if grid.alpha.len() != grid.storage.len() * grid.num_outputs
        {
            return Err(SGError::DimensionMismatch { expected: grid.storage.len() * grid.num_outputs, found: grid.alpha.len() });
        }
        Ok(grid)
    }

    ///
    /// Reads grid and coefficients from a reader.
    ///
    pub fn read<Reader: std::io::Read>(mut reader: Reader, format: SerializationFormat) -> Result<Self, SGError>
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_| SGError::FileIOError)?;
        Self::read_buffer(&bytes, format)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::refinement::user_defined::UserDefinedRefinement;
    use crate::storage::GridPoint;

    #[test]
    fn coefficients_follow_refinement()
    {
        let mut grid = SparseGrid::new(2, 2, BoundaryMode::Interior);
        grid.sparse_grid(2).unwrap();
        assert_eq!(grid.alpha().len(), 10);
        let seq = grid.storage().find(&GridPoint::new(&[2, 1], &[1, 1], true)).unwrap();
        grid.alpha_mut()[2 * seq + 1] = -4.0;
        let created = grid.refine_surplus(1.0, &RefinementOptions::default()).unwrap();
        // (2,1)x(1,1) gains two children in both directions
        assert_eq!(created.len(), 4);
        assert_eq!(grid.alpha().len(), 2 * grid.len());
        assert!(grid.alpha()[2 * 5..].iter().all(|&a| a == 0.0));
        assert_eq!(grid.alpha()[2 * seq + 1], -4.0);
    }

    #[test]
    fn coefficients_follow_removal()
    {
        let mut grid = SparseGrid::new(1, 1, BoundaryMode::Interior);
        grid.sparse_grid(3).unwrap();
        for (seq, a) in grid.alpha_mut().iter_mut().enumerate()
        {
            *a = seq as f64;
        }
        let remap = grid.erase([3, 5]).unwrap();
        assert_eq!(remap.new_len(), 5);
        assert_eq!(grid.alpha(), &[0.0, 1.0, 2.0, 4.0, 6.0]);

        let small = |storage: &GridStorage, seq: usize| storage.level_sum(seq) as f64;
        let functor = UserDefinedRefinement::new(&small, 4.0);
        grid.coarsen(&functor, &CoarseningOptions::default()).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.alpha(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn boundary_grid_roundtrip()
    {
        let mut grid = SparseGrid::new(2, 1, BoundaryMode::Boundary);
        grid.sparse_grid(2).unwrap();
        assert_eq!(grid.len(), 21);
        grid.alpha_mut()[3] = 1.5;
        let bytes = crate::serialization::serialize(&grid, SerializationFormat::BincodeLz4).unwrap();
        let restored = SparseGrid::read(bytes.as_slice(), SerializationFormat::BincodeLz4).unwrap();
        assert!(restored.has_boundary());
        assert!(restored.storage() == grid.storage());
        assert_eq!(restored.alpha(), grid.alpha());
    }
}
