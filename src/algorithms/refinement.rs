use std::cmp::Reverse;
use std::collections::BinaryHeap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use crate::errors::SGError;
use crate::generators::SubspaceIterator;
use crate::storage::{GridPoint, GridStorage, MAX_LEVEL};
use crate::utilities::float::OrdF64;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementMode
{
    /// A selected point is refined in every direction with missing children.
    #[default]
    Isotropic,
    /// Only directions whose per-dimension score exceeds the threshold are refined.
    Anisotropic,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementOptions
{
    pub refinement_mode: RefinementMode,
    /// Per-dimension level caps. No child beyond these levels is created.
    pub level_limits: Option<Vec<u8>>,
    /// Global level cap, combined with `level_limits`.
    pub max_level: Option<u8>,
}

impl RefinementOptions
{
    pub fn anisotropic() -> Self
    {
        Self { refinement_mode: RefinementMode::Anisotropic, ..Default::default() }
    }

    pub fn with_max_level(max_level: u8) -> Self
    {
        Self { max_level: Some(max_level), ..Default::default() }
    }

    fn resolve_limits(&self, num_inputs: usize) -> Result<Vec<u8>, SGError>
    {
        let mut limits = match self.level_limits.as_ref()
        {
            Some(limits) if limits.len() != num_inputs => return Err(SGError::InvalidLevelLimits),
            Some(limits) => limits.clone(),
            None => vec![MAX_LEVEL; num_inputs],
        };
        let max_level = self.max_level.unwrap_or(MAX_LEVEL).min(MAX_LEVEL);
        limits.iter_mut().for_each(|l| *l = (*l).min(max_level));
        Ok(limits)
    }
}

///
/// Scoring contract consumed by refinement and coarsening. The two are never
/// performed simultaneously but share this interface so that user-specified
/// indicators can drive either operation.
///
pub trait RefinementFunctor : Send + Sync
{
    ///
    /// Indicator magnitude of the point at `seq`, used for ranking.
    ///
    fn score(&self, storage: &GridStorage, seq: usize) -> f64;

    ///
    /// Indicator for refining `seq` in direction `dim` only. Used in
    /// anisotropic mode; defaults to the point score.
    ///
    fn score_dimension(&self, storage: &GridStorage, seq: usize, _dim: usize) -> f64
    {
        self.score(storage, seq)
    }

    ///
    /// Points scoring at or below this value are never refined.
    ///
    fn threshold(&self) -> f64;

    ///
    /// Maximum number of points refined per call. `None` means unlimited.
    ///
    fn refinements_num(&self) -> Option<usize>
    {
        None
    }

    ///
    /// Admissibility-aware functors veto points whose refinement they consider
    /// premature.
    ///
    fn is_admissible(&self, _storage: &GridStorage, _seq: usize) -> bool
    {
        true
    }

    ///
    /// Returns the maximum number of points that may be removed by coarsening.
    ///
    fn max_num_removed(&self) -> Option<usize>
    {
        None
    }

    ///
    /// Leaves scoring below this value are removable by coarsening.
    ///
    fn coarsening_threshold(&self) -> f64
    {
        self.threshold()
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryMode
{
    /// Interior grids: level-zero directions are never refined.
    #[default]
    Interior,
    /// Grids with boundary anchors on level zero.
    Boundary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementCandidate
{
    pub seq: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubspaceCandidate
{
    pub level: Vec<u8>,
    pub value: f64,
}

///
/// Keeps the `capacity` largest entries of `items`. On equal values the
/// smaller key survives. Result is sorted by descending value.
///
fn retain_largest<K: Ord, I: IntoIterator<Item = (f64, K)>>(items: I, capacity: Option<usize>) -> Vec<(f64, K)>
{
    let capacity = capacity.unwrap_or(usize::MAX);
    if capacity == 0
    {
        return Vec::new();
    }
    let mut heap = BinaryHeap::new();
    for (value, key) in items
    {
        heap.push(Reverse((OrdF64(value), Reverse(key))));
        if heap.len() > capacity
        {
            heap.pop();
        }
    }
    // ascending order of Reverse(..) is descending order of value
    heap.into_sorted_vec().into_iter().map(|Reverse((value, Reverse(key)))| (value.get(), key)).collect()
}

///
/// Hash-based refinement engine. Holds no state besides its boundary mode;
/// every call borrows the storage it mutates.
///
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementEngine(pub BoundaryMode);

impl RefinementEngine
{
    pub fn interior() -> Self
    {
        Self(BoundaryMode::Interior)
    }

    pub fn with_boundary() -> Self
    {
        Self(BoundaryMode::Boundary)
    }

    #[inline]
    pub fn has_boundary(&self) -> bool
    {
        self.0 == BoundaryMode::Boundary
    }

    ///
    /// Directions in which `point` lacks at least one child that the level
    /// limits allow. Interior grids skip level-zero directions.
    ///
    fn missing_child_dimensions(&self, storage: &GridStorage, point: &GridPoint, limits: &[u8]) -> Vec<usize>
    {
        let mut dims = Vec::new();
        for dim in 0..storage.num_inputs()
        {
            let level = point.level[dim];
            if level >= limits[dim]
            {
                continue;
            }
            if level == 0
            {
                if self.has_boundary() && !storage.contains(&point.level_one(dim))
                {
                    dims.push(dim);
                }
            }
            else if !storage.contains(&point.left_child(dim)) || !storage.contains(&point.right_child(dim))
            {
                dims.push(dim);
            }
        }
        dims
    }

    fn selected_dimensions(&self, storage: &GridStorage, functor: &dyn RefinementFunctor, seq: usize, dims: Vec<usize>, mode: RefinementMode) -> Vec<usize>
    {
        let threshold = functor.threshold();
        match mode
        {
            RefinementMode::Isotropic => dims,
            RefinementMode::Anisotropic => dims.into_iter().filter(|&d| functor.score_dimension(storage, seq, d) > threshold).collect(),
        }
    }

    ///
    /// Single refinement pass. Every point present when the pass starts is
    /// visited once in sequence order; points created during the pass are not
    /// candidates until the next call. A candidate scoring above the threshold
    /// is refined immediately. Returns the sequence numbers of the new points.
    ///
    pub fn refine(&self, storage: &mut GridStorage, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        let limits = options.resolve_limits(storage.num_inputs())?;
        let original_number = storage.len();
        let budget = functor.refinements_num().unwrap_or(usize::MAX);
        let threshold = functor.threshold();
        let mut candidates = 0;
        let mut refined = 0;
        for seq in 0..original_number
        {
            if refined >= budget
            {
                break;
            }
            let point = storage.point(seq)?;
            let dims = self.missing_child_dimensions(storage, &point, &limits);
            if dims.is_empty() || !functor.is_admissible(storage, seq)
            {
                continue;
            }
            candidates += 1;
            if options.refinement_mode == RefinementMode::Isotropic && functor.score(storage, seq) <= threshold
            {
                continue;
            }
            let dims = self.selected_dimensions(storage, functor, seq, dims, options.refinement_mode);
            if dims.is_empty()
            {
                continue;
            }
            storage.set_is_leaf(seq, false);
            for dim in dims
            {
                self.refine_1d(storage, point.clone(), dim)?;
            }
            refined += 1;
        }
        log::debug!("refinement pass: {} candidates, {} refined, {} points created", candidates, refined, storage.len() - original_number);
        Ok((original_number..storage.len()).collect())
    }

    ///
    /// Gathers the `refinements_num` best refinable points. Only admissible
    /// points scoring above the threshold are kept. Scores are computed before
    /// any mutation, in parallel when the `rayon` feature is enabled.
    ///
    pub fn collect_refinable_points(&self, storage: &GridStorage, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<RefinementCandidate>, SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        let limits = options.resolve_limits(storage.num_inputs())?;
        let mut refinable = Vec::new();
        for (seq, node) in storage.nodes().enumerate()
        {
            let point = GridPoint::from(node);
            if !self.missing_child_dimensions(storage, &point, &limits).is_empty()
            {
                refinable.push(seq);
            }
        }
        let scores = Self::score_points(storage, functor, &refinable);
        let threshold = functor.threshold();
        let ranked = retain_largest(refinable.into_iter().zip(scores).filter(|&(_, value)| value > threshold).map(|(seq, value)| (value, seq)), functor.refinements_num());
        Ok(ranked.into_iter().map(|(value, seq)| RefinementCandidate { seq, value }).collect())
    }

    #[cfg(feature = "rayon")]
    fn score_points(storage: &GridStorage, functor: &dyn RefinementFunctor, sequences: &[usize]) -> Vec<f64>
    {
        use rayon::prelude::*;
        sequences.par_iter().map(|&seq|
        {
            if functor.is_admissible(storage, seq) { functor.score(storage, seq) } else { f64::NEG_INFINITY }
        }).collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn score_points(storage: &GridStorage, functor: &dyn RefinementFunctor, sequences: &[usize]) -> Vec<f64>
    {
        sequences.iter().map(|&seq|
        {
            if functor.is_admissible(storage, seq) { functor.score(storage, seq) } else { f64::NEG_INFINITY }
        }).collect()
    }

    ///
    /// Refines every collected point whose value reaches the threshold.
    /// Returns the sequence numbers of the new points.
    ///
    pub fn refine_gridpoints_collection(&self, storage: &mut GridStorage, functor: &dyn RefinementFunctor, candidates: &[RefinementCandidate], options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        let original_number = storage.len();
        let threshold = functor.threshold();
        for candidate in candidates.iter().filter(|c| c.value >= threshold)
        {
            self.refine_gridpoint_with(storage, functor, candidate.seq, options)?;
        }
        log::debug!("refined {} collected points, {} points created", candidates.len(), storage.len() - original_number);
        Ok((original_number..storage.len()).collect())
    }

    ///
    /// Ranked refinement: collects the best candidates first, then refines them.
    ///
    pub fn refine_largest(&self, storage: &mut GridStorage, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<usize>, SGError>
    {
        let candidates = self.collect_refinable_points(storage, functor, options)?;
        self.refine_gridpoints_collection(storage, functor, &candidates, options)
    }

    ///
    /// Returns the number of grid points that can be refined.
    ///
    pub fn num_refinable_points(&self, storage: &GridStorage, options: &RefinementOptions) -> Result<usize, SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        let limits = options.resolve_limits(storage.num_inputs())?;
        Ok(storage.nodes().filter(|node|
        {
            let point = GridPoint::from(*node);
            !self.missing_child_dimensions(storage, &point, &limits).is_empty()
        }).count())
    }

    fn refine_gridpoint_with(&self, storage: &mut GridStorage, functor: &dyn RefinementFunctor, seq: usize, options: &RefinementOptions) -> Result<(), SGError>
    {
        let limits = options.resolve_limits(storage.num_inputs())?;
        let point = storage.point(seq)?;
        let dims = self.missing_child_dimensions(storage, &point, &limits);
        let dims = self.selected_dimensions(storage, functor, seq, dims, options.refinement_mode);
        if dims.is_empty()
        {
            return Ok(());
        }
        storage.set_is_leaf(seq, false);
        for dim in dims
        {
            self.refine_1d(storage, point.clone(), dim)?;
        }
        Ok(())
    }

    ///
    /// Creates all missing children of `seq` in every refinable direction.
    ///
    pub fn refine_gridpoint(&self, storage: &mut GridStorage, seq: usize) -> Result<(), SGError>
    {
        let point = storage.point(seq)?;
        let dims: Vec<usize> = (0..storage.num_inputs()).filter(|&dim| self.is_refinable_direction(&point, dim)).collect();
        if dims.is_empty()
        {
            return Ok(());
        }
        storage.set_is_leaf(seq, false);
        for dim in dims
        {
            self.refine_1d(storage, point.clone(), dim)?;
        }
        Ok(())
    }

    ///
    /// Level-zero directions only refine on boundary grids; no direction
    /// refines beyond `MAX_LEVEL`.
    ///
    fn is_refinable_direction(&self, point: &GridPoint, dim: usize) -> bool
    {
        let level = point.level[dim];
        level < MAX_LEVEL && (level > 0 || self.has_boundary())
    }

    ///
    /// Refines `seq` along direction `dim` only.
    ///
    pub fn refine_gridpoint_1d(&self, storage: &mut GridStorage, seq: usize, dim: usize) -> Result<(), SGError>
    {
        let point = storage.point(seq)?;
        if dim >= storage.num_inputs()
        {
            return Err(SGError::DimensionMismatch { expected: storage.num_inputs(), found: dim + 1 });
        }
        if !self.is_refinable_direction(&point, dim)
        {
            return Ok(());
        }
        storage.set_is_leaf(seq, false);
        self.refine_1d(storage, point, dim)
    }

    fn refine_1d(&self, storage: &mut GridStorage, point: GridPoint, dim: usize) -> Result<(), SGError>
    {
        let children = if point.level[dim] == 0
        {
            vec![point.level_one(dim)]
        }
        else
        {
            vec![point.left_child(dim), point.right_child(dim)]
        };
        for mut child in children
        {
            if !storage.contains(&child)
            {
                child.set_is_leaf(true);
                self.create_point(storage, child)?;
            }
        }
        Ok(())
    }

    ///
    /// Inserts `point` after every missing ancestor has been created. On
    /// boundary grids the level-zero siblings are completed afterwards.
    ///
    fn create_point(&self, storage: &mut GridStorage, point: GridPoint) -> Result<(), SGError>
    {
        for dim in 0..storage.num_inputs()
        {
            if self.has_boundary()
            {
                self.create_point_1d_with_boundary(storage, &point, dim)?;
            }
            else
            {
                self.create_point_1d(storage, &point, dim)?;
            }
        }
        if !storage.contains(&point)
        {
            log::trace!("creating grid point level={:?} index={:?}", point.level, point.index);
            storage.insert(point.clone())?;
        }
        if self.has_boundary()
        {
            self.create_point_level_zero_consistency(storage, &point)?;
        }
        Ok(())
    }

    ///
    /// Marks an existing predecessor as inner node, or creates it as one.
    ///
    fn create_point_internal(&self, storage: &mut GridStorage, mut point: GridPoint) -> Result<(), SGError>
    {
        if storage.set_is_leaf_of(&point, false).is_none()
        {
            point.set_is_leaf(false);
            self.create_point(storage, point)?;
        }
        Ok(())
    }

    fn create_point_1d(&self, storage: &mut GridStorage, point: &GridPoint, dim: usize) -> Result<(), SGError>
    {
        if let Some(parent) = point.parent(dim)
        {
            self.create_point_internal(storage, parent)?;
        }
        Ok(())
    }

    fn create_point_1d_with_boundary(&self, storage: &mut GridStorage, point: &GridPoint, dim: usize) -> Result<(), SGError>
    {
        if point.level[dim] == 1
        {
            self.create_point_internal(storage, point.left_level_zero(dim))?;
            self.create_point_internal(storage, point.right_level_zero(dim))?;
        }
        self.create_point_1d(storage, point, dim)
    }

    ///
    /// Both anchors (0,0) and (0,1) of a direction exist together and share
    /// the leaf flag of the point just inserted.
    ///
    fn create_point_level_zero_consistency(&self, storage: &mut GridStorage, point: &GridPoint) -> Result<(), SGError>
    {
        let is_leaf = point.is_leaf();
        for dim in 0..storage.num_inputs()
        {
            if point.level[dim] != 0
            {
                continue;
            }
            let mut sibling = point.clone();
            sibling.set(dim, 0, 1 - point.index[dim]);
            if storage.set_is_leaf_of(&sibling, is_leaf).is_none()
            {
                sibling.set_is_leaf(is_leaf);
                self.create_point(storage, sibling)?;
            }
        }
        Ok(())
    }

    ///
    /// Accumulates candidate scores per subspace (level vector of the first
    /// missing child) and keeps the `refinements_num` largest subspaces.
    ///
    pub fn collect_refinable_subspaces(&self, storage: &GridStorage, functor: &dyn RefinementFunctor, options: &RefinementOptions) -> Result<Vec<SubspaceCandidate>, SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        let limits = options.resolve_limits(storage.num_inputs())?;
        let mut subspace_error: IndexMap<Vec<u8>, f64> = IndexMap::new();
        for (seq, node) in storage.nodes().enumerate()
        {
            let point = GridPoint::from(node);
            let dims = self.missing_child_dimensions(storage, &point, &limits);
            if let Some(&dim) = dims.first()
            {
                if !functor.is_admissible(storage, seq)
                {
                    continue;
                }
                let child = point.left_child(dim);
                *subspace_error.entry(child.level).or_insert(0.0) += functor.score(storage, seq);
            }
        }
        let threshold = functor.threshold();
        let ranked = retain_largest(subspace_error.into_iter().filter(|&(_, value)| value > threshold).map(|(level, value)| (value, level)), functor.refinements_num());
        Ok(ranked.into_iter().map(|(value, level)| SubspaceCandidate { level, value }).collect())
    }

    pub fn refine_subspace_collection(&self, storage: &mut GridStorage, functor: &dyn RefinementFunctor, subspaces: &[SubspaceCandidate]) -> Result<Vec<usize>, SGError>
    {
        let original_number = storage.len();
        let threshold = functor.threshold();
        for subspace in subspaces.iter().filter(|s| s.value >= threshold)
        {
            self.create_subspace(storage, &subspace.level)?;
        }
        Ok((original_number..storage.len()).collect())
    }

    ///
    /// Creates every point of the subspace `level` together with all ancestors.
    /// Returns the number of points created.
    ///
    pub fn create_subspace(&self, storage: &mut GridStorage, level: &[u8]) -> Result<usize, SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        if level.len() != storage.num_inputs()
        {
            return Err(SGError::DimensionMismatch { expected: storage.num_inputs(), found: level.len() });
        }
        if !self.has_boundary() && level.contains(&0)
        {
            return Err(SGError::InvalidPoint);
        }
        let original_number = storage.len();
        for index in SubspaceIterator::new(level)
        {
            let point = GridPoint::try_new(level, &index, true)?;
            if !storage.contains(&point)
            {
                self.create_point(storage, point)?;
            }
        }
        Ok(storage.len() - original_number)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::generators;

    /// Scores every point with the same value.
    struct Constant(f64, f64, Option<usize>);

    impl RefinementFunctor for Constant
    {
        fn score(&self, _storage: &GridStorage, _seq: usize) -> f64
        {
            self.0
        }
        fn threshold(&self) -> f64
        {
            self.1
        }
        fn refinements_num(&self) -> Option<usize>
        {
            self.2
        }
    }

    /// Scores exactly one point above zero.
    struct Only(GridPoint);

    impl RefinementFunctor for Only
    {
        fn score(&self, storage: &GridStorage, seq: usize) -> f64
        {
            if storage.point(seq).map(|p| p == self.0).unwrap_or(false) { 1.0 } else { 0.0 }
        }
        fn threshold(&self) -> f64
        {
            0.0
        }
    }

    fn p(level: &[u8], index: &[u32]) -> GridPoint
    {
        GridPoint::new(level, index, true)
    }

    fn leaf_of(storage: &GridStorage, point: &GridPoint) -> bool
    {
        storage.is_leaf(storage.find(point).unwrap())
    }

    fn assert_leaf_flags_exact(storage: &GridStorage)
    {
        let mut check = storage.clone();
        check.recalc_leaf_property();
        for seq in 0..storage.len()
        {
            assert_eq!(storage.is_leaf(seq), check.is_leaf(seq), "{:?}", storage.point(seq).unwrap());
        }
    }

    #[test]
    fn refine_single_point_1d()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(p(&[1], &[1])).unwrap();
        let engine = RefinementEngine::interior();
        let created = engine.refine(&mut storage, &Constant(1.0, 0.0, None), &RefinementOptions::default()).unwrap();
        assert_eq!(created, vec![1, 2]);
        assert_eq!(storage.len(), 3);
        assert!(!leaf_of(&storage, &p(&[1], &[1])));
        assert!(leaf_of(&storage, &p(&[2], &[1])));
        assert!(leaf_of(&storage, &p(&[2], &[3])));

        engine.refine(&mut storage, &Only(p(&[2], &[1])), &RefinementOptions::default()).unwrap();
        assert_eq!(storage.len(), 5);
        assert!(storage.contains(&p(&[3], &[1])));
        assert!(storage.contains(&p(&[3], &[3])));
        assert!(!leaf_of(&storage, &p(&[1], &[1])));
        assert!(!leaf_of(&storage, &p(&[2], &[1])));
        assert!(leaf_of(&storage, &p(&[2], &[3])));
    }

    #[test]
    fn refine_empty_storage_fails()
    {
        let mut storage = GridStorage::new(2);
        let engine = RefinementEngine::interior();
        assert_eq!(engine.refine(&mut storage, &Constant(1.0, 0.0, None), &RefinementOptions::default()), Err(SGError::EmptyStorage));
        assert_eq!(engine.num_refinable_points(&storage, &RefinementOptions::default()), Err(SGError::EmptyStorage));
    }

    #[test]
    fn threshold_blocks_refinement()
    {
        let mut storage = GridStorage::new(2);
        generators::regular(&mut storage, 2).unwrap();
        let before = storage.len();
        let created = RefinementEngine::interior().refine(&mut storage, &Constant(0.5, 0.5, None), &RefinementOptions::default()).unwrap();
        assert!(created.is_empty());
        assert_eq!(storage.len(), before);
    }

    #[test]
    fn refinement_creates_missing_ancestors()
    {
        // (2,1)x(1,1) refined in direction 1 needs (1,1)x(2,1) and (1,1)x(2,3) parents
        let mut storage = GridStorage::new(2);
        storage.insert(GridPoint::new(&[1, 1], &[1, 1], false)).unwrap();
        storage.insert(p(&[2, 1], &[1, 1])).unwrap();
        storage.insert(p(&[2, 1], &[3, 1])).unwrap();
        let engine = RefinementEngine::interior();
        let seq = storage.find(&p(&[2, 1], &[1, 1])).unwrap();
        engine.refine_gridpoint_1d(&mut storage, seq, 1).unwrap();
        assert!(storage.contains(&p(&[2, 2], &[1, 1])));
        assert!(storage.contains(&p(&[2, 2], &[1, 3])));
        assert!(storage.contains(&p(&[1, 2], &[1, 1])));
        assert!(storage.contains(&p(&[1, 2], &[1, 3])));
        assert_eq!(storage.len(), 7);
        assert!(!leaf_of(&storage, &p(&[1, 2], &[1, 1])));
        assert!(leaf_of(&storage, &p(&[2, 2], &[1, 3])));
    }

    #[test]
    fn refinement_respects_budget_and_limits()
    {
        let mut storage = GridStorage::new(1);
        generators::regular(&mut storage, 2).unwrap();
        let engine = RefinementEngine::interior();
        engine.refine(&mut storage, &Constant(1.0, 0.0, Some(1)), &RefinementOptions::default()).unwrap();
        // only the first refinable leaf (2,1) gets children
        assert_eq!(storage.len(), 5);
        assert!(storage.contains(&p(&[3], &[1])));

        let mut storage = GridStorage::new(1);
        generators::regular(&mut storage, 2).unwrap();
        let created = engine.refine(&mut storage, &Constant(1.0, 0.0, None), &RefinementOptions::with_max_level(2)).unwrap();
        assert!(created.is_empty());
        let bad = RefinementOptions { level_limits: Some(vec![3, 3]), ..Default::default() };
        assert_eq!(engine.refine(&mut storage, &Constant(1.0, 0.0, None), &bad), Err(SGError::InvalidLevelLimits));
    }

    #[test]
    fn collection_keeps_largest()
    {
        struct BySeq;
        impl RefinementFunctor for BySeq
        {
            fn score(&self, _storage: &GridStorage, seq: usize) -> f64
            {
                seq as f64
            }
            fn threshold(&self) -> f64
            {
                0.0
            }
            fn refinements_num(&self) -> Option<usize>
            {
                Some(2)
            }
        }
        let mut storage = GridStorage::new(1);
        generators::regular(&mut storage, 3).unwrap();
        let engine = RefinementEngine::interior();
        let candidates = engine.collect_refinable_points(&storage, &BySeq, &RefinementOptions::default()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].seq, storage.len() - 1);
        assert_eq!(candidates[1].seq, storage.len() - 2);
        assert!(candidates[0].value > candidates[1].value);
        let before = storage.len();
        let created = engine.refine_gridpoints_collection(&mut storage, &BySeq, &candidates, &RefinementOptions::default()).unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(storage.len(), before + 4);
    }

    #[test]
    fn boundary_refinement_completes_anchors()
    {
        let mut storage = GridStorage::new(2);
        generators::regular_with_boundaries(&mut storage, 1).unwrap();
        let engine = RefinementEngine::with_boundary();
        let seq = storage.find(&p(&[1, 1], &[1, 1])).unwrap();
        engine.refine_gridpoint(&mut storage, seq).unwrap();
        for point in [p(&[2, 1], &[1, 1]), p(&[2, 1], &[3, 1]), p(&[1, 2], &[1, 1]), p(&[1, 2], &[1, 3])]
        {
            assert!(storage.contains(&point));
        }
        // anchors of the new points in the other direction
        for point in [p(&[2, 0], &[1, 0]), p(&[2, 0], &[1, 1]), p(&[0, 2], &[0, 3]), p(&[0, 2], &[1, 3])]
        {
            assert!(storage.contains(&point), "{:?}", point);
        }
        let mut check = storage.clone();
        check.recalc_leaf_property();
        for seq in 0..storage.len()
        {
            assert_eq!(storage.is_leaf(seq), check.is_leaf(seq), "{:?}", storage.point(seq).unwrap());
        }
    }

    #[test]
    fn boundary_anchor_refines_to_level_one()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(p(&[0], &[0])).unwrap();
        let engine = RefinementEngine::with_boundary();
        engine.refine_gridpoint(&mut storage, 0).unwrap();
        assert!(storage.contains(&p(&[1], &[1])));
        assert!(storage.contains(&p(&[0], &[1])));
        assert_eq!(storage.len(), 3);
        assert!(!leaf_of(&storage, &p(&[0], &[0])));
        assert!(!leaf_of(&storage, &p(&[0], &[1])));
        assert!(leaf_of(&storage, &p(&[1], &[1])));
    }

    #[test]
    fn anisotropic_refines_selected_directions()
    {
        struct FirstDirection;
        impl RefinementFunctor for FirstDirection
        {
            fn score(&self, _storage: &GridStorage, _seq: usize) -> f64
            {
                1.0
            }
            fn score_dimension(&self, _storage: &GridStorage, _seq: usize, dim: usize) -> f64
            {
                if dim == 0 { 1.0 } else { 0.0 }
            }
            fn threshold(&self) -> f64
            {
                0.0
            }
        }
        let mut storage = GridStorage::new(2);
        storage.insert(p(&[1, 1], &[1, 1])).unwrap();
        RefinementEngine::interior().refine(&mut storage, &FirstDirection, &RefinementOptions::anisotropic()).unwrap();
        assert_eq!(storage.len(), 3);
        assert!(storage.contains(&p(&[2, 1], &[1, 1])));
        assert!(!storage.contains(&p(&[1, 2], &[1, 1])));
    }

    #[test]
    fn subspace_refinement()
    {
        let mut storage = GridStorage::new(2);
        storage.insert(p(&[1, 1], &[1, 1])).unwrap();
        let engine = RefinementEngine::interior();
        let created = engine.create_subspace(&mut storage, &[2, 2]).unwrap();
        // four points of (2,2) plus four level-(1,2)/(2,1) ancestors
        assert_eq!(created, 8);
        assert_eq!(storage.len(), 9);
        assert_leaf_flags_exact(&storage);
        // (1,2) points vote for (1,3), (2,1) points for (3,1), (2,2) points for (3,2)
        let functor = Constant(1.0, 0.0, Some(1));
        let subspaces = engine.collect_refinable_subspaces(&storage, &functor, &RefinementOptions::default()).unwrap();
        assert_eq!(subspaces, vec![SubspaceCandidate { level: vec![3, 2], value: 4.0 }]);
        let created = engine.refine_subspace_collection(&mut storage, &functor, &subspaces).unwrap();
        // eight (3,2) points and their four (3,1) parents
        assert_eq!(created.len(), 12);
        for index in SubspaceIterator::new(&[3, 2])
        {
            assert!(storage.contains(&GridPoint::new(&[3, 2], &index, true)));
        }
        for index in SubspaceIterator::new(&[3, 1])
        {
            assert!(!leaf_of(&storage, &GridPoint::new(&[3, 1], &index, true)));
        }
        assert_leaf_flags_exact(&storage);
    }

    #[test]
    fn boundary_ranked_refinement()
    {
        let mut storage = GridStorage::new(2);
        generators::regular_with_boundaries(&mut storage, 1).unwrap();
        let engine = RefinementEngine::with_boundary();
        let functor = Constant(1.0, 0.0, Some(1));
        assert_eq!(engine.num_refinable_points(&storage, &RefinementOptions::default()).unwrap(), 5);
        let candidates = engine.collect_refinable_points(&storage, &functor, &RefinementOptions::default()).unwrap();
        // equal scores keep the smallest sequence number, the edge anchor (0,1)x(0,1)
        assert_eq!(candidates.len(), 1);
        assert_eq!(storage.point(candidates[0].seq).unwrap(), p(&[0, 1], &[0, 1]));
        let created = engine.refine_largest(&mut storage, &functor, &RefinementOptions::default()).unwrap();
        assert_eq!(created.len(), 4);
        for point in [p(&[0, 2], &[0, 1]), p(&[0, 2], &[0, 3]), p(&[0, 2], &[1, 1]), p(&[0, 2], &[1, 3])]
        {
            assert!(storage.contains(&point), "{:?}", point);
        }
        assert!(!leaf_of(&storage, &p(&[0, 1], &[1, 1])));
        assert_leaf_flags_exact(&storage);
    }

    #[test]
    fn deepest_level_is_not_refined()
    {
        let mut storage = GridStorage::new(1);
        for l in 1..=MAX_LEVEL
        {
            storage.insert(GridPoint::new(&[l], &[(1_u32 << l) - 1], l == MAX_LEVEL)).unwrap();
        }
        let seq = storage.len() - 1;
        let engine = RefinementEngine::interior();
        engine.refine_gridpoint(&mut storage, seq).unwrap();
        engine.refine_gridpoint_1d(&mut storage, seq, 0).unwrap();
        assert_eq!(storage.len(), MAX_LEVEL as usize);
        assert!(storage.is_leaf(seq));
        let options = RefinementOptions { level_limits: Some(vec![40]), ..Default::default() };
        let created = engine.refine(&mut storage, &Constant(1.0, 0.0, None), &options).unwrap();
        // only the left children along the chain are missing
        assert_eq!(created.len(), MAX_LEVEL as usize - 1);
        assert_eq!(storage.max_level(), MAX_LEVEL);
        assert_leaf_flags_exact(&storage);
    }

    #[test]
    fn retain_largest_evicts_smallest()
    {
        let kept = retain_largest(vec![(1.0, 0_usize), (5.0, 1), (3.0, 2), (5.0, 3)], Some(2));
        assert_eq!(kept, vec![(5.0, 1), (5.0, 3)]);
        assert!(retain_largest(vec![(1.0, 0_usize)], Some(0)).is_empty());
    }
}
