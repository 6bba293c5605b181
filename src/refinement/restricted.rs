use crate::algorithms::refinement::RefinementFunctor;
use crate::storage::GridStorage;

///
/// Wraps a functor and only lets it refine the directions in `dimensions`.
/// Combined with anisotropic refinement this grows the grid along a chosen set
/// of directions, e.g. for one-dimensional or low-order ANOVA terms.
///
pub struct RestrictedRefinement<F: RefinementFunctor>
{
    pub inner: F,
    pub dimensions: Vec<usize>,
}

impl<F: RefinementFunctor> RestrictedRefinement<F>
{
    pub fn new(inner: F, dimensions: Vec<usize>) -> Self
    {
        Self { inner, dimensions }
    }
}

impl<F: RefinementFunctor> RefinementFunctor for RestrictedRefinement<F>
{
    fn score(&self, storage: &GridStorage, seq: usize) -> f64
    {
        self.inner.score(storage, seq)
    }

    fn score_dimension(&self, storage: &GridStorage, seq: usize, dim: usize) -> f64
    {
        if self.dimensions.contains(&dim)
        {
            self.inner.score_dimension(storage, seq, dim)
        }
        else
        {
            0.0
        }
    }

    fn threshold(&self) -> f64
    {
        self.inner.threshold()
    }

    fn refinements_num(&self) -> Option<usize>
    {
        self.inner.refinements_num()
    }

    fn is_admissible(&self, storage: &GridStorage, seq: usize) -> bool
    {
        self.inner.is_admissible(storage, seq)
    }

    fn max_num_removed(&self) -> Option<usize>
    {
        self.inner.max_num_removed()
    }

    fn coarsening_threshold(&self) -> f64
    {
        self.inner.coarsening_threshold()
    }
}
