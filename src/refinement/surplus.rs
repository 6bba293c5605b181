use crate::algorithms::refinement::RefinementFunctor;
use crate::storage::GridStorage;

///
/// Scores a point by the largest absolute hierarchical surplus over all outputs.
///
pub struct SurplusRefinement<'a>
{
    pub alpha: &'a [f64],
    pub num_outputs: usize,
    pub threshold: f64,
    pub refinements_num: Option<usize>,
}

impl<'a> SurplusRefinement<'a>
{
    pub fn new(alpha: &'a [f64], num_outputs: usize, threshold: f64) -> Self
    {
        Self { alpha, num_outputs, threshold, refinements_num: None }
    }
}

impl RefinementFunctor for SurplusRefinement<'_>
{
    fn score(&self, _storage: &GridStorage, seq: usize) -> f64
    {
        let mut max = -1.0_f64;
        if let Some(alpha_i) = self.alpha.chunks_exact(self.num_outputs).nth(seq)
        {
            alpha_i.iter().for_each(|&val| max = max.max(val.abs()));
        }
        max
    }

    #[inline]
    fn threshold(&self) -> f64
    {
        self.threshold
    }

    #[inline]
    fn refinements_num(&self) -> Option<usize>
    {
        self.refinements_num
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn max_abs_over_outputs()
    {
        let storage = GridStorage::new(1);
        let alpha = [1.0, -3.0, 0.5, 0.25];
        let functor = SurplusRefinement::new(&alpha, 2, 0.0);
        assert_eq!(functor.score(&storage, 0), 3.0);
        assert_eq!(functor.score(&storage, 1), 0.5);
        // points without coefficients never pass a non-negative threshold
        assert_eq!(functor.score(&storage, 2), -1.0);
    }
}
