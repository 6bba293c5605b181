use crate::algorithms::refinement::RefinementFunctor;
use crate::storage::GridStorage;

///
/// A function that defines how refinement is performed.
///
/// # Arguments
/// - `storage`: Storage of sparse grid.
/// - `seq`: Sequence number of the scored point.
///
pub type UserRefinementFunction = dyn Fn(&GridStorage, usize) -> f64 + Send + Sync;

pub struct UserDefinedRefinement<'a>
{
    pub fun_eval: &'a UserRefinementFunction,
    pub threshold: f64,
    pub refinements_num: Option<usize>,
    /// Upper bound on points removed by one coarsening pass.
    pub max_num_removed: Option<usize>,
}

impl<'a> UserDefinedRefinement<'a>
{
    pub fn new(fun_eval: &'a UserRefinementFunction, threshold: f64) -> Self
    {
        Self { fun_eval, threshold, refinements_num: None, max_num_removed: None }
    }
}

impl RefinementFunctor for UserDefinedRefinement<'_>
{
    fn score(&self, storage: &GridStorage, seq: usize) -> f64
    {
        (self.fun_eval)(storage, seq)
    }

    fn threshold(&self) -> f64
    {
        self.threshold
    }

    fn refinements_num(&self) -> Option<usize>
    {
        self.refinements_num
    }

    fn max_num_removed(&self) -> Option<usize>
    {
        self.max_num_removed
    }
}
