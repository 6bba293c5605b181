use serde::{Deserialize, Serialize};
use crate::errors::SGError;
use crate::storage::{GridStorage, SequenceRemap};
use crate::utilities::float::OrdF64;
use super::refinement::RefinementFunctor;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoarseningOptions
{
    /// The first `protected_points` sequence numbers are never removed.
    pub protected_points: usize,
    /// Allow removal of points with a level-zero direction.
    pub remove_boundary: bool,
}

impl CoarseningOptions
{
    pub fn protect(protected_points: usize) -> Self
    {
        Self { protected_points, ..Default::default() }
    }
}

///
/// Sequence numbers of `seq` and every point reached from it by swapping
/// boundary anchors (index 0 and 1) in its level-zero directions, ascending.
/// Anchors are only ever removed together with all of these siblings.
///
fn anchor_group(storage: &GridStorage, seq: usize) -> Result<Vec<usize>, SGError>
{
    let point = storage.point(seq)?;
    let zero_dims: Vec<usize> = (0..storage.num_inputs()).filter(|&dim| point.level[dim] == 0).collect();
    let mut group = Vec::with_capacity(1 << zero_dims.len());
    for mask in 0..(1_usize << zero_dims.len())
    {
        let mut sibling = point.clone();
        for (k, &dim) in zero_dims.iter().enumerate()
        {
            sibling.set(dim, 0, point.index[dim] ^ ((mask >> k) & 1) as u32);
        }
        if let Some(other) = storage.find(&sibling)
        {
            group.push(other);
        }
    }
    group.sort_unstable();
    Ok(group)
}

///
/// Removes the lowest scoring removable points. A point is removable if it has
/// no children in storage, lies outside the protected prefix and scores below
/// the functor's coarsening threshold. Boundary anchors are removed together
/// with their siblings, and only if every sibling is removable; the whole
/// group counts against `max_num_removed`. Returns the sequence number remap
/// of the erase; if nothing qualifies the remap is the identity.
///
pub fn coarsen(storage: &mut GridStorage, functor: &dyn RefinementFunctor, options: &CoarseningOptions) -> Result<SequenceRemap, SGError>
{
    if storage.is_empty()
    {
        return Err(SGError::EmptyStorage);
    }
    let threshold = functor.coarsening_threshold();
    let mut candidates: Vec<(OrdF64, Vec<usize>)> = Vec::new();
    for seq in options.protected_points..storage.len()
    {
        let is_inner = storage.is_inner_point(seq);
        if !options.remove_boundary && !is_inner
        {
            continue;
        }
        if storage.has_children(seq)
        {
            continue;
        }
        let group = if is_inner { vec![seq] } else { anchor_group(storage, seq)? };
        // each group is visited from its smallest member, which also keeps
        // the group outside the protected prefix
        if group.first() != Some(&seq)
        {
            continue;
        }
        let mut worst = f64::NEG_INFINITY;
        let mut removable = true;
        for &member in &group
        {
            let value = functor.score(storage, member);
            if storage.has_children(member) || !(value < threshold)
            {
                removable = false;
                break;
            }
            worst = worst.max(value);
        }
        if removable
        {
            candidates.push((OrdF64(worst), group));
        }
    }
    candidates.sort_unstable();
    let budget = functor.max_num_removed().unwrap_or(usize::MAX);
    let mut removed = Vec::new();
    for (_, group) in candidates
    {
        if removed.len() + group.len() <= budget
        {
            removed.extend(group);
        }
    }
    log::debug!("coarsening: {} of {} points removable", removed.len(), storage.len());
    if removed.is_empty()
    {
        return Ok(SequenceRemap::identity(storage.len()));
    }
    storage.erase(removed)
}
