use crate::errors::SGError;
use crate::storage::{GridPoint, GridStorage};

///
/// Iterates the index vectors of one subspace (fixed level vector). Odd
/// indices on positive levels, both anchors 0 and 1 on level zero. The first
/// direction varies fastest.
///
pub struct SubspaceIterator<'a>
{
    level: &'a [u8],
    index: Vec<u32>,
    done: bool,
}

impl<'a> SubspaceIterator<'a>
{
    pub fn new(level: &'a [u8]) -> Self
    {
        let index = level.iter().map(|&l| first_index(l)).collect();
        Self { level, index, done: false }
    }
}

#[inline]
fn first_index(level: u8) -> u32
{
    if level == 0 { 0 } else { 1 }
}

impl Iterator for SubspaceIterator<'_>
{
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done
        {
            return None;
        }
        let current = self.index.clone();
        self.done = true;
        for (dim, &l) in self.level.iter().enumerate()
        {
            let (step, last) = if l == 0 { (1_u64, 1_u64) } else { (2, (1_u64 << l) - 1) };
            if self.index[dim] as u64 + step <= last
            {
                self.index[dim] += step as u32;
                self.done = false;
                break;
            }
            self.index[dim] = first_index(l);
        }
        Some(current)
    }
}

///
/// All level vectors with entries in `[min_level, max_level]` accepted by
/// `admit`, in lexicographic order.
///
fn level_vectors(num_inputs: usize, min_level: u8, max_level: u8, admit: impl Fn(&[u8]) -> bool) -> Vec<Vec<u8>>
{
    let mut result = Vec::new();
    if num_inputs == 0 || min_level > max_level
    {
        return result;
    }
    let mut level = vec![min_level; num_inputs];
    loop
    {
        if admit(&level)
        {
            result.push(level.clone());
        }
        let mut dim = num_inputs;
        loop
        {
            if dim == 0
            {
                return result;
            }
            dim -= 1;
            if level[dim] < max_level
            {
                level[dim] += 1;
                break;
            }
            level[dim] = min_level;
        }
    }
}

///
/// Inserts every point of the given subspaces that is not yet stored and
/// recomputes the leaf flags.
///
fn fill_subspaces(storage: &mut GridStorage, subspaces: Vec<Vec<u8>>) -> Result<(), SGError>
{
    let before = storage.len();
    for level in subspaces
    {
        for index in SubspaceIterator::new(&level)
        {
            let point = GridPoint::try_new(&level, &index, false)?;
            if !storage.contains(&point)
            {
                storage.insert(point)?;
            }
        }
    }
    storage.recalc_leaf_property();
    log::debug!("generated {} grid points", storage.len() - before);
    Ok(())
}

///
/// Generates a regular sparse grid of level `level` without boundaries: every
/// level vector with positive entries and level sum at most `level + d - 1`.
///
pub fn regular(storage: &mut GridStorage, level: u8) -> Result<(), SGError>
{
    let d = storage.num_inputs() as u32;
    let bound = level as u32 + d.saturating_sub(1);
    let subspaces = level_vectors(storage.num_inputs(), 1, level, |l| l.iter().map(|&x| x as u32).sum::<u32>() <= bound);
    fill_subspaces(storage, subspaces)
}

///
/// Generates a regular sparse grid of level `level` with boundary anchors. A
/// level-zero direction counts like level one in the level sum.
///
pub fn regular_with_boundaries(storage: &mut GridStorage, level: u8) -> Result<(), SGError>
{
    let d = storage.num_inputs() as u32;
    let bound = level.max(1) as u32 + d.saturating_sub(1);
    let subspaces = level_vectors(storage.num_inputs(), 0, level, |l| l.iter().map(|&x| x.max(1) as u32).sum::<u32>() <= bound);
    fill_subspaces(storage, subspaces)
}

///
/// Generates a full grid of level `level` without boundaries.
///
pub fn full(storage: &mut GridStorage, level: u8) -> Result<(), SGError>
{
    let subspaces = level_vectors(storage.num_inputs(), 1, level, |_| true);
    fill_subspaces(storage, subspaces)
}

///
/// Generates a full grid of level `level`, with boundary grid points.
///
pub fn full_with_boundaries(storage: &mut GridStorage, level: u8) -> Result<(), SGError>
{
    let subspaces = level_vectors(storage.num_inputs(), 0, level, |_| true);
    fill_subspaces(storage, subspaces)
}
