use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::algorithms::refinement::BoundaryMode;
use crate::errors::SGError;
use crate::storage::{GridPoint, GridStorage};
use crate::utilities::float::OrdF64;

///
/// Refinement indicator attached to a candidate point (or, for subspace
/// indicators, to a level vector with all indices set to one).
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorContainer
{
    pub point: GridPoint,
    pub value: f64,
    pub contributions: u32,
    /// True if every hierarchical ancestor of `point` is part of the scored grid.
    pub admissible: bool,
}

impl ErrorContainer
{
    pub fn new(point: GridPoint, value: f64, admissible: bool) -> Self
    {
        Self { point, value, contributions: 1, admissible }
    }

    ///
    /// Entry for `point` whose admissibility is taken from `grid`.
    ///
    pub fn scored_against(point: GridPoint, value: f64, grid: &GridStorage, boundary: BoundaryMode) -> Self
    {
        let admissible = is_admissible_in(&point, grid, boundary);
        Self::new(point, value, admissible)
    }
}

///
/// True if all hierarchical parents of `point` are present in `grid`. On
/// boundary grids every level-one direction also needs both level-zero anchors.
///
pub fn is_admissible_in(point: &GridPoint, grid: &GridStorage, boundary: BoundaryMode) -> bool
{
    (0..point.num_inputs()).all(|dim|
    {
        let parent_ok = point.parent(dim).map(|parent| grid.contains(&parent)).unwrap_or(true);
        let anchors_ok = boundary == BoundaryMode::Interior
            || point.level[dim] != 1
            || (grid.contains(&point.left_level_zero(dim)) && grid.contains(&point.right_level_zero(dim)));
        parent_ok && anchors_ok
    })
}

///
/// Indicator store ranked by value. Entries are keyed by their point in an
/// internal [`GridStorage`]; a sorted set of `(value, sequence)` pairs gives the
/// value order. Both indices address the same record through its sequence number.
///
#[derive(Clone, Debug)]
pub struct ErrorStorage
{
    keys: GridStorage,
    records: Vec<ErrorContainer>,
    rank: BTreeSet<(OrdF64, usize)>,
}

impl ErrorStorage
{
    pub fn new(num_inputs: usize) -> Self
    {
        Self { keys: GridStorage::new(num_inputs), records: Vec::new(), rank: BTreeSet::new() }
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.records.is_empty()
    }

    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.keys.num_inputs()
    }

    ///
    /// Adds a new entry and returns its sequence number. Fails with
    /// `DuplicateKey` if an entry for the same point exists.
    ///
    pub fn push(&mut self, entry: ErrorContainer) -> Result<usize, SGError>
    {
        let seq = self.keys.insert(entry.point.clone())?;
        self.rank.insert((OrdF64(entry.value), seq));
        self.records.push(entry);
        Ok(seq)
    }

    pub fn get(&self, point: &GridPoint) -> Option<&ErrorContainer>
    {
        self.keys.find(point).map(|seq| &self.records[seq])
    }

    #[inline]
    pub fn contains(&self, point: &GridPoint) -> bool
    {
        self.keys.contains(point)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorContainer>
    {
        self.records.iter()
    }

    ///
    /// Bulk access to the records. Changing a value leaves the rank index stale
    /// until [`ErrorStorage::rebuild_rank_index`] is called. Keys must not be
    /// changed.
    ///
    pub fn records_mut(&mut self) -> &mut [ErrorContainer]
    {
        &mut self.records
    }

    pub fn rebuild_rank_index(&mut self)
    {
        self.rank = self.records.iter().enumerate().map(|(seq, r)| (OrdF64(r.value), seq)).collect();
    }

    ///
    /// Recomputes every admissibility flag against the grid being refined.
    ///
    pub fn update_admissibility(&mut self, grid: &GridStorage, boundary: BoundaryMode)
    {
        for record in self.records.iter_mut()
        {
            record.admissible = is_admissible_in(&record.point, grid, boundary);
        }
    }

    ///
    /// Accumulates value and contributions of `entry` into the existing record
    /// with the same point and moves it to its new rank.
    ///
    pub fn add_to_old_error(&mut self, entry: &ErrorContainer) -> Result<usize, SGError>
    {
        let seq = self.keys.sequence_number(&entry.point)?;
        let record = &mut self.records[seq];
        self.rank.remove(&(OrdF64(record.value), seq));
        record.value += entry.value;
        record.contributions += entry.contributions;
        self.rank.insert((OrdF64(record.value), seq));
        Ok(seq)
    }

    ///
    /// Merges every record of `other`: absent points are inserted, present
    /// ones accumulated.
    ///
    pub fn update_errors(&mut self, other: &ErrorStorage) -> Result<(), SGError>
    {
        for entry in other.iter()
        {
            if self.contains(&entry.point)
            {
                self.add_to_old_error(entry)?;
            }
            else
            {
                self.push(entry.clone())?;
            }
        }
        Ok(())
    }

    fn largest_admissible(&self) -> Option<usize>
    {
        self.rank.iter().rev().find(|(_, seq)| self.records[*seq].admissible).map(|&(_, seq)| seq)
    }

    fn smallest_admissible(&self) -> Option<usize>
    {
        self.rank.iter().find(|(_, seq)| self.records[*seq].admissible).map(|&(_, seq)| seq)
    }

    fn largest(&self) -> Result<usize, SGError>
    {
        self.rank.last().map(|&(_, seq)| seq).ok_or(SGError::EmptyStore)
    }

    fn smallest(&self) -> Result<usize, SGError>
    {
        self.rank.first().map(|&(_, seq)| seq).ok_or(SGError::EmptyStore)
    }

    ///
    /// Largest admissible entry. Without admissible entries the smallest entry
    /// is chosen instead so that callers always make progress.
    ///
    fn select_front(&self) -> Result<usize, SGError>
    {
        match self.largest_admissible()
        {
            Some(seq) => Ok(seq),
            None =>
            {
                let seq = self.smallest()?;
                log::debug!("no admissible entry among {}, falling back to smallest", self.len());
                Ok(seq)
            }
        }
    }

    ///
    /// Smallest admissible entry, falling back to the largest entry.
    ///
    fn select_back(&self) -> Result<usize, SGError>
    {
        match self.smallest_admissible()
        {
            Some(seq) => Ok(seq),
            None =>
            {
                let seq = self.largest()?;
                log::debug!("no admissible entry among {}, falling back to largest", self.len());
                Ok(seq)
            }
        }
    }

    fn remove(&mut self, seq: usize) -> Result<ErrorContainer, SGError>
    {
        let last = self.records.len() - 1;
        self.rank.remove(&(OrdF64(self.records[seq].value), seq));
        if seq != last
        {
            self.rank.remove(&(OrdF64(self.records[last].value), last));
            self.rank.insert((OrdF64(self.records[last].value), seq));
        }
        self.keys.swap_remove(seq)?;
        Ok(self.records.swap_remove(seq))
    }

    pub fn pop(&mut self) -> Result<ErrorContainer, SGError>
    {
        let seq = self.select_front()?;
        self.remove(seq)
    }

    /// Removes the largest entry regardless of admissibility.
    pub fn pop_next(&mut self) -> Result<ErrorContainer, SGError>
    {
        let seq = self.largest()?;
        self.remove(seq)
    }

    pub fn pop_back(&mut self) -> Result<ErrorContainer, SGError>
    {
        let seq = self.select_back()?;
        self.remove(seq)
    }

    /// Removes the smallest entry regardless of admissibility.
    pub fn pop_back_next(&mut self) -> Result<ErrorContainer, SGError>
    {
        let seq = self.smallest()?;
        self.remove(seq)
    }

    pub fn peek(&self) -> Result<&ErrorContainer, SGError>
    {
        Ok(&self.records[self.select_front()?])
    }

    pub fn peek_next(&self) -> Result<&ErrorContainer, SGError>
    {
        Ok(&self.records[self.largest()?])
    }

    pub fn peek_back(&self) -> Result<&ErrorContainer, SGError>
    {
        Ok(&self.records[self.select_back()?])
    }

    pub fn peek_back_next(&self) -> Result<&ErrorContainer, SGError>
    {
        Ok(&self.records[self.smallest()?])
    }

    pub fn clear(&mut self)
    {
        self.keys.clear();
        self.records.clear();
        self.rank.clear();
    }
}
