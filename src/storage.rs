use std::hash::{Hash, Hasher};
use bitfield_struct::bitfield;
use hashbrown::HashTable;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use crate::errors::SGError;

#[bitfield(u8, new=false)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct GridPointFlags
{
    pub is_leaf: bool,
    pub is_inner: bool,
    #[bits(6)]
    pub _empty: u8
}

impl GridPointFlags
{
    pub fn new(level: &[u8], is_leaf: bool) -> Self
    {
        let mut r = Self::default();
        r.set_is_leaf(is_leaf);
        r.set_is_inner(!level.contains(&0));
        r
    }
    /// Recomputes `is_inner` from the level vector.
    pub fn update_is_inner(&mut self, level: &[u8])
    {
        self.set_is_inner(!level.contains(&0));
    }
}

///
/// Hash of a level/index vector. Leaf and inner flags never take part in it.
///
#[inline]
pub(crate) fn point_hash(level: &[u8], index: &[u32]) -> u64
{
    let hasher = &mut FxHasher::default();
    level.hash(hasher);
    index.hash(hasher);
    hasher.finish()
}

///
/// Deepest representable level. Children of a point on this level would need
/// indices beyond `u32`.
///
pub const MAX_LEVEL: u8 = 31;

///
/// Checks the dyadic encoding of a single (level, index) pair.
///
#[inline]
pub fn is_valid_pair(level: u8, index: u32) -> bool
{
    if level == 0
    {
        index <= 1
    }
    else if level > MAX_LEVEL
    {
        false
    }
    else
    {
        index % 2 == 1 && (index as u64) < (1_u64 << level)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GridPoint
{
    pub level: Vec<u8>,
    pub index: Vec<u32>,
    pub(crate) flags: GridPointFlags,
}

impl Hash for GridPoint
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.index.hash(state);
    }
}

impl PartialEq for GridPoint
{
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.index == other.index
    }
}
impl Eq for GridPoint{}

impl PartialOrd for GridPoint
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(std::cmp::Ord::cmp(self, other))
    }
}
impl Ord for GridPoint
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level.cmp(&other.level).then(self.index.cmp(&other.index))
    }
}

impl GridPoint
{
    pub fn new(level: &[u8], index: &[u32], is_leaf: bool) -> Self
    {
        debug_assert_eq!(level.len(), index.len());
        let flags = GridPointFlags::new(level, is_leaf);
        Self { level: level.to_vec(), index: index.to_vec(), flags }
    }

    ///
    /// Same as [`GridPoint::new`] but rejects level/index pairs outside the dyadic encoding.
    ///
    pub fn try_new(level: &[u8], index: &[u32], is_leaf: bool) -> Result<Self, SGError>
    {
        if level.len() != index.len()
        {
            return Err(SGError::DimensionMismatch { expected: level.len(), found: index.len() });
        }
        let point = Self::new(level, index, is_leaf);
        if !point.is_valid()
        {
            return Err(SGError::InvalidPoint);
        }
        Ok(point)
    }

    pub fn zero_index(num_inputs: usize) -> Self
    {
        Self::new(&vec![0; num_inputs], &vec![0; num_inputs], false)
    }

    pub fn is_valid(&self) -> bool
    {
        self.level.len() == self.index.len() &&
            self.level.iter().zip(self.index.iter()).all(|(&l, &i)| is_valid_pair(l, i))
    }

    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.level.len()
    }

    pub fn is_leaf(&self) -> bool
    {
        self.flags.is_leaf()
    }
    pub fn set_is_leaf(&mut self, is_leaf: bool)
    {
        self.flags.set_is_leaf(is_leaf);
    }
    ///
    /// This is an inner point if no levels are zero...
    ///
    pub fn is_inner_point(&self) -> bool
    {
        !self.level.contains(&0)
    }

    ///
    /// Sets level and index in direction `dim`, keeping the leaf flag.
    ///
    #[inline]
    pub fn set(&mut self, dim: usize, level: u8, index: u32)
    {
        self.level[dim] = level;
        self.index[dim] = index;
        self.flags.update_is_inner(&self.level);
    }

    pub fn level_sum(&self) -> u32
    {
        self.level.iter().map(|&l| l as u32).sum()
    }
    #[inline]
    pub fn level_max(&self) -> u8
    {
        self.level.iter().copied().max().unwrap_or(0)
    }
    pub fn level_min(&self) -> u8
    {
        self.level.iter().copied().min().unwrap_or(0)
    }

    ///
    /// Left hierarchical child in direction `dim`. A boundary anchor (level 0)
    /// has the single child (1, 1), which is returned by both child helpers.
    ///
    pub fn left_child(&self, dim: usize) -> GridPoint
    {
        if self.level[dim] == 0
        {
            return self.level_one(dim);
        }
        let mut r = self.clone();
        r.set(dim, self.level[dim] + 1, 2 * self.index[dim] - 1);
        r
    }
    pub fn right_child(&self, dim: usize) -> GridPoint
    {
        if self.level[dim] == 0
        {
            return self.level_one(dim);
        }
        let mut r = self.clone();
        r.set(dim, self.level[dim] + 1, 2 * self.index[dim] + 1);
        r
    }

    ///
    /// Returns the point with level one in direction `dim`.
    ///
    pub fn level_one(&self, dim: usize) -> GridPoint
    {
        let mut r = self.clone();
        r.set(dim, 1, 1);
        r
    }

    ///
    /// Hierarchical parent in direction `dim`. Points on level one have the two
    /// boundary anchors as predecessors and boundary anchors have none, so both
    /// return `None`.
    ///
    pub fn parent(&self, dim: usize) -> Option<GridPoint>
    {
        if self.level[dim] <= 1
        {
            return None;
        }
        let mut r = self.clone();
        r.set(dim, self.level[dim] - 1, (self.index[dim] >> 1) | 1);
        Some(r)
    }

    pub fn left_level_zero(&self, dim: usize) -> GridPoint
    {
        let mut r = self.clone();
        r.set(dim, 0, 0);
        r
    }

    pub fn right_level_zero(&self, dim: usize) -> GridPoint
    {
        let mut r = self.clone();
        r.set(dim, 0, 1);
        r
    }

    ///
    /// True if `self` is a (non-strict) hierarchical ancestor of `other` in every
    /// direction, i.e. the support of `self` contains `other`'s grid location.
    ///
    pub fn is_ancestor_of(&self, other: &GridPoint) -> bool
    {
        if self.num_inputs() != other.num_inputs()
        {
            return false;
        }
        (0..self.num_inputs()).all(|d|
        {
            let (ls, is) = (self.level[d], self.index[d]);
            let (lo, io) = (other.level[d], other.index[d]);
            if ls == 0
            {
                lo > 0 || is == io
            }
            else
            {
                lo >= ls && ((io >> (lo - ls)) | 1) == is
            }
        })
    }

    pub fn unit_coordinate(&self) -> Vec<f64>
    {
        self.level.iter().zip(self.index.iter()).map(|(&l, &i)| i as f64 / (1_u64 << l) as f64).collect()
    }
}

impl From<&GridPoint> for u64
{
    fn from(val: &GridPoint) -> Self {
        point_hash(&val.level, &val.index)
    }
}

///
/// Borrowed view of a stored point.
///
#[derive(Clone, Copy, Debug)]
pub struct GridPointRef<'a>
{
    pub(crate) level: &'a [u8],
    pub(crate) index: &'a [u32],
    pub(crate) flags: GridPointFlags,
}

impl<'a> GridPointRef<'a>
{
    #[inline]
    pub fn level(&self) -> &'a [u8]
    {
        self.level
    }
    #[inline]
    pub fn index(&self) -> &'a [u32]
    {
        self.index
    }
    #[inline]
    pub fn is_leaf(&self) -> bool
    {
        self.flags.is_leaf()
    }
    #[inline]
    pub fn is_inner_point(&self) -> bool
    {
        self.flags.is_inner()
    }
    pub fn level_sum(&self) -> u32
    {
        self.level.iter().map(|&l| l as u32).sum()
    }
    #[inline]
    pub fn level_max(&self) -> u8
    {
        self.level.iter().copied().max().unwrap_or(0)
    }
}

impl PartialEq for GridPointRef<'_>
{
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.index == other.index
    }
}
impl Eq for GridPointRef<'_>{}

impl From<GridPointRef<'_>> for GridPoint
{
    fn from(value: GridPointRef<'_>) -> Self {
        GridPoint { level: value.level.to_owned(), index: value.index.to_owned(), flags: value.flags }
    }
}

///
/// Old-to-new sequence number table produced by every compacting removal.
/// Callers owning vectors indexed by sequence number must apply it before the
/// next use of those vectors.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceRemap
{
    new_sequence: Vec<Option<usize>>,
    removed: Vec<usize>,
    new_len: usize,
}

impl SequenceRemap
{
    pub fn identity(len: usize) -> Self
    {
        Self { new_sequence: (0..len).map(Some).collect(), removed: Vec::new(), new_len: len }
    }

    pub(crate) fn from_removed(old_len: usize, removed: Vec<usize>) -> Self
    {
        let mut new_sequence = vec![None; old_len];
        let mut is_removed = vec![false; old_len];
        for &seq in &removed
        {
            is_removed[seq] = true;
        }
        let mut next = 0;
        for (seq, slot) in new_sequence.iter_mut().enumerate()
        {
            if !is_removed[seq]
            {
                *slot = Some(next);
                next += 1;
            }
        }
        Self { new_sequence, removed, new_len: next }
    }

    /// New sequence number of `old`, `None` if it was removed.
    #[inline]
    pub fn get(&self, old: usize) -> Option<usize>
    {
        self.new_sequence.get(old).copied().flatten()
    }

    /// Removed sequence numbers (old numbering), ascending.
    pub fn removed(&self) -> &[usize]
    {
        &self.removed
    }

    pub fn is_identity(&self) -> bool
    {
        self.removed.is_empty()
    }

    pub fn old_len(&self) -> usize
    {
        self.new_sequence.len()
    }

    pub fn new_len(&self) -> usize
    {
        self.new_len
    }

    /// Old sequence numbers of the surviving points, in their new order.
    pub fn survivors(&self) -> impl Iterator<Item = usize> + '_
    {
        self.new_sequence.iter().enumerate().filter_map(|(old, new)| new.map(|_| old))
    }

    ///
    /// Compacts a caller-owned vector holding `stride` values per point.
    ///
    pub fn compact<T: Clone>(&self, values: &[T], stride: usize) -> Result<Vec<T>, SGError>
    {
        if values.len() != self.old_len() * stride
        {
            return Err(SGError::DimensionMismatch { expected: self.old_len() * stride, found: values.len() });
        }
        let mut result = Vec::with_capacity(self.new_len * stride);
        for old in self.survivors()
        {
            result.extend_from_slice(&values[old * stride..(old + 1) * stride]);
        }
        Ok(result)
    }
}

///
/// One stored point in the ordered round-trip description of a storage.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPointRecord
{
    pub level: Vec<u8>,
    pub index: Vec<u32>,
    pub is_leaf: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescription
{
    pub num_inputs: usize,
    pub points: Vec<GridPointRecord>,
}

///
/// Hash-indexed point storage. Points live in flat level/index arrays addressed
/// by a dense sequence number; the hash table maps a level/index vector to that
/// sequence number. Parent and child relations are never stored, they are
/// recomputed from level/index arithmetic.
///
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "StorageDescription", try_from = "StorageDescription")]
pub struct GridStorage
{
    pub(crate) num_inputs: usize,
    pub(crate) level: Vec<u8>,
    pub(crate) index: Vec<u32>,
    pub(crate) flags: Vec<GridPointFlags>,
    pub(crate) max_level: u8,
    table: HashTable<u32>,
}

impl std::fmt::Debug for GridStorage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridStorage")
            .field("num_inputs", &self.num_inputs)
            .field("len", &self.len())
            .field("max_level", &self.max_level)
            .finish()
    }
}

impl PartialEq for GridStorage
{
    fn eq(&self, other: &Self) -> bool {
        self.num_inputs == other.num_inputs && self.level == other.level && self.index == other.index && self.flags == other.flags
    }
}

impl GridStorage
{
    pub fn new(num_inputs: usize) -> Self
    {
        Self::with_capacity(num_inputs, 0)
    }

    pub fn with_capacity(num_inputs: usize, capacity: usize) -> Self
    {
        Self
        {
            num_inputs,
            level: Vec::with_capacity(capacity * num_inputs),
            index: Vec::with_capacity(capacity * num_inputs),
            flags: Vec::with_capacity(capacity),
            max_level: 0,
            table: HashTable::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.num_inputs
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.flags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.flags.is_empty()
    }

    ///
    /// Largest level over every point and direction.
    ///
    #[inline]
    pub fn max_level(&self) -> u8
    {
        self.max_level
    }

    #[inline(always)]
    pub fn level(&self, seq: usize, dim: usize) -> u8
    {
        self.level[self.num_inputs * seq + dim]
    }

    #[inline(always)]
    pub fn index(&self, seq: usize, dim: usize) -> u32
    {
        self.index[self.num_inputs * seq + dim]
    }

    #[inline]
    fn range(&self, seq: usize) -> std::ops::Range<usize>
    {
        seq * self.num_inputs..(seq + 1) * self.num_inputs
    }

    #[inline]
    fn check_sequence(&self, seq: usize) -> Result<(), SGError>
    {
        if seq >= self.len()
        {
            Err(SGError::IndexOutOfRange { index: seq, len: self.len() })
        }
        else
        {
            Ok(())
        }
    }

    pub fn get(&self, seq: usize) -> Result<GridPointRef<'_>, SGError>
    {
        self.check_sequence(seq)?;
        let range = self.range(seq);
        Ok(GridPointRef { level: &self.level[range.clone()], index: &self.index[range], flags: self.flags[seq] })
    }

    ///
    /// Owned copy of the point at `seq`.
    ///
    pub fn point(&self, seq: usize) -> Result<GridPoint, SGError>
    {
        self.get(seq).map(GridPoint::from)
    }

    fn find_slices(&self, level: &[u8], index: &[u32]) -> Option<usize>
    {
        if level.len() != self.num_inputs || index.len() != self.num_inputs
        {
            return None;
        }
        let n = self.num_inputs;
        let (levels, indices) = (&self.level, &self.index);
        self.table.find(point_hash(level, index), |&seq|
        {
            let start = seq as usize * n;
            &levels[start..start + n] == level && &indices[start..start + n] == index
        }).map(|&seq| seq as usize)
    }

    #[inline]
    pub fn find(&self, point: &GridPoint) -> Option<usize>
    {
        self.find_slices(&point.level, &point.index)
    }

    #[inline]
    pub fn contains(&self, point: &GridPoint) -> bool
    {
        self.find(point).is_some()
    }

    pub fn sequence_number(&self, point: &GridPoint) -> Result<usize, SGError>
    {
        self.find(point).ok_or(SGError::NotFound)
    }

    ///
    /// Appends a point and returns its sequence number. Existing sequence
    /// numbers are left untouched.
    ///
    pub fn insert(&mut self, mut point: GridPoint) -> Result<usize, SGError>
    {
        if point.num_inputs() != self.num_inputs || point.index.len() != self.num_inputs
        {
            return Err(SGError::DimensionMismatch { expected: self.num_inputs, found: point.num_inputs() });
        }
        if !point.is_valid()
        {
            return Err(SGError::InvalidPoint);
        }
        if self.contains(&point)
        {
            return Err(SGError::DuplicateKey);
        }
        let seq = self.len();
        let hash = point_hash(&point.level, &point.index);
        point.flags.update_is_inner(&point.level);
        self.max_level = self.max_level.max(point.level_max());
        self.level.extend_from_slice(&point.level);
        self.index.extend_from_slice(&point.index);
        self.flags.push(point.flags);
        let n = self.num_inputs;
        let (levels, indices) = (&self.level, &self.index);
        self.table.insert_unique(hash, seq as u32, |&s|
        {
            let start = s as usize * n;
            point_hash(&levels[start..start + n], &indices[start..start + n])
        });
        Ok(seq)
    }

    #[inline]
    pub fn is_leaf(&self, seq: usize) -> bool
    {
        self.flags[seq].is_leaf()
    }

    #[inline]
    pub fn set_is_leaf(&mut self, seq: usize, value: bool)
    {
        self.flags[seq].set_is_leaf(value);
    }

    ///
    /// Sets the leaf flag of a stored point, returning its sequence number, or
    /// `None` if the point is absent.
    ///
    pub fn set_is_leaf_of(&mut self, point: &GridPoint, value: bool) -> Option<usize>
    {
        let seq = self.find(point)?;
        self.flags[seq].set_is_leaf(value);
        Some(seq)
    }

    #[inline]
    pub fn is_inner_point(&self, seq: usize) -> bool
    {
        self.flags[seq].is_inner()
    }

    pub fn num_inner_points(&self) -> usize
    {
        self.flags.iter().filter(|f| f.is_inner()).count()
    }

    #[inline]
    pub fn level_sum(&self, seq: usize) -> u32
    {
        self.level[self.range(seq)].iter().map(|&l| l as u32).sum()
    }

    #[inline]
    pub fn level_max(&self, seq: usize) -> u8
    {
        self.level[self.range(seq)].iter().copied().max().unwrap_or(0)
    }

    ///
    /// True if any hierarchical child of `seq` is stored. Boundary anchors
    /// count their single level-one child.
    ///
    pub fn has_children(&self, seq: usize) -> bool
    {
        let mut level = self.level[self.range(seq)].to_vec();
        let mut index = self.index[self.range(seq)].to_vec();
        for dim in 0..self.num_inputs
        {
            let (l, i) = (level[dim], index[dim]);
            let found = if l == 0
            {
                level[dim] = 1;
                index[dim] = 1;
                self.find_slices(&level, &index).is_some()
            }
            else
            {
                level[dim] = l + 1;
                index[dim] = 2 * i - 1;
                let left = self.find_slices(&level, &index).is_some();
                index[dim] = 2 * i + 1;
                left || self.find_slices(&level, &index).is_some()
            };
            level[dim] = l;
            index[dim] = i;
            if found
            {
                return true;
            }
        }
        false
    }

    ///
    /// Recomputes every leaf flag from the children actually present.
    ///
    pub fn recalc_leaf_property(&mut self)
    {
        for seq in 0..self.len()
        {
            let is_leaf = !self.has_children(seq);
            self.flags[seq].set_is_leaf(is_leaf);
        }
    }

    fn recalc_max_level(&mut self)
    {
        self.max_level = self.level.iter().copied().max().unwrap_or(0);
    }

    fn rebuild_table(&mut self)
    {
        let n = self.num_inputs;
        let mut table = HashTable::with_capacity(self.len());
        for seq in 0..self.len()
        {
            let start = seq * n;
            let hash = point_hash(&self.level[start..start + n], &self.index[start..start + n]);
            let (levels, indices) = (&self.level, &self.index);
            table.insert_unique(hash, seq as u32, |&s: &u32|
            {
                let start = s as usize * n;
                point_hash(&levels[start..start + n], &indices[start..start + n])
            });
        }
        self.table = table;
    }

    ///
    /// Removes the given points and compacts the survivors into `[0, new_len)`,
    /// keeping their relative order. Leaf flags and the maximum level are
    /// recomputed. Every surviving sequence number may change; the returned
    /// remap tells how.
    ///
    pub fn erase<I: IntoIterator<Item = usize>>(&mut self, sequences: I) -> Result<SequenceRemap, SGError>
    {
        let old_len = self.len();
        let mut removed: Vec<usize> = Vec::new();
        for seq in sequences
        {
            self.check_sequence(seq)?;
            removed.push(seq);
        }
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty()
        {
            return Ok(SequenceRemap::identity(old_len));
        }
        let remap = SequenceRemap::from_removed(old_len, removed);
        let n = self.num_inputs;
        let mut level = Vec::with_capacity(remap.new_len() * n);
        let mut index = Vec::with_capacity(remap.new_len() * n);
        let mut flags = Vec::with_capacity(remap.new_len());
        for old in remap.survivors()
        {
            level.extend_from_slice(&self.level[old * n..(old + 1) * n]);
            index.extend_from_slice(&self.index[old * n..(old + 1) * n]);
            flags.push(self.flags[old]);
        }
        self.level = level;
        self.index = index;
        self.flags = flags;
        self.rebuild_table();
        self.recalc_max_level();
        self.recalc_leaf_property();
        log::debug!("erased {} of {} grid points", remap.removed().len(), old_len);
        Ok(remap)
    }

    ///
    /// Removes a single point in O(1) by moving the last point into its slot.
    /// Returns the removed point and, if a point was moved, its former sequence
    /// number (it now lives at `seq`). Leaf flags are not touched.
    ///
    pub fn swap_remove(&mut self, seq: usize) -> Result<(GridPoint, Option<usize>), SGError>
    {
        let removed = self.point(seq)?;
        let last = self.len() - 1;
        let n = self.num_inputs;
        let (levels, indices) = (&self.level, &self.index);
        let hash = point_hash(&removed.level, &removed.index);
        if let Ok(entry) = self.table.find_entry(hash, |&s| s as usize == seq)
        {
            entry.remove();
        }
        let moved = if seq != last
        {
            let last_hash = point_hash(&levels[last * n..(last + 1) * n], &indices[last * n..(last + 1) * n]);
            if let Some(slot) = self.table.find_mut(last_hash, |&s| s as usize == last)
            {
                *slot = seq as u32;
            }
            self.level.copy_within(last * n..(last + 1) * n, seq * n);
            self.index.copy_within(last * n..(last + 1) * n, seq * n);
            self.flags[seq] = self.flags[last];
            Some(last)
        }
        else
        {
            None
        };
        self.level.truncate(last * n);
        self.index.truncate(last * n);
        self.flags.truncate(last);
        if removed.level_max() == self.max_level
        {
            self.recalc_max_level();
        }
        Ok((removed, moved))
    }

    pub fn clear(&mut self)
    {
        self.level.clear();
        self.index.clear();
        self.flags.clear();
        self.table.clear();
        self.max_level = 0;
    }

    ///
    /// Dense level and index arrays, `num_inputs` entries per sequence number.
    ///
    pub fn level_index_arrays(&self) -> (&[u8], &[u32])
    {
        (&self.level, &self.index)
    }

    pub fn unit_coordinate(&self, seq: usize) -> Vec<f64>
    {
        self.range(seq).map(|k| self.index[k] as f64 / (1_u64 << self.level[k]) as f64).collect()
    }

    ///
    /// Iterates the stored points in sequence order.
    ///
    pub fn nodes(&self) -> NodeIterator<'_>
    {
        NodeIterator { storage: self, current_seq: 0 }
    }

    pub fn to_description(&self) -> StorageDescription
    {
        StorageDescription
        {
            num_inputs: self.num_inputs,
            points: self.nodes().map(|p| GridPointRecord { level: p.level.to_vec(), index: p.index.to_vec(), is_leaf: p.is_leaf() }).collect(),
        }
    }

    ///
    /// Rebuilds a storage from its ordered description. Sequence numbers follow
    /// the record order; leaf flags are taken as recorded.
    ///
    pub fn from_description(description: &StorageDescription) -> Result<Self, SGError>
    {
        let mut storage = Self::with_capacity(description.num_inputs, description.points.len());
        for record in &description.points
        {
            let point = GridPoint::try_new(&record.level, &record.index, record.is_leaf)?;
            storage.insert(point)?;
        }
        Ok(storage)
    }
}

impl From<GridStorage> for StorageDescription
{
    fn from(value: GridStorage) -> Self {
        value.to_description()
    }
}

impl TryFrom<StorageDescription> for GridStorage
{
    type Error = SGError;

    fn try_from(value: StorageDescription) -> Result<Self, Self::Error> {
        GridStorage::from_description(&value)
    }
}

pub struct NodeIterator<'a>
{
    storage: &'a GridStorage,
    current_seq: usize,
}

impl<'a> Iterator for NodeIterator<'a>
{
    type Item = GridPointRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_seq < self.storage.len()
        {
            let start = self.current_seq * self.storage.num_inputs;
            let end = start + self.storage.num_inputs;
            let flags = self.storage.flags[self.current_seq];
            self.current_seq += 1;
            Some(GridPointRef { level: &self.storage.level[start..end], index: &self.storage.index[start..end], flags })
        }
        else
        {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.storage.len() - self.current_seq;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for NodeIterator<'_> {}

#[cfg(test)]
mod tests
{
    use super::*;

    fn p(level: &[u8], index: &[u32]) -> GridPoint
    {
        GridPoint::new(level, index, true)
    }

    #[test]
    fn insert_and_find()
    {
        let mut storage = GridStorage::new(2);
        assert_eq!(storage.insert(p(&[1, 1], &[1, 1])).unwrap(), 0);
        assert_eq!(storage.insert(p(&[2, 1], &[3, 1])).unwrap(), 1);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.max_level(), 2);
        assert_eq!(storage.find(&p(&[2, 1], &[3, 1])), Some(1));
        assert!(!storage.contains(&p(&[2, 1], &[1, 1])));
        assert_eq!(storage.sequence_number(&p(&[1, 2], &[1, 3])), Err(SGError::NotFound));
    }

    #[test]
    fn lookup_ignores_leaf_flag()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(GridPoint::new(&[1], &[1], true)).unwrap();
        assert!(storage.contains(&GridPoint::new(&[1], &[1], false)));
    }

    #[test]
    fn duplicate_and_invalid_points_are_rejected()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(p(&[2], &[3])).unwrap();
        assert_eq!(storage.insert(p(&[2], &[3])), Err(SGError::DuplicateKey));
        assert_eq!(storage.insert(p(&[2], &[2])), Err(SGError::InvalidPoint));
        assert_eq!(storage.insert(p(&[2], &[5])), Err(SGError::InvalidPoint));
        assert_eq!(storage.insert(p(&[0], &[2])), Err(SGError::InvalidPoint));
        assert_eq!(storage.insert(p(&[1, 1], &[1, 1])), Err(SGError::DimensionMismatch { expected: 1, found: 2 }));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn deepest_level_does_not_overflow()
    {
        let mut storage = GridStorage::new(1);
        for l in 1..=MAX_LEVEL
        {
            storage.insert(p(&[l], &[(1_u32 << l) - 1])).unwrap();
        }
        let deepest = GridPoint::new(&[MAX_LEVEL], &[u32::MAX >> 1], true);
        let seq = storage.find(&deepest).unwrap();
        assert_eq!(storage.insert(p(&[MAX_LEVEL + 1], &[1])), Err(SGError::InvalidPoint));
        assert!(!storage.has_children(seq));
        storage.recalc_leaf_property();
        assert!(storage.is_leaf(seq));
        assert!(!storage.is_leaf(0));
        assert_eq!(storage.max_level(), MAX_LEVEL);
    }

    #[test]
    fn get_out_of_range()
    {
        let storage = GridStorage::new(3);
        assert_eq!(storage.get(0).err(), Some(SGError::IndexOutOfRange { index: 0, len: 0 }));
    }

    #[test]
    fn child_and_parent_arithmetic()
    {
        let point = p(&[2, 1], &[3, 1]);
        assert_eq!(point.left_child(0), p(&[3, 1], &[5, 1]));
        assert_eq!(point.right_child(0), p(&[3, 1], &[7, 1]));
        assert_eq!(point.parent(0), Some(p(&[1, 1], &[1, 1])));
        assert_eq!(point.parent(1), None);
        assert_eq!(p(&[3], &[5]).parent(0), Some(p(&[2], &[3])));
        assert_eq!(p(&[3], &[3]).parent(0), Some(p(&[2], &[1])));
        let anchor = p(&[0], &[1]);
        assert_eq!(anchor.parent(0), None);
        assert_eq!(anchor.left_child(0), p(&[1], &[1]));
        assert_eq!(anchor.right_child(0), p(&[1], &[1]));
    }

    #[test]
    fn ancestor_test()
    {
        let root = p(&[1, 1], &[1, 1]);
        assert!(root.is_ancestor_of(&p(&[3, 2], &[5, 3])));
        assert!(p(&[2, 1], &[3, 1]).is_ancestor_of(&p(&[3, 1], &[5, 1])));
        assert!(!p(&[2, 1], &[1, 1]).is_ancestor_of(&p(&[3, 1], &[5, 1])));
        assert!(p(&[0], &[0]).is_ancestor_of(&p(&[2], &[3])));
        assert!(!p(&[0], &[0]).is_ancestor_of(&p(&[0], &[1])));
    }

    #[test]
    fn erase_compacts_and_recalculates()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(GridPoint::new(&[1], &[1], false)).unwrap();
        storage.insert(p(&[2], &[1])).unwrap();
        storage.insert(GridPoint::new(&[2], &[3], false)).unwrap();
        storage.insert(p(&[3], &[5])).unwrap();
        storage.insert(p(&[3], &[7])).unwrap();
        let remap = storage.erase([3, 4]).unwrap();
        assert_eq!(storage.len(), 3);
        assert_eq!(remap.removed(), &[3, 4]);
        assert_eq!(remap.get(2), Some(2));
        assert_eq!(remap.get(3), None);
        assert_eq!(storage.max_level(), 2);
        // (2,3) lost both children
        assert!(storage.is_leaf(2));
        assert!(!storage.is_leaf(0));
        let remap = storage.erase([1]).unwrap();
        assert_eq!(remap.get(2), Some(1));
        assert_eq!(storage.find(&p(&[2], &[3])), Some(1));
        assert_eq!(remap.compact(&[10.0, 11.0, 12.0], 1).unwrap(), vec![10.0, 12.0]);
    }

    #[test]
    fn erase_rejects_bad_sequence()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(p(&[1], &[1])).unwrap();
        assert_eq!(storage.erase([5]).err(), Some(SGError::IndexOutOfRange { index: 5, len: 1 }));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn swap_remove_moves_last()
    {
        let mut storage = GridStorage::new(1);
        storage.insert(p(&[1], &[1])).unwrap();
        storage.insert(p(&[2], &[1])).unwrap();
        storage.insert(p(&[3], &[1])).unwrap();
        let (removed, moved) = storage.swap_remove(0).unwrap();
        assert_eq!(removed, p(&[1], &[1]));
        assert_eq!(moved, Some(2));
        assert_eq!(storage.find(&p(&[3], &[1])), Some(0));
        assert_eq!(storage.find(&p(&[2], &[1])), Some(1));
        assert!(!storage.contains(&p(&[1], &[1])));
        assert_eq!(storage.max_level(), 3);
        let (_, moved) = storage.swap_remove(0).unwrap();
        assert_eq!(moved, Some(1));
        assert_eq!(storage.max_level(), 2);
        let (_, moved) = storage.swap_remove(0).unwrap();
        assert_eq!(moved, None);
        assert!(storage.is_empty());
    }

    #[test]
    fn description_roundtrip()
    {
        let mut storage = GridStorage::new(2);
        storage.insert(GridPoint::new(&[1, 1], &[1, 1], false)).unwrap();
        storage.insert(p(&[0, 1], &[1, 1])).unwrap();
        storage.insert(p(&[1, 2], &[1, 3])).unwrap();
        let description = storage.to_description();
        let restored = GridStorage::from_description(&description).unwrap();
        assert!(restored == storage);
        for (seq, node) in storage.nodes().enumerate()
        {
            assert_eq!(restored.find(&GridPoint::from(node)), Some(seq));
        }
        assert_eq!(restored.num_inner_points(), 2);
    }
}
