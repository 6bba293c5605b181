use std::cmp::Ordering;

///
/// An f64 wrapper ordered with `total_cmp`, usable as a key in heaps and
/// ordered sets. NaN sorts above every number instead of poisoning comparisons.
///
#[derive(Debug, Clone, Copy)]
pub struct OrdF64(pub f64);

impl PartialEq for OrdF64
{
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64
{
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64
{
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl OrdF64
{
    #[inline]
    pub fn get(self) -> f64
    {
        self.0
    }
}

impl From<f64> for OrdF64
{
    fn from(value: f64) -> Self {
        OrdF64(value)
    }
}
