//! Sequence sets for message ranges.

use std::num::NonZeroU32;

use super::{SeqNum, Uid};

/// A set of message numbers (sequence numbers or UIDs) as inclusive ranges.
///
/// Sets built from numbers are normalised: sorted, merged and free of
/// duplicates, so `3,1,2,7` renders as `1:3,7`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceSet {
    ranges: Vec<(NonZeroU32, NonZeroU32)>,
}

impl SequenceSet {
    /// Creates a set containing a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        Self::range(n, n)
    }

    /// Creates an inclusive range; the bounds may be given in either order.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        Some(Self {
            ranges: vec![(NonZeroU32::new(lo)?, NonZeroU32::new(hi)?)],
        })
    }

    /// Builds a normalised set from arbitrary numbers. Zeros are ignored.
    #[must_use]
    pub fn from_numbers(numbers: impl IntoIterator<Item = u32>) -> Self {
        let mut sorted: Vec<NonZeroU32> = numbers.into_iter().filter_map(NonZeroU32::new).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<(NonZeroU32, NonZeroU32)> = Vec::new();
        for n in sorted {
            match ranges.last_mut() {
                Some((_, hi)) if hi.get().checked_add(1) == Some(n.get()) => *hi = n,
                _ => ranges.push((n, n)),
            }
        }
        Self { ranges }
    }

    /// Builds a set from UIDs.
    #[must_use]
    pub fn from_uids(uids: impl IntoIterator<Item = Uid>) -> Self {
        Self::from_numbers(uids.into_iter().map(Uid::get))
    }

    /// Builds a set from sequence numbers.
    #[must_use]
    pub fn from_seqs(seqs: impl IntoIterator<Item = SeqNum>) -> Self {
        Self::from_numbers(seqs.into_iter().map(SeqNum::get))
    }

    /// Parses the wire form, e.g. `2,10:11`. `*` is not accepted because an
    /// expanded set must be finite.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let (lo, hi) = match part.split_once(':') {
                Some((a, b)) => (a.parse().ok()?, b.parse().ok()?),
                None => {
                    let n = part.parse().ok()?;
                    (n, n)
                }
            };
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            ranges.push((NonZeroU32::new(lo)?, NonZeroU32::new(hi)?));
        }
        Some(Self { ranges })
    }

    /// Returns true if the set holds no numbers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total count of numbers in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ranges
            .iter()
            .map(|(lo, hi)| (hi.get() - lo.get()) as usize + 1)
            .sum()
    }

    /// Expands the set in range order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|(lo, hi)| lo.get()..=hi.get())
    }

    /// Expands the set into UIDs.
    #[must_use]
    pub fn uids(&self) -> Vec<Uid> {
        self.iter().filter_map(Uid::new).collect()
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (lo, hi)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if lo == hi {
                write!(f, "{lo}")?;
            } else {
                write!(f, "{lo}:{hi}")?;
            }
        }
        Ok(())
    }
}
