//! Index translation for reconciliation.
//!
//! An [`OffsetTracker`] maps every original slot to its current position
//! while a sequence is rearranged. Updates shift every value inside a value
//! range at once.
//!
//! Small sequences keep a flat array and scan it. Larger ones also keep the
//! start index of every maximal non-decreasing run ("fences"): an update
//! binary-searches each run for the affected slice and splits a run only
//! where the shifted slice breaks its order.

/// Sequences shorter than this are tracked without fences.
pub const THRESHOLD: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetTracker {
    Flat(Vec<usize>),
    Fenced {
        values: Vec<usize>,
        /// Start of each non-decreasing run; `fences[0] == 0`.
        fences: Vec<usize>,
    },
}

fn run_starts(values: &[usize]) -> Vec<usize> {
    let mut fences = vec![0];
    fences.extend((1..values.len()).filter(|&i| values[i - 1] > values[i]));
    fences
}

impl OffsetTracker {
    /// Track `values[slot]`, the current position of each slot.
    pub fn new(values: Vec<usize>) -> Self {
        if values.len() < THRESHOLD {
            OffsetTracker::Flat(values)
        } else {
            let fences = run_starts(&values);
            OffsetTracker::Fenced { values, fences }
        }
    }

    pub fn get(&self, slot: usize) -> usize {
        self.values()[slot]
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn values(&self) -> &[usize] {
        match self {
            OffsetTracker::Flat(values) | OffsetTracker::Fenced { values, .. } => values,
        }
    }

    /// Number of non-decreasing runs currently tracked.
    pub fn runs(&self) -> usize {
        match self {
            OffsetTracker::Flat(values) => run_starts(values).len(),
            OffsetTracker::Fenced { fences, .. } => fences.len(),
        }
    }

    /// Add `offset` to every value `v` with `lower <= v < upper`.
    pub fn adjust(&mut self, lower: usize, upper: usize, offset: isize) {
        if lower >= upper || offset == 0 {
            return;
        }

        match self {
            OffsetTracker::Flat(values) => {
                for v in values.iter_mut() {
                    if *v >= lower && *v < upper {
                        *v = v.saturating_add_signed(offset);
                    }
                }
            }
            OffsetTracker::Fenced { values, fences } => {
                let mut splits = Vec::new();
                for (r, &start) in fences.iter().enumerate() {
                    let end = fences.get(r + 1).copied().unwrap_or(values.len());
                    let run = &values[start..end];
                    match (run.first(), run.last()) {
                        (Some(&first), Some(&last)) if first < upper && last >= lower => {}
                        _ => continue,
                    }

                    let a = start + run.partition_point(|&v| v < lower);
                    let b = start + run.partition_point(|&v| v < upper);
                    for v in &mut values[a..b] {
                        *v = v.saturating_add_signed(offset);
                    }
                    if a > start && values[a - 1] > values[a] {
                        splits.push(a);
                    }
                    if b < end && values[b - 1] > values[b] {
                        splits.push(b);
                    }
                }

                if !splits.is_empty() {
                    fences.extend(splits);
                    fences.sort_unstable();
                    fences.dedup();
                }
            }
        }
    }

    /// Record that the block at positions `from..from + len` now starts at
    /// position `to`, with the positions in between shifted to close the gap.
    pub fn relocate(&mut self, from: usize, len: usize, to: usize) {
        if len == 0 || from == to {
            return;
        }

        // Park the block past every live position while the gap closes.
        let park = self.len();
        self.adjust(from, from + len, park as isize);
        if to < from {
            self.adjust(to, from, len as isize);
        } else {
            self.adjust(from + len, to + len, -(len as isize));
        }
        self.adjust(
            from + park,
            from + park + len,
            to as isize - from as isize - park as isize,
        );
    }
}
