//! # Set Partitions
//!
//! Lazy enumeration of every way to split a sequence into exactly `k`
//! nonempty, unordered groups.
//!
//! ## Restricted Growth Strings
//! ```text
//! Each partition is encoded as a[0..n] where a[j] is the group of item j:
//!
//!   a[0] = 0
//!   a[j] <= 1 + max(a[0..j])      (a new group is always the next unused)
//!   max(a) = k - 1                (exactly k groups)
//!
//! n = 3, k = 2:
//!   [0,0,1]  ->  {a,b} {c}
//!   [0,1,0]  ->  {a,c} {b}
//!   [0,1,1]  ->  {a}   {b,c}
//! ```
//!
//! Strings are produced in lexicographic order, so the enumeration is
//! deterministic and every call to [`partitions`] starts from the beginning.
//! Items inside a group keep their input order.
//!
//! The number of partitions grows as the Stirling numbers of the second
//! kind; callers bound `n` (and a wall-clock budget) before iterating.

/// Enumerates the partitions of `items` into exactly `k` nonempty groups.
///
/// Yields nothing when `k` is zero or larger than `items.len()`.
///
/// ```rust
/// use tagger_core::partition::partitions;
///
/// let items = ["a", "b", "c"];
/// let all: Vec<_> = partitions(&items, 2).collect();
/// assert_eq!(all.len(), 3);
/// assert_eq!(all[0], vec![vec![&"a", &"b"], vec![&"c"]]);
/// ```
pub fn partitions<T>(items: &[T], k: usize) -> Partitions<'_, T> {
    let state = if k == 0 || k > items.len() {
        State::Done
    } else {
        State::Fresh
    };
    Partitions {
        items,
        k,
        groups_of: vec![0; items.len()],
        state,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Running,
    Done,
}

/// Iterator returned by [`partitions`].
#[derive(Debug, Clone)]
pub struct Partitions<'a, T> {
    items: &'a [T],
    k: usize,
    /// Current restricted growth string.
    groups_of: Vec<usize>,
    state: State,
}

impl<'a, T> Partitions<'a, T> {
    /// Fills positions `from..n` with the lexicographically smallest suffix
    /// that still reaches `k` groups.
    fn fill_from(&mut self, from: usize) {
        let n = self.items.len();
        let mut highest = self.groups_of[..from].iter().copied().max().unwrap_or(0);
        for j in from..n {
            let missing = self.k - 1 - highest;
            if missing == n - j {
                highest += 1;
                self.groups_of[j] = highest;
            } else {
                self.groups_of[j] = 0;
            }
        }
    }

    /// Steps to the next string; false once the enumeration is exhausted.
    fn advance(&mut self) -> bool {
        let n = self.items.len();
        for i in (1..n).rev() {
            let current = self.groups_of[i];
            let prefix_max = self.groups_of[..i].iter().copied().max().unwrap_or(0);
            if current + 1 >= self.k || current > prefix_max {
                continue;
            }
            let new_max = prefix_max.max(current + 1);
            if n - 1 - i >= self.k - 1 - new_max {
                self.groups_of[i] = current + 1;
                self.fill_from(i + 1);
                return true;
            }
        }
        false
    }

    fn current(&self) -> Vec<Vec<&'a T>> {
        let mut groups: Vec<Vec<&'a T>> = (0..self.k).map(|_| Vec::new()).collect();
        for (item, &group) in self.items.iter().zip(&self.groups_of) {
            groups[group].push(item);
        }
        groups
    }
}

impl<'a, T> Iterator for Partitions<'a, T> {
    type Item = Vec<Vec<&'a T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            State::Done => return None,
            State::Fresh => {
                self.fill_from(1);
                self.state = State::Running;
            }
            State::Running => {
                if !self.advance() {
                    self.state = State::Done;
                    return None;
                }
            }
        }
        Some(self.current())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
