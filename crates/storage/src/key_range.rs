//! Key ranges over composite index keys.
//!
//! Bounds are key *prefixes*: a key satisfies a bound by comparing only its first
//! `prefix.len()` values. This lets a bound on the leading columns of an index
//! select every key that extends it, without a "max value" sentinel.

use relq_core::Value;
use std::cmp::Ordering;
use std::fmt;

/// A composite index key.
pub type Key = Vec<Value>;

/// One end of a key range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBound {
    /// Key prefix.
    pub prefix: Key,
    /// Whether keys equal to the prefix are included.
    pub inclusive: bool,
}

impl KeyBound {
    /// Creates an inclusive bound.
    pub fn incl(prefix: Key) -> Self {
        Self {
            prefix,
            inclusive: true,
        }
    }

    /// Creates an exclusive bound.
    pub fn excl(prefix: Key) -> Self {
        Self {
            prefix,
            inclusive: false,
        }
    }

    /// Returns true if this bound doesn't restrict anything.
    pub fn is_unbounded(&self) -> bool {
        self.prefix.is_empty() && self.inclusive
    }

    fn cmp_prefix(&self, key: &[Value]) -> Ordering {
        let n = self.prefix.len().min(key.len());
        key[..n].cmp(&self.prefix[..n]).then_with(|| {
            if key.len() < self.prefix.len() {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
    }

    /// Returns true if `key` is at or above this bound used as a lower bound.
    pub fn admits_lower(&self, key: &[Value]) -> bool {
        match self.cmp_prefix(key) {
            Ordering::Greater => true,
            Ordering::Equal => self.inclusive,
            Ordering::Less => false,
        }
    }

    /// Returns true if `key` is at or below this bound used as an upper bound.
    pub fn admits_upper(&self, key: &[Value]) -> bool {
        match self.cmp_prefix(key) {
            Ordering::Less => true,
            Ordering::Equal => self.inclusive,
            Ordering::Greater => false,
        }
    }

    /// The more restrictive of two lower bounds.
    pub fn max_lower(a: &KeyBound, b: &KeyBound) -> KeyBound {
        let n = a.prefix.len().min(b.prefix.len());
        match a.prefix[..n].cmp(&b.prefix[..n]) {
            Ordering::Greater => a.clone(),
            Ordering::Less => b.clone(),
            Ordering::Equal => {
                let (short, long) = if a.prefix.len() <= b.prefix.len() {
                    (a, b)
                } else {
                    (b, a)
                };
                if short.prefix.len() == long.prefix.len() {
                    if short.inclusive { long.clone() } else { short.clone() }
                } else if short.inclusive {
                    long.clone()
                } else {
                    short.clone()
                }
            }
        }
    }

    /// The more restrictive of two upper bounds.
    pub fn min_upper(a: &KeyBound, b: &KeyBound) -> KeyBound {
        let n = a.prefix.len().min(b.prefix.len());
        match a.prefix[..n].cmp(&b.prefix[..n]) {
            Ordering::Less => a.clone(),
            Ordering::Greater => b.clone(),
            Ordering::Equal => {
                let (short, long) = if a.prefix.len() <= b.prefix.len() {
                    (a, b)
                } else {
                    (b, a)
                };
                if short.prefix.len() == long.prefix.len() {
                    if short.inclusive { long.clone() } else { short.clone() }
                } else if short.inclusive {
                    long.clone()
                } else {
                    short.clone()
                }
            }
        }
    }
}

/// A key range for index seeks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound.
    pub lo: KeyBound,
    /// Upper bound.
    pub hi: KeyBound,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

impl KeyRange {
    /// Creates a range from two bounds.
    pub fn new(lo: KeyBound, hi: KeyBound) -> Self {
        Self { lo, hi }
    }

    /// Creates a range for all keys.
    pub fn all() -> Self {
        Self::new(KeyBound::incl(Vec::new()), KeyBound::incl(Vec::new()))
    }

    /// Creates a range of every key starting with `prefix`.
    pub fn point(prefix: Key) -> Self {
        Self::new(KeyBound::incl(prefix.clone()), KeyBound::incl(prefix))
    }

    /// Returns true if this range represents all values (unbounded).
    pub fn is_all(&self) -> bool {
        self.lo.is_unbounded() && self.hi.is_unbounded()
    }

    /// Returns true if both ends are the same inclusive prefix.
    pub fn is_point(&self) -> bool {
        self.lo.inclusive && self.hi.inclusive && self.lo.prefix == self.hi.prefix
    }

    /// Checks if a key is within this range.
    pub fn contains(&self, key: &[Value]) -> bool {
        self.lo.admits_lower(key) && self.hi.admits_upper(key)
    }

    /// Returns true if `key` is past the upper end, so a forward scan can stop.
    pub fn above(&self, key: &[Value]) -> bool {
        !self.hi.admits_upper(key)
    }

    /// Returns true if `key` is before the lower end, so a backward scan can stop.
    pub fn below(&self, key: &[Value]) -> bool {
        !self.lo.admits_lower(key)
    }

    /// Intersects two ranges over the same index.
    pub fn intersect(&self, other: &KeyRange) -> KeyRange {
        KeyRange::new(
            KeyBound::max_lower(&self.lo, &other.lo),
            KeyBound::min_upper(&self.hi, &other.hi),
        )
    }

    /// Returns true if no key can satisfy the range.
    pub fn is_empty(&self) -> bool {
        let n = self.lo.prefix.len().min(self.hi.prefix.len());
        match self.lo.prefix[..n].cmp(&self.hi.prefix[..n]) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                if self.lo.prefix.len() == self.hi.prefix.len() {
                    !(self.lo.inclusive && self.hi.inclusive) && !self.lo.prefix.is_empty()
                } else if self.lo.prefix.len() < self.hi.prefix.len() {
                    !self.lo.inclusive
                } else {
                    !self.hi.inclusive
                }
            }
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |k: &Key| {
            k.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "{}{}..{}{}",
            if self.lo.inclusive { "[" } else { "(" },
            join(&self.lo.prefix),
            join(&self.hi.prefix),
            if self.hi.inclusive { "]" } else { ")" }
        )
    }
}
