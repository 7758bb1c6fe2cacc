//! Iteration direction.

/// Direction of a `get` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dir {
    /// Forward, in ascending index order.
    Next,
    /// Backward, in descending index order.
    Prev,
}

impl Dir {
    /// Returns the opposite direction.
    #[inline]
    pub fn reverse(self) -> Dir {
        match self {
            Dir::Next => Dir::Prev,
            Dir::Prev => Dir::Next,
        }
    }
}
