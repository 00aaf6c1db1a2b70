//! Global monotonic version numbers.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// A version number stamped onto every written value.
///
/// Version numbers are globally monotonic across all transports in the
/// process and establish causal ordering only; they carry no wall-clock
/// meaning. The zero version marks "never written".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionNumber(u64);

impl VersionNumber {
    /// The "never written" version, smaller than any stamped version.
    pub const ZERO: VersionNumber = VersionNumber(0);

    /// Obtain the next globally unique version.
    pub fn next() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for VersionNumber {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_increasing() {
        let a = VersionNumber::next();
        let b = VersionNumber::next();
        let c = VersionNumber::next();
        assert!(a < b && b < c);
        assert!(VersionNumber::ZERO < a);
    }
}
