//! Scheduling priority levels.

/// Priority level for request scheduling.
///
/// Maps onto the accessor tiers of a [`PriorityQueue`](super::PriorityQueue):
/// lower accessor index means served first, and within a tier the most
/// recently requested entry wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Work the caller is actively waiting on
    High,
    /// Standard requests
    #[default]
    Normal,
    /// Background and prefetch work
    Low,
}

impl Priority {
    /// Number of priority levels, which is also the default tier count of a
    /// priority queue.
    pub const COUNT: usize = 3;

    /// Tier index in a priority queue; 0 is served first.
    #[inline]
    pub fn accessor_index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_indices_are_dense() {
        assert_eq!(Priority::High.accessor_index(), 0);
        assert_eq!(Priority::Normal.accessor_index(), 1);
        assert_eq!(Priority::Low.accessor_index(), 2);
        assert_eq!(Priority::COUNT, 3);
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Priority::High.to_string(), "high");
        assert_eq!(Priority::Low.to_string(), "low");
    }
}
