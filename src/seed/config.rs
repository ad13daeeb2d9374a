//! Seed Selection Configuration
//!
//! How many seed nodes a cluster wants and how they are picked.

use serde::{Deserialize, Serialize};

/// Cluster reliability tier; each tier maps to a seed (quorum) size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReliabilityLevel {
    /// Single-node development clusters
    None,
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl ReliabilityLevel {
    /// Number of seed nodes requested by this tier
    pub fn seed_count(self) -> usize {
        match self {
            ReliabilityLevel::None => 1,
            ReliabilityLevel::Bronze => 3,
            ReliabilityLevel::Silver => 5,
            ReliabilityLevel::Gold => 7,
            ReliabilityLevel::Platinum => 9,
        }
    }
}

/// Strategy for picking seed nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedSelectionStrategy {
    /// Spread seeds round-robin across fault domains, then upgrade domains
    DomainSpread,

    /// Explicitly configured seed node names
    ///
    /// The names must exist in the topology, be seed-eligible and form an
    /// odd-sized quorum.
    Manual(Vec<String>),
}

/// Seed selection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSelectionConfig {
    /// Number of seeds wanted (default: 3)
    ///
    /// The selector clamps this to the eligible node count and rounds down
    /// to an odd number.
    pub desired_seed_count: usize,

    /// Strategy for selecting which nodes become seeds
    pub strategy: SeedSelectionStrategy,
}

impl Default for SeedSelectionConfig {
    fn default() -> Self {
        Self::from_reliability(ReliabilityLevel::default())
    }
}

impl SeedSelectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config requesting the seed count of a reliability tier
    pub fn from_reliability(level: ReliabilityLevel) -> Self {
        Self::with_desired(level.seed_count())
    }

    /// Create a config with a specific desired seed count
    pub fn with_desired(desired_seed_count: usize) -> Self {
        Self {
            desired_seed_count,
            strategy: SeedSelectionStrategy::DomainSpread,
        }
    }

    /// Create a config with manually pinned seed nodes
    pub fn with_manual_seeds(names: Vec<String>) -> Self {
        Self {
            desired_seed_count: names.len(),
            strategy: SeedSelectionStrategy::Manual(names),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.strategy, SeedSelectionStrategy::Manual(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SeedSelectionConfig::default();
        assert_eq!(config.desired_seed_count, 3);
        assert!(matches!(config.strategy, SeedSelectionStrategy::DomainSpread));
    }

    #[test]
    fn test_reliability_seed_counts() {
        assert_eq!(ReliabilityLevel::None.seed_count(), 1);
        assert_eq!(ReliabilityLevel::Silver.seed_count(), 5);
        assert_eq!(ReliabilityLevel::Platinum.seed_count(), 9);
        assert_eq!(SeedSelectionConfig::from_reliability(ReliabilityLevel::Gold).desired_seed_count, 7);
    }

    #[test]
    fn test_with_manual_seeds() {
        let config = SeedSelectionConfig::with_manual_seeds(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(config.desired_seed_count, 3);
        assert!(config.is_manual());
    }
}
