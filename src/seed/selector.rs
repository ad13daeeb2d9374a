//! Seed Node Selector
//!
//! Pure placement logic for the seed quorum. Given a topology snapshot (and
//! optionally the seed set currently in use) it returns the seed set to run
//! with. Deterministic: equal inputs always give equal outputs.

use crate::error::{ClusterError, ClusterResult};
use crate::seed::config::{SeedSelectionConfig, SeedSelectionStrategy};
use crate::topology::{ClusterTopology, DomainPath, NodeDescription};
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use std::collections::{BTreeMap, BTreeSet};

/// Smallest seed quorum for a multi-node cluster
pub const MIN_SEED_QUORUM: usize = 3;

/// Ordered set of seed node names, cached against the eligible membership
/// it was computed from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeedNodeSet {
    seeds: BTreeSet<String>,
    computed_from: BTreeSet<String>,
    desired: usize,
}

impl SeedNodeSet {
    pub fn contains(&self, name: &str) -> bool {
        self.seeds.contains(name)
    }

    /// Seed names in lexicographic order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.seeds.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// The seed count requested when this set was computed
    pub fn desired(&self) -> usize {
        self.desired
    }

    /// True when this set was computed from the same eligible membership and
    /// seed count request
    pub fn is_current_for(&self, topology: &ClusterTopology, desired: usize) -> bool {
        self.desired == desired && self.computed_from == topology.eligible_membership()
    }
}

/// Seeds already placed in one fault domain plus the candidates left in it
struct FaultDomainGroup<'a> {
    remaining: BTreeMap<&'a DomainPath, BTreeSet<&'a str>>,
    seeded: usize,
    seeded_by_ud: BTreeMap<&'a DomainPath, usize>,
}

impl<'a> FaultDomainGroup<'a> {
    fn new() -> Self {
        Self {
            remaining: BTreeMap::new(),
            seeded: 0,
            seeded_by_ud: BTreeMap::new(),
        }
    }

    fn remaining_len(&self) -> usize {
        self.remaining.values().map(BTreeSet::len).sum()
    }

    fn smallest_remaining(&self) -> Option<&'a str> {
        self.remaining.values().filter_map(|names| names.first().copied()).min()
    }

    fn record_seed(&mut self, upgrade_domain: &'a DomainPath) {
        self.seeded += 1;
        *self.seeded_by_ud.entry(upgrade_domain).or_insert(0) += 1;
    }

    /// Take the next candidate: least-seeded upgrade domain first, then the
    /// largest remaining group, then the smallest node name
    fn take(&mut self) -> Option<&'a str> {
        let seeded_by_ud = &self.seeded_by_ud;
        let upgrade_domain = self
            .remaining
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .min_by(|(ud_a, names_a), (ud_b, names_b)| {
                let seeded_a = seeded_by_ud.get(*ud_a).copied().unwrap_or(0);
                let seeded_b = seeded_by_ud.get(*ud_b).copied().unwrap_or(0);
                seeded_a
                    .cmp(&seeded_b)
                    .then(names_b.len().cmp(&names_a.len()))
                    .then(names_a.first().cmp(&names_b.first()))
            })
            .map(|(ud, _)| *ud)?;

        let name = self.remaining.get_mut(upgrade_domain)?.pop_first()?;
        self.record_seed(upgrade_domain);
        Some(name)
    }
}

/// Picks quorum-safe seed node sets
#[derive(Clone)]
pub struct SeedNodeSelector {
    config: SeedSelectionConfig,
    allow_single_node: bool,
    logger: Logger,
}

impl SeedNodeSelector {
    /// Create a new selector
    ///
    /// # Arguments
    /// * `config` - Desired seed count and selection strategy
    /// * `allow_single_node` - Accept a one-seed set for single-node topologies
    /// * `logger` - Logger instance
    pub fn new(config: SeedSelectionConfig, allow_single_node: bool, logger: Logger) -> Self {
        Self {
            config,
            allow_single_node,
            logger,
        }
    }

    pub fn config(&self) -> &SeedSelectionConfig {
        &self.config
    }

    /// Select a fresh seed set for the topology
    pub fn select(&self, topology: &ClusterTopology) -> ClusterResult<SeedNodeSet> {
        self.reselect(topology, None)
    }

    /// Reuse `current` when it was computed for the same eligible membership
    /// and request, otherwise run a re-selection pass seeded with it
    pub fn select_cached(
        &self,
        topology: &ClusterTopology,
        current: Option<&SeedNodeSet>,
    ) -> ClusterResult<SeedNodeSet> {
        if let Some(current) = current {
            if !self.config.is_manual() && current.is_current_for(topology, self.config.desired_seed_count) {
                debug!(self.logger, "Seed set unchanged, reusing cached selection";
                    "seeds" => current.len());
                return Ok(current.clone());
            }
        }
        self.reselect(topology, current)
    }

    /// Re-select seeds, keeping every current seed that is still eligible
    ///
    /// Strategy:
    /// 1. Compute the target count (clamped, quorum floor, rounded down to odd)
    /// 2. Keep current seeds still eligible; drop surplus from the most crowded
    ///    fault domain if the target shrank
    /// 3. Fill the rest round-robin across fault domains (fewest seeds first,
    ///    then largest remaining group, then smallest node name)
    pub fn reselect(
        &self,
        topology: &ClusterTopology,
        current: Option<&SeedNodeSet>,
    ) -> ClusterResult<SeedNodeSet> {
        if let SeedSelectionStrategy::Manual(names) = &self.config.strategy {
            return self.select_manual(topology, names);
        }

        let eligible: Vec<&NodeDescription> = topology.eligible_seed_nodes().collect();
        let target = self.target_seed_count(eligible.len())?;

        let mut kept: BTreeSet<&str> = BTreeSet::new();
        if let Some(current) = current {
            for name in current.names() {
                match topology.get(name) {
                    Some(node) if node.role().is_seed_eligible() => {
                        kept.insert(node.name());
                    }
                    _ => {
                        info!(self.logger, "Dropping seed that is no longer eligible"; "node" => name);
                    }
                }
            }
        }

        if kept.len() > target {
            Self::trim(topology, &mut kept, target);
        }

        let mut groups: BTreeMap<&DomainPath, FaultDomainGroup> = BTreeMap::new();
        for node in &eligible {
            let group = groups
                .entry(node.fault_domain())
                .or_insert_with(FaultDomainGroup::new);
            if kept.contains(node.name()) {
                group.record_seed(node.upgrade_domain());
            } else {
                group
                    .remaining
                    .entry(node.upgrade_domain())
                    .or_default()
                    .insert(node.name());
            }
        }

        let mut selected = kept;
        while selected.len() < target {
            let next_fd = groups
                .iter()
                .filter(|(_, group)| group.remaining_len() > 0)
                .min_by(|(_, a), (_, b)| {
                    a.seeded
                        .cmp(&b.seeded)
                        .then(b.remaining_len().cmp(&a.remaining_len()))
                        .then(a.smallest_remaining().cmp(&b.smallest_remaining()))
                })
                .map(|(fd, _)| *fd);

            let Some(fd) = next_fd else {
                break;
            };
            match groups.get_mut(fd).and_then(FaultDomainGroup::take) {
                Some(name) => {
                    selected.insert(name);
                }
                None => break,
            }
        }

        let seeds: BTreeSet<String> = selected.into_iter().map(str::to_string).collect();
        let fault_domains: BTreeSet<&DomainPath> = seeds
            .iter()
            .filter_map(|name| topology.get(name))
            .map(NodeDescription::fault_domain)
            .collect();

        info!(self.logger, "Seed nodes selected";
            "seeds" => ?seeds,
            "target" => target,
            "fault_domains" => fault_domains.len(),
            "eligible" => eligible.len()
        );

        Ok(SeedNodeSet {
            seeds,
            computed_from: topology.eligible_membership(),
            desired: self.config.desired_seed_count,
        })
    }

    /// Number of seeds to place given the eligible node count
    pub fn target_seed_count(&self, eligible: usize) -> ClusterResult<usize> {
        let desired = self.config.desired_seed_count;
        if desired == 0 {
            return Err(ClusterError::validation(
                "seed.desired_seed_count",
                "at least one seed node is required",
            ));
        }

        if eligible < MIN_SEED_QUORUM {
            if eligible == 1 && self.allow_single_node {
                return Ok(1);
            }
            return Err(ClusterError::InsufficientNodes {
                eligible,
                required: MIN_SEED_QUORUM,
            });
        }

        let mut target = desired.min(eligible);
        if target < MIN_SEED_QUORUM {
            warn!(self.logger, "Desired seed count below quorum, raising to minimum";
                "desired" => desired, "minimum" => MIN_SEED_QUORUM);
            target = MIN_SEED_QUORUM;
        }
        if target % 2 == 0 {
            target -= 1;
        }
        Ok(target)
    }

    fn select_manual(&self, topology: &ClusterTopology, names: &[String]) -> ClusterResult<SeedNodeSet> {
        let eligible = topology.eligible_membership();
        // Enforces the quorum floor for the topology as a whole
        self.target_seed_count(eligible.len())?;

        let mut seeds = BTreeSet::new();
        for name in names {
            if !eligible.contains(name) {
                return Err(ClusterError::validation(
                    format!("seed_nodes[{}]", name),
                    "pinned seed is not an eligible node of the topology",
                ));
            }
            seeds.insert(name.clone());
        }

        let single_node = eligible.len() == 1 && seeds.len() == 1;
        if !single_node && (seeds.len() < MIN_SEED_QUORUM || seeds.len() % 2 == 0) {
            return Err(ClusterError::validation(
                "seed_nodes",
                format!(
                    "{} pinned seed(s); a quorum needs an odd count of at least {}",
                    seeds.len(),
                    MIN_SEED_QUORUM
                ),
            ));
        }

        info!(self.logger, "Using manually pinned seed nodes"; "seeds" => ?seeds);
        Ok(SeedNodeSet {
            seeds,
            computed_from: eligible,
            desired: self.config.desired_seed_count,
        })
    }

    /// Drop surplus seeds from the most crowded fault domain (ties: largest name)
    fn trim(topology: &ClusterTopology, kept: &mut BTreeSet<&str>, target: usize) {
        while kept.len() > target {
            let mut per_fd: BTreeMap<&DomainPath, usize> = BTreeMap::new();
            let mut per_ud: BTreeMap<(&DomainPath, &DomainPath), usize> = BTreeMap::new();
            for name in kept.iter() {
                if let Some(node) = topology.get(name) {
                    *per_fd.entry(node.fault_domain()).or_insert(0) += 1;
                    *per_ud
                        .entry((node.fault_domain(), node.upgrade_domain()))
                        .or_insert(0) += 1;
                }
            }

            let crowding = |name: &str| -> (usize, usize) {
                topology
                    .get(name)
                    .map(|node| {
                        (
                            per_fd.get(node.fault_domain()).copied().unwrap_or(0),
                            per_ud
                                .get(&(node.fault_domain(), node.upgrade_domain()))
                                .copied()
                                .unwrap_or(0),
                        )
                    })
                    .unwrap_or((0, 0))
            };

            let victim = kept
                .iter()
                .copied()
                .max_by(|a, b| crowding(a).cmp(&crowding(b)).then(a.cmp(b)));
            match victim {
                Some(victim) => {
                    kept.remove(victim);
                }
                None => break,
            }
        }
    }
}
