//! # Player Upgrades
//!
//! Purchased upgrades and the multipliers they grant. Upgrade ownership and
//! world state come from the host through [`PlayerContext`]; this module only
//! turns levels into numbers.

use std::collections::HashMap;

use crate::tag::Domain;

/// Refinement fee by level 1..=5.
const REFINEMENT_FEES: [f64; 5] = [0.15, 0.12, 0.09, 0.07, 0.05];
/// Logistics bonus at full diversity by level 1..=5.
const LOGISTICS_MAX_BONUS: [f64; 5] = [0.12, 0.14, 0.16, 0.18, 0.20];
/// Distinct item types needed for the full logistics bonus by level 1..=5.
const LOGISTICS_TARGET_TYPES: [u32; 5] = [12, 11, 10, 9, 8];

/// A player's chosen specialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Specialization {
    /// Ores and metals.
    Miner,
    /// Crops.
    Farmer,
    /// Mob drops.
    Hunter,
}

impl Specialization {
    /// Parses a choice name (`miner`, `FARMER`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "MINER" => Some(Self::Miner),
            "FARMER" => Some(Self::Farmer),
            "HUNTER" => Some(Self::Hunter),
            _ => None,
        }
    }

    /// Item domain this specialization favors.
    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::Miner => Domain::Miner,
            Self::Farmer => Domain::Farmer,
            Self::Hunter => Domain::Hunter,
        }
    }
}

/// Upgrades that affect selling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Upgrade {
    /// Flat sell multiplier with diminishing returns.
    Barter,
    /// Diversity bonus for batch sells.
    Logistics,
    /// Sell raw ores at their refined price minus a fee.
    Refinement,
    /// Mastery of one specialization.
    Mastery(Specialization),
}

impl Upgrade {
    /// Maps a host upgrade id to an upgrade. Unknown ids yield `None`,
    /// which callers treat as level 0.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        match id.as_str() {
            "barter" => Some(Self::Barter),
            "logistics" => Some(Self::Logistics),
            "refinement" => Some(Self::Refinement),
            "spec_miner" => Some(Self::Mastery(Specialization::Miner)),
            "spec_farmer" => Some(Self::Mastery(Specialization::Farmer)),
            "spec_hunter" => Some(Self::Mastery(Specialization::Hunter)),
            other if other.starts_with("refine_") => Some(Self::Refinement),
            _ => None,
        }
    }

    /// Refinement tier unlocked by a `refine_*` id: the trailing number
    /// (`refine_autosmelt_3` is tier 3), or 1 when there is none. Other ids
    /// yield `None`.
    #[must_use]
    pub fn refinement_tier(id: &str) -> Option<u32> {
        let id = id.trim().to_ascii_lowercase();
        let rest = id.strip_prefix("refine_")?;
        let tier = rest
            .rsplit('_')
            .next()
            .and_then(|suffix| suffix.parse::<u32>().ok())
            .unwrap_or(1);
        Some(tier.max(1))
    }
}

/// Read access to the selling player's upgrades and surroundings.
pub trait PlayerContext {
    /// Owned level of an upgrade; 0 when not owned.
    fn upgrade_level(&self, upgrade: Upgrade) -> u32;

    /// Chosen specialization, if any.
    fn specialization(&self) -> Option<Specialization>;

    /// Time of day in world ticks.
    fn world_time(&self) -> u64;

    /// Whether it is raining or storming where the player stands.
    fn is_raining(&self) -> bool;

    /// Player's block Y coordinate.
    fn block_y(&self) -> i32;

    /// Level for a host upgrade id; unknown ids are level 0. Refinement
    /// unlocks read as 1 when the owned tier reaches theirs.
    fn level_of(&self, id: &str) -> u32 {
        if let Some(tier) = Upgrade::refinement_tier(id) {
            return u32::from(self.upgrade_level(Upgrade::Refinement) >= tier);
        }
        Upgrade::from_id(id).map_or(0, |upgrade| self.upgrade_level(upgrade))
    }
}

/// Plain-data [`PlayerContext`].
#[derive(Clone, Debug, Default)]
pub struct PlayerSnapshot {
    /// Owned upgrade levels.
    pub levels: HashMap<Upgrade, u32>,
    /// Chosen specialization.
    pub specialization: Option<Specialization>,
    /// Time of day in world ticks.
    pub world_time: u64,
    /// Raining or storming.
    pub raining: bool,
    /// Block Y coordinate.
    pub block_y: i32,
}

impl PlayerSnapshot {
    /// A player with no upgrades at noon, in clear weather, on the surface.
    #[must_use]
    pub fn new() -> Self {
        Self {
            world_time: 6_000,
            block_y: 64,
            ..Self::default()
        }
    }

    /// Sets an upgrade level.
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: Upgrade, level: u32) -> Self {
        self.levels.insert(upgrade, level);
        self
    }

    /// Sets an upgrade level by host id. Unknown ids are ignored.
    ///
    /// `refine_*` ids are unlocks: owning one at any level raises the
    /// refinement tier to the id's tier, keeping the highest owned.
    #[must_use]
    pub fn with_upgrade_id(mut self, id: &str, level: u32) -> Self {
        if let Some(tier) = Upgrade::refinement_tier(id) {
            if level > 0 {
                let owned = self.levels.entry(Upgrade::Refinement).or_insert(0);
                *owned = (*owned).max(tier);
            }
            return self;
        }
        match Upgrade::from_id(id) {
            Some(upgrade) => self.with_upgrade(upgrade, level),
            None => self,
        }
    }

    /// Sets the specialization.
    #[must_use]
    pub const fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specialization = Some(specialization);
        self
    }

    /// Sets world time, weather and depth.
    #[must_use]
    pub const fn at(mut self, world_time: u64, raining: bool, block_y: i32) -> Self {
        self.world_time = world_time;
        self.raining = raining;
        self.block_y = block_y;
        self
    }
}

impl PlayerContext for PlayerSnapshot {
    fn upgrade_level(&self, upgrade: Upgrade) -> u32 {
        self.levels.get(&upgrade).copied().unwrap_or(0)
    }

    fn specialization(&self) -> Option<Specialization> {
        self.specialization
    }

    fn world_time(&self) -> u64 {
        self.world_time
    }

    fn is_raining(&self) -> bool {
        self.raining
    }

    fn block_y(&self) -> i32 {
        self.block_y
    }
}

/// Index into the 1..=5 level tables; levels above 5 use the top row.
#[inline]
fn tier(level: u32) -> usize {
    level.clamp(1, 5) as usize - 1
}

/// `1 + 0.6 × (1 − e^(−0.18 × level))`.
#[must_use]
pub fn barter_multiplier(level: u32) -> f64 {
    1.0 + 0.6 * (1.0 - (-0.18 * f64::from(level)).exp())
}

/// `1 + max_bonus × min(distinct / target, 1)`; 1.0 without the upgrade or
/// without any distinct types.
#[must_use]
pub fn logistics_multiplier(level: u32, distinct_types: u32) -> f64 {
    if level == 0 || distinct_types == 0 {
        return 1.0;
    }
    let tier = tier(level);
    let diversity =
        (f64::from(distinct_types) / f64::from(LOGISTICS_TARGET_TYPES[tier])).min(1.0);
    1.0 + LOGISTICS_MAX_BONUS[tier] * diversity
}

/// Fee taken by the refinement upgrade, or `None` at level 0.
#[must_use]
pub fn refinement_fee(level: u32) -> Option<f64> {
    (level > 0).then(|| REFINEMENT_FEES[tier(level)])
}

/// Specialization multiplier for an item in `domain`.
///
/// Matching domain earns `+3%` per level, a different specialized domain
/// costs `1.5%` per level, unrelated items are unaffected.
#[must_use]
pub fn specialization_multiplier(
    specialization: Option<Specialization>,
    level: u32,
    domain: Domain,
) -> f64 {
    let Some(specialization) = specialization else {
        return 1.0;
    };
    if level == 0 || domain == Domain::None {
        return 1.0;
    }
    if specialization.domain() == domain {
        1.0 + 0.03 * f64::from(level)
    } else {
        1.0 - 0.015 * f64::from(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_ids() {
        assert_eq!(Upgrade::from_id("barter"), Some(Upgrade::Barter));
        assert_eq!(Upgrade::from_id("refine_autosmelt_3"), Some(Upgrade::Refinement));
        assert_eq!(
            Upgrade::from_id("SPEC_HUNTER"),
            Some(Upgrade::Mastery(Specialization::Hunter))
        );
        assert_eq!(Upgrade::from_id("vendor_tier_2"), None);
    }

    #[test]
    fn test_refinement_unlocks_keep_highest_tier() {
        assert_eq!(Upgrade::refinement_tier("refine_autosmelt_4"), Some(4));
        assert_eq!(Upgrade::refinement_tier("REFINE_AUTOSMELT"), Some(1));
        assert_eq!(Upgrade::refinement_tier("refinement"), None);

        let player = PlayerSnapshot::new()
            .with_upgrade_id("refine_autosmelt_1", 1)
            .with_upgrade_id("refine_autosmelt_3", 1)
            .with_upgrade_id("refine_autosmelt_2", 1)
            .with_upgrade_id("refine_autosmelt_5", 0);
        assert_eq!(player.upgrade_level(Upgrade::Refinement), 3);
        assert_eq!(player.level_of("refine_autosmelt_2"), 1);
        assert_eq!(player.level_of("refine_autosmelt_3"), 1);
        assert_eq!(player.level_of("refine_autosmelt_4"), 0);
        assert_eq!(refinement_fee(player.upgrade_level(Upgrade::Refinement)), Some(0.09));
    }

    #[test]
    fn test_unknown_id_is_level_zero() {
        let player = PlayerSnapshot::new()
            .with_upgrade(Upgrade::Barter, 4)
            .with_upgrade_id("teleport", 9);
        assert_eq!(player.level_of("barter"), 4);
        assert_eq!(player.level_of("teleport"), 0);
        assert_eq!(player.levels.len(), 1);
    }

    #[test]
    fn test_barter_curve() {
        assert!((barter_multiplier(0) - 1.0).abs() < f64::EPSILON);
        let expected = 1.0 + 0.6 * (1.0 - (-1.8_f64).exp());
        assert!((barter_multiplier(10) - expected).abs() < 1e-12);
        assert!(barter_multiplier(1_000) < 1.6 + 1e-12);
    }

    #[test]
    fn test_logistics_tiers() {
        assert!((logistics_multiplier(0, 20) - 1.0).abs() < f64::EPSILON);
        assert!((logistics_multiplier(3, 0) - 1.0).abs() < f64::EPSILON);
        assert!((logistics_multiplier(1, 6) - 1.06).abs() < 1e-12);
        assert!((logistics_multiplier(5, 8) - 1.20).abs() < 1e-12);
        assert!((logistics_multiplier(9, 40) - 1.20).abs() < 1e-12);
    }

    #[test]
    fn test_refinement_fees() {
        assert_eq!(refinement_fee(0), None);
        assert_eq!(refinement_fee(1), Some(0.15));
        assert_eq!(refinement_fee(4), Some(0.07));
        assert_eq!(refinement_fee(12), Some(0.05));
    }

    #[test]
    fn test_specialization() {
        let miner = Some(Specialization::Miner);
        assert!((specialization_multiplier(miner, 10, Domain::Miner) - 1.3).abs() < 1e-12);
        assert!((specialization_multiplier(miner, 10, Domain::Farmer) - 0.85).abs() < 1e-12);
        assert!((specialization_multiplier(miner, 10, Domain::None) - 1.0).abs() < f64::EPSILON);
        assert!((specialization_multiplier(None, 10, Domain::Miner) - 1.0).abs() < f64::EPSILON);
        assert_eq!(Specialization::from_name(" farmer "), Some(Specialization::Farmer));
    }
}
