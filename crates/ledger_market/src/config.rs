//! # Market Configuration
//!
//! Tuning knobs loaded once from TOML. Every field has a default so a partial
//! file (or none at all) yields a working market.
//!
//! ```toml
//! [market]
//! half_life_hours = 72.0
//! depletion_baseline = 50000.0
//! scarcity_rho = 0.25
//!
//! [mob]
//! half_life_hours = 48.0
//!
//! [windows]
//! night_multiplier = 1.25
//! depth_y = 32
//!
//! [refinement]
//! RAW_IRON = "IRON_INGOT"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{MarketError, MarketResult};

/// Complete market configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Item market decay and scarcity defaults.
    pub market: MarketSection,
    /// Mob payout decay.
    pub mob: MobSection,
    /// Contextual scarcity windows.
    pub windows: WindowConfig,
    /// Player-facing multipliers.
    pub player: PlayerSection,
    /// Raw item key -> refined output key.
    pub refinement: RefinementTable,
}

/// `[market]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    /// Half-life of the sold accumulator, in hours.
    pub half_life_hours: f64,
    /// Default scarcity baseline for entries that do not set one.
    pub depletion_baseline: f64,
    /// Default scarcity markup for entries that do not set one.
    pub scarcity_rho: f64,
    /// Longest stretch of time a single decay step covers.
    pub max_decay_hours: f64,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            half_life_hours: 72.0,
            depletion_baseline: 50_000.0,
            scarcity_rho: 0.25,
            max_decay_hours: 168.0,
        }
    }
}

/// `[mob]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MobSection {
    /// Half-life of the kill accumulator, in hours.
    pub half_life_hours: f64,
}

impl Default for MobSection {
    fn default() -> Self {
        Self {
            half_life_hours: 48.0,
        }
    }
}

/// `[windows]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Bonus for mob drops at night.
    pub night_multiplier: f64,
    /// Bonus for crops while it rains.
    pub rain_multiplier: f64,
    /// Bonus for ores while the seller is deep underground.
    pub depth_multiplier: f64,
    /// Block Y at or below which the depth bonus applies.
    pub depth_y: i32,
    /// First world tick counted as night.
    pub night_start: u64,
    /// Last world tick counted as night.
    pub night_end: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            night_multiplier: 1.25,
            rain_multiplier: 1.20,
            depth_multiplier: 1.30,
            depth_y: 32,
            night_start: 13_000,
            night_end: 23_000,
        }
    }
}

/// `[player]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlayerSection {
    /// Multiplier for silk-touch-marked drops.
    pub silk_touch_multiplier: f64,
    /// Lowest soil fatigue multiplier a crop can carry.
    pub fatigue_min_multiplier: f64,
    /// Lower bound of the final price relative to the market anchor.
    pub clamp_min: f64,
    /// Upper bound of the final price relative to the market anchor.
    pub clamp_max: f64,
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            silk_touch_multiplier: 0.80,
            fatigue_min_multiplier: 0.25,
            clamp_min: 0.2,
            clamp_max: 5.0,
        }
    }
}

/// Raw material -> refined output mapping used by the refinement upgrade.
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct RefinementTable(BTreeMap<String, String>);

impl RefinementTable {
    /// Builds a table from explicit pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(raw, refined)| (raw.to_string(), refined.to_string()))
                .collect(),
        )
    }

    /// Iterates raw -> refined pairs as written in the config.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(raw, refined)| (raw.as_str(), refined.as_str()))
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no mappings are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RefinementTable {
    fn default() -> Self {
        Self::from_pairs([
            ("IRON_ORE", "IRON_INGOT"),
            ("DEEPSLATE_IRON_ORE", "IRON_INGOT"),
            ("RAW_IRON", "IRON_INGOT"),
            ("GOLD_ORE", "GOLD_INGOT"),
            ("DEEPSLATE_GOLD_ORE", "GOLD_INGOT"),
            ("NETHER_GOLD_ORE", "GOLD_INGOT"),
            ("RAW_GOLD", "GOLD_INGOT"),
            ("COPPER_ORE", "COPPER_INGOT"),
            ("DEEPSLATE_COPPER_ORE", "COPPER_INGOT"),
            ("RAW_COPPER", "COPPER_INGOT"),
            ("ANCIENT_DEBRIS", "NETHERITE_SCRAP"),
        ])
    }
}

impl MarketConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or a value is out of range.
    pub fn from_toml_str(source: &str) -> MarketResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or fails validation.
    pub fn from_toml_file(path: impl AsRef<Path>) -> MarketResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks every divisor and multiplier bound.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidConfig` naming the first bad value.
    pub fn validate(&self) -> MarketResult<()> {
        positive("market.half_life_hours", self.market.half_life_hours)?;
        positive("market.depletion_baseline", self.market.depletion_baseline)?;
        positive("market.max_decay_hours", self.market.max_decay_hours)?;
        positive("mob.half_life_hours", self.mob.half_life_hours)?;
        if !self.market.scarcity_rho.is_finite() || self.market.scarcity_rho < 0.0 {
            return Err(MarketError::InvalidConfig(format!(
                "market.scarcity_rho must be >= 0, got {}",
                self.market.scarcity_rho
            )));
        }
        for (name, value) in [
            ("windows.night_multiplier", self.windows.night_multiplier),
            ("windows.rain_multiplier", self.windows.rain_multiplier),
            ("windows.depth_multiplier", self.windows.depth_multiplier),
        ] {
            if !value.is_finite() || value < 1.0 {
                return Err(MarketError::InvalidConfig(format!(
                    "{name} must be >= 1.0, got {value}"
                )));
            }
        }
        if self.windows.night_start > self.windows.night_end {
            return Err(MarketError::InvalidConfig(
                "windows.night_start must not exceed windows.night_end".to_string(),
            ));
        }
        let player = &self.player;
        positive("player.silk_touch_multiplier", player.silk_touch_multiplier)?;
        if !(0.0..=1.0).contains(&player.fatigue_min_multiplier) {
            return Err(MarketError::InvalidConfig(format!(
                "player.fatigue_min_multiplier must be in [0, 1], got {}",
                player.fatigue_min_multiplier
            )));
        }
        positive("player.clamp_min", player.clamp_min)?;
        if !player.clamp_max.is_finite() || player.clamp_max < player.clamp_min {
            return Err(MarketError::InvalidConfig(
                "player.clamp_max must be >= player.clamp_min".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> MarketResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MarketError::InvalidConfig(format!("{name} must be > 0, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = MarketConfig::from_toml_str("").unwrap();
        assert!((config.market.half_life_hours - 72.0).abs() < f64::EPSILON);
        assert!((config.mob.half_life_hours - 48.0).abs() < f64::EPSILON);
        assert_eq!(config.windows.depth_y, 32);
        assert!(!config.refinement.is_empty());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = MarketConfig::from_toml_str(
            r#"
            [market]
            half_life_hours = 24.0

            [windows]
            depth_y = 0
            "#,
        )
        .unwrap();
        assert!((config.market.half_life_hours - 24.0).abs() < f64::EPSILON);
        assert!((config.market.scarcity_rho - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.windows.depth_y, 0);
        assert!((config.windows.rain_multiplier - 1.20).abs() < f64::EPSILON);
    }

    #[test]
    fn test_refinement_table_replaces_defaults() {
        let config = MarketConfig::from_toml_str(
            r#"
            [refinement]
            RAW_TIN = "TIN_INGOT"
            "#,
        )
        .unwrap();
        assert_eq!(config.refinement.len(), 1);
        assert_eq!(config.refinement.iter().next(), Some(("RAW_TIN", "TIN_INGOT")));
    }

    #[test]
    fn test_rejects_zero_half_life() {
        let result = MarketConfig::from_toml_str("[market]\nhalf_life_hours = 0.0\n");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_window_penalty() {
        let result = MarketConfig::from_toml_str("[windows]\nrain_multiplier = 0.9\n");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = MarketConfig::from_toml_str("[market\nhalf_life_hours = ");
        assert!(matches!(result, Err(MarketError::Toml(_))));
    }
}
