//! Contextual scarcity windows: temporary bonuses for selling goods while
//! they are harder to obtain.

use crate::config::WindowConfig;
use crate::tag::ItemTag;
use crate::upgrades::PlayerContext;

/// Ticks in one in-game day.
const DAY_TICKS: u64 = 24_000;

/// Stateless multiplier source. Results are never cached since weather,
/// time and position change constantly.
#[derive(Clone, Debug, Default)]
pub struct ScarcityWindowCalculator {
    config: WindowConfig,
}

impl ScarcityWindowCalculator {
    /// Creates a calculator from validated window settings.
    #[must_use]
    pub const fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    /// Window settings in use.
    #[must_use]
    pub const fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// True when `world_time` falls in the night window.
    #[must_use]
    pub fn is_night(&self, world_time: u64) -> bool {
        (self.config.night_start..=self.config.night_end).contains(&(world_time % DAY_TICKS))
    }

    /// Combined window factor for selling an item with `tag`. Always `>= 1.0`.
    #[must_use]
    pub fn multiplier(&self, player: &dyn PlayerContext, tag: ItemTag) -> f64 {
        let mut multiplier = 1.0;
        match tag {
            ItemTag::Mob if self.is_night(player.world_time()) => {
                multiplier *= self.config.night_multiplier;
            }
            ItemTag::Crop if player.is_raining() => {
                multiplier *= self.config.rain_multiplier;
            }
            ItemTag::Ore if player.block_y() <= self.config.depth_y => {
                multiplier *= self.config.depth_multiplier;
            }
            _ => {}
        }
        multiplier
    }
}
