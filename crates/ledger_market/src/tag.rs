//! # Item Tags
//!
//! Closed set of market categories. Tags drive three decisions:
//! anti-arbitrage capping (infrastructure), scarcity windows (ore, crop, mob)
//! and specialization domains. Matching is exhaustive so a new category
//! cannot silently fall through any of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market category of a catalog entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemTag {
    /// Ores, raw metals, ingots and gems.
    Ore,
    /// Farmed crops and plants.
    Crop,
    /// Mob drops and entity payouts.
    Mob,
    /// Crafted utility blocks (hoppers, furnaces, rails).
    Infra,
    /// Crafted redstone components.
    RedstoneInfra,
    /// Storage blocks.
    Container,
    /// Common building blocks.
    Build,
    /// Common natural blocks.
    Natural,
    /// Enchanted or otherwise unique items.
    Enchanted,
    /// Never sold.
    Unsellable,
    /// Anything else.
    #[default]
    Misc,
}

/// Player specialization domain an item belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Mining goods.
    Miner,
    /// Farming goods.
    Farmer,
    /// Hunting goods.
    Hunter,
    /// Not tied to a specialization.
    None,
}

impl ItemTag {
    /// Parses a tag name, accepting the price-band spellings
    /// (`ORE_RARE`, `FARM_COMMON`, `UTILITY_INFRA`, ...). Unknown names map
    /// to [`ItemTag::Misc`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "ORE" | "ORE_COMMON" | "ORE_MID" | "ORE_RARE" | "NETHER_RARE" | "END_RARE" => Self::Ore,
            "CROP" | "FARM_COMMON" | "FARM_VALUABLE" => Self::Crop,
            "MOB" | "MOB_COMMON" | "MOB_VALUABLE" => Self::Mob,
            "INFRA" | "UTILITY_INFRA" => Self::Infra,
            "REDSTONE_INFRA" => Self::RedstoneInfra,
            "CONTAINER" => Self::Container,
            "BUILD" | "COMMON_BUILD" => Self::Build,
            "NATURAL" | "COMMON_NATURAL" | "TRASH_COMMON" => Self::Natural,
            "ENCHANTED" => Self::Enchanted,
            "UNSELLABLE" => Self::Unsellable,
            _ => Self::Misc,
        }
    }

    /// Canonical name used when writing catalogs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ore => "ORE",
            Self::Crop => "CROP",
            Self::Mob => "MOB",
            Self::Infra => "INFRA",
            Self::RedstoneInfra => "REDSTONE_INFRA",
            Self::Container => "CONTAINER",
            Self::Build => "BUILD",
            Self::Natural => "NATURAL",
            Self::Enchanted => "ENCHANTED",
            Self::Unsellable => "UNSELLABLE",
            Self::Misc => "MISC",
        }
    }

    /// Crafted items whose price is capped by their ingredient value.
    #[inline]
    #[must_use]
    pub const fn is_infrastructure(self) -> bool {
        matches!(self, Self::Infra | Self::RedstoneInfra)
    }

    /// Specialization domain for this tag.
    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::Ore => Domain::Miner,
            Self::Crop => Domain::Farmer,
            Self::Mob => Domain::Hunter,
            Self::Infra
            | Self::RedstoneInfra
            | Self::Container
            | Self::Build
            | Self::Natural
            | Self::Enchanted
            | Self::Unsellable
            | Self::Misc => Domain::None,
        }
    }
}

impl From<String> for ItemTag {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<ItemTag> for String {
    fn from(tag: ItemTag) -> Self {
        tag.name().to_string()
    }
}

impl fmt::Display for ItemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
