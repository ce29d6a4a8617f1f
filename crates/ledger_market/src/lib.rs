//! # Ledger Market
//!
//! Dynamic pricing for a game-server economy: static catalog prices become
//! live sell values that react to supply, scarcity and crafting cost.
//!
//! ## Design Principles
//!
//! 1. **Prices never fail** - missing or broken data prices at 0 and logs
//! 2. **Explicit handles** - catalog, ledger, recipes and clock are passed in, no globals
//! 3. **Versioned cache** - every ledger mutation or reload invalidates memoized prices
//! 4. **Traceless previews** - projections snapshot and restore the market exactly
//! 5. **External configuration** - all tuning lives in TOML files
//!
//! ## Thread Safety
//!
//! All shared state sits behind `parking_lot` locks or atomics. One game
//! context mutates; a background task may read the ledger for persistence
//! at any time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_market::{Market, MarketConfig, PriceTable, RecipeIndex, SellItem};
//!
//! let config = MarketConfig::from_toml_file("data/market.toml")?;
//! let normalizer = Arc::new(StandardNormalizer::new());
//! let table = PriceTable::from_toml_file("data/prices.toml", &config.market, normalizer.as_ref())?;
//! let recipes = RecipeIndex::from_toml_file("data/recipes.toml", normalizer.as_ref())?;
//!
//! let market = Market::new(config, table, recipes, Arc::new(SystemClock), normalizer);
//! let paid = market.sell(Some(&player), &SellItem::new(diamond, 16), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arbitrage;
pub mod catalog;
pub mod clock;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod ledger;
pub mod market;
pub mod mobs;
pub mod recipes;
pub mod storage;
pub mod tag;
pub mod upgrades;
pub mod windows;

pub use arbitrage::{AntiArbitrageResolver, CRAFT_VALUE_RATIO};
pub use catalog::{CatalogEntry, Coverage, PriceCatalog, PriceTable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::{PlayerPriceComposer, SellItem};
pub use config::{MarketConfig, MarketSection, MobSection, PlayerSection, RefinementTable, WindowConfig};
pub use engine::{MarketSnapshot, PricingEngine};
pub use error::{MarketError, MarketResult};
pub use key::{ItemKey, KeyNormalizer, StandardNormalizer};
pub use ledger::{DecayPolicy, LedgerEntry, MarketLedger, MobEntry};
pub use market::Market;
pub use mobs::MobPayouts;
pub use recipes::{Recipe, RecipeId, RecipeIndex, RecipeItem};
pub use storage::{LedgerStore, LoadReport, LoadSource, SaveReport};
pub use tag::{Domain, ItemTag};
pub use upgrades::{PlayerContext, PlayerSnapshot, Specialization, Upgrade};
pub use windows::ScarcityWindowCalculator;
