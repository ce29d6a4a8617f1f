//! # Player Price Composer
//!
//! Layers player-specific multipliers on top of the engine's base price:
//!
//! 1. refined base (refinement upgrade) × silk-touch quality
//! 2. × scarcity window
//! 3. × barter × specialization (× logistics for batch sells)
//! 4. clamp to `[clamp_min, clamp_max] × base × window`
//! 5. × soil fatigue for crops
//!
//! Nothing here mutates the market.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{MarketConfig, PlayerSection};
use crate::engine::PricingEngine;
use crate::key::ItemKey;
use crate::tag::ItemTag;
use crate::upgrades::{self, PlayerContext, Upgrade};
use crate::windows::ScarcityWindowCalculator;

/// One stack offered for sale.
#[derive(Clone, Debug, PartialEq)]
pub struct SellItem {
    /// Item identity.
    pub key: ItemKey,
    /// Units in the stack.
    pub amount: i64,
    /// Dropped from a silk-touch break.
    pub silk_touch: bool,
    /// Soil fatigue of the crop's source block, `0.0` = fresh soil.
    pub fatigue: f64,
}

impl SellItem {
    /// A plain stack.
    #[must_use]
    pub const fn new(key: ItemKey, amount: i64) -> Self {
        Self {
            key,
            amount,
            silk_touch: false,
            fatigue: 0.0,
        }
    }

    /// Marks the stack as a silk-touch drop.
    #[must_use]
    pub const fn silk_touched(mut self) -> Self {
        self.silk_touch = true;
        self
    }

    /// Sets soil fatigue.
    #[must_use]
    pub const fn with_fatigue(mut self, fatigue: f64) -> Self {
        self.fatigue = fatigue;
        self
    }
}

/// Composes player-facing sell prices.
#[derive(Debug)]
pub struct PlayerPriceComposer {
    engine: Arc<PricingEngine>,
    windows: ScarcityWindowCalculator,
    refinement: HashMap<ItemKey, ItemKey>,
    player: PlayerSection,
}

impl PlayerPriceComposer {
    /// Creates a composer. Refinement keys go through the engine's
    /// normalizer; unparseable pairs are dropped.
    #[must_use]
    pub fn new(engine: Arc<PricingEngine>, config: &MarketConfig) -> Self {
        let refinement = config
            .refinement
            .iter()
            .filter_map(|(raw, refined)| Some((engine.normalize(raw)?, engine.normalize(refined)?)))
            .collect();
        Self {
            engine,
            windows: ScarcityWindowCalculator::new(config.windows.clone()),
            refinement,
            player: config.player.clone(),
        }
    }

    /// The engine underneath.
    #[must_use]
    pub fn engine(&self) -> &Arc<PricingEngine> {
        &self.engine
    }

    /// The scarcity window calculator.
    #[must_use]
    pub const fn windows(&self) -> &ScarcityWindowCalculator {
        &self.windows
    }

    /// Refined output for a raw item, if the refinement table maps it.
    #[must_use]
    pub fn refined_output(&self, key: &ItemKey) -> Option<&ItemKey> {
        self.refinement.get(key)
    }

    fn tag_of(&self, key: &ItemKey) -> ItemTag {
        self.engine
            .catalog()
            .current()
            .get(key)
            .map_or(ItemTag::Misc, |entry| entry.tag)
    }

    fn silk_multiplier(&self, item: &SellItem) -> f64 {
        if item.silk_touch {
            self.player.silk_touch_multiplier
        } else {
            1.0
        }
    }

    /// Soil fatigue multiplier in `[fatigue_min_multiplier, 1]` for crops,
    /// 1.0 for everything else.
    #[must_use]
    pub fn fatigue_multiplier(&self, item: &SellItem, tag: ItemTag) -> f64 {
        if tag != ItemTag::Crop || !item.fatigue.is_finite() {
            return 1.0;
        }
        (1.0 - item.fatigue).min(1.0).max(self.player.fatigue_min_multiplier)
    }

    /// Engine price adjusted for refinement and silk touch.
    ///
    /// The item must be sellable in its own right; refinement only swaps in
    /// the refined output's price when that price is positive.
    #[must_use]
    pub fn refined_base(&self, player: &dyn PlayerContext, item: &SellItem) -> f64 {
        let own = self.engine.base_price(&item.key);
        if own <= 0.0 {
            return 0.0;
        }
        let silk = self.silk_multiplier(item);
        let level = player.upgrade_level(Upgrade::Refinement);
        let (Some(fee), Some(output)) = (upgrades::refinement_fee(level), self.refined_output(&item.key))
        else {
            return own * silk;
        };
        let refined = self.engine.base_price(output);
        if refined <= 0.0 {
            return own * silk;
        }
        refined * (1.0 - fee) * silk
    }

    /// Unit sell price for `item`.
    ///
    /// Without a player this is the engine price with quality penalties.
    /// `distinct_types > 0` marks a batch sell and enables the logistics
    /// bonus.
    #[must_use]
    pub fn price_for(
        &self,
        player: Option<&dyn PlayerContext>,
        item: &SellItem,
        distinct_types: u32,
    ) -> f64 {
        let tag = self.tag_of(&item.key);
        let Some(player) = player else {
            let base = self.engine.base_price(&item.key);
            if base <= 0.0 {
                return 0.0;
            }
            return base * self.silk_multiplier(item) * self.fatigue_multiplier(item, tag);
        };

        let base = self.refined_base(player, item);
        if base <= 0.0 {
            return 0.0;
        }
        let window = self.windows.multiplier(player, tag);
        let anchor = base * window;

        let specialization = player.specialization();
        let mastery = specialization.map_or(0, |s| player.upgrade_level(Upgrade::Mastery(s)));
        let mut price = anchor
            * upgrades::barter_multiplier(player.upgrade_level(Upgrade::Barter))
            * upgrades::specialization_multiplier(specialization, mastery, tag.domain());
        if distinct_types > 0 {
            price *= upgrades::logistics_multiplier(
                player.upgrade_level(Upgrade::Logistics),
                distinct_types,
            );
        }

        let clamped = price
            .max(anchor * self.player.clamp_min)
            .min(anchor * self.player.clamp_max);
        let final_price = clamped * self.fatigue_multiplier(item, tag);
        if final_price.is_finite() {
            final_price.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, PriceCatalog, PriceTable};
    use crate::clock::ManualClock;
    use crate::config::MarketSection;
    use crate::key::StandardNormalizer;
    use crate::ledger::MarketLedger;
    use crate::recipes::RecipeIndex;
    use crate::upgrades::{PlayerSnapshot, Specialization};

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    fn composer() -> PlayerPriceComposer {
        let defaults = MarketSection::default();
        let entries = [
            ("RAW_IRON", 10.0, ItemTag::Ore),
            ("IRON_INGOT", 20.0, ItemTag::Ore),
            ("WHEAT", 4.0, ItemTag::Crop),
            ("ROTTEN_FLESH", 2.0, ItemTag::Mob),
            ("STONE", 1.0, ItemTag::Build),
        ]
        .into_iter()
        .map(|(k, base, tag)| CatalogEntry::new(key(k), base, tag, &defaults));
        let engine = PricingEngine::new(
            Arc::new(PriceCatalog::new(PriceTable::new(entries))),
            Arc::new(MarketLedger::new()),
            Arc::new(RecipeIndex::new()),
            Arc::new(ManualClock::new(0)),
            Arc::new(StandardNormalizer::new()),
            &defaults,
        );
        PlayerPriceComposer::new(Arc::new(engine), &MarketConfig::default())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_no_player_uses_quality_only() {
        let composer = composer();
        let item = SellItem::new(key("WHEAT"), 1).with_fatigue(0.5);
        assert_close(composer.price_for(None, &item, 0), 2.0);
        let silk = SellItem::new(key("STONE"), 1).silk_touched();
        assert_close(composer.price_for(None, &silk, 0), 0.8);
    }

    #[test]
    fn test_plain_player_gets_base() {
        let composer = composer();
        let player = PlayerSnapshot::new();
        assert_close(composer.price_for(Some(&player), &SellItem::new(key("STONE"), 1), 0), 1.0);
        assert!(composer.price_for(Some(&player), &SellItem::new(key("DIRT"), 1), 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_refinement_uses_output_price_minus_fee() {
        let composer = composer();
        let player = PlayerSnapshot::new().with_upgrade(Upgrade::Refinement, 2);
        let item = SellItem::new(key("RAW_IRON"), 1);
        assert_close(composer.refined_base(&player, &item), 20.0 * 0.88);
        let silk = item.clone().silk_touched();
        assert_close(composer.refined_base(&player, &silk), 20.0 * 0.88 * 0.8);
        // Items without a mapping are untouched.
        assert_close(composer.refined_base(&player, &SellItem::new(key("STONE"), 1)), 1.0);
    }

    #[test]
    fn test_refinement_tier_from_owned_unlocks() {
        let composer = composer();
        let player = PlayerSnapshot::new()
            .with_upgrade_id("refine_autosmelt_1", 1)
            .with_upgrade_id("refine_autosmelt_2", 1)
            .with_upgrade_id("refine_autosmelt_3", 1);
        let item = SellItem::new(key("RAW_IRON"), 1);
        assert_close(composer.refined_base(&player, &item), 20.0 * 0.91);
    }

    #[test]
    fn test_depth_window_with_mastery_and_barter() {
        let composer = composer();
        let player = PlayerSnapshot::new()
            .at(6_000, false, 10)
            .with_specialization(Specialization::Miner)
            .with_upgrade(Upgrade::Mastery(Specialization::Miner), 5)
            .with_upgrade(Upgrade::Barter, 3);
        let price = composer.price_for(Some(&player), &SellItem::new(key("IRON_INGOT"), 1), 0);
        let expected = 20.0 * 1.30 * upgrades::barter_multiplier(3) * 1.15;
        assert_close(price, expected);
    }

    #[test]
    fn test_mismatched_specialization_penalizes() {
        let composer = composer();
        let player = PlayerSnapshot::new()
            .with_specialization(Specialization::Farmer)
            .with_upgrade(Upgrade::Mastery(Specialization::Farmer), 10);
        let price = composer.price_for(Some(&player), &SellItem::new(key("ROTTEN_FLESH"), 1), 0);
        assert_close(price, 2.0 * 0.85);
    }

    #[test]
    fn test_logistics_only_for_batches() {
        let composer = composer();
        let player = PlayerSnapshot::new().with_upgrade(Upgrade::Logistics, 5);
        let item = SellItem::new(key("STONE"), 1);
        assert_close(composer.price_for(Some(&player), &item, 0), 1.0);
        assert_close(composer.price_for(Some(&player), &item, 4), 1.10);
    }

    #[test]
    fn test_fatigue_applies_after_clamp() {
        let composer = composer();
        let player = PlayerSnapshot::new();
        let exhausted = SellItem::new(key("WHEAT"), 1).with_fatigue(0.99);
        assert_close(composer.price_for(Some(&player), &exhausted, 0), 4.0 * 0.25);
        let stone = SellItem::new(key("STONE"), 1).with_fatigue(0.99);
        assert_close(composer.price_for(Some(&player), &stone, 0), 1.0);
    }
}
