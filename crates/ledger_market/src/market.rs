//! # Market Facade
//!
//! The single entry point the host server talks to. Everything the game
//! needs (price lookups, sells, previews, mob payouts, reloads and
//! persistence) goes through [`Market`].
//!
//! ## The Sell Path
//!
//! ```text
//! host ──> Market::sell(player, item, distinct_types)
//!              │
//!              ├──> PlayerPriceComposer::price_for   (refinement, windows,
//!              │         │                            upgrades, fatigue)
//!              │         └──> PricingEngine::base_price  (cached by version)
//!              │
//!              └──> PricingEngine::apply_sale  (ledger mutation, version bump)
//! ```
//!
//! ## Thread Safety
//!
//! `Market` is `Send + Sync`. Mutations are expected from one game context;
//! persistence may run concurrently from a background task.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let market = Market::new(config, table, recipes, Arc::new(SystemClock), normalizer);
//! market.load_ledger(&store)?;
//!
//! let earned = market.sell(Some(&player), &SellItem::new(diamond, 16), 1);
//! let preview = market.project_batch_value(&inventory, &quantities);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{Coverage, PriceCatalog, PriceTable};
use crate::clock::Clock;
use crate::composer::{PlayerPriceComposer, SellItem};
use crate::config::MarketConfig;
use crate::engine::{MarketSnapshot, PricingEngine};
use crate::error::MarketResult;
use crate::key::{ItemKey, KeyNormalizer};
use crate::ledger::MarketLedger;
use crate::mobs::MobPayouts;
use crate::recipes::RecipeIndex;
use crate::storage::{LedgerStore, LoadReport, SaveReport};
use crate::upgrades::PlayerContext;

/// Puts the market back the way it was when dropped.
struct RestoreGuard<'a> {
    engine: &'a PricingEngine,
    snapshot: MarketSnapshot,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.engine.restore(&self.snapshot);
    }
}

/// The market.
#[derive(Debug)]
pub struct Market {
    config: MarketConfig,
    engine: Arc<PricingEngine>,
    composer: PlayerPriceComposer,
    mobs: MobPayouts,
}

impl Market {
    /// Builds a market over a fresh ledger.
    #[must_use]
    pub fn new(
        config: MarketConfig,
        table: PriceTable,
        recipes: RecipeIndex,
        clock: Arc<dyn Clock>,
        normalizer: Arc<dyn KeyNormalizer>,
    ) -> Self {
        let catalog = Arc::new(PriceCatalog::new(table));
        let ledger = Arc::new(MarketLedger::new());
        let engine = Arc::new(PricingEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::new(recipes),
            Arc::clone(&clock),
            normalizer,
            &config.market,
        ));
        let composer = PlayerPriceComposer::new(Arc::clone(&engine), &config);
        let mobs = MobPayouts::new(catalog, ledger, clock, &config.mob, &config.market);
        Self {
            config,
            engine,
            composer,
            mobs,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The pricing engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<PricingEngine> {
        &self.engine
    }

    /// The player price composer.
    #[must_use]
    pub const fn composer(&self) -> &PlayerPriceComposer {
        &self.composer
    }

    /// The mob payout calculator.
    #[must_use]
    pub const fn mobs(&self) -> &MobPayouts {
        &self.mobs
    }

    /// Normalizes a raw item identifier.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<ItemKey> {
        self.engine.normalize(raw)
    }

    /// Live base price.
    #[must_use]
    pub fn base_price(&self, key: &ItemKey) -> f64 {
        self.engine.base_price(key)
    }

    /// Player-facing unit price. See [`PlayerPriceComposer::price_for`].
    #[must_use]
    pub fn player_price(
        &self,
        player: Option<&dyn PlayerContext>,
        item: &SellItem,
        distinct_types: u32,
    ) -> f64 {
        self.composer.price_for(player, item, distinct_types)
    }

    /// Records a sale. Non-positive quantities are ignored.
    pub fn apply_sale(&self, key: &ItemKey, quantity: i64) {
        self.engine.apply_sale(key, quantity);
    }

    /// Records extraction. Non-positive or non-finite quantities are ignored.
    pub fn record_extraction(&self, key: &ItemKey, quantity: f64) {
        self.engine.record_extraction(key, quantity);
    }

    /// Prices `item` for `player` and commits the sale, returning the total
    /// paid. Sells count as batch sells of at least one distinct type.
    pub fn sell(
        &self,
        player: Option<&dyn PlayerContext>,
        item: &SellItem,
        distinct_types: u32,
    ) -> f64 {
        if item.amount <= 0 {
            return 0.0;
        }
        let price = self.player_price(player, item, distinct_types.max(1));
        if price <= 0.0 {
            return 0.0;
        }
        self.engine.apply_sale(&item.key, item.amount);
        price * item.amount as f64
    }

    /// Value of selling `items` one stack after another, each sale pushing
    /// the next price down, without changing the market.
    ///
    /// Stacks are priced without a player (quality penalties only) and each
    /// stack's value is rounded to whole currency. Returns 0 when either
    /// input is empty.
    #[must_use]
    pub fn project_batch_value(
        &self,
        items: &[SellItem],
        quantities: &HashMap<ItemKey, i64>,
    ) -> i64 {
        if items.is_empty() || quantities.is_empty() {
            return 0;
        }
        // Pricing infrastructure decays its ingredients' entries too.
        let keys = self
            .engine
            .price_dependencies(quantities.keys().chain(items.iter().map(|item| &item.key)));
        let _guard = RestoreGuard {
            engine: &self.engine,
            snapshot: self.engine.snapshot(&keys),
        };

        let mut total: i64 = 0;
        for item in items {
            if item.amount <= 0 {
                continue;
            }
            let price = self.composer.price_for(None, item, 0);
            if price <= 0.0 {
                continue;
            }
            total = total.saturating_add((price * item.amount as f64).round() as i64);
            self.engine.apply_sale(&item.key, item.amount);
        }
        debug!(stacks = items.len(), total, "projected batch value");
        total
    }

    /// Swaps in a new catalog. Every cached price is invalidated; ledger
    /// state is kept.
    pub fn reload_catalog(&self, table: PriceTable) {
        self.engine.reload_catalog(table);
    }

    /// Catalog coverage of the host's known item keys; warns below 90%.
    #[must_use]
    pub fn coverage<'a>(&self, known: impl IntoIterator<Item = &'a ItemKey>) -> Coverage {
        self.engine.catalog().coverage(known)
    }

    /// Current payout for one kill of `mob`.
    #[must_use]
    pub fn payout(&self, mob: &ItemKey) -> f64 {
        self.mobs.payout(mob)
    }

    /// Records one kill of `mob`.
    pub fn record_kill(&self, mob: &ItemKey) {
        self.mobs.record_kill(mob);
    }

    /// Loads persisted ledger state and invalidates cached prices.
    ///
    /// # Errors
    ///
    /// See [`LedgerStore::load`].
    pub fn load_ledger(&self, store: &LedgerStore) -> MarketResult<LoadReport> {
        let report = store.load(self.engine.ledger(), self.engine.clock().now_millis())?;
        self.engine.invalidate();
        Ok(report)
    }

    /// Persists the ledger.
    ///
    /// # Errors
    ///
    /// See [`LedgerStore::save`].
    pub fn save_ledger(&self, store: &LedgerStore) -> MarketResult<SaveReport> {
        store.save(self.engine.ledger(), self.engine.clock().now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::clock::ManualClock;
    use crate::key::StandardNormalizer;
    use crate::recipes::{Recipe, RecipeItem};
    use crate::tag::ItemTag;
    use crate::upgrades::{PlayerSnapshot, Upgrade};

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    fn market() -> Market {
        let config = MarketConfig::default();
        let entries = [
            ("DIAMOND", 100.0, ItemTag::Ore),
            ("STONE", 1.0, ItemTag::Build),
            ("ENTITY:ZOMBIE", 5.0, ItemTag::Mob),
        ]
        .into_iter()
        .map(|(k, base, tag)| {
            let mut entry = CatalogEntry::new(key(k), base, tag, &config.market);
            entry.saturation_cap = 1_000.0;
            entry
        })
        .collect::<Vec<_>>();
        Market::new(
            config,
            PriceTable::new(entries),
            RecipeIndex::new(),
            Arc::new(ManualClock::new(0)),
            Arc::new(StandardNormalizer::new()),
        )
    }

    #[test]
    fn test_sell_pays_and_moves_market() {
        let market = market();
        let player = PlayerSnapshot::new();
        let paid = market.sell(Some(&player), &SellItem::new(key("DIAMOND"), 10), 1);
        assert!((paid - 1_000.0).abs() < 1e-9);
        assert!(market.base_price(&key("DIAMOND")) < 100.0);
    }

    #[test]
    fn test_sell_rejects_empty_stacks() {
        let market = market();
        assert!(market.sell(None, &SellItem::new(key("DIAMOND"), 0), 1).abs() < f64::EPSILON);
        assert!(market.sell(None, &SellItem::new(key("DIAMOND"), -3), 1).abs() < f64::EPSILON);
        assert!(market.sell(None, &SellItem::new(key("UNKNOWN"), 3), 1).abs() < f64::EPSILON);
        assert_eq!(market.engine().market_version(), 0);
    }

    #[test]
    fn test_sell_applies_logistics() {
        let market = market();
        let player = PlayerSnapshot::new().with_upgrade(Upgrade::Logistics, 1);
        let paid = market.sell(Some(&player), &SellItem::new(key("STONE"), 1), 12);
        assert!((paid - 1.12).abs() < 1e-9);
    }

    #[test]
    fn test_projection_walks_down_curve_and_restores() {
        let market = market();
        let items = vec![SellItem::new(key("DIAMOND"), 1_000), SellItem::new(key("DIAMOND"), 1_000)];
        let quantities = HashMap::from([(key("DIAMOND"), 2_000)]);
        let before = market.base_price(&key("DIAMOND"));
        let version = market.engine().market_version();

        let total = market.project_batch_value(&items, &quantities);
        // 1000 at 100, then 1000 at 50.
        assert_eq!(total, 150_000);
        assert_eq!(market.engine().market_version(), version);
        assert_eq!(before.to_bits(), market.base_price(&key("DIAMOND")).to_bits());
    }

    #[test]
    fn test_projection_restores_ingredient_entries() {
        let config = MarketConfig::default();
        let entries = [
            ("IRON_INGOT", 10.0, ItemTag::Ore),
            ("CHEST", 20.0, ItemTag::Container),
            ("HOPPER", 500.0, ItemTag::Infra),
        ]
        .into_iter()
        .map(|(k, base, tag)| CatalogEntry::new(key(k), base, tag, &config.market))
        .collect::<Vec<_>>();
        let mut recipes = RecipeIndex::new();
        recipes
            .add_recipe(
                Recipe::new(
                    1,
                    "Hopper".to_string(),
                    vec![
                        RecipeItem::new(key("IRON_INGOT"), 5),
                        RecipeItem::new(key("CHEST"), 1),
                    ],
                    RecipeItem::new(key("HOPPER"), 1),
                )
                .unwrap(),
            )
            .unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let market = Market::new(
            config,
            PriceTable::new(entries),
            recipes,
            clock.clone(),
            Arc::new(StandardNormalizer::new()),
        );
        market.apply_sale(&key("IRON_INGOT"), 500);
        market.apply_sale(&key("CHEST"), 50);
        clock.advance_hours(12.0);
        let iron = market.engine().ledger().get(&key("IRON_INGOT"));
        let chest = market.engine().ledger().get(&key("CHEST"));

        let items = [SellItem::new(key("HOPPER"), 4)];
        let quantities = HashMap::from([(key("HOPPER"), 4)]);
        assert!(market.project_batch_value(&items, &quantities) > 0);

        assert_eq!(market.engine().ledger().get(&key("IRON_INGOT")), iron);
        assert_eq!(market.engine().ledger().get(&key("CHEST")), chest);
        assert!(market.engine().ledger().get(&key("HOPPER")).is_none());
    }

    #[test]
    fn test_projection_of_nothing_is_zero() {
        let market = market();
        assert_eq!(market.project_batch_value(&[], &HashMap::new()), 0);
        let items = [SellItem::new(key("DIAMOND"), 1)];
        assert_eq!(market.project_batch_value(&items, &HashMap::new()), 0);
    }

    #[test]
    fn test_mob_payouts_through_facade() {
        let market = market();
        let zombie = key("entity:zombie");
        assert!((market.payout(&zombie) - 5.0).abs() < 1e-9);
        for _ in 0..1_000 {
            market.record_kill(&zombie);
        }
        assert!((market.payout(&zombie) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_coverage() {
        let market = market();
        let known = [key("DIAMOND"), key("STONE"), key("DIRT"), key("SAND")];
        let coverage = market.coverage(&known);
        assert_eq!(coverage, Coverage { covered: 2, total: 4 });
    }
}
