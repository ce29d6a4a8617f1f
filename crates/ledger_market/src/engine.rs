//! # Pricing Engine
//!
//! Turns static catalog prices into live sell values.
//!
//! ```text
//! supply   = 1 / (1 + sold / cap)^sigma
//! scarcity = 1 + rho * clamp(mined / baseline, 0, 1)
//! price    = clamp(base * supply * scarcity,
//!                  base * min_factor,
//!                  base * max_factor * scarcity)
//! ```
//!
//! Infrastructure items are then capped by their ingredient value.
//!
//! ## Caching
//!
//! Prices are memoized per key. Every ledger mutation bumps `market_version`
//! and every catalog reload bumps the catalog generation; the first read
//! after either change clears the cache in bulk. Elapsed time alone does not
//! invalidate: decay shows up at the next mutation.
//!
//! ## Speculation
//!
//! [`PricingEngine::snapshot`] captures ledger entries, cache contents and
//! both counters; [`PricingEngine::restore`] puts all of it back so a preview
//! leaves no trace.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::arbitrage::AntiArbitrageResolver;
use crate::catalog::{CatalogEntry, PriceCatalog, PriceTable};
use crate::clock::Clock;
use crate::config::MarketSection;
use crate::key::{ItemKey, KeyNormalizer};
use crate::ledger::{DecayPolicy, LedgerEntry, MarketLedger};
use crate::recipes::RecipeIndex;

#[derive(Debug, Default)]
struct PriceCache {
    market_version: u64,
    catalog_generation: u64,
    prices: HashMap<ItemKey, f64>,
}

/// Captured engine state for speculative previews.
#[derive(Clone, Debug)]
pub struct MarketSnapshot {
    entries: Vec<(ItemKey, Option<LedgerEntry>)>,
    cached_prices: HashMap<ItemKey, f64>,
    cache_version: u64,
    cache_generation: u64,
    market_version: u64,
}

impl MarketSnapshot {
    /// Number of ledger keys captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State threaded through one top-level price resolution.
struct Resolution {
    table: Arc<PriceTable>,
    market_version: u64,
    catalog_generation: u64,
    now: u64,
    visiting: Vec<ItemKey>,
    truncated: bool,
}

/// The dynamic pricing engine.
///
/// All methods take `&self`; the engine is shared between the main game
/// context and background readers.
pub struct PricingEngine {
    catalog: Arc<PriceCatalog>,
    ledger: Arc<MarketLedger>,
    resolver: AntiArbitrageResolver,
    clock: Arc<dyn Clock>,
    normalizer: Arc<dyn KeyNormalizer>,
    decay: DecayPolicy,
    market_version: AtomicU64,
    cache: Mutex<PriceCache>,
    missing_keys: Mutex<HashSet<ItemKey>>,
    cyclic_keys: Mutex<HashSet<ItemKey>>,
}

impl PricingEngine {
    /// Creates an engine over explicit handles.
    #[must_use]
    pub fn new(
        catalog: Arc<PriceCatalog>,
        ledger: Arc<MarketLedger>,
        recipes: Arc<RecipeIndex>,
        clock: Arc<dyn Clock>,
        normalizer: Arc<dyn KeyNormalizer>,
        market: &MarketSection,
    ) -> Self {
        let catalog_generation = catalog.generation();
        Self {
            catalog,
            ledger,
            resolver: AntiArbitrageResolver::new(recipes),
            clock,
            normalizer,
            decay: DecayPolicy::new(market.half_life_hours, market.max_decay_hours),
            market_version: AtomicU64::new(0),
            cache: Mutex::new(PriceCache {
                catalog_generation,
                ..PriceCache::default()
            }),
            missing_keys: Mutex::new(HashSet::new()),
            cyclic_keys: Mutex::new(HashSet::new()),
        }
    }

    /// The catalog handle.
    #[must_use]
    pub fn catalog(&self) -> &Arc<PriceCatalog> {
        &self.catalog
    }

    /// The ledger handle.
    #[must_use]
    pub fn ledger(&self) -> &Arc<MarketLedger> {
        &self.ledger
    }

    /// The clock handle.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Normalizes a raw item identifier.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<ItemKey> {
        self.normalizer.normalize(raw)
    }

    /// Current market version.
    #[inline]
    #[must_use]
    pub fn market_version(&self) -> u64 {
        self.market_version.load(Ordering::SeqCst)
    }

    /// Item decay policy.
    #[must_use]
    pub const fn decay_policy(&self) -> &DecayPolicy {
        &self.decay
    }

    /// Live base price of an item. Always finite and `>= 0`.
    #[must_use]
    pub fn base_price(&self, key: &ItemKey) -> f64 {
        // Counters are read before the table so a concurrent reload can only
        // make the memoized value stale, never mislabeled.
        let market_version = self.market_version();
        let catalog_generation = self.catalog.generation();
        let mut resolution = Resolution {
            table: self.catalog.current(),
            market_version,
            catalog_generation,
            now: self.clock.now_millis(),
            visiting: Vec::new(),
            truncated: false,
        };
        self.resolve(key, &mut resolution)
    }

    /// Base price of a raw identifier; unknown or blank identifiers price at 0.
    #[must_use]
    pub fn base_price_of(&self, raw: &str) -> f64 {
        self.normalize(raw).map_or(0.0, |key| self.base_price(&key))
    }

    fn resolve(&self, key: &ItemKey, resolution: &mut Resolution) -> f64 {
        let table = Arc::clone(&resolution.table);
        let Some(entry) = table.get(key) else {
            self.warn_missing(key);
            return 0.0;
        };
        if !entry.is_sellable() {
            return 0.0;
        }
        if let Some(price) = self.cached(key, resolution) {
            return price;
        }
        if resolution.visiting.contains(key) {
            resolution.truncated = true;
            if self.cyclic_keys.lock().insert(key.clone()) {
                warn!(item = %key, "recipe cycle while resolving ingredient value");
            }
            return 0.0;
        }

        resolution.visiting.push(key.clone());
        let mut price = self.market_price(entry, resolution.now);
        if entry.tag.is_infrastructure() {
            price = self
                .resolver
                .cap(key, price, |ingredient| self.resolve(ingredient, resolution));
        }
        resolution.visiting.pop();

        let price = if price.is_finite() { price.max(0.0) } else { 0.0 };
        if !resolution.truncated {
            self.memoize(key, price, resolution);
        }
        price
    }

    /// Supply and scarcity adjusted price before anti-arbitrage.
    fn market_price(&self, entry: &CatalogEntry, now: u64) -> f64 {
        let state = self
            .ledger
            .decayed(&entry.key, now, &self.decay)
            .unwrap_or_default();
        let base = entry.base_price;
        let supply = 1.0 / (1.0 + state.sold_accumulator / entry.saturation_cap).powf(entry.sigma);
        let depletion = (state.mined_total / entry.scarcity_baseline).clamp(0.0, 1.0);
        let scarcity = 1.0 + entry.scarcity_rho * depletion;
        let raw = base * supply * scarcity;
        raw.max(base * entry.min_factor)
            .min(base * entry.max_factor * scarcity)
    }

    fn cached(&self, key: &ItemKey, resolution: &Resolution) -> Option<f64> {
        let mut cache = self.cache.lock();
        if cache.market_version != resolution.market_version
            || cache.catalog_generation != resolution.catalog_generation
        {
            // Only move forward; a reader holding older counters just misses.
            if resolution.market_version >= cache.market_version
                && resolution.catalog_generation >= cache.catalog_generation
            {
                cache.prices.clear();
                cache.market_version = resolution.market_version;
                cache.catalog_generation = resolution.catalog_generation;
            }
            return None;
        }
        cache.prices.get(key).copied()
    }

    fn memoize(&self, key: &ItemKey, price: f64, resolution: &Resolution) {
        let mut cache = self.cache.lock();
        if cache.market_version == resolution.market_version
            && cache.catalog_generation == resolution.catalog_generation
        {
            cache.prices.insert(key.clone(), price);
        }
    }

    fn warn_missing(&self, key: &ItemKey) {
        if self.missing_keys.lock().insert(key.clone()) {
            warn!(item = %key, "no catalog price; selling at 0");
        }
    }

    fn bump_version(&self) {
        self.market_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks every cached price stale. Call after writing the ledger
    /// directly, e.g. when loading persisted state.
    pub fn invalidate(&self) {
        self.bump_version();
    }

    /// Records a sale of `quantity` units. Non-positive quantities are ignored.
    pub fn apply_sale(&self, key: &ItemKey, quantity: i64) {
        if quantity <= 0 {
            return;
        }
        let now = self.clock.now_millis();
        self.ledger.update(key, now, |state| {
            state.decay(now, &self.decay);
            state.sold_accumulator += quantity as f64;
            state.last_update = now;
        });
        self.bump_version();
    }

    /// Records `quantity` units extracted from the world. Non-positive or
    /// non-finite quantities are ignored.
    pub fn record_extraction(&self, key: &ItemKey, quantity: f64) {
        if !quantity.is_finite() || quantity <= 0.0 {
            return;
        }
        let now = self.clock.now_millis();
        self.ledger.update(key, now, |state| state.mined_total += quantity);
        self.bump_version();
    }

    /// Captures ledger state for `keys` plus the cache and both counters.
    #[must_use]
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a ItemKey>) -> MarketSnapshot {
        let mut seen = HashSet::new();
        let entries = keys
            .into_iter()
            .filter(|key| seen.insert(*key))
            .map(|key| (key.clone(), self.ledger.get(key)))
            .collect();
        let cache = self.cache.lock();
        MarketSnapshot {
            entries,
            cached_prices: cache.prices.clone(),
            cache_version: cache.market_version,
            cache_generation: cache.catalog_generation,
            market_version: self.market_version(),
        }
    }

    /// `keys` plus every recipe ingredient their prices can depend on,
    /// followed transitively and deduplicated.
    #[must_use]
    pub fn price_dependencies<'a>(&self, keys: impl IntoIterator<Item = &'a ItemKey>) -> Vec<ItemKey> {
        let mut seen = HashSet::new();
        let mut pending: Vec<ItemKey> = keys.into_iter().cloned().collect();
        let mut dependencies = Vec::new();
        while let Some(key) = pending.pop() {
            if !seen.insert(key.clone()) {
                continue;
            }
            for recipe in self.resolver.recipes().recipes_for(&key) {
                pending.extend(recipe.ingredients.iter().map(|item| item.key.clone()));
            }
            dependencies.push(key);
        }
        dependencies
    }

    /// Restores a snapshot exactly. Entries that did not exist when it was
    /// taken are removed again.
    pub fn restore(&self, snapshot: &MarketSnapshot) {
        for (key, entry) in &snapshot.entries {
            match entry {
                Some(entry) => self.ledger.set(key.clone(), *entry),
                None => {
                    self.ledger.remove(key);
                }
            }
        }
        let mut cache = self.cache.lock();
        cache.prices.clone_from(&snapshot.cached_prices);
        cache.market_version = snapshot.cache_version;
        cache.catalog_generation = snapshot.cache_generation;
        self.market_version
            .store(snapshot.market_version, Ordering::SeqCst);
    }

    /// Swaps the catalog and invalidates every cached price. Ledger state is
    /// kept.
    pub fn reload_catalog(&self, table: PriceTable) {
        self.catalog.reload(table);
        self.bump_version();
        self.cache.lock().prices.clear();
        self.missing_keys.lock().clear();
        self.cyclic_keys.lock().clear();
    }
}

impl std::fmt::Debug for PricingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingEngine")
            .field("market_version", &self.market_version())
            .field("catalog_generation", &self.catalog.generation())
            .field("ledger_entries", &self.ledger.len())
            .finish_non_exhaustive()
    }
}
