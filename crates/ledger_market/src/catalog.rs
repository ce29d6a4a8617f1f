//! # Price Catalog
//!
//! Immutable per-item tuning, swapped wholesale on reload.
//!
//! ## Format
//!
//! ```toml
//! [prices.IRON_INGOT]
//! base = 40.0
//! cap = 8000.0
//! tag = "ORE_MID"
//!
//! [mob_prices."ENTITY:ZOMBIE"]
//! base = 5.0
//!
//! [overrides.SHULKER_BOX]
//! unsellable = true
//! ```
//!
//! Entries that fail validation are skipped one by one with a warning; a bad
//! entry never aborts the whole load.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MarketSection;
use crate::error::{MarketError, MarketResult};
use crate::key::{ItemKey, KeyNormalizer};
use crate::tag::ItemTag;

/// Default saturation capacity when an entry does not set `cap`.
pub const DEFAULT_CAP: f64 = 10_000.0;
/// Default price floor as a fraction of base.
pub const DEFAULT_MIN_FACTOR: f64 = 0.2;
/// Default price ceiling as a fraction of base.
pub const DEFAULT_MAX_FACTOR: f64 = 2.5;
/// Default supply-curve steepness.
pub const DEFAULT_SIGMA: f64 = 1.0;
/// Coverage ratio below which a warning is logged.
const COVERAGE_WARN_RATIO: f64 = 0.9;

/// Tuning parameters for one item.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    /// Canonical item key.
    pub key: ItemKey,
    /// Static base sell price.
    pub base_price: f64,
    /// Sales volume at which the supply factor halves (sigma = 1).
    pub saturation_cap: f64,
    /// Steepness of the supply curve.
    pub sigma: f64,
    /// Floor as a fraction of base.
    pub min_factor: f64,
    /// Ceiling as a fraction of base (before scarcity).
    pub max_factor: f64,
    /// Total extracted amount at which scarcity saturates.
    pub scarcity_baseline: f64,
    /// Maximum scarcity markup.
    pub scarcity_rho: f64,
    /// Market category.
    pub tag: ItemTag,
    /// Explicitly excluded from selling.
    pub unsellable: bool,
}

impl CatalogEntry {
    /// Creates an entry with default curve parameters.
    #[must_use]
    pub fn new(key: ItemKey, base_price: f64, tag: ItemTag, defaults: &MarketSection) -> Self {
        Self {
            key,
            base_price,
            saturation_cap: DEFAULT_CAP,
            sigma: DEFAULT_SIGMA,
            min_factor: DEFAULT_MIN_FACTOR,
            max_factor: DEFAULT_MAX_FACTOR,
            scarcity_baseline: defaults.depletion_baseline,
            scarcity_rho: defaults.scarcity_rho,
            tag,
            unsellable: false,
        }
    }

    /// Starting point for an override naming a key the base catalog lacks.
    fn empty(key: ItemKey, defaults: &MarketSection) -> Self {
        Self {
            unsellable: true,
            ..Self::new(key, 0.0, ItemTag::Misc, defaults)
        }
    }

    /// Whether this entry can produce a positive price at all.
    #[inline]
    #[must_use]
    pub fn is_sellable(&self) -> bool {
        !self.unsellable && self.tag != ItemTag::Unsellable && self.base_price > 0.0
    }

    /// Checks every divisor and bound used by the pricing math.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidEntry` describing the first violation.
    pub fn validate(&self) -> MarketResult<()> {
        let reject = |reason: String| {
            Err(MarketError::InvalidEntry {
                key: self.key.to_string(),
                reason,
            })
        };
        let fields = [
            ("base", self.base_price),
            ("cap", self.saturation_cap),
            ("sigma", self.sigma),
            ("min_factor", self.min_factor),
            ("max_factor", self.max_factor),
            ("baseline", self.scarcity_baseline),
            ("rho", self.scarcity_rho),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return reject(format!("{name} is not finite ({value})"));
        }
        if self.base_price < 0.0 {
            return reject(format!("base must be >= 0, got {}", self.base_price));
        }
        if self.saturation_cap <= 0.0 {
            return reject(format!("cap must be > 0, got {}", self.saturation_cap));
        }
        if self.sigma <= 0.0 {
            return reject(format!("sigma must be > 0, got {}", self.sigma));
        }
        if self.scarcity_baseline <= 0.0 {
            return reject(format!("baseline must be > 0, got {}", self.scarcity_baseline));
        }
        if self.scarcity_rho < 0.0 {
            return reject(format!("rho must be >= 0, got {}", self.scarcity_rho));
        }
        if self.min_factor < 0.0 || self.min_factor > self.max_factor {
            return reject(format!(
                "factors must satisfy 0 <= min_factor <= max_factor, got {} / {}",
                self.min_factor, self.max_factor
            ));
        }
        Ok(())
    }
}

/// Fields as written in the TOML file. Every field is optional so overrides
/// can touch a single value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryFields {
    base: Option<f64>,
    cap: Option<f64>,
    #[serde(alias = "minFactor")]
    min_factor: Option<f64>,
    #[serde(alias = "maxFactor")]
    max_factor: Option<f64>,
    sigma: Option<f64>,
    baseline: Option<f64>,
    rho: Option<f64>,
    tag: Option<ItemTag>,
    unsellable: Option<bool>,
}

impl EntryFields {
    fn apply(self, mut entry: CatalogEntry, defaults: &MarketSection) -> CatalogEntry {
        if let Some(base) = self.base {
            entry.base_price = base;
        }
        if let Some(cap) = self.cap {
            entry.saturation_cap = cap;
        }
        if let Some(min_factor) = self.min_factor {
            entry.min_factor = min_factor;
        }
        if let Some(max_factor) = self.max_factor {
            entry.max_factor = max_factor;
        }
        if let Some(sigma) = self.sigma {
            entry.sigma = sigma;
        }
        // Non-positive baselines fall back to the market-wide default.
        if let Some(baseline) = self.baseline {
            entry.scarcity_baseline = if baseline > 0.0 {
                baseline
            } else {
                defaults.depletion_baseline
            };
        }
        if let Some(rho) = self.rho {
            entry.scarcity_rho = rho;
        }
        if let Some(tag) = self.tag {
            entry.tag = tag;
        }
        if let Some(unsellable) = self.unsellable {
            entry.unsellable = unsellable;
        }
        entry
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogDocument {
    prices: BTreeMap<String, toml::Value>,
    #[serde(alias = "mobPrices")]
    mob_prices: BTreeMap<String, toml::Value>,
    overrides: BTreeMap<String, toml::Value>,
}

/// Immutable key -> entry table.
#[derive(Clone, Debug, Default)]
pub struct PriceTable {
    entries: HashMap<ItemKey, CatalogEntry>,
}

impl PriceTable {
    /// Builds a table from already-validated entries. Invalid entries are
    /// skipped with a warning.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.insert_checked(entry);
        }
        table
    }

    /// Parses a catalog document.
    ///
    /// # Errors
    ///
    /// Returns error only when the document itself is not valid TOML.
    /// Individual bad entries are skipped.
    pub fn from_toml_str(
        source: &str,
        defaults: &MarketSection,
        normalizer: &dyn KeyNormalizer,
    ) -> MarketResult<Self> {
        let document: CatalogDocument = toml::from_str(source)?;
        let mut table = Self::default();

        let sections = document
            .prices
            .into_iter()
            .map(|(raw, value)| (raw, value, ItemTag::Misc))
            .chain(document.mob_prices.into_iter().map(|(raw, value)| (raw, value, ItemTag::Mob)));
        for (raw_key, value, default_tag) in sections {
            let Some(key) = normalizer.normalize(&raw_key) else {
                warn!(key = %raw_key, "skipping catalog entry with blank key");
                continue;
            };
            match value.try_into::<EntryFields>() {
                Ok(fields) => {
                    let entry = fields.apply(CatalogEntry::new(key, 0.0, default_tag, defaults), defaults);
                    table.insert_checked(entry);
                }
                Err(e) => warn!(key = %key, error = %e, "skipping malformed catalog entry"),
            }
        }

        for (raw_key, value) in document.overrides {
            let Some(key) = normalizer.normalize(&raw_key) else {
                continue;
            };
            match value.try_into::<EntryFields>() {
                Ok(fields) => {
                    let base = table
                        .entries
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| CatalogEntry::empty(key, defaults));
                    table.insert_checked(fields.apply(base, defaults));
                }
                Err(e) => warn!(key = %key, error = %e, "skipping malformed catalog override"),
            }
        }

        Ok(table)
    }

    /// Reads and parses a catalog file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid TOML.
    pub fn from_toml_file(
        path: impl AsRef<Path>,
        defaults: &MarketSection,
        normalizer: &dyn KeyNormalizer,
    ) -> MarketResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source, defaults, normalizer)
    }

    fn insert_checked(&mut self, entry: CatalogEntry) {
        match entry.validate() {
            Ok(()) => {
                self.entries.insert(entry.key.clone(), entry);
            }
            Err(e) => warn!(error = %e, "skipping invalid catalog entry"),
        }
    }

    /// Looks up an entry by canonical key.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates all entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Reports how many of the host's known item keys have an entry.
    #[must_use]
    pub fn coverage<'a>(&self, known: impl IntoIterator<Item = &'a ItemKey>) -> Coverage {
        let mut coverage = Coverage::default();
        for key in known {
            coverage.total += 1;
            if self.entries.contains_key(key) {
                coverage.covered += 1;
            }
        }
        if coverage.total > 0 && coverage.ratio() < COVERAGE_WARN_RATIO {
            warn!(
                covered = coverage.covered,
                total = coverage.total,
                "price coverage below 90%"
            );
        }
        coverage
    }
}

/// Catalog coverage of the host's item registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Known keys with a catalog entry.
    pub covered: usize,
    /// Known keys checked.
    pub total: usize,
}

impl Coverage {
    /// Covered fraction in `[0, 1]`; 1.0 when nothing was checked.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }
}

/// The live catalog handle.
///
/// Readers take a cheap `Arc` of the current table; `reload` swaps the whole
/// table so no reader ever sees a half-updated catalog.
#[derive(Debug, Default)]
pub struct PriceCatalog {
    table: RwLock<Arc<PriceTable>>,
    generation: AtomicU64,
}

impl PriceCatalog {
    /// Wraps an initial table.
    #[must_use]
    pub fn new(table: PriceTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            generation: AtomicU64::new(0),
        }
    }

    /// The current table.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Arc<PriceTable> {
        Arc::clone(&self.table.read())
    }

    /// Looks up a single entry in the current table.
    #[must_use]
    pub fn lookup(&self, key: &ItemKey) -> Option<CatalogEntry> {
        self.table.read().get(key).cloned()
    }

    /// Replaces the whole table and bumps the generation counter.
    pub fn reload(&self, table: PriceTable) {
        let count = table.len();
        {
            let mut current = self.table.write();
            *current = Arc::new(table);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        info!(entries = count, "price catalog reloaded");
    }

    /// Coverage of the current table over the host's known keys.
    #[must_use]
    pub fn coverage<'a>(&self, known: impl IntoIterator<Item = &'a ItemKey>) -> Coverage {
        self.current().coverage(known)
    }

    /// Number of reloads since construction.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
