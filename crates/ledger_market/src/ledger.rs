//! # Market Ledger
//!
//! Mutable per-item market state: a decaying sales accumulator that suppresses
//! price after heavy selling, and a cumulative extraction total that drives
//! long-term scarcity. A parallel map tracks mob kills for payouts.
//!
//! Entries are created lazily on first touch and never evicted; the item
//! space is the finite game registry.
//!
//! ## Concurrency
//!
//! The main game context mutates entries one at a time while the persistence
//! task copies the maps out under a read lock. Both maps live behind
//! `parking_lot::RwLock`, so iteration never observes a torn entry.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::clock::MILLIS_PER_HOUR;
use crate::key::ItemKey;

/// Exponential decay with a half-life, capped per step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayPolicy {
    /// Hours for the accumulator to halve.
    pub half_life_hours: f64,
    /// Longest elapsed time one step accounts for.
    pub max_hours: f64,
}

impl DecayPolicy {
    /// Creates a policy. Non-positive half-lives disable decay.
    #[must_use]
    pub const fn new(half_life_hours: f64, max_hours: f64) -> Self {
        Self {
            half_life_hours,
            max_hours,
        }
    }

    /// Decays `accumulator` from `last_update` to `now`.
    ///
    /// No-op when no time has passed (or the clock went backwards); otherwise
    /// the accumulator shrinks and `last_update` moves to `now`.
    pub fn apply(&self, accumulator: &mut f64, last_update: &mut u64, now: u64) {
        if now <= *last_update {
            return;
        }
        let hours = ((now - *last_update) as f64 / MILLIS_PER_HOUR).min(self.max_hours);
        if hours <= 0.0 || self.half_life_hours <= 0.0 {
            return;
        }
        let lambda = std::f64::consts::LN_2 / self.half_life_hours;
        *accumulator *= (-lambda * hours).exp();
        *last_update = now;
    }
}

/// Market state for one item.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LedgerEntry {
    /// Recent sales volume, decaying toward zero.
    pub sold_accumulator: f64,
    /// Total extracted from the world. Only rollback lowers it.
    pub mined_total: f64,
    /// Epoch millis of the last decay or sale.
    pub last_update: u64,
}

impl LedgerEntry {
    /// A fresh entry stamped at `now`.
    #[must_use]
    pub const fn fresh(now: u64) -> Self {
        Self {
            sold_accumulator: 0.0,
            mined_total: 0.0,
            last_update: now,
        }
    }

    /// Applies decay up to `now`.
    #[inline]
    pub fn decay(&mut self, now: u64, policy: &DecayPolicy) {
        policy.apply(&mut self.sold_accumulator, &mut self.last_update, now);
    }
}

/// Kill-pressure state for one mob type.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MobEntry {
    /// Recent kills, decaying toward zero.
    pub kill_accumulator: f64,
    /// Epoch millis of the last decay or kill.
    pub last_update: u64,
}

impl MobEntry {
    /// A fresh entry stamped at `now`.
    #[must_use]
    pub const fn fresh(now: u64) -> Self {
        Self {
            kill_accumulator: 0.0,
            last_update: now,
        }
    }

    /// Applies decay up to `now`.
    #[inline]
    pub fn decay(&mut self, now: u64, policy: &DecayPolicy) {
        policy.apply(&mut self.kill_accumulator, &mut self.last_update, now);
    }
}

/// The shared ledger.
#[derive(Debug, Default)]
pub struct MarketLedger {
    items: RwLock<HashMap<ItemKey, LedgerEntry>>,
    mobs: RwLock<HashMap<ItemKey, MobEntry>>,
}

impl MarketLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry, creating it (stamped at `now`) if absent.
    pub fn get_or_create(&self, key: &ItemKey, now: u64) -> LedgerEntry {
        if let Some(entry) = self.items.read().get(key) {
            return *entry;
        }
        *self
            .items
            .write()
            .entry(key.clone())
            .or_insert_with(|| LedgerEntry::fresh(now))
    }

    /// Returns a copy of the entry without creating it.
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<LedgerEntry> {
        self.items.read().get(key).copied()
    }

    /// Mutates an entry in place, creating it first if needed.
    pub fn update<R>(&self, key: &ItemKey, now: u64, f: impl FnOnce(&mut LedgerEntry) -> R) -> R {
        let mut items = self.items.write();
        let entry = items
            .entry(key.clone())
            .or_insert_with(|| LedgerEntry::fresh(now));
        f(entry)
    }

    /// Decays an existing entry to `now` and returns it. Absent keys are
    /// left absent.
    pub fn decayed(&self, key: &ItemKey, now: u64, policy: &DecayPolicy) -> Option<LedgerEntry> {
        let mut items = self.items.write();
        let entry = items.get_mut(key)?;
        entry.decay(now, policy);
        Some(*entry)
    }

    /// Overwrites an entry (persistence load, rollback).
    pub fn set(&self, key: ItemKey, entry: LedgerEntry) {
        self.items.write().insert(key, entry);
    }

    /// Removes an entry, returning it.
    pub fn remove(&self, key: &ItemKey) -> Option<LedgerEntry> {
        self.items.write().remove(key)
    }

    /// Copies every item entry out under a single read lock.
    #[must_use]
    pub fn items(&self) -> Vec<(ItemKey, LedgerEntry)> {
        self.items
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }

    /// Number of item entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True when no item has been touched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Mutates a mob entry in place, creating it first if needed.
    pub fn update_mob<R>(&self, key: &ItemKey, now: u64, f: impl FnOnce(&mut MobEntry) -> R) -> R {
        let mut mobs = self.mobs.write();
        let entry = mobs.entry(key.clone()).or_insert_with(|| MobEntry::fresh(now));
        f(entry)
    }

    /// Decays an existing mob entry to `now` and returns it.
    pub fn decayed_mob(&self, key: &ItemKey, now: u64, policy: &DecayPolicy) -> Option<MobEntry> {
        let mut mobs = self.mobs.write();
        let entry = mobs.get_mut(key)?;
        entry.decay(now, policy);
        Some(*entry)
    }

    /// Returns a copy of a mob entry without creating it.
    #[must_use]
    pub fn get_mob(&self, key: &ItemKey) -> Option<MobEntry> {
        self.mobs.read().get(key).copied()
    }

    /// Overwrites a mob entry.
    pub fn set_mob(&self, key: ItemKey, entry: MobEntry) {
        self.mobs.write().insert(key, entry);
    }

    /// Copies every mob entry out under a single read lock.
    #[must_use]
    pub fn mobs(&self) -> Vec<(ItemKey, MobEntry)> {
        self.mobs
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }

    /// Number of mob entries.
    #[must_use]
    pub fn mob_len(&self) -> usize {
        self.mobs.read().len()
    }

    /// Decays every entry to `now`. Used after loading persisted state so
    /// server downtime counts toward recovery.
    pub fn decay_all(&self, now: u64, items: &DecayPolicy, mobs: &DecayPolicy) {
        for entry in self.items.write().values_mut() {
            entry.decay(now, items);
        }
        for entry in self.mobs.write().values_mut() {
            entry.decay(now, mobs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: u64 = 3_600_000;

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    #[test]
    fn test_one_half_life_halves_accumulator() {
        let policy = DecayPolicy::new(72.0, 168.0);
        let mut entry = LedgerEntry {
            sold_accumulator: 1000.0,
            mined_total: 10.0,
            last_update: 0,
        };
        entry.decay(72 * HOUR, &policy);
        assert!((entry.sold_accumulator - 500.0).abs() < 1e-9);
        assert!((entry.mined_total - 10.0).abs() < f64::EPSILON);
        assert_eq!(entry.last_update, 72 * HOUR);
    }

    #[test]
    fn test_decay_is_capped_at_one_week() {
        let policy = DecayPolicy::new(72.0, 168.0);
        let mut capped = LedgerEntry {
            sold_accumulator: 1000.0,
            ..LedgerEntry::default()
        };
        let mut week = capped;
        capped.decay(1_000 * HOUR, &policy);
        week.decay(168 * HOUR, &policy);
        assert!((capped.sold_accumulator - week.sold_accumulator).abs() < 1e-9);
        assert_eq!(capped.last_update, 1_000 * HOUR);
    }

    #[test]
    fn test_no_elapsed_time_is_noop() {
        let policy = DecayPolicy::new(72.0, 168.0);
        let mut entry = LedgerEntry {
            sold_accumulator: 5.0,
            mined_total: 0.0,
            last_update: 10 * HOUR,
        };
        entry.decay(10 * HOUR, &policy);
        entry.decay(HOUR, &policy);
        assert!((entry.sold_accumulator - 5.0).abs() < f64::EPSILON);
        assert_eq!(entry.last_update, 10 * HOUR);
    }

    #[test]
    fn test_split_decay_equals_single_step() {
        let policy = DecayPolicy::new(48.0, 168.0);
        let mut stepped = MobEntry {
            kill_accumulator: 64.0,
            last_update: 0,
        };
        let mut single = stepped;
        stepped.decay(10 * HOUR, &policy);
        stepped.decay(30 * HOUR, &policy);
        single.decay(30 * HOUR, &policy);
        assert!((stepped.kill_accumulator - single.kill_accumulator).abs() < 1e-9);
    }

    #[test]
    fn test_lazy_creation_stamps_now() {
        let ledger = MarketLedger::new();
        assert!(ledger.get(&key("DIAMOND")).is_none());
        let entry = ledger.get_or_create(&key("diamond"), 42);
        assert_eq!(entry, LedgerEntry::fresh(42));
        assert_eq!(ledger.len(), 1);
        // Existing entries keep their stamp.
        assert_eq!(ledger.get_or_create(&key("DIAMOND"), 99).last_update, 42);
    }

    #[test]
    fn test_decayed_reads_never_create() {
        let ledger = MarketLedger::new();
        let policy = DecayPolicy::new(72.0, 168.0);
        assert!(ledger.decayed(&key("SAND"), HOUR, &policy).is_none());
        assert!(ledger.decayed_mob(&key("ENTITY:BAT"), HOUR, &policy).is_none());
        assert!(ledger.is_empty());
        assert_eq!(ledger.mob_len(), 0);

        ledger.update(&key("SAND"), 0, |e| e.sold_accumulator = 8.0);
        let sand = ledger.decayed(&key("SAND"), 72 * HOUR, &policy).unwrap();
        assert!((sand.sold_accumulator - 4.0).abs() < 1e-9);
        assert_eq!(ledger.get(&key("SAND")), Some(sand));
    }

    #[test]
    fn test_update_and_copy_out() {
        let ledger = MarketLedger::new();
        ledger.update(&key("COAL"), 0, |e| e.sold_accumulator += 3.0);
        ledger.update_mob(&key("ENTITY:ZOMBIE"), 0, |e| e.kill_accumulator += 1.0);
        let items = ledger.items();
        assert_eq!(items.len(), 1);
        assert!((items[0].1.sold_accumulator - 3.0).abs() < f64::EPSILON);
        assert_eq!(ledger.mob_len(), 1);
        assert!(ledger.remove(&key("COAL")).is_some());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_decay_all_uses_separate_half_lives() {
        let ledger = MarketLedger::new();
        ledger.set(
            key("WHEAT"),
            LedgerEntry {
                sold_accumulator: 100.0,
                mined_total: 0.0,
                last_update: 0,
            },
        );
        ledger.set_mob(
            key("ENTITY:COW"),
            MobEntry {
                kill_accumulator: 100.0,
                last_update: 0,
            },
        );
        ledger.decay_all(48 * HOUR, &DecayPolicy::new(96.0, 168.0), &DecayPolicy::new(48.0, 168.0));
        let wheat = ledger.get(&key("WHEAT")).unwrap();
        let cow = ledger.get_mob(&key("ENTITY:COW")).unwrap();
        assert!((wheat.sold_accumulator - 100.0 * 0.5_f64.sqrt()).abs() < 1e-9);
        assert!((cow.kill_accumulator - 50.0).abs() < 1e-9);
    }
}
