//! Mob kill payouts.
//!
//! Each mob type carries a kill accumulator that decays with its own
//! half-life. Farming one mob type drives its payout down the same supply
//! curve items use, without the scarcity term. Payouts are cheap to compute
//! and not cached.

use std::sync::Arc;

use crate::catalog::PriceCatalog;
use crate::clock::Clock;
use crate::config::{MarketSection, MobSection};
use crate::key::ItemKey;
use crate::ledger::{DecayPolicy, MarketLedger};

/// Payout calculator over the mob half of the ledger.
pub struct MobPayouts {
    catalog: Arc<PriceCatalog>,
    ledger: Arc<MarketLedger>,
    clock: Arc<dyn Clock>,
    decay: DecayPolicy,
}

impl MobPayouts {
    /// Creates a payout calculator.
    #[must_use]
    pub fn new(
        catalog: Arc<PriceCatalog>,
        ledger: Arc<MarketLedger>,
        clock: Arc<dyn Clock>,
        mob: &MobSection,
        market: &MarketSection,
    ) -> Self {
        Self {
            catalog,
            ledger,
            clock,
            decay: DecayPolicy::new(mob.half_life_hours, market.max_decay_hours),
        }
    }

    /// Kill decay policy.
    #[must_use]
    pub const fn decay_policy(&self) -> &DecayPolicy {
        &self.decay
    }

    /// Current payout for killing one `mob`. Unknown or unsellable mobs pay 0.
    #[must_use]
    pub fn payout(&self, mob: &ItemKey) -> f64 {
        let Some(entry) = self.catalog.lookup(mob) else {
            return 0.0;
        };
        if !entry.is_sellable() {
            return 0.0;
        }
        let now = self.clock.now_millis();
        let state = self
            .ledger
            .decayed_mob(mob, now, &self.decay)
            .unwrap_or_default();
        let base = entry.base_price;
        let factor = 1.0 / (1.0 + state.kill_accumulator / entry.saturation_cap).powf(entry.sigma);
        let payout = (base * factor)
            .max(base * entry.min_factor)
            .min(base * entry.max_factor);
        if payout.is_finite() {
            payout.max(0.0)
        } else {
            0.0
        }
    }

    /// Records one kill of `mob`.
    pub fn record_kill(&self, mob: &ItemKey) {
        let now = self.clock.now_millis();
        self.ledger.update_mob(mob, now, |state| {
            state.decay(now, &self.decay);
            state.kill_accumulator += 1.0;
            state.last_update = now;
        });
    }
}

impl std::fmt::Debug for MobPayouts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobPayouts")
            .field("decay", &self.decay)
            .field("tracked_mobs", &self.ledger.mob_len())
            .finish_non_exhaustive()
    }
}
