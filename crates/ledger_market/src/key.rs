//! # Item Keys
//!
//! Canonical identity for a sellable item type. Every map in the market is
//! keyed by [`ItemKey`], so two spellings of the same item (`minecraft:iron_ingot`,
//! `IRON_INGOT`, ` iron_ingot `) always hit the same catalog and ledger entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Namespace stripped from vanilla identifiers.
const VANILLA_NAMESPACE: &str = "minecraft";

/// A normalized, uppercase item identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Normalizes a raw identifier with the standard rules.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        StandardNormalizer::new().normalize(raw)
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for keys in the `ENTITY:` space (mob payouts).
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.0.starts_with("ENTITY:")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps raw identifiers to canonical catalog keys.
///
/// The host server supplies this; alias tables and registry lookups live
/// behind it so the engine only ever sees canonical keys.
pub trait KeyNormalizer: Send + Sync {
    /// Resolves a raw identifier, or `None` if it names nothing.
    fn normalize(&self, raw: &str) -> Option<ItemKey>;
}

/// Default normalizer: trim, strip the vanilla namespace, uppercase,
/// then resolve aliases.
#[derive(Clone, Debug, Default)]
pub struct StandardNormalizer {
    aliases: HashMap<String, ItemKey>,
}

impl StandardNormalizer {
    /// Creates a normalizer with no aliases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an alias. Both sides go through the standard rules first.
    #[must_use]
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        if let (Some(from), Some(to)) = (canonicalize(alias), canonicalize(canonical)) {
            self.aliases.insert(from, ItemKey(to));
        }
        self
    }
}

impl KeyNormalizer for StandardNormalizer {
    fn normalize(&self, raw: &str) -> Option<ItemKey> {
        let canonical = canonicalize(raw)?;
        match self.aliases.get(&canonical) {
            Some(target) => Some(target.clone()),
            None => Some(ItemKey(canonical)),
        }
    }
}

fn canonicalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = match trimmed.split_once(':') {
        Some((namespace, rest))
            if namespace.eq_ignore_ascii_case(VANILLA_NAMESPACE) && !rest.is_empty() =>
        {
            rest
        }
        _ => trimmed,
    };
    Some(stripped.to_ascii_uppercase())
}
