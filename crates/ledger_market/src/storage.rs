//! # Ledger Storage
//!
//! Crash-safe persistence of the market ledger.
//!
//! ## Guarantees
//!
//! 1. **Atomic replace**: the live file is only ever swapped by a rename, so a
//!    crash mid-save leaves the previous file intact
//! 2. **Backup**: the previous live file is copied to `<file>.bak` before each
//!    swap and used when the live file is missing or unreadable
//! 3. **Partial recovery**: malformed entries are skipped one by one
//!
//! ## Format
//!
//! ```toml
//! schema = 1
//! generated_at = 1700000000000
//!
//! [items.DIAMOND]
//! s = 412.5
//! mined_total = 9000.0
//! last_update = 1699999990000
//!
//! [mobs."ENTITY:ZOMBIE"]
//! k = 30.0
//! last_update = 1699999990000
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::key::ItemKey;
use crate::ledger::{DecayPolicy, LedgerEntry, MarketLedger, MobEntry};

/// Current file schema.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ItemRecord {
    s: f64,
    #[serde(alias = "minedTotal")]
    mined_total: f64,
    #[serde(alias = "lastUpdate")]
    last_update: u64,
}

#[derive(Serialize, Deserialize)]
struct MobRecord {
    k: f64,
    #[serde(alias = "lastUpdate")]
    last_update: u64,
}

#[derive(Serialize)]
struct LedgerDocument {
    schema: u32,
    generated_at: u64,
    items: BTreeMap<String, ItemRecord>,
    mobs: BTreeMap<String, MobRecord>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    schema: Option<u32>,
    #[serde(default)]
    items: BTreeMap<String, toml::Value>,
    #[serde(default)]
    mobs: BTreeMap<String, toml::Value>,
}

/// Which file a load ended up using.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// The live file.
    Primary,
    /// The `.bak` copy.
    Backup,
    /// Neither file was usable; the ledger starts empty.
    Empty,
}

/// Outcome of [`LedgerStore::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadReport {
    /// File the entries came from.
    pub source: LoadSource,
    /// Item entries restored.
    pub items: usize,
    /// Mob entries restored.
    pub mobs: usize,
    /// Entries skipped as malformed.
    pub skipped: usize,
}

/// Outcome of [`LedgerStore::save`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveReport {
    /// Item entries written.
    pub items: usize,
    /// Mob entries written.
    pub mobs: usize,
}

/// Reads and writes the ledger file.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    item_decay: DecayPolicy,
    mob_decay: DecayPolicy,
    /// Serializes saves; the ledger itself is only read-locked.
    write_lock: Mutex<()>,
}

impl LedgerStore {
    /// Creates a store for `path` using the configured half-lives for
    /// downtime decay.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, config: &MarketConfig) -> Self {
        let max_hours = config.market.max_decay_hours;
        Self {
            path: path.as_ref().to_path_buf(),
            item_decay: DecayPolicy::new(config.market.half_life_hours, max_hours),
            mob_decay: DecayPolicy::new(config.mob.half_life_hours, max_hours),
            write_lock: Mutex::new(()),
        }
    }

    /// Live file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup file path.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".bak")
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    /// Writes a consistent copy of the ledger.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or any filesystem step fails. The
    /// previous live file is untouched in that case.
    pub fn save(&self, ledger: &MarketLedger, now: u64) -> MarketResult<SaveReport> {
        let items: BTreeMap<String, ItemRecord> = ledger
            .items()
            .into_iter()
            .map(|(key, entry)| {
                (
                    key.to_string(),
                    ItemRecord {
                        s: entry.sold_accumulator,
                        mined_total: entry.mined_total,
                        last_update: entry.last_update,
                    },
                )
            })
            .collect();
        let mobs: BTreeMap<String, MobRecord> = ledger
            .mobs()
            .into_iter()
            .map(|(key, entry)| {
                (
                    key.to_string(),
                    MobRecord {
                        k: entry.kill_accumulator,
                        last_update: entry.last_update,
                    },
                )
            })
            .collect();
        let report = SaveReport {
            items: items.len(),
            mobs: mobs.len(),
        };
        let document = LedgerDocument {
            schema: SCHEMA_VERSION,
            generated_at: now,
            items,
            mobs,
        };
        let contents = toml::to_string(&document)?;

        let _guard = self.write_lock.lock();
        self.write_atomic(contents.as_bytes())?;
        info!(items = report.items, mobs = report.mobs, path = %self.path.display(), "ledger saved");
        Ok(report)
    }

    fn write_atomic(&self, contents: &[u8]) -> MarketResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Loads the ledger file into `ledger`, then decays every entry to `now`
    /// so downtime counts toward recovery.
    ///
    /// Falls back to the backup when the live file is missing, empty or
    /// malformed, and to an empty ledger when both are.
    ///
    /// # Errors
    ///
    /// Returns error only if a stale temp file cannot be removed.
    pub fn load(&self, ledger: &MarketLedger, now: u64) -> MarketResult<LoadReport> {
        match fs::remove_file(self.temp_path()) {
            Ok(()) => warn!(path = %self.temp_path().display(), "removed stale temp file"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let (source, document) = match read_document(&self.path) {
            Ok(document) => (LoadSource::Primary, Some(document)),
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "ledger file unusable, trying backup");
                match read_document(&self.backup_path()) {
                    Ok(document) => (LoadSource::Backup, Some(document)),
                    Err(err) => {
                        warn!(error = %err, "ledger backup unusable, starting empty");
                        (LoadSource::Empty, None)
                    }
                }
            }
        };

        let mut report = LoadReport {
            source,
            items: 0,
            mobs: 0,
            skipped: 0,
        };
        if let Some(document) = document {
            if document.schema.is_some_and(|schema| schema != SCHEMA_VERSION) {
                warn!(schema = ?document.schema, "unexpected ledger schema, loading what parses");
            }
            for (raw, value) in document.items {
                match parse_item(&raw, value) {
                    Ok((key, entry)) => {
                        ledger.set(key, entry);
                        report.items += 1;
                    }
                    Err(err) => {
                        warn!(item = %raw, error = %err, "skipping malformed ledger entry");
                        report.skipped += 1;
                    }
                }
            }
            for (raw, value) in document.mobs {
                match parse_mob(&raw, value) {
                    Ok((key, entry)) => {
                        ledger.set_mob(key, entry);
                        report.mobs += 1;
                    }
                    Err(err) => {
                        warn!(mob = %raw, error = %err, "skipping malformed mob entry");
                        report.skipped += 1;
                    }
                }
            }
        }

        ledger.decay_all(now, &self.item_decay, &self.mob_decay);
        info!(
            source = ?report.source,
            items = report.items,
            mobs = report.mobs,
            skipped = report.skipped,
            "ledger loaded"
        );
        Ok(report)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_document(path: &Path) -> MarketResult<RawDocument> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(MarketError::InvalidConfig(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(toml::from_str(&contents)?)
}

fn entry_error(raw: &str, reason: impl Into<String>) -> MarketError {
    MarketError::InvalidEntry {
        key: raw.to_string(),
        reason: reason.into(),
    }
}

fn parse_key(raw: &str) -> MarketResult<ItemKey> {
    ItemKey::parse(raw).ok_or_else(|| entry_error(raw, "blank key"))
}

fn non_negative(raw: &str, field: &str, value: f64) -> MarketResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(entry_error(raw, format!("{field} must be finite and >= 0, got {value}")))
    }
}

fn parse_item(raw: &str, value: toml::Value) -> MarketResult<(ItemKey, LedgerEntry)> {
    let key = parse_key(raw)?;
    let record: ItemRecord = value
        .try_into()
        .map_err(|err: toml::de::Error| entry_error(raw, err.to_string()))?;
    Ok((
        key,
        LedgerEntry {
            sold_accumulator: non_negative(raw, "s", record.s)?,
            mined_total: non_negative(raw, "mined_total", record.mined_total)?,
            last_update: record.last_update,
        },
    ))
}

fn parse_mob(raw: &str, value: toml::Value) -> MarketResult<(ItemKey, MobEntry)> {
    let key = parse_key(raw)?;
    let record: MobRecord = value
        .try_into()
        .map_err(|err: toml::de::Error| entry_error(raw, err.to_string()))?;
    Ok((
        key,
        MobEntry {
            kill_accumulator: non_negative(raw, "k", record.k)?,
            last_update: record.last_update,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_ledger_{id}.toml"))
    }

    fn cleanup(store: &LedgerStore) {
        fs::remove_file(store.path()).ok();
        fs::remove_file(store.backup_path()).ok();
        fs::remove_file(store.temp_path()).ok();
    }

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let store = LedgerStore::new(temp_ledger_path(), &MarketConfig::default());
        let ledger = MarketLedger::new();
        ledger.set(
            key("DIAMOND"),
            LedgerEntry {
                sold_accumulator: 12.5,
                mined_total: 300.0,
                last_update: 1_000,
            },
        );
        ledger.set_mob(
            key("ENTITY:ZOMBIE"),
            MobEntry {
                kill_accumulator: 4.0,
                last_update: 1_000,
            },
        );
        let saved = store.save(&ledger, 1_000).unwrap();
        assert_eq!(saved, SaveReport { items: 1, mobs: 1 });

        let restored = MarketLedger::new();
        let report = store.load(&restored, 1_000).unwrap();
        assert_eq!(report.source, LoadSource::Primary);
        assert_eq!((report.items, report.mobs, report.skipped), (1, 1, 0));
        assert_eq!(restored.get(&key("DIAMOND")), ledger.get(&key("DIAMOND")));
        assert_eq!(restored.get_mob(&key("ENTITY:ZOMBIE")), ledger.get_mob(&key("ENTITY:ZOMBIE")));
        cleanup(&store);
    }

    #[test]
    fn test_missing_files_start_empty() {
        let store = LedgerStore::new(temp_ledger_path(), &MarketConfig::default());
        let ledger = MarketLedger::new();
        let report = store.load(&ledger, 0).unwrap();
        assert_eq!(report.source, LoadSource::Empty);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_second_save_keeps_backup() {
        let store = LedgerStore::new(temp_ledger_path(), &MarketConfig::default());
        let ledger = MarketLedger::new();
        ledger.update(&key("COAL"), 0, |e| e.sold_accumulator = 1.0);
        store.save(&ledger, 0).unwrap();
        assert!(!store.backup_path().exists());
        ledger.update(&key("COAL"), 0, |e| e.sold_accumulator = 2.0);
        store.save(&ledger, 0).unwrap();
        assert!(store.backup_path().exists());
        assert!(!store.temp_path().exists());
        cleanup(&store);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let store = LedgerStore::new(temp_ledger_path(), &MarketConfig::default());
        fs::write(
            store.path(),
            r#"
            schema = 1
            generated_at = 0

            [items.GOOD]
            s = 1.0
            minedTotal = 2.0
            lastUpdate = 0

            [items.NEGATIVE]
            s = -4.0
            mined_total = 0.0
            last_update = 0

            [items.WRONG_TYPE]
            s = "lots"
            mined_total = 0.0
            last_update = 0

            [mobs."ENTITY:SPIDER"]
            k = 3.0
            last_update = 0
            "#,
        )
        .unwrap();
        let ledger = MarketLedger::new();
        let report = store.load(&ledger, 0).unwrap();
        assert_eq!((report.items, report.mobs, report.skipped), (1, 1, 2));
        assert!((ledger.get(&key("GOOD")).unwrap().mined_total - 2.0).abs() < f64::EPSILON);
        cleanup(&store);
    }
}
