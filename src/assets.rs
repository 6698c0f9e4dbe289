//! Asset catalog: which assets each exchange pair trades, under which symbols.
//!
//! The on-disk format accepts either a single symbol (same on both venues) or a
//! per-exchange map. Everything is normalized here into [`AssetMapping`] so the
//! engine only ever sees explicit per-exchange symbols.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, MappingError};
use crate::shutdown::Shutdown;

/// Ordered pair of exchanges, written `first-second`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangePair {
    pub first: String,
    pub second: String,
}

impl ExchangePair {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            first: first.trim().to_lowercase(),
            second: second.trim().to_lowercase(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().split_once('-') {
            Some((a, b))
                if !a.trim().is_empty()
                    && !b.trim().is_empty()
                    && !b.contains('-')
                    && !a.trim().eq_ignore_ascii_case(b.trim()) =>
            {
                Ok(Self::new(a, b))
            }
            _ => Err(ConfigError::InvalidPair(raw.to_string())),
        }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExchangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// asset -> (exchange -> symbol) for one exchange pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMapping {
    assets: BTreeMap<String, BTreeMap<String, String>>,
}

impl AssetMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: &str, exchange: &str, symbol: &str) {
        self.assets
            .entry(asset.to_string())
            .or_default()
            .insert(exchange.trim().to_lowercase(), symbol.to_string());
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.assets.contains_key(asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Symbols of `asset` on the pair's first and second exchange
    pub fn symbols_for(&self, asset: &str, pair: &ExchangePair) -> Result<(&str, &str), MappingError> {
        let symbols = self.assets.get(asset);
        let lookup = |exchange: &str| {
            symbols
                .and_then(|s| s.get(exchange))
                .map(String::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| MappingError::MissingSymbol {
                    asset: asset.to_string(),
                    exchange: exchange.to_string(),
                })
        };
        Ok((lookup(&pair.first)?, lookup(&pair.second)?))
    }

    fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.assets.retain(|asset, _| keep(asset));
    }
}

/// Every monitored pair's mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetCatalog {
    pairs: BTreeMap<ExchangePair, AssetMapping>,
}

impl AssetCatalog {
    pub fn insert(&mut self, pair: ExchangePair, mapping: AssetMapping) {
        self.pairs.insert(pair, mapping);
    }

    pub fn mapping(&self, pair: &ExchangePair) -> Option<&AssetMapping> {
        self.pairs.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &ExchangePair> {
        self.pairs.keys()
    }

    pub fn asset_count(&self) -> usize {
        self.pairs.values().map(AssetMapping::len).sum()
    }
}

/// Catalog shared between the reloader and the monitors. Monitors take one
/// snapshot per round, so a reload never changes a round in progress.
#[derive(Debug, Clone, Default)]
pub struct SharedAssets {
    inner: Arc<RwLock<Arc<AssetCatalog>>>,
}

impl SharedAssets {
    pub fn new(catalog: AssetCatalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<AssetCatalog> {
        self.inner.read().clone()
    }

    pub fn replace(&self, catalog: AssetCatalog) {
        *self.inner.write() = Arc::new(catalog);
    }
}

// ============== FILE FORMAT ==============

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSymbols {
    Same(String),
    PerExchange(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct AddEntry {
    normalized: Option<String>,
    source: Option<String>,
    dest: Option<String>,
}

type RawCatalog = BTreeMap<String, BTreeMap<String, RawSymbols>>;
type RemoveFile = BTreeMap<String, Vec<String>>;
type AddFile = BTreeMap<String, Vec<AddEntry>>;

#[derive(Debug, Clone)]
pub struct AssetFiles {
    pub assets: PathBuf,
    pub remove: PathBuf,
    pub add: PathBuf,
}

/// Reads the asset file and applies the remove/add adjustments and the quote
/// filter.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    files: AssetFiles,
    allowed_quotes: HashSet<String>,
}

impl AssetLoader {
    pub fn new(files: AssetFiles, allowed_quotes: &[String]) -> Self {
        Self {
            files,
            allowed_quotes: allowed_quotes.iter().map(|q| q.trim().to_uppercase()).collect(),
        }
    }

    pub fn load(&self) -> Result<AssetCatalog, ConfigError> {
        let raw: RawCatalog = read_json(&self.files.assets)?;
        let removals: RemoveFile = read_optional(&self.files.remove);
        let additions: AddFile = read_optional(&self.files.add);

        let mut catalog = AssetCatalog::default();

        for (key, entries) in raw {
            let pair = ExchangePair::parse(&key)?;
            let mut mapping = AssetMapping::new();
            for (asset, symbols) in entries {
                match symbols {
                    RawSymbols::Same(symbol) => {
                        mapping.insert(&asset, &pair.first, &symbol);
                        mapping.insert(&asset, &pair.second, &symbol);
                    }
                    RawSymbols::PerExchange(map) => {
                        for (exchange, symbol) in map {
                            mapping.insert(&asset, &exchange, &symbol);
                        }
                    }
                }
            }
            catalog.insert(pair, mapping);
        }

        for (key, remove_list) in &removals {
            let Ok(pair) = ExchangePair::parse(key) else {
                warn!("Ignoring removals for invalid pair '{}'", key);
                continue;
            };
            if let Some(mapping) = catalog.pairs.get_mut(&pair) {
                let before = mapping.len();
                mapping.retain(|asset| !should_remove(asset, remove_list));
                info!("Configuration {}: removed {} assets", pair, before - mapping.len());
            }
        }

        for (key, entries) in &additions {
            let Ok(pair) = ExchangePair::parse(key) else {
                warn!("Ignoring additions for invalid pair '{}'", key);
                continue;
            };
            let mapping = catalog.pairs.entry(pair.clone()).or_default();
            for entry in entries {
                let Some(asset) = entry.normalized.as_deref().filter(|a| !a.is_empty()) else {
                    continue;
                };
                if mapping.contains(asset) {
                    continue;
                }
                // a missing symbol is kept so the monitor reports the entry as malformed
                if let Some(source) = &entry.source {
                    mapping.insert(asset, &pair.first, source);
                }
                if let Some(dest) = &entry.dest {
                    mapping.insert(asset, &pair.second, dest);
                }
                if !mapping.contains(asset) {
                    mapping.assets.insert(asset.to_string(), BTreeMap::new());
                }
                info!("Configuration {}: added asset {}", pair, asset);
            }
        }

        if !self.allowed_quotes.is_empty() {
            for (pair, mapping) in catalog.pairs.iter_mut() {
                let before = mapping.len();
                mapping.retain(|asset| self.quote_allowed(asset));
                let dropped = before - mapping.len();
                if dropped > 0 {
                    debug!("Configuration {}: dropped {} assets outside allowed quotes", pair, dropped);
                }
            }
        }

        for (pair, mapping) in &catalog.pairs {
            if mapping.is_empty() {
                warn!("Configuration {}: no assets left to monitor", pair);
            }
        }

        Ok(catalog)
    }

    /// Assets written `BASE/QUOTE` must quote in an allowed currency; bare
    /// identifiers pass.
    fn quote_allowed(&self, asset: &str) -> bool {
        match asset.rsplit_once('/') {
            Some((_, quote)) => self.allowed_quotes.contains(&quote.to_uppercase()),
            None => true,
        }
    }
}

fn should_remove(asset: &str, remove_list: &[String]) -> bool {
    remove_list
        .iter()
        .any(|r| asset == r || asset.strip_prefix(r.as_str()).is_some_and(|rest| rest.starts_with('/')))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::AssetsIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::AssetsParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Adjustment files are optional; anything unreadable is treated as empty
fn read_optional<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(value) => {
            info!("Loaded {}", path.display());
            value
        }
        Err(e) => {
            warn!("Failed to load {}: {}", path.display(), e);
            T::default()
        }
    }
}

/// Reload the catalog every `every` until shutdown. A failed reload keeps the
/// catalog currently in use.
pub fn spawn_reloader(
    loader: AssetLoader,
    shared: SharedAssets,
    every: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick fires immediately; the catalog was just loaded
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // file reads block; keep them off the runtime workers the monitors use
            let loading = loader.clone();
            match tokio::task::spawn_blocking(move || loading.load()).await {
                Ok(Ok(catalog)) => {
                    info!(
                        "Reloaded asset catalog: {} pairs, {} assets",
                        catalog.pairs.len(),
                        catalog.asset_count()
                    );
                    shared.replace(catalog);
                }
                Ok(Err(e)) => warn!("Asset reload failed, keeping previous catalog: {}", e),
                Err(e) => warn!("Asset reload task failed, keeping previous catalog: {}", e),
            }
        }
        debug!("Asset reloader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    /// Fresh scratch directory per test
    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cex-arb-assets-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn files_in(dir: &Path) -> AssetFiles {
        AssetFiles {
            assets: dir.join("common_assets.json"),
            remove: dir.join("assets_to_remove.json"),
            add: dir.join("assets_to_add.json"),
        }
    }

    fn quotes() -> Vec<String> {
        vec!["USDT".to_string(), "EUR".to_string()]
    }

    #[test]
    fn test_pair_parse() {
        let pair = ExchangePair::parse(" Binance-kucoin ").unwrap();
        assert_eq!(pair, ExchangePair::new("binance", "kucoin"));
        assert_eq!(pair.key(), "binance-kucoin");

        assert!(ExchangePair::parse("binance").is_err());
        assert!(ExchangePair::parse("binance-").is_err());
        assert!(ExchangePair::parse("a-b-c").is_err());
        assert!(ExchangePair::parse("binance-binance").is_err());
    }

    #[test]
    fn test_symbols_for_missing_exchange() {
        let pair = ExchangePair::new("binance", "kucoin");
        let mut mapping = AssetMapping::new();
        mapping.insert("ABC/USDT", "binance", "ABC/USDT");
        mapping.insert("ABC/USDT", "kucoin", "ABC/USDT");
        mapping.insert("XYZ/USDT", "binance", "XYZ/USDT");

        assert_eq!(mapping.symbols_for("ABC/USDT", &pair).unwrap(), ("ABC/USDT", "ABC/USDT"));
        assert_eq!(
            mapping.symbols_for("XYZ/USDT", &pair),
            Err(MappingError::MissingSymbol {
                asset: "XYZ/USDT".to_string(),
                exchange: "kucoin".to_string(),
            })
        );
    }

    #[test]
    fn test_load_applies_adjustments() {
        let dir = scratch_dir();
        let files = files_in(&dir);
        std::fs::write(
            &files.assets,
            r#"{
                "binance-kucoin": {
                    "ABC/USDT": "ABC/USDT",
                    "RNDR/USDT": {"binance": "RNDR/USDT", "kucoin": "RENDER/USDT"},
                    "OLD/USDT": "OLD/USDT",
                    "OLD": "OLD/USDT",
                    "OLDER/USDT": "OLDER/USDT",
                    "ABC/BTC": "ABC/BTC"
                }
            }"#,
        )
        .unwrap();
        std::fs::write(&files.remove, r#"{"binance-kucoin": ["OLD"]}"#).unwrap();
        std::fs::write(
            &files.add,
            r#"{"binance-kucoin": [
                {"normalized": "NEW/USDT", "source": "NEW/USDT", "dest": "NEW2/USDT"},
                {"normalized": "ABC/USDT", "source": "X", "dest": "Y"}
            ]}"#,
        )
        .unwrap();

        let catalog = AssetLoader::new(files, &quotes()).load().unwrap();
        let pair = ExchangePair::new("binance", "kucoin");
        let mapping = catalog.mapping(&pair).unwrap();
        let assets: Vec<&str> = mapping.assets().collect();

        assert_eq!(assets, vec!["ABC/USDT", "NEW/USDT", "OLDER/USDT", "RNDR/USDT"]);
        assert_eq!(mapping.symbols_for("RNDR/USDT", &pair).unwrap(), ("RNDR/USDT", "RENDER/USDT"));
        assert_eq!(mapping.symbols_for("NEW/USDT", &pair).unwrap(), ("NEW/USDT", "NEW2/USDT"));
        assert_eq!(mapping.symbols_for("ABC/USDT", &pair).unwrap(), ("ABC/USDT", "ABC/USDT"));
    }

    #[test]
    fn test_missing_adjustment_files_are_not_errors() {
        let dir = scratch_dir();
        let files = files_in(&dir);
        std::fs::write(&files.assets, r#"{"bitget-bitstamp": {"ABC/EUR": "ABC/EUR"}}"#).unwrap();

        let catalog = AssetLoader::new(files, &quotes()).load().unwrap();

        assert_eq!(catalog.asset_count(), 1);
        assert_eq!(
            catalog.pairs().collect::<Vec<_>>(),
            vec![&ExchangePair::new("bitget", "bitstamp")]
        );
    }

    #[test]
    fn test_missing_or_bad_asset_file_is_config_error() {
        let dir = scratch_dir();
        let files = files_in(&dir);
        let loader = AssetLoader::new(files.clone(), &quotes());

        assert!(matches!(loader.load(), Err(ConfigError::AssetsIo { .. })));

        std::fs::write(&files.assets, "{not json").unwrap();
        assert!(matches!(loader.load(), Err(ConfigError::AssetsParse { .. })));

        std::fs::write(&files.assets, r#"{"binance": {}}"#).unwrap();
        assert!(matches!(loader.load(), Err(ConfigError::InvalidPair(_))));
    }

    #[test]
    fn test_shared_snapshot_survives_replace() {
        let shared = SharedAssets::new(AssetCatalog::default());
        let before = shared.snapshot();

        let mut next = AssetCatalog::default();
        let mut mapping = AssetMapping::new();
        mapping.insert("ABC/USDT", "binance", "ABC/USDT");
        next.insert(ExchangePair::new("binance", "kucoin"), mapping);
        shared.replace(next);

        assert_eq!(before.asset_count(), 0);
        assert_eq!(shared.snapshot().asset_count(), 1);
    }

    #[tokio::test]
    async fn test_reloader_keeps_catalog_on_failure() {
        let dir = scratch_dir();
        let files = files_in(&dir);
        std::fs::write(&files.assets, r#"{"binance-kucoin": {"ABC/USDT": "ABC/USDT"}}"#).unwrap();

        let loader = AssetLoader::new(files.clone(), &quotes());
        let shared = SharedAssets::new(loader.load().unwrap());
        let (trigger, shutdown) = crate::shutdown::channel();

        std::fs::write(&files.assets, "broken").unwrap();
        let handle = spawn_reloader(loader, shared.clone(), Duration::from_millis(20), shutdown);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(shared.snapshot().asset_count(), 1);

        std::fs::write(
            &files.assets,
            r#"{"binance-kucoin": {"ABC/USDT": "ABC/USDT", "XYZ/USDT": "XYZ/USDT"}}"#,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(shared.snapshot().asset_count(), 2);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
