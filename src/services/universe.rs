//! Symbol universe: the union of futures listings across enabled venues,
//! cached in the store and rebuilt at most once a day.

use crate::error::Result;
use crate::services::store::Store;
use crate::sources::{normalize_symbol, SourceRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Rebuild the cached universe after this long.
const MAX_AGE_HOURS: i64 = 24;

/// Quote-side and pegged assets that are never scan targets.
const STABLES: &[&str] = &["USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "USDE"];

/// Builds and caches the symbol → futures-exchanges map.
pub struct UniverseBuilder {
    store: Arc<Store>,
}

impl UniverseBuilder {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Cached universe when fresh enough, otherwise a rebuild from the
    /// venues. A venue that fails listing is skipped, not fatal, as long as
    /// at least one lists something.
    pub async fn get_or_build(
        &self,
        sources: &SourceRegistry,
        now: i64,
    ) -> Result<HashMap<String, Vec<String>>> {
        if let Some((oldest, cached)) = self.store.load_universe()? {
            let age_hours = (now - oldest) / 3_600_000;
            if age_hours < MAX_AGE_HOURS && !cached.is_empty() {
                info!(symbols = cached.len(), age_hours, "using cached universe");
                return Ok(cached);
            }
        }
        self.build(sources, now).await
    }

    /// Union the futures listings of every enabled venue.
    pub async fn build(
        &self,
        sources: &SourceRegistry,
        now: i64,
    ) -> Result<HashMap<String, Vec<String>>> {
        let mut universe: HashMap<String, Vec<String>> = HashMap::new();
        let mut listed_anywhere = false;

        for source in sources.iter() {
            match source.list_futures_symbols().await {
                Ok(symbols) => {
                    listed_anywhere = true;
                    info!(exchange = source.name(), count = symbols.len(), "futures listings");
                    for raw in symbols {
                        let symbol = normalize_symbol(&raw);
                        if symbol.is_empty() || STABLES.contains(&symbol.as_str()) {
                            continue;
                        }
                        let exchanges = universe.entry(symbol).or_default();
                        if !exchanges.iter().any(|e| e == source.name()) {
                            exchanges.push(source.name().to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(exchange = source.name(), "listing failed: {}", e);
                }
            }
        }

        if !listed_anywhere {
            return Err(crate::error::ScanError::TransientFetch(
                "every exchange failed to list futures symbols".into(),
            ));
        }

        for exchanges in universe.values_mut() {
            exchanges.sort();
        }
        self.store.store_universe(&universe, now)?;
        info!(symbols = universe.len(), "universe rebuilt");
        Ok(universe)
    }
}
