use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domain::Instrument;
use crate::error::EngineError;

/// 외부에서 받는 시드 카탈로그 한 줄 (camelCase JSON)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    name_kr: Option<String>,
    #[serde(default)]
    location: String,
    price: f64,
    prev_price: f64,
    // changeRate는 읽지 않는다. price/prev_price에서 다시 계산한다.
    #[serde(default, alias = "volume24h")]
    volume: f64,
}

impl From<CatalogEntry> for Instrument {
    fn from(entry: CatalogEntry) -> Self {
        let name = entry
            .name_kr
            .or(entry.name)
            .unwrap_or_else(|| entry.id.clone());
        Instrument::new(
            entry.id,
            name,
            entry.location,
            entry.price,
            entry.prev_price,
            entry.volume,
        )
    }
}

pub fn parse_catalog(json: &str) -> Result<Vec<Instrument>, EngineError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)
        .map_err(|e| EngineError::Catalog(format!("Failed to parse catalog: {}", e)))?;
    Ok(entries.into_iter().map(Instrument::from).collect())
}

pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<Instrument>, EngineError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Catalog(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let instruments = parse_catalog(&content)?;
    info!("카탈로그 로드: {}개 종목 ({})", instruments.len(), path.display());
    Ok(instruments)
}
