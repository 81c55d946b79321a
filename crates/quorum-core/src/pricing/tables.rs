//! Rate-table file formats.
//!
//! Four independently loadable JSON documents, one per provider family.
//! Each loader tolerates a missing or malformed file by returning an empty
//! table; lookups then resolve to the documented fallback rates instead of
//! failing the request.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Anthropic catalog: rates per million tokens.
///
/// ```json
/// { "models": [ { "model": "Claude 3.5 Sonnet", "input": 3.0, "output": 15.0 } ] }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicTable {
    #[serde(default)]
    pub models: Vec<FlatEntry>,
}

/// Meta catalog: rates per thousand tokens, bucketed by model family.
///
/// ```json
/// { "models": { "llama_3_1": [ { "model": "Llama 3.1 70B Instruct",
///   "on_demand": { "input": 0.00099, "output": 0.00099 } } ] } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaTable {
    #[serde(default)]
    pub models: BTreeMap<String, Vec<MetaEntry>>,
}

/// OpenAI catalog: rates per million tokens, tiered; only the standard
/// tier is consulted. Entry order is significant (first match wins).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiTable {
    #[serde(default)]
    pub tiers: OpenAiTiers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiTiers {
    #[serde(default)]
    pub standard: Vec<FlatEntry>,
}

/// GCP Vertex catalog: rates per million tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcpTable {
    #[serde(default)]
    pub models: Vec<FlatEntry>,
}

/// A catalog row with direct input/output rates.
#[derive(Debug, Clone, Deserialize)]
pub struct FlatEntry {
    pub model: String,
    pub input: f64,
    pub output: f64,
}

/// A Meta catalog row; rates live under `on_demand`.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaEntry {
    pub model: String,
    pub on_demand: OnDemandRates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnDemandRates {
    pub input: f64,
    pub output: f64,
}

/// Load one table, degrading to the empty default on any failure.
pub fn load_table<T>(path: &Path) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed rate table, using empty");
                T::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "rate table unavailable, using empty");
            T::default()
        }
    }
}
