//! Optional YAML configuration. Every field can also be given on the command
//! line, and the command line wins.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sums to the lineorder count: every row has exactly one manufacturer.
pub const DEFAULT_CARDINALITY_QUERY: &str = "Count(Bitmap(frame=\"p_mfgr\", rowID=0))
Count(Bitmap(frame=\"p_mfgr\", rowID=1))
Count(Bitmap(frame=\"p_mfgr\", rowID=2))
Count(Bitmap(frame=\"p_mfgr\", rowID=3))
Count(Bitmap(frame=\"p_mfgr\", rowID=4))
";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    pub engine: Option<String>,
    #[serde(default)]
    pub connect: BTreeMap<String, String>,
    pub out_dir: Option<PathBuf>,
    pub catalogue: Option<PathBuf>,
    pub cardinality_query: Option<String>,
    pub snapshot_interval: Option<u64>,
    pub queue_depth: Option<usize>,
    #[serde(default)]
    pub sweep: SweepGrid,
    /// Frames `schema` makes sure exist.
    #[serde(default)]
    pub frames: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SweepGrid {
    #[serde(default)]
    pub concurrency: Vec<usize>,
    #[serde(default)]
    pub batch_size: Vec<usize>,
}

impl BenchConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Connect parameters with `overrides` (from `--connect`) applied on top.
    pub fn connect_params(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut params = self.connect.clone();
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}

/// Frames of the SSB schema as laid out for bitmap indexing.
pub const SSB_FRAMES: [&str; 21] = [
    "lo_quantity",
    "lo_quantity_b",
    "lo_extendedprice",
    "lo_discount",
    "lo_discount_b",
    "lo_revenue",
    "lo_supplycost",
    "lo_profit",
    "lo_revenue_computed",
    "c_city",
    "c_nation",
    "c_region",
    "s_city",
    "s_nation",
    "s_region",
    "p_mfgr",
    "p_category",
    "p_brand1",
    "lo_year",
    "lo_month",
    "lo_weeknum",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg = BenchConfig::from_yaml_str(
            r#"
engine: pilosa
connect:
  host: "pilosa:10101"
  index: ssb
out_dir: /tmp/results
snapshot_interval: 5
sweep:
  concurrency: [1, 4]
  batch_size: [10]
frames: [lo_year]
"#,
        )
        .unwrap();
        assert_eq!(cfg.engine.as_deref(), Some("pilosa"));
        assert_eq!(cfg.connect.get("host").map(String::as_str), Some("pilosa:10101"));
        assert_eq!(cfg.sweep.concurrency, vec![1, 4]);
        assert_eq!(cfg.sweep.batch_size, vec![10]);
        assert_eq!(cfg.snapshot_interval, Some(5));
    }

    #[test]
    fn empty_document_is_default() {
        let cfg = BenchConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, BenchConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BenchConfig::from_yaml_str("concurency: 3").is_err());
    }

    #[test]
    fn cli_connect_overrides_file() {
        let cfg = BenchConfig::from_yaml_str("connect: {host: a, index: ssb}").unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("host".to_string(), "b".to_string());
        let params = cfg.connect_params(&overrides);
        assert_eq!(params.get("host").map(String::as_str), Some("b"));
        assert_eq!(params.get("index").map(String::as_str), Some("ssb"));
    }

    #[test]
    fn default_cardinality_query_has_five_counts() {
        assert_eq!(DEFAULT_CARDINALITY_QUERY.lines().count(), 5);
    }
}
