//! Compiler configuration, loadable from a JSON file. Every field has a
//! default so partial files are accepted.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_TM_SERVICE_URL: &str = "https://tmapi.neb.com/tm/batch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TmServiceMode {
    /// Query the remote annealing-temperature service.
    #[default]
    Neb,
    /// Use the mean oligo Tm already present in the design.
    Design,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmServiceSettings {
    pub mode: TmServiceMode,
    pub url: String,
    pub concentration: f64,
    pub prodcode: String,
    pub email: String,
    pub attempts: usize,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub max_batch: usize,
}

impl Default for TmServiceSettings {
    fn default() -> Self {
        Self {
            mode: TmServiceMode::default(),
            url: DEFAULT_TM_SERVICE_URL.to_string(),
            concentration: 0.5,
            prodcode: "q5-0".to_string(),
            email: "no-reply@example.org".to_string(),
            attempts: 3,
            backoff_ms: 3000,
            timeout_secs: 60,
            max_batch: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquimolarSettings {
    pub max_fmol: f64,
    /// Final reaction volume in µL.
    pub max_vol: f64,
    pub max_part_percentage: f64,
}

impl Default for EquimolarSettings {
    fn default() -> Self {
        Self {
            max_fmol: 100.0,
            max_vol: 5.0,
            max_part_percentage: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    pub principal_investigator: String,
    pub principal_investigator_email: String,
    pub intellectual_property: String,
    pub biosafety_level: u8,
    pub keywords: String,
    pub notes: String,
    pub status: String,
    pub strain_name_prefix: String,
    pub creator: String,
    pub creator_email: String,
    pub host: String,
    pub genotype: String,
    pub circular: bool,
    pub selection_marker: String,
    pub strain_selection_marker: String,
    pub backbone: String,
    pub replicates_in: String,
    pub ori: String,
    pub promoters: String,
    pub plasmid_use: String,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            principal_investigator: "Principal Investigator Name".to_string(),
            principal_investigator_email: "Principal Investigator Email".to_string(),
            intellectual_property: "N/A".to_string(),
            biosafety_level: 1,
            keywords: String::new(),
            notes: String::new(),
            status: "In Progress".to_string(),
            strain_name_prefix: "strain_".to_string(),
            creator: "Creator Name".to_string(),
            creator_email: "Creator Email".to_string(),
            host: "E. coli".to_string(),
            genotype: "DH5-alpha".to_string(),
            circular: true,
            selection_marker: "kan".to_string(),
            strain_selection_marker: "kan".to_string(),
            backbone: "pET28".to_string(),
            replicates_in: "E. coli".to_string(),
            ori: "colE1".to_string(),
            promoters: "T7".to_string(),
            plasmid_use: "expression".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingSettings {
    pub colonies_per_construct: usize,
}

impl Default for PickingSettings {
    fn default() -> Self {
        Self {
            colonies_per_construct: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub max_well_uses: usize,
    pub operator_email: String,
    pub tm_service: TmServiceSettings,
    pub equimolar: EquimolarSettings,
    pub registry: RegistryOptions,
    pub picking: PickingSettings,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            max_well_uses: 8,
            operator_email: "operator@example.org".to_string(),
            tm_service: TmServiceSettings::default(),
            equimolar: EquimolarSettings::default(),
            registry: RegistryOptions::default(),
            picking: PickingSettings::default(),
        }
    }
}

impl CompilerSettings {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        Ok(settings)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: CompilerSettings =
            serde_json::from_str(r#"{"max_well_uses": 4, "tm_service": {"mode": "design"}}"#)
                .unwrap();
        assert_eq!(settings.max_well_uses, 4);
        assert_eq!(settings.tm_service.mode, TmServiceMode::Design);
        assert_eq!(settings.tm_service.attempts, 3);
        assert_eq!(settings.equimolar.max_vol, 5.0);
        assert_eq!(settings.registry.strain_name_prefix, "strain_");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = CompilerSettings::default();
        settings.equimolar.max_fmol = 50.0;
        settings.save_to_path(&path).unwrap();
        let loaded = CompilerSettings::load_from_path(&path).unwrap();
        assert_eq!(loaded, settings);
    }
}
