//! Per-part volume accounting: how much of each part the assemblies draw
//! and whether the planned reactions yield enough of it.

use crate::design::{Design, PartType};
use crate::table::{self, Tabular};
use crate::wells::Location;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Volume of a part pipetted into one assembly reaction, in µL.
pub const VOLUME_PER_USE_UL: f64 = 2.0;
/// Elution volume recovered from one part reaction, in µL.
pub const ELUTION_VOLUME_UL: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyVolume {
    #[serde(rename = "PART_ID")]
    pub part_id: u32,
    #[serde(rename = "PART_NAME")]
    pub part_name: String,
    #[serde(rename = "TYPE")]
    pub part_type: PartType,
    #[serde(rename = "TYPE_ID")]
    pub type_id: u32,
    #[serde(rename = "NUMBER_OF_USES")]
    pub uses: usize,
    #[serde(rename = "VOLUME_REQUIRED_(uL)")]
    pub volume_required: f64,
}

impl Tabular for AssemblyVolume {
    const COLUMNS: &'static [&'static str] = &[
        "PART_ID",
        "PART_NAME",
        "TYPE",
        "TYPE_ID",
        "NUMBER_OF_USES",
        "VOLUME_REQUIRED_(uL)",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedVolume {
    #[serde(rename = "PART_ID")]
    pub part_id: u32,
    #[serde(rename = "PART_NAME")]
    pub part_name: String,
    #[serde(rename = "TYPE")]
    pub part_type: PartType,
    #[serde(rename = "TYPE_ID")]
    pub type_id: u32,
    #[serde(rename = "NUMBER_OF_USES")]
    pub uses: usize,
    #[serde(rename = "VOLUME_REQUIRED_(uL)")]
    pub volume_required: f64,
    #[serde(rename = "NUMBER_OF_RXNS_PERFORMED")]
    pub reactions: usize,
    #[serde(rename = "VOLUME_OBTAINED_(uL)")]
    pub volume_obtained: f64,
    #[serde(rename = "ENOUGH_VOLUME", with = "table::flag")]
    pub enough: bool,
    #[serde(rename = "SOURCE_WELLS")]
    pub source_wells: String,
}

impl Tabular for VerifiedVolume {
    const COLUMNS: &'static [&'static str] = &[
        "PART_ID",
        "PART_NAME",
        "TYPE",
        "TYPE_ID",
        "NUMBER_OF_USES",
        "VOLUME_REQUIRED_(uL)",
        "NUMBER_OF_RXNS_PERFORMED",
        "VOLUME_OBTAINED_(uL)",
        "ENOUGH_VOLUME",
        "SOURCE_WELLS",
    ];
}

/// One row per part, in part table order. Parts that no assembly uses keep
/// a zero count.
pub fn assembly_volumes(design: &Design) -> Vec<AssemblyVolume> {
    let counts = design.skinny_assemblies.iter().counts_by(|s| s.part_id);
    design
        .parts
        .iter()
        .map(|part| {
            let uses = counts.get(&part.id).copied().unwrap_or(0);
            AssemblyVolume {
                part_id: part.id,
                part_name: part.name.clone(),
                part_type: part.part_type,
                type_id: part.type_id,
                uses,
                volume_required: uses as f64 * VOLUME_PER_USE_UL,
            }
        })
        .collect()
}

pub fn format_locations(locations: &[Location]) -> String {
    locations.iter().map(Location::to_string).join(";")
}

/// Compares required and obtained volume per part. Shortfalls are reported,
/// never fatal.
pub fn verify_volumes(
    volumes: &[AssemblyVolume],
    locations: &BTreeMap<u32, Vec<Location>>,
) -> Vec<VerifiedVolume> {
    volumes
        .iter()
        .map(|volume| {
            let sources = locations.get(&volume.part_id).map(Vec::as_slice).unwrap_or(&[]);
            let volume_obtained = sources.len() as f64 * ELUTION_VOLUME_UL;
            let enough = volume_obtained > volume.volume_required;
            if !enough {
                warn!(
                    "Part {} ({}) yields {volume_obtained} uL but needs {} uL",
                    volume.part_id, volume.part_name, volume.volume_required
                );
            }
            VerifiedVolume {
                part_id: volume.part_id,
                part_name: volume.part_name.clone(),
                part_type: volume.part_type,
                type_id: volume.type_id,
                uses: volume.uses,
                volume_required: volume.volume_required,
                reactions: sources.len(),
                volume_obtained,
                enough,
                source_wells: format_locations(sources),
            }
        })
        .collect()
}
