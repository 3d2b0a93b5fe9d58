//! Colony picking into glycerol plates and the colony PCR that checks
//! the picked clones before sequencing.

use crate::bundle::Bundle;
use crate::error::{CompileError, Result};
use crate::instructions::{self, TransferMethod, Worksheet};
use crate::registry::TypedSequence;
use crate::sequence;
use crate::table::{self, Tabular};
use crate::wells::{self, PlateFormat, Well, WellOrder};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::HashMap;
use tracing::debug;

pub const PRIMER_PLATE: &str = "colony_pcr_primer_plate";
pub const NGS_VOLUME_NL: u32 = 100;
/// Colony PCR reaction volume, in µL.
pub const DEFAULT_REACTION_VOLUME_UL: u32 = 10;

/// A transformed construct spread on a Q-tray, as handed to picking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatingRow {
    pub j5_construct_id: u32,
    pub name: String,
    #[serde(rename = "QPLATE")]
    pub qplate: String,
    #[serde(rename = "QWELL")]
    pub qwell: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickingRow {
    #[serde(rename = "Source Barcode")]
    pub source_barcode: String,
    #[serde(rename = "Source Region")]
    pub source_region: String,
    #[serde(rename = "Destination Barcode")]
    pub destination_barcode: String,
    #[serde(rename = "Destination Well")]
    #[serde_as(as = "DisplayFromStr")]
    pub destination_well: Well,
    pub name: String,
}

impl Tabular for PickingRow {
    const COLUMNS: &'static [&'static str] = &[
        "Source Barcode",
        "Source Region",
        "Destination Barcode",
        "Destination Well",
        "name",
    ];
}

/// `colonies` picks per construct, column-major across glycerol plates.
pub fn picking_worksheet(plating: &[PlatingRow], colonies: usize) -> Vec<PickingRow> {
    plating
        .iter()
        .flat_map(|row| std::iter::repeat_n(row, colonies))
        .enumerate()
        .map(|(i, row)| PickingRow {
            source_barcode: row.qplate.clone(),
            source_region: row.qwell.clone(),
            destination_barcode: wells::plate_name("glycerol_plate_{}", i, 96),
            destination_well: wells::well_at(i, WellOrder::ColumnMajor, PlateFormat::Plate96),
            name: row.name.clone(),
        })
        .collect()
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlycerolRow {
    #[serde(rename = "GLYCEROL_PLATE")]
    pub plate: String,
    #[serde(rename = "GLYCEROL_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub well: Well,
    /// Empty for control wells.
    pub name: Option<String>,
}

pub fn glycerol_stocks(picking: &[PickingRow]) -> Vec<GlycerolRow> {
    picking
        .iter()
        .map(|p| GlycerolRow {
            plate: p.destination_barcode.clone(),
            well: p.destination_well,
            name: Some(p.name.clone()).filter(|n| !n.is_empty()),
        })
        .collect()
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyPcrRow {
    #[serde(rename = "GLYCEROL_PLATE")]
    pub glycerol_plate: String,
    #[serde(rename = "GLYCEROL_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub glycerol_well: Well,
    pub name: Option<String>,
    #[serde(rename = "NGS_PLATE")]
    pub ngs_plate: String,
    #[serde(rename = "NGS_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub ngs_well: Well,
    #[serde(rename = "NGS_VOLUME")]
    pub ngs_volume: u32,
    #[serde(rename = "PRIMER1_SEQ")]
    pub primer1_seq: String,
    #[serde(rename = "PRIMER1_PLATE")]
    pub primer1_plate: String,
    #[serde(rename = "PRIMER1_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub primer1_well: Well,
    #[serde(rename = "PRIMER1_VOLUME")]
    pub primer1_volume: u32,
    #[serde(rename = "PRIMER2_SEQ")]
    pub primer2_seq: String,
    #[serde(rename = "PRIMER2_PLATE")]
    pub primer2_plate: String,
    #[serde(rename = "PRIMER2_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub primer2_well: Well,
    #[serde(rename = "PRIMER2_VOLUME")]
    pub primer2_volume: u32,
    #[serde(rename = "PCR_LENGTH")]
    pub pcr_length: usize,
    #[serde(rename = "COLONY_PCR_PLATE")]
    pub colony_pcr_plate: String,
    #[serde(rename = "COLONY_PCR_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub colony_pcr_well: Well,
}

impl Tabular for ColonyPcrRow {
    const COLUMNS: &'static [&'static str] = &[
        "GLYCEROL_PLATE",
        "GLYCEROL_WELL",
        "name",
        "NGS_PLATE",
        "NGS_WELL",
        "NGS_VOLUME",
        "PRIMER1_SEQ",
        "PRIMER1_PLATE",
        "PRIMER1_WELL",
        "PRIMER1_VOLUME",
        "PRIMER2_SEQ",
        "PRIMER2_PLATE",
        "PRIMER2_WELL",
        "PRIMER2_VOLUME",
        "PCR_LENGTH",
        "COLONY_PCR_PLATE",
        "COLONY_PCR_WELL",
    ];
}

/// Primers and operator details shared by every colony PCR of a run.
#[derive(Debug, Clone)]
pub struct ColonyPcrSetup<'a> {
    pub forward_primer: &'a str,
    pub reverse_primer: &'a str,
    pub username: &'a str,
    /// `yymmdd`
    pub date: &'a str,
    pub reaction_volume_ul: u32,
}

/// Four glycerol plates are stamped into the quadrants of one 384-well NGS
/// plate; each colony gets a PCR on `colony_pcr_plate_N`, column-major.
pub fn colony_pcr_worksheet(
    glycerol: &[GlycerolRow],
    plasmids: &[TypedSequence],
    setup: &ColonyPcrSetup<'_>,
) -> Result<Vec<ColonyPcrRow>> {
    let bases: HashMap<&str, &str> = plasmids
        .iter()
        .map(|p| (p.name.as_str(), p.bases.as_str()))
        .collect();
    let primer_well = |text: &str| Well::parse(text);
    let primer_volume = 4 * setup.reaction_volume_ul;
    glycerol
        .iter()
        .enumerate()
        .map(|(i, stock)| {
            let plate = wells::plate_number(&stock.plate)?;
            let pcr_length = match &stock.name {
                Some(name) => {
                    let template = bases.get(name.as_str()).ok_or_else(|| {
                        CompileError::InvalidInput(format!("no plasmid sequence for '{name}'"))
                    })?;
                    sequence::simulate_pcr(template, setup.forward_primer, setup.reverse_primer)
                        .map_err(|e| CompileError::InvalidInput(format!("{name}: {e}")))?
                        .0
                }
                None => 0,
            };
            debug!("Colony {}#{} PCR length {pcr_length}", stock.plate, stock.well);
            Ok(ColonyPcrRow {
                glycerol_plate: stock.plate.clone(),
                glycerol_well: stock.well,
                name: stock.name.clone(),
                ngs_plate: format!("{} {} {}", setup.username, (plate - 1) / 4 + 1, setup.date),
                ngs_well: wells::stamp(stock.well, (plate - 1) % 4)?,
                ngs_volume: NGS_VOLUME_NL,
                primer1_seq: setup.forward_primer.to_string(),
                primer1_plate: PRIMER_PLATE.to_string(),
                primer1_well: primer_well("O22")?,
                primer1_volume: primer_volume,
                primer2_seq: setup.reverse_primer.to_string(),
                primer2_plate: PRIMER_PLATE.to_string(),
                primer2_well: primer_well("O24")?,
                primer2_volume: primer_volume,
                pcr_length,
                colony_pcr_plate: wells::plate_name("colony_pcr_plate_{}", i, 96),
                colony_pcr_well: wells::well_at(i, WellOrder::ColumnMajor, PlateFormat::Plate96),
            })
        })
        .collect()
}

/// Colony PCR worksheet and its Echo instructions under `colony_pcr/`.
pub fn colony_pcr(
    glycerol: &[GlycerolRow],
    plasmids: &[TypedSequence],
    setup: &ColonyPcrSetup<'_>,
) -> Result<Bundle> {
    let worksheet = colony_pcr_worksheet(glycerol, plasmids, setup)?;
    let echo = instructions::generate(TransferMethod::ColonyPcr, Worksheet::ColonyPcr(&worksheet))?;
    let mut bundle = Bundle::default();
    bundle.insert("colony_pcr/colony_pcr_worksheet.csv", table::to_csv(&worksheet)?);
    bundle.insert("colony_pcr/colony_pcr_echo_instructions.csv", table::to_csv(&echo)?);
    Ok(bundle)
}
