//! Equimolar pooling: per assembly reaction, the part volumes that put the
//! same number of femtomoles of every part into the reaction, topped off
//! with water to the final reaction volume.

use crate::assembly::AssemblyRow;
use crate::bundle::Bundle;
use crate::error::Result;
use crate::instructions::{self, TransferMethod, Worksheet};
use crate::lp::{LinearProgram, Outcome, Relation};
use crate::parts::QuantRow;
use crate::settings::EquimolarSettings;
use crate::table::{self, Tabular};
use crate::wells::{self, PlateFormat, Well};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Water held by one well of the water plate, in µL.
const WATER_PER_WELL_UL: f64 = 45.0;
const WATER_TOLERANCE_UL: f64 = 1e-3;
pub const WATER: &str = "water";
pub const STANDALONE_DIR: &str = "equimolar_assembly_instructions";

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquimolarRow {
    #[serde(rename = "Number")]
    pub number: u32,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Part Name")]
    pub part_name: String,
    #[serde(rename = "Part ID")]
    pub part_id: Option<u32>,
    #[serde(rename = "Part Order")]
    pub part_order: Option<usize>,
    #[serde(rename = "Source Plate")]
    pub source_plate: String,
    #[serde(rename = "Source Well")]
    #[serde_as(as = "DisplayFromStr")]
    pub source_well: Well,
    #[serde(rename = "Destination Plate")]
    pub destination_plate: String,
    #[serde(rename = "Destination Well")]
    #[serde_as(as = "DisplayFromStr")]
    pub destination_well: Well,
    #[serde(rename = "PART_LENGTH")]
    pub part_length: Option<usize>,
    #[serde(rename = "Conc (ng/uL)")]
    pub concentration_ng: Option<f64>,
    #[serde(rename = "Conc (fmol/uL)")]
    pub concentration_fmol: Option<f64>,
    #[serde(rename = "EQUIMOLAR_VOLUME")]
    pub volume_ul: f64,
    #[serde(rename = "fmol_used")]
    pub fmol_used: Option<f64>,
    #[serde(rename = "Transfer Volume")]
    pub transfer_volume: u32,
}

impl Tabular for EquimolarRow {
    const COLUMNS: &'static [&'static str] = &[
        "Number",
        "Name",
        "Part Name",
        "Part ID",
        "Part Order",
        "Source Plate",
        "Source Well",
        "Destination Plate",
        "Destination Well",
        "PART_LENGTH",
        "Conc (ng/uL)",
        "Conc (fmol/uL)",
        "EQUIMOLAR_VOLUME",
        "fmol_used",
        "Transfer Volume",
    ];
}

/// Molar concentration of double stranded DNA of `length` bp.
pub fn fmol_per_ul(ng_per_ul: f64, length: usize) -> f64 {
    (ng_per_ul * 1e-6) / (length as f64 * 617.96 + 36.04) * 1e12
}

/// Echo transfers are whole nanoliters.
pub fn transfer_nl(volume_ul: f64) -> u32 {
    (volume_ul * 1000.0).round().max(0.0) as u32
}

/// Volumes (µL) of each part maximizing the pooled femtomoles while every
/// part contributes the same amount. Anything but an optimum yields zeros.
pub fn optimize_reaction(concentrations: &[f64], settings: &EquimolarSettings) -> Vec<f64> {
    let n = concentrations.len();
    if n == 0 {
        return vec![];
    }
    if concentrations.iter().any(|c| !c.is_finite() || *c <= 0.0) {
        warn!("Unusable concentrations {concentrations:?}, skipping equimolar optimization");
        return vec![0.0; n];
    }
    let part_cap = settings.max_vol * settings.max_part_percentage;
    let mut program = LinearProgram::maximize(concentrations.to_vec());
    for (i, c) in concentrations.iter().enumerate() {
        let mut row = vec![0.0; n];
        row[i] = *c;
        program = program
            .constrain(row, Relation::LessEqual, settings.max_fmol)
            .upper_bound(i, part_cap);
    }
    program = program.constrain(vec![1.0; n], Relation::LessEqual, settings.max_vol);
    for (i, pair) in concentrations.windows(2).enumerate() {
        let mut row = vec![0.0; n];
        row[i] = pair[0];
        row[i + 1] = -pair[1];
        program = program.constrain(row, Relation::Equal, 0.0);
    }
    match program.solve() {
        Outcome::Optimal { x, .. } => x,
        other => {
            warn!("Equimolar optimization failed ({other:?}), using zero volumes");
            vec![0.0; n]
        }
    }
}

/// Appends one water transfer per reaction that is short of the final
/// volume. Water is drawn from consecutive 45 µL wells of 384-well plates.
pub fn add_water(rows: &mut Vec<EquimolarRow>, max_vol: f64) {
    let reactions: Vec<(u32, f64, String, Well)> = rows
        .iter()
        .chunk_by(|r| r.number)
        .into_iter()
        .map(|(number, members)| {
            let members: Vec<&EquimolarRow> = members.collect();
            let used: f64 = members.iter().map(|r| r.volume_ul).sum();
            (
                number,
                max_vol - used,
                members[0].destination_plate.clone(),
                members[0].destination_well,
            )
        })
        .filter(|(_, water, _, _)| water.abs() > WATER_TOLERANCE_UL)
        .collect();
    let mut cumulative = 0.0;
    for (number, water, destination_plate, destination_well) in reactions {
        cumulative += water;
        let bucket = (cumulative / WATER_PER_WELL_UL).floor().max(0.0) as usize;
        rows.push(EquimolarRow {
            number,
            name: None,
            part_name: WATER.to_string(),
            part_id: None,
            part_order: None,
            source_plate: format!("water_plate_{}", bucket / 384 + 1),
            source_well: wells::index_to_well(bucket, PlateFormat::Plate384),
            destination_plate,
            destination_well,
            part_length: None,
            concentration_ng: None,
            concentration_fmol: None,
            volume_ul: water,
            fmol_used: None,
            transfer_volume: transfer_nl(water),
        });
    }
}

/// Joins the assembly worksheet with measured concentrations and solves
/// every reaction.
pub fn equimolar_worksheet(
    assembly: &[AssemblyRow],
    quant: &[QuantRow],
    settings: &EquimolarSettings,
) -> Vec<EquimolarRow> {
    let measured: HashMap<(&str, Well), &QuantRow> = quant
        .iter()
        .map(|q| ((q.part_plate.as_str(), q.part_well), q))
        .collect();
    let joined: Vec<(&AssemblyRow, &QuantRow)> = assembly
        .iter()
        .filter_map(|row| {
            let found = measured.get(&(row.source_plate.as_str(), row.source_well));
            if found.is_none() {
                warn!(
                    "No quantification for {}#{} ({}), dropped from equimolar pooling",
                    row.source_plate, row.source_well, row.part_name
                );
            }
            found.map(|q| (row, *q))
        })
        .sorted_by_key(|(row, _)| (row.number, row.part_order))
        .collect();

    let mut rows = Vec::with_capacity(joined.len());
    for (number, members) in &joined.iter().chunk_by(|(row, _)| row.number) {
        let members: Vec<_> = members.collect();
        let concentrations: Vec<f64> = members
            .iter()
            .map(|(_, q)| fmol_per_ul(q.concentration, q.part_length))
            .collect();
        let volumes = optimize_reaction(&concentrations, settings);
        debug!("Reaction {number}: volumes {volumes:?}");
        for (((row, q), conc), volume) in members.iter().zip(&concentrations).zip(&volumes) {
            rows.push(EquimolarRow {
                number: row.number,
                name: Some(row.name.clone()),
                part_name: row.part_name.clone(),
                part_id: Some(row.part_id),
                part_order: Some(row.part_order),
                source_plate: row.source_plate.clone(),
                source_well: row.source_well,
                destination_plate: row.destination_plate.clone(),
                destination_well: row.destination_well,
                part_length: Some(q.part_length),
                concentration_ng: Some(q.concentration),
                concentration_fmol: Some(*conc),
                volume_ul: *volume,
                fmol_used: Some(conc * volume),
                transfer_volume: transfer_nl(*volume),
            });
        }
    }
    add_water(&mut rows, settings.max_vol);
    rows
}

/// Equimolar pooling from an assembly worksheet and a quantification
/// worksheet given as CSV text.
pub fn standalone(assembly_csv: &str, quant_csv: &str, settings: &EquimolarSettings) -> Result<Bundle> {
    let assembly: Vec<AssemblyRow> = table::from_csv(assembly_csv)?;
    let quant: Vec<QuantRow> = table::from_csv(quant_csv)?;
    let worksheet = equimolar_worksheet(&assembly, &quant, settings);
    let echo = instructions::generate(TransferMethod::Equimolar, Worksheet::Equimolar(&worksheet))?;
    let mut bundle = Bundle::default();
    bundle.insert(
        format!("{STANDALONE_DIR}/equimolar_assembly_worksheet.csv"),
        table::to_csv(&worksheet)?,
    );
    bundle.insert(
        format!("{STANDALONE_DIR}/equimolar_assembly_echo_instructions.csv"),
        table::to_csv(&echo)?,
    );
    Ok(bundle)
}
