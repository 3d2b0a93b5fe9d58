//! Assembly worksheet (one row per part of each construct) and the
//! construct worksheet derived from it.

use crate::design::{AssemblyMethod, Design};
use crate::distribute;
use crate::error::{CompileError, Result};
use crate::table::Tabular;
use crate::wells::{self, Location, PlateFormat, Well, WellOrder};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{BTreeMap, HashMap};

/// Volume of each part transferred into an assembly reaction, in nL.
pub const ASSEMBLY_TRANSFER_NL: u32 = 2000;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRow {
    #[serde(rename = "Number")]
    pub number: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Assembly Method")]
    pub method: AssemblyMethod,
    #[serde(rename = "Part Name")]
    pub part_name: String,
    #[serde(rename = "Part ID")]
    pub part_id: u32,
    #[serde(rename = "Part Order")]
    pub part_order: usize,
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
    #[serde(rename = "Parts Summary")]
    pub parts_summary: String,
}

impl Tabular for AssemblyRow {
    const COLUMNS: &'static [&'static str] = &[
        "Number",
        "Name",
        "Assembly Method",
        "Part Name",
        "Part ID",
        "Part Order",
        "Source Plate",
        "Source Well",
        "Destination Plate",
        "Destination Well",
        "Parts Summary",
    ];
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructRow {
    pub j5_construct_id: u32,
    pub name: String,
    pub parts: String,
    pub assembly_method: AssemblyMethod,
    pub src_plate: String,
    #[serde_as(as = "DisplayFromStr")]
    pub src_well: Well,
}

impl Tabular for ConstructRow {
    const COLUMNS: &'static [&'static str] = &[
        "j5_construct_id",
        "name",
        "parts",
        "assembly_method",
        "src_plate",
        "src_well",
    ];
}

/// `(promoter)(gfp)` style part names joined into `promoter + gfp`.
pub fn parts_summary<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .collect::<String>()
        .replace(")(", " + ")
        .replace(['(', ')'], "")
}

/// Lays out one reaction per assembly, column-major on 96-well plates of its
/// method, and draws each part from its parts plate wells without exceeding
/// `max_well_uses` draws per well.
pub fn assembly_worksheet(
    design: &Design,
    locations: &BTreeMap<u32, Vec<Location>>,
    max_well_uses: usize,
) -> Result<Vec<AssemblyRow>> {
    let skinny = &design.skinny_assemblies;

    let mut destinations: HashMap<u32, Location> = HashMap::new();
    let mut per_method: HashMap<AssemblyMethod, usize> = HashMap::new();
    for row in skinny.iter().unique_by(|s| s.number) {
        let index = per_method.entry(row.method).or_insert(0);
        let plate = format!("{}_plate_{}", row.method.plate_prefix(), *index / 96 + 1);
        let well = wells::well_at(*index, WellOrder::ColumnMajor, PlateFormat::Plate96);
        destinations.insert(row.number, Location::new(plate, well));
        *index += 1;
    }

    let summaries: HashMap<u32, String> = skinny
        .iter()
        .chunk_by(|s| s.number)
        .into_iter()
        .map(|(number, rows)| (number, parts_summary(rows.map(|r| r.part_name.as_str()))))
        .collect();

    let mut sources: HashMap<u32, std::vec::IntoIter<Location>> = HashMap::new();
    for (part_id, rows) in &skinny.iter().into_group_map_by(|s| s.part_id) {
        let available = locations.get(part_id).map(Vec::as_slice).unwrap_or(&[]);
        let subject = format!("part {part_id} {}", rows[0].part_name);
        let drawn = distribute::distribute_wells(rows.len(), available, max_well_uses, &subject)?;
        sources.insert(*part_id, drawn.into_iter());
    }

    let mut worksheet = Vec::with_capacity(skinny.len());
    for row in skinny {
        let source = sources
            .get_mut(&row.part_id)
            .and_then(Iterator::next)
            .ok_or_else(|| CompileError::ResourceExhaustion {
                subject: format!("part {}", row.part_id),
                required: 1,
                available: 0,
            })?;
        let destination = &destinations[&row.number];
        worksheet.push(AssemblyRow {
            number: row.number,
            name: row.name.clone(),
            method: row.method,
            part_name: row.part_name.clone(),
            part_id: row.part_id,
            part_order: row.part_order,
            source_plate: source.plate,
            source_well: source.well,
            destination_plate: destination.plate.clone(),
            destination_well: destination.well,
            parts_summary: summaries.get(&row.number).cloned().unwrap_or_default(),
        });
    }
    Ok(worksheet)
}

/// First row of every construct.
pub fn construct_worksheet(assembly: &[AssemblyRow]) -> Vec<ConstructRow> {
    assembly
        .iter()
        .unique_by(|r| r.number)
        .sorted_by_key(|r| r.number)
        .map(|r| ConstructRow {
            j5_construct_id: r.number,
            name: r.name.clone(),
            parts: r.parts_summary.clone(),
            assembly_method: r.method,
            src_plate: r.destination_plate.clone(),
            src_well: r.destination_well,
        })
        .collect()
}
