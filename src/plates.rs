//! Source plate layouts: templates, oligos, synthesized genes, their order
//! forms and the 96-well backup copies.

use crate::design::{Design, Oligo};
use crate::error::{CompileError, Result};
use crate::table::Tabular;
use crate::wells::{self, PlateFormat, Well, WellOrder};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{BTreeSet, HashMap};

pub const SOURCE_VOLUME_UL: u32 = 65;
pub const BACKUP_VOLUME_UL: u32 = 1500;

/// Content class of a plate, as recorded in the workflow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateKind {
    Synth,
    Oligo,
    Template,
    Digest,
    Part,
    Pcr,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateWell {
    #[serde(rename = "PLATE ID")]
    pub plate: String,
    #[serde(rename = "PLATE WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub well: Well,
    #[serde(rename = "LIQUID TYPE")]
    pub liquid: String,
    #[serde(rename = "VOLUME (uL)")]
    pub volume_ul: u32,
}

impl Tabular for PlateWell {
    const COLUMNS: &'static [&'static str] = &["PLATE ID", "PLATE WELL", "LIQUID TYPE", "VOLUME (uL)"];
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthWell {
    #[serde(rename = "PLATE ID")]
    pub plate: String,
    #[serde(rename = "PLATE WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub well: Well,
    #[serde(rename = "LIQUID TYPE")]
    pub liquid: String,
    #[serde(rename = "VOLUME (uL)")]
    pub volume_ul: u32,
    #[serde(rename = "SEQUENCE")]
    pub sequence: String,
}

impl Tabular for SynthWell {
    const COLUMNS: &'static [&'static str] = &[
        "PLATE ID",
        "PLATE WELL",
        "LIQUID TYPE",
        "VOLUME (uL)",
        "SEQUENCE",
    ];
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OligoOrder {
    #[serde(rename = "Plate")]
    pub plate: String,
    #[serde(rename = "Well Position")]
    #[serde_as(as = "DisplayFromStr")]
    pub well: Well,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Sequence")]
    pub sequence: String,
    #[serde(rename = "Length")]
    pub length: usize,
}

impl Tabular for OligoOrder {
    const COLUMNS: &'static [&'static str] = &["Plate", "Well Position", "Name", "Sequence", "Length"];
}

/// Places the sorted unique `names` one per well, row-major, opening a new
/// plate whenever the current one is full.
pub fn allocate<S: AsRef<str>>(
    names: impl IntoIterator<Item = S>,
    template: &str,
    format: PlateFormat,
    volume_ul: u32,
) -> Vec<PlateWell> {
    let names: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    names
        .into_iter()
        .enumerate()
        .map(|(i, liquid)| PlateWell {
            plate: wells::plate_name(template, i, format.capacity()),
            well: wells::well_at(i, WellOrder::RowMajor, format),
            liquid,
            volume_ul,
        })
        .collect()
}

pub fn templates_plate(design: &Design) -> Vec<PlateWell> {
    allocate(
        design.pcrs.iter().map(|p| p.primary_template.as_str()),
        "templates_plate_{}",
        PlateFormat::Plate384,
        SOURCE_VOLUME_UL,
    )
}

pub fn oligos_plate(design: &Design) -> Vec<PlateWell> {
    allocate(
        design.oligos.iter().map(|o| o.name.as_str()),
        "oligos_plate_{}",
        PlateFormat::Plate384,
        SOURCE_VOLUME_UL,
    )
}

/// Synthesized fragments keep their table order.
pub fn synths_plate(design: &Design) -> Vec<SynthWell> {
    design
        .synthesis
        .iter()
        .enumerate()
        .map(|(i, synth)| SynthWell {
            plate: wells::plate_name("directSynthesiss_plate_{}", i, 96),
            well: wells::well_at(i, WellOrder::RowMajor, PlateFormat::Plate96),
            liquid: synth.name.clone(),
            volume_ul: SOURCE_VOLUME_UL,
            sequence: synth.sequence.clone(),
        })
        .collect()
}

/// Order form for the vendor. The 96 layout puts each oligo where the
/// 384-well oligo plate expects it after re-stamping.
pub fn oligo_order_form(
    oligo_plate: &[PlateWell],
    oligos: &[Oligo],
    format: PlateFormat,
) -> Result<Vec<OligoOrder>> {
    let sequences: HashMap<&str, &str> = oligos
        .iter()
        .map(|o| (o.name.as_str(), o.sequence.as_str()))
        .collect();
    oligo_plate
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let sequence = sequences.get(entry.liquid.as_str()).ok_or_else(|| {
                CompileError::InvalidInput(format!("no sequence for oligo '{}'", entry.liquid))
            })?;
            let well = match format {
                PlateFormat::Plate96 => wells::unstamp_oligos(entry.well)?,
                PlateFormat::Plate384 => entry.well,
            };
            Ok(OligoOrder {
                plate: wells::plate_name("oligo_order_plate_{}", i, format.capacity()),
                well,
                name: entry.liquid.clone(),
                sequence: sequence.to_string(),
                length: sequence.len(),
            })
        })
        .collect()
}

/// 96-well copies of the oligo plate, laid out like the 96 order form.
pub fn backup_oligos_plate(oligo_plate: &[PlateWell], order_96: &[OligoOrder]) -> Result<Vec<PlateWell>> {
    let orders: HashMap<&str, &OligoOrder> = order_96.iter().map(|o| (o.name.as_str(), o)).collect();
    oligo_plate
        .iter()
        .map(|entry| {
            let order = orders.get(entry.liquid.as_str()).ok_or_else(|| {
                CompileError::InvalidInput(format!("oligo '{}' missing from order form", entry.liquid))
            })?;
            Ok(PlateWell {
                plate: format!("backup_oligos_plate_{}", wells::plate_number(&order.plate)?),
                well: order.well,
                liquid: entry.liquid.clone(),
                volume_ul: BACKUP_VOLUME_UL,
            })
        })
        .collect()
}

/// 96-well copies of the template plate. Each quadrant of a 384-well plate
/// becomes its own backup plate, so no well is used twice.
pub fn backup_templates_plate(templates: &[PlateWell]) -> Result<Vec<PlateWell>> {
    templates
        .iter()
        .map(|entry| {
            let source_plate = wells::plate_number(&entry.plate)?;
            let quadrant = wells::quadrant_of(entry.well)?;
            Ok(PlateWell {
                plate: format!("backup_templates_plate_{}", (source_plate - 1) * 4 + quadrant + 1),
                well: wells::unstamp(entry.well)?,
                liquid: entry.liquid.clone(),
                volume_ul: BACKUP_VOLUME_UL,
            })
        })
        .collect()
}

/// Distinct plate names in order of first appearance.
pub fn plate_names<'a>(plates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    plates.into_iter().unique().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_sorts_and_spills() {
        let names: Vec<String> = (0..100).rev().map(|i| format!("n{i:03}")).collect();
        let plate = allocate(&names, "p_{}", PlateFormat::Plate96, 65);
        assert_eq!(plate.len(), 100);
        assert_eq!(plate[0].liquid, "n000");
        assert_eq!(plate[0].well.to_string(), "A1");
        assert_eq!(plate[95].plate, "p_1");
        assert_eq!(plate[95].well.to_string(), "H12");
        assert_eq!(plate[96].plate, "p_2");
        assert_eq!(plate[96].well.to_string(), "A1");
    }

    #[test]
    fn test_allocate_never_reuses_a_well() {
        let names: Vec<String> = (0..800).map(|i| format!("oligo{i}")).collect();
        let plate = allocate(&names, "oligos_plate_{}", PlateFormat::Plate384, 65);
        let mut seen = HashSet::new();
        for entry in &plate {
            assert!(entry.well.fits(PlateFormat::Plate384));
            assert!(seen.insert((entry.plate.clone(), entry.well)));
        }
        let counts = plate.iter().counts_by(|e| e.plate.clone());
        assert!(counts.values().all(|c| *c <= 384));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_duplicate_names_share_a_well() {
        let plate = allocate(["b", "a", "b"], "t_{}", PlateFormat::Plate384, 65);
        assert_eq!(plate.len(), 2);
        assert_eq!(plate[1].liquid, "b");
    }

    #[test]
    fn test_sample_plates_and_order_forms() {
        let design = Design::parse(SAMPLE_DESIGN).unwrap();
        let templates = templates_plate(&design);
        assert_eq!(
            templates.iter().map(|t| t.liquid.as_str()).collect::<Vec<_>>(),
            vec!["pGFP", "pUC19"]
        );
        let oligos = oligos_plate(&design);
        assert_eq!(oligos[3].well.to_string(), "A4");
        let order_96 = oligo_order_form(&oligos, &design.oligos, PlateFormat::Plate96).unwrap();
        let wells_96: Vec<String> = order_96.iter().map(|o| o.well.to_string()).collect();
        assert_eq!(wells_96, vec!["A1", "B1", "A2", "B2"]);
        assert_eq!(order_96[0].length, 10);
        let order_384 = oligo_order_form(&oligos, &design.oligos, PlateFormat::Plate384).unwrap();
        assert_eq!(order_384[1].well.to_string(), "A2");
        let backup = backup_oligos_plate(&oligos, &order_96).unwrap();
        assert_eq!(backup[1].plate, "backup_oligos_plate_1");
        assert_eq!(backup[1].well.to_string(), "B1");
        assert_eq!(backup[1].volume_ul, 1500);
    }

    #[test]
    fn test_backup_templates_are_unique() {
        let names: Vec<String> = (0..400).map(|i| format!("t{i:03}")).collect();
        let templates = allocate(&names, "templates_plate_{}", PlateFormat::Plate384, 65);
        let backup = backup_templates_plate(&templates).unwrap();
        let unique: HashSet<(String, Well)> =
            backup.iter().map(|b| (b.plate.clone(), b.well)).collect();
        assert_eq!(unique.len(), 400);
        assert_eq!(backup[0].plate, "backup_templates_plate_1");
        assert_eq!(backup[1].plate, "backup_templates_plate_2");
        assert_eq!(backup[1].well.to_string(), "A1");
        assert_eq!(backup[384].plate, "backup_templates_plate_5");
    }

    #[test]
    fn test_synths_keep_table_order() {
        let mut design = Design::default();
        for (i, name) in ["zeta", "alpha"].iter().enumerate() {
            design.synthesis.push(crate::design::Synthesis {
                id: i as u32,
                name: name.to_string(),
                length: 4,
                cost: 1.0,
                sequence: "ACGT".to_string(),
            });
        }
        let plate = synths_plate(&design);
        assert_eq!(plate[0].liquid, "zeta");
        assert_eq!(plate[1].well.to_string(), "A2");
        assert_eq!(plate[1].plate, "directSynthesiss_plate_1");
    }
}
