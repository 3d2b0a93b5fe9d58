//! The 384-well parts plate collecting every purified PCR and digest
//! product, and the quantification worksheet taken from it.

use crate::design::{Design, SourceKind};
use crate::digests::DigestRow;
use crate::error::{CompileError, Result};
use crate::pcr::PcrRow;
use crate::table::Tabular;
use crate::wells::{Location, Well};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{BTreeMap, HashMap};

pub const QUANT_VOLUME_NL: u32 = 1000;
/// Assumed yield before the plate has been measured.
pub const DEFAULT_CONCENTRATION_NG_UL: f64 = 50.0;
const QUANT_COLUMNS: usize = 11;
const QUANT_WELLS: usize = 8 * QUANT_COLUMNS;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartWell {
    #[serde(rename = "PART_PLATE")]
    pub part_plate: String,
    #[serde(rename = "PART_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub part_well: Well,
    #[serde(rename = "PART_ID")]
    pub part_id: u32,
    #[serde(rename = "PART_NAME")]
    pub part_name: String,
    #[serde(rename = "PART_LENGTH")]
    pub part_length: usize,
    #[serde(rename = "PART_TYPE")]
    pub part_type: SourceKind,
    #[serde(rename = "SOURCE_ID")]
    pub source_id: u32,
    #[serde(rename = "SOURCE_PLATE")]
    pub source_plate: String,
    #[serde(rename = "SOURCE_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub source_well: Well,
}

impl Tabular for PartWell {
    const COLUMNS: &'static [&'static str] = &[
        "PART_PLATE",
        "PART_WELL",
        "PART_ID",
        "PART_NAME",
        "PART_LENGTH",
        "PART_TYPE",
        "SOURCE_ID",
        "SOURCE_PLATE",
        "SOURCE_WELL",
    ];
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantRow {
    #[serde(rename = "PART_PLATE")]
    pub part_plate: String,
    #[serde(rename = "PART_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub part_well: Well,
    #[serde(rename = "PART_ID")]
    pub part_id: u32,
    #[serde(rename = "PART_NAME")]
    pub part_name: String,
    #[serde(rename = "PART_LENGTH")]
    pub part_length: usize,
    #[serde(rename = "PART_TYPE")]
    pub part_type: SourceKind,
    #[serde(rename = "SOURCE_ID")]
    pub source_id: u32,
    #[serde(rename = "SOURCE_PLATE")]
    pub source_plate: String,
    #[serde(rename = "SOURCE_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub source_well: Well,
    #[serde(rename = "QUANT_PLATE")]
    pub quant_plate: String,
    #[serde(rename = "QUANT_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub quant_well: Well,
    #[serde(rename = "QUANT_VOLUME")]
    pub quant_volume: u32,
    #[serde(rename = "Conc (ng/uL)")]
    pub concentration: f64,
}

impl Tabular for QuantRow {
    const COLUMNS: &'static [&'static str] = &[
        "PART_PLATE",
        "PART_WELL",
        "PART_ID",
        "PART_NAME",
        "PART_LENGTH",
        "PART_TYPE",
        "SOURCE_ID",
        "SOURCE_PLATE",
        "SOURCE_WELL",
        "QUANT_PLATE",
        "QUANT_WELL",
        "QUANT_VOLUME",
        "Conc (ng/uL)",
    ];
}

/// Parts plate location of a stamped PCR row.
pub fn pcr_location(row: &PcrRow) -> Result<Location> {
    match (&row.parts_plate, row.parts_well) {
        (Some(plate), Some(well)) => Ok(Location::new(plate.clone(), well)),
        _ => Err(CompileError::InvalidInput(format!(
            "PCR reaction {} at {}#{} has no parts plate location",
            row.reaction, row.output_plate, row.output_well
        ))),
    }
}

/// Every parts plate location holding each part, keyed by part ID, in
/// worksheet order.
pub fn part_locations(
    design: &Design,
    pcrs: &[PcrRow],
    digests: &[DigestRow],
) -> Result<BTreeMap<u32, Vec<Location>>> {
    let mut by_source: HashMap<(SourceKind, u32), Vec<Location>> = HashMap::new();
    for row in pcrs {
        by_source
            .entry((SourceKind::Pcr, row.reaction))
            .or_default()
            .push(pcr_location(row)?);
    }
    for row in digests {
        by_source
            .entry((SourceKind::Digest, row.reaction))
            .or_default()
            .push(Location::new(row.parts_plate.clone(), row.parts_well));
    }
    Ok(design
        .parts
        .iter()
        .map(|part| {
            let key = (part.part_type.source_kind(), part.type_id);
            (part.id, by_source.get(&key).cloned().unwrap_or_default())
        })
        .collect())
}

/// Parts plate contents: digest products first, then PCR products.
pub fn parts_plate(design: &Design, pcrs: &[PcrRow], digests: &[DigestRow]) -> Result<Vec<PartWell>> {
    let part_for = |kind: SourceKind, source_id: u32| {
        design
            .parts
            .iter()
            .find(|p| p.part_type.source_kind() == kind && p.type_id == source_id)
            .ok_or_else(|| {
                CompileError::InvalidInput(format!(
                    "no part is made from {} reaction {source_id}",
                    kind.label()
                ))
            })
    };
    let mut rows = Vec::with_capacity(pcrs.len() + digests.len());
    for digest in digests {
        let part = part_for(SourceKind::Digest, digest.reaction)?;
        rows.push(PartWell {
            part_plate: digest.parts_plate.clone(),
            part_well: digest.parts_well,
            part_id: part.id,
            part_name: part.name.clone(),
            part_length: digest.sequence_length,
            part_type: SourceKind::Digest,
            source_id: digest.reaction,
            source_plate: digest.digest_plate.clone(),
            source_well: digest.digest_well,
        });
    }
    for pcr in pcrs {
        let part = part_for(SourceKind::Pcr, pcr.reaction)?;
        let location = pcr_location(pcr)?;
        rows.push(PartWell {
            part_plate: location.plate,
            part_well: location.well,
            part_id: part.id,
            part_name: part.name.clone(),
            part_length: pcr.expected_size,
            part_type: SourceKind::Pcr,
            source_id: pcr.reaction,
            source_plate: pcr.output_plate.clone(),
            source_well: pcr.output_well,
        });
    }
    Ok(rows)
}

/// Quantification plate: 88 samples per plate over columns 1 to 11,
/// leaving column 12 for standards.
pub fn quant_worksheet(parts: &[PartWell]) -> Vec<QuantRow> {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let slot = i % QUANT_WELLS;
            QuantRow {
                part_plate: part.part_plate.clone(),
                part_well: part.part_well,
                part_id: part.part_id,
                part_name: part.part_name.clone(),
                part_length: part.part_length,
                part_type: part.part_type,
                source_id: part.source_id,
                source_plate: part.source_plate.clone(),
                source_well: part.source_well,
                quant_plate: format!("quant_plate_{}", i / QUANT_WELLS + 1),
                quant_well: Well::new((slot / QUANT_COLUMNS) as u8, (slot % QUANT_COLUMNS) as u8),
                quant_volume: QUANT_VOLUME_NL,
                concentration: DEFAULT_CONCENTRATION_NG_UL,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;
    use crate::tm_service::DesignTmService;
    use crate::{digests, pcr, plates, volume};

    /// PCR and digest worksheets of the sample design.
    pub(crate) fn sample_worksheets() -> (Design, Vec<PcrRow>, Vec<DigestRow>) {
        let design = Design::parse(SAMPLE_DESIGN).unwrap();
        let volumes = volume::assembly_volumes(&design);
        let (mut pcrs, _) = pcr::distribute_pcr(
            &design,
            &plates::templates_plate(&design),
            &plates::oligos_plate(&design),
            &volumes,
            8,
            &DesignTmService::from_design(&design),
        )
        .unwrap();
        pcr::stamp_pcrs(&mut pcrs).unwrap();
        let digests = digests::create_digests(&design, &volumes, 8, 1).unwrap();
        (design, pcrs, digests)
    }

    #[test]
    fn test_part_locations() {
        let (design, pcrs, digests) = sample_worksheets();
        let locations = part_locations(&design, &pcrs, &digests).unwrap();
        assert_eq!(locations[&0][0].to_string(), "parts_plate_1#A2");
        assert_eq!(locations[&1][0].to_string(), "parts_plate_1#A1");
        assert_eq!(locations[&2][0].to_string(), "parts_plate_1#A5");
    }

    #[test]
    fn test_parts_plate_lists_digests_first() {
        let (design, pcrs, digests) = sample_worksheets();
        let plate = parts_plate(&design, &pcrs, &digests).unwrap();
        assert_eq!(plate.len(), 3);
        assert_eq!(plate[0].part_type, SourceKind::Digest);
        assert_eq!(plate[0].part_name, "(backbone)");
        assert_eq!(plate[0].source_plate, "digest_plate_1");
        assert_eq!(plate[2].part_name, "(gfp)");
        assert_eq!(plate[2].source_well.to_string(), "A3");
        assert_eq!(plate[2].part_length, 30);
    }

    #[test]
    fn test_quant_layout() {
        let (design, pcrs, digests) = sample_worksheets();
        let mut plate = parts_plate(&design, &pcrs, &digests).unwrap();
        let template = plate[0].clone();
        while plate.len() < 90 {
            plate.push(template.clone());
        }
        let quant = quant_worksheet(&plate);
        assert_eq!(quant[10].quant_well.to_string(), "A11");
        assert_eq!(quant[11].quant_well.to_string(), "B1");
        assert_eq!(quant[87].quant_well.to_string(), "H11");
        assert_eq!(quant[88].quant_plate, "quant_plate_2");
        assert_eq!(quant[88].quant_well.to_string(), "A1");
        assert_eq!(quant[0].quant_volume, 1000);
        assert_eq!(quant[0].concentration, 50.0);
    }
}
