//! Echo transfer lists. Every automation method maps its worksheet rows to
//! one or more source → destination legs.

use crate::assembly::{ASSEMBLY_TRANSFER_NL, AssemblyRow};
use crate::colony::ColonyPcrRow;
use crate::equimolar::EquimolarRow;
use crate::error::{CompileError, Result};
use crate::parts::QuantRow;
use crate::pcr::PcrRow;
use crate::redo::RedoRow;
use crate::table::{self, Sheet, Tabular};
use crate::wells::Well;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::fmt;
use std::str::FromStr;

/// Volume moved from the parts plate onto the zag (fragment analysis) plate, in nL.
pub const ZAG_TRANSFER_NL: u32 = 500;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    #[serde(rename = "Source Plate Name")]
    pub source_plate: String,
    #[serde(rename = "Source Well")]
    #[serde_as(as = "DisplayFromStr")]
    pub source_well: Well,
    #[serde(rename = "Destination Plate Name")]
    pub destination_plate: String,
    #[serde(rename = "Destination Well")]
    #[serde_as(as = "DisplayFromStr")]
    pub destination_well: Well,
    #[serde(rename = "Transfer Volume")]
    pub volume: u32,
}

impl Tabular for TransferInstruction {
    const COLUMNS: &'static [&'static str] = &[
        "Source Plate Name",
        "Source Well",
        "Destination Plate Name",
        "Destination Well",
        "Transfer Volume",
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferMethod {
    Pcr,
    Assembly,
    Equimolar,
    Zag,
    Quant,
    RedoPcr,
    ColonyPcr,
    Custom,
}

impl TransferMethod {
    pub const ALL: [TransferMethod; 8] = [
        TransferMethod::Pcr,
        TransferMethod::Assembly,
        TransferMethod::Equimolar,
        TransferMethod::Zag,
        TransferMethod::Quant,
        TransferMethod::RedoPcr,
        TransferMethod::ColonyPcr,
        TransferMethod::Custom,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TransferMethod::Pcr => "pcr",
            TransferMethod::Assembly => "assembly",
            TransferMethod::Equimolar => "equimolar",
            TransferMethod::Zag => "zag",
            TransferMethod::Quant => "quant",
            TransferMethod::RedoPcr => "redo_pcr",
            TransferMethod::ColonyPcr => "colony_pcr",
            TransferMethod::Custom => "custom",
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TransferMethod {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.tag() == tag)
            .ok_or_else(|| CompileError::UnsupportedMethod(s.to_string()))
    }
}

/// A typed worksheet borrowed for instruction generation.
#[derive(Clone, Copy, Debug)]
pub enum Worksheet<'a> {
    Pcr(&'a [PcrRow]),
    Redo(&'a [RedoRow]),
    Assembly(&'a [AssemblyRow]),
    Equimolar(&'a [EquimolarRow]),
    Quant(&'a [QuantRow]),
    ColonyPcr(&'a [ColonyPcrRow]),
    Custom(&'a Sheet),
}

impl Worksheet<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Worksheet::Pcr(_) => "PCR",
            Worksheet::Redo(_) => "redo PCR",
            Worksheet::Assembly(_) => "assembly",
            Worksheet::Equimolar(_) => "equimolar assembly",
            Worksheet::Quant(_) => "quant",
            Worksheet::ColonyPcr(_) => "colony PCR",
            Worksheet::Custom(_) => "custom",
        }
    }
}

fn leg(
    source_plate: Option<&str>,
    source_well: Option<Well>,
    destination_plate: Option<&str>,
    destination_well: Option<Well>,
    volume: Option<u32>,
) -> Option<TransferInstruction> {
    let source_plate = source_plate.filter(|p| !p.trim().is_empty())?;
    let destination_plate = destination_plate.filter(|p| !p.trim().is_empty())?;
    Some(TransferInstruction {
        source_plate: source_plate.to_string(),
        source_well: source_well?,
        destination_plate: destination_plate.to_string(),
        destination_well: destination_well?,
        volume: volume?,
    })
}

/// Transfer-bearing columns of PCR, redo PCR and zag worksheets. Every cell
/// is optional so a blank one only drops the leg it belongs to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PcrLegs {
    #[serde(rename = "TEMPLATE_PLATE", deserialize_with = "table::blank::deserialize")]
    template_plate: Option<String>,
    #[serde(rename = "TEMPLATE_WELL", deserialize_with = "table::blank::deserialize")]
    template_well: Option<Well>,
    #[serde(rename = "TEMPLATE_VOLUME", deserialize_with = "table::blank::deserialize")]
    template_volume: Option<u32>,
    #[serde(rename = "PRIMER1_PLATE", deserialize_with = "table::blank::deserialize")]
    primer1_plate: Option<String>,
    #[serde(rename = "PRIMER1_WELL", deserialize_with = "table::blank::deserialize")]
    primer1_well: Option<Well>,
    #[serde(rename = "PRIMER1_VOLUME", deserialize_with = "table::blank::deserialize")]
    primer1_volume: Option<u32>,
    #[serde(rename = "PRIMER2_PLATE", deserialize_with = "table::blank::deserialize")]
    primer2_plate: Option<String>,
    #[serde(rename = "PRIMER2_WELL", deserialize_with = "table::blank::deserialize")]
    primer2_well: Option<Well>,
    #[serde(rename = "PRIMER2_VOLUME", deserialize_with = "table::blank::deserialize")]
    primer2_volume: Option<u32>,
    #[serde(rename = "OUTPUT_PLATE", deserialize_with = "table::blank::deserialize")]
    output_plate: Option<String>,
    #[serde(rename = "OUTPUT_WELL", deserialize_with = "table::blank::deserialize")]
    output_well: Option<Well>,
    #[serde(rename = "REDO_PLATE", deserialize_with = "table::blank::deserialize")]
    redo_plate: Option<String>,
    #[serde(rename = "REDO_WELL", deserialize_with = "table::blank::deserialize")]
    redo_well: Option<Well>,
    #[serde(rename = "PARTS_SOURCE_PLATE", deserialize_with = "table::blank::deserialize")]
    parts_plate: Option<String>,
    #[serde(rename = "PARTS_WELL", deserialize_with = "table::blank::deserialize")]
    parts_well: Option<Well>,
    #[serde(rename = "ZAG_PLATE", deserialize_with = "table::blank::deserialize")]
    zag_plate: Option<String>,
    #[serde(rename = "ZAG_WELL", deserialize_with = "table::blank::deserialize")]
    zag_well: Option<Well>,
}

const PCR_LEG_COLUMNS: &[&str] = &[
    "TEMPLATE_PLATE",
    "TEMPLATE_WELL",
    "TEMPLATE_VOLUME",
    "PRIMER1_PLATE",
    "PRIMER1_WELL",
    "PRIMER1_VOLUME",
    "PRIMER2_PLATE",
    "PRIMER2_WELL",
    "PRIMER2_VOLUME",
];

impl From<&PcrRow> for PcrLegs {
    fn from(row: &PcrRow) -> Self {
        PcrLegs {
            template_plate: Some(row.template_plate.clone()),
            template_well: Some(row.template_well),
            template_volume: Some(row.template_volume),
            primer1_plate: Some(row.primer1_plate.clone()),
            primer1_well: Some(row.primer1_well),
            primer1_volume: Some(row.primer1_volume),
            primer2_plate: Some(row.primer2_plate.clone()),
            primer2_well: Some(row.primer2_well),
            primer2_volume: Some(row.primer2_volume),
            output_plate: Some(row.output_plate.clone()),
            output_well: Some(row.output_well),
            redo_plate: None,
            redo_well: None,
            parts_plate: row.parts_plate.clone(),
            parts_well: row.parts_well,
            zag_plate: row.zag_plate.clone(),
            zag_well: row.zag_well,
        }
    }
}

impl From<&RedoRow> for PcrLegs {
    fn from(row: &RedoRow) -> Self {
        PcrLegs {
            redo_plate: Some(row.redo_plate.clone()),
            redo_well: Some(row.redo_well),
            ..PcrLegs::from(&row.pcr)
        }
    }
}

impl PcrLegs {
    fn legs(&self, method: TransferMethod) -> Vec<TransferInstruction> {
        match method {
            TransferMethod::Zag => leg(
                self.parts_plate.as_deref(),
                self.parts_well,
                self.zag_plate.as_deref(),
                self.zag_well,
                Some(ZAG_TRANSFER_NL),
            )
            .into_iter()
            .collect(),
            TransferMethod::RedoPcr => self.reaction_legs(self.redo_plate.as_deref(), self.redo_well),
            _ => self.reaction_legs(self.output_plate.as_deref(), self.output_well),
        }
    }

    /// Both primers and the template into one reaction well.
    fn reaction_legs(&self, plate: Option<&str>, well: Option<Well>) -> Vec<TransferInstruction> {
        [
            leg(self.primer1_plate.as_deref(), self.primer1_well, plate, well, self.primer1_volume),
            leg(self.primer2_plate.as_deref(), self.primer2_well, plate, well, self.primer2_volume),
            leg(self.template_plate.as_deref(), self.template_well, plate, well, self.template_volume),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Source and destination columns shared by assembly and equimolar
/// worksheets. Assembly sheets carry no volume column.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PoolLegs {
    #[serde(rename = "Source Plate", deserialize_with = "table::blank::deserialize")]
    source_plate: Option<String>,
    #[serde(rename = "Source Well", deserialize_with = "table::blank::deserialize")]
    source_well: Option<Well>,
    #[serde(rename = "Destination Plate", deserialize_with = "table::blank::deserialize")]
    destination_plate: Option<String>,
    #[serde(rename = "Destination Well", deserialize_with = "table::blank::deserialize")]
    destination_well: Option<Well>,
    #[serde(rename = "Transfer Volume", deserialize_with = "table::blank::deserialize")]
    transfer_volume: Option<u32>,
}

const POOL_LEG_COLUMNS: &[&str] = &["Source Plate", "Source Well", "Destination Plate", "Destination Well"];

impl From<&AssemblyRow> for PoolLegs {
    fn from(row: &AssemblyRow) -> Self {
        PoolLegs {
            source_plate: Some(row.source_plate.clone()),
            source_well: Some(row.source_well),
            destination_plate: Some(row.destination_plate.clone()),
            destination_well: Some(row.destination_well),
            transfer_volume: None,
        }
    }
}

impl From<&EquimolarRow> for PoolLegs {
    fn from(row: &EquimolarRow) -> Self {
        PoolLegs {
            source_plate: Some(row.source_plate.clone()),
            source_well: Some(row.source_well),
            destination_plate: Some(row.destination_plate.clone()),
            destination_well: Some(row.destination_well),
            transfer_volume: Some(row.transfer_volume),
        }
    }
}

impl PoolLegs {
    fn leg(&self, method: TransferMethod) -> Option<TransferInstruction> {
        let volume = match method {
            TransferMethod::Assembly => Some(ASSEMBLY_TRANSFER_NL),
            _ => self.transfer_volume,
        };
        leg(
            self.source_plate.as_deref(),
            self.source_well,
            self.destination_plate.as_deref(),
            self.destination_well,
            volume,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct QuantLegs {
    #[serde(rename = "PART_PLATE", deserialize_with = "table::blank::deserialize")]
    part_plate: Option<String>,
    #[serde(rename = "PART_WELL", deserialize_with = "table::blank::deserialize")]
    part_well: Option<Well>,
    #[serde(rename = "QUANT_PLATE", deserialize_with = "table::blank::deserialize")]
    quant_plate: Option<String>,
    #[serde(rename = "QUANT_WELL", deserialize_with = "table::blank::deserialize")]
    quant_well: Option<Well>,
    #[serde(rename = "QUANT_VOLUME", deserialize_with = "table::blank::deserialize")]
    quant_volume: Option<u32>,
}

const QUANT_LEG_COLUMNS: &[&str] = &["PART_PLATE", "PART_WELL", "QUANT_PLATE", "QUANT_WELL", "QUANT_VOLUME"];

impl From<&QuantRow> for QuantLegs {
    fn from(row: &QuantRow) -> Self {
        QuantLegs {
            part_plate: Some(row.part_plate.clone()),
            part_well: Some(row.part_well),
            quant_plate: Some(row.quant_plate.clone()),
            quant_well: Some(row.quant_well),
            quant_volume: Some(row.quant_volume),
        }
    }
}

impl QuantLegs {
    fn leg(&self) -> Option<TransferInstruction> {
        leg(
            self.part_plate.as_deref(),
            self.part_well,
            self.quant_plate.as_deref(),
            self.quant_well,
            self.quant_volume,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ColonyLegs {
    #[serde(rename = "NGS_PLATE", deserialize_with = "table::blank::deserialize")]
    ngs_plate: Option<String>,
    #[serde(rename = "NGS_WELL", deserialize_with = "table::blank::deserialize")]
    ngs_well: Option<Well>,
    #[serde(rename = "NGS_VOLUME", deserialize_with = "table::blank::deserialize")]
    ngs_volume: Option<u32>,
    #[serde(rename = "PRIMER1_PLATE", deserialize_with = "table::blank::deserialize")]
    primer1_plate: Option<String>,
    #[serde(rename = "PRIMER1_WELL", deserialize_with = "table::blank::deserialize")]
    primer1_well: Option<Well>,
    #[serde(rename = "PRIMER1_VOLUME", deserialize_with = "table::blank::deserialize")]
    primer1_volume: Option<u32>,
    #[serde(rename = "PRIMER2_PLATE", deserialize_with = "table::blank::deserialize")]
    primer2_plate: Option<String>,
    #[serde(rename = "PRIMER2_WELL", deserialize_with = "table::blank::deserialize")]
    primer2_well: Option<Well>,
    #[serde(rename = "PRIMER2_VOLUME", deserialize_with = "table::blank::deserialize")]
    primer2_volume: Option<u32>,
    #[serde(rename = "COLONY_PCR_PLATE", deserialize_with = "table::blank::deserialize")]
    colony_pcr_plate: Option<String>,
    #[serde(rename = "COLONY_PCR_WELL", deserialize_with = "table::blank::deserialize")]
    colony_pcr_well: Option<Well>,
}

const COLONY_LEG_COLUMNS: &[&str] = &[
    "NGS_PLATE",
    "NGS_WELL",
    "NGS_VOLUME",
    "PRIMER1_PLATE",
    "PRIMER1_WELL",
    "PRIMER1_VOLUME",
    "PRIMER2_PLATE",
    "PRIMER2_WELL",
    "PRIMER2_VOLUME",
    "COLONY_PCR_PLATE",
    "COLONY_PCR_WELL",
];

impl From<&ColonyPcrRow> for ColonyLegs {
    fn from(row: &ColonyPcrRow) -> Self {
        ColonyLegs {
            ngs_plate: Some(row.ngs_plate.clone()),
            ngs_well: Some(row.ngs_well),
            ngs_volume: Some(row.ngs_volume),
            primer1_plate: Some(row.primer1_plate.clone()),
            primer1_well: Some(row.primer1_well),
            primer1_volume: Some(row.primer1_volume),
            primer2_plate: Some(row.primer2_plate.clone()),
            primer2_well: Some(row.primer2_well),
            primer2_volume: Some(row.primer2_volume),
            colony_pcr_plate: Some(row.colony_pcr_plate.clone()),
            colony_pcr_well: Some(row.colony_pcr_well),
        }
    }
}

impl ColonyLegs {
    fn legs(&self) -> Vec<TransferInstruction> {
        let plate = self.colony_pcr_plate.as_deref();
        let well = self.colony_pcr_well;
        [
            leg(self.primer1_plate.as_deref(), self.primer1_well, plate, well, self.primer1_volume),
            leg(self.primer2_plate.as_deref(), self.primer2_well, plate, well, self.primer2_volume),
            leg(self.ngs_plate.as_deref(), self.ngs_well, plate, well, self.ngs_volume),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Assembly-like sheets with free-form `Part(s)...` columns: every part
/// column pairs with its `... Source Plate` and `... Well` columns.
fn custom_legs(sheet: &Sheet) -> Result<Vec<TransferInstruction>> {
    let destination_plate = sheet.require("Assembly Plate")?;
    let destination_well = sheet.require("Assembly Well")?;
    let pairs: Vec<(usize, usize)> = sheet
        .headers
        .iter()
        .filter(|h| {
            h.starts_with("Part(s)")
                && !h.ends_with("ID")
                && !h.ends_with("Source Plate")
                && !h.ends_with("Well")
        })
        .filter_map(|part| {
            let plate = sheet.column(&format!("{part} Source Plate"))?;
            let well = sheet.column(&format!("{part} Well"))?;
            Some((plate, well))
        })
        .collect();
    let parse = |text: Option<&str>| text.map(Well::parse).transpose();
    let mut legs = vec![];
    for row in 0..sheet.rows.len() {
        let destination = parse(sheet.cell(row, destination_well))?;
        for (plate, well) in &pairs {
            legs.extend(leg(
                sheet.cell(row, *plate),
                parse(sheet.cell(row, *well))?,
                sheet.cell(row, destination_plate),
                destination,
                Some(ASSEMBLY_TRANSFER_NL),
            ));
        }
    }
    Ok(legs)
}

/// Sorts by source plate, destination plate, source well and destination well.
fn sorted(mut legs: Vec<TransferInstruction>) -> Vec<TransferInstruction> {
    legs.sort_by(|a, b| {
        (&a.source_plate, &a.destination_plate, a.source_well, a.destination_well).cmp(&(
            &b.source_plate,
            &b.destination_plate,
            b.source_well,
            b.destination_well,
        ))
    });
    legs
}

/// Transfer list for `method` over `worksheet`, sorted by source plate,
/// destination plate, source well and destination well.
pub fn generate(method: TransferMethod, worksheet: Worksheet<'_>) -> Result<Vec<TransferInstruction>> {
    let legs: Vec<TransferInstruction> = match (method, worksheet) {
        (TransferMethod::Pcr | TransferMethod::Zag, Worksheet::Pcr(rows)) => rows
            .iter()
            .flat_map(|r| PcrLegs::from(r).legs(method))
            .collect(),
        (TransferMethod::RedoPcr, Worksheet::Redo(rows)) => rows
            .iter()
            .flat_map(|r| PcrLegs::from(r).legs(method))
            .collect(),
        (TransferMethod::Assembly, Worksheet::Assembly(rows)) => rows
            .iter()
            .filter_map(|r| PoolLegs::from(r).leg(method))
            .collect(),
        (TransferMethod::Equimolar, Worksheet::Equimolar(rows)) => rows
            .iter()
            .filter_map(|r| PoolLegs::from(r).leg(method))
            .collect(),
        (TransferMethod::Quant, Worksheet::Quant(rows)) => {
            rows.iter().filter_map(|r| QuantLegs::from(r).leg()).collect()
        }
        (TransferMethod::ColonyPcr, Worksheet::ColonyPcr(rows)) => {
            rows.iter().flat_map(|r| ColonyLegs::from(r).legs()).collect()
        }
        (TransferMethod::Custom, Worksheet::Custom(sheet)) => custom_legs(sheet)?,
        (method, worksheet) => {
            return Err(CompileError::UnsupportedMethod(format!(
                "{method} instructions cannot be made from a {} worksheet",
                worksheet.kind()
            )));
        }
    };
    Ok(sorted(legs))
}

/// Rows of `text` after checking that every column in `required` exists.
fn read_legs<T: DeserializeOwned>(text: &str, required: &[&str]) -> Result<Vec<T>> {
    let sheet = Sheet::from_csv(text)?;
    for column in required {
        sheet.require(column)?;
    }
    table::from_csv(text)
}

/// Reads a worksheet CSV of the kind `method` expects and generates its
/// transfer list. A blank plate, well or volume cell drops only the leg it
/// belongs to.
pub fn from_csv(method: TransferMethod, text: &str) -> Result<Vec<TransferInstruction>> {
    let legs: Vec<TransferInstruction> = match method {
        TransferMethod::Pcr | TransferMethod::RedoPcr | TransferMethod::Zag => {
            let destination: &[&str] = match method {
                TransferMethod::Pcr => &["OUTPUT_PLATE", "OUTPUT_WELL"],
                TransferMethod::RedoPcr => &["REDO_PLATE", "REDO_WELL"],
                _ => &["PARTS_SOURCE_PLATE", "PARTS_WELL", "ZAG_PLATE", "ZAG_WELL"],
            };
            let required = match method {
                TransferMethod::Zag => destination.to_vec(),
                _ => [PCR_LEG_COLUMNS, destination].concat(),
            };
            read_legs::<PcrLegs>(text, &required)?
                .iter()
                .flat_map(|r| r.legs(method))
                .collect()
        }
        TransferMethod::Assembly => read_legs::<PoolLegs>(text, POOL_LEG_COLUMNS)?
            .iter()
            .filter_map(|r| r.leg(method))
            .collect(),
        TransferMethod::Equimolar => {
            let required = [POOL_LEG_COLUMNS, &["Transfer Volume"][..]].concat();
            read_legs::<PoolLegs>(text, &required)?
                .iter()
                .filter_map(|r| r.leg(method))
                .collect()
        }
        TransferMethod::Quant => read_legs::<QuantLegs>(text, QUANT_LEG_COLUMNS)?
            .iter()
            .filter_map(QuantLegs::leg)
            .collect(),
        TransferMethod::ColonyPcr => read_legs::<ColonyLegs>(text, COLONY_LEG_COLUMNS)?
            .iter()
            .flat_map(ColonyLegs::legs)
            .collect(),
        TransferMethod::Custom => custom_legs(&Sheet::from_csv(text)?)?,
    };
    Ok(sorted(legs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts;

    fn w(s: &str) -> Well {
        Well::parse(s).unwrap()
    }

    fn pcr_row() -> PcrRow {
        let (_, pcrs, _) = parts::tests::sample_worksheets();
        let mut row = pcrs[0].clone();
        row.primer1_plate = "oligos_plate_1".to_string();
        row.primer1_well = w("A2");
        row.primer2_plate = "oligos_plate_1".to_string();
        row.primer2_well = w("A3");
        row.template_plate = "templates_plate_1".to_string();
        row.template_well = w("A1");
        row.output_plate = "pcr_plate_1".to_string();
        row.output_well = w("B1");
        row
    }

    #[test]
    fn test_method_tags() {
        for method in TransferMethod::ALL {
            assert_eq!(method.tag().parse::<TransferMethod>().unwrap(), method);
        }
        assert_eq!("REDO_PCR".parse::<TransferMethod>().unwrap(), TransferMethod::RedoPcr);
        assert!(matches!(
            "pipetting".parse::<TransferMethod>(),
            Err(CompileError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_pcr_legs() {
        let rows = vec![pcr_row()];
        let legs = generate(TransferMethod::Pcr, Worksheet::Pcr(&rows)).unwrap();
        assert_eq!(legs.len(), 3);
        assert!(legs.iter().all(|l| l.destination_plate == "pcr_plate_1"));
        assert!(legs.iter().all(|l| l.destination_well == w("B1")));
        assert_eq!(
            legs.iter().map(|l| l.volume).collect::<Vec<_>>(),
            vec![250, 250, 100]
        );
        assert_eq!(legs[0].source_well, w("A2"));
        assert_eq!(legs[2].source_plate, "templates_plate_1");
        let text = table::to_csv(&legs).unwrap();
        assert!(text.starts_with(
            "Source Plate Name,Source Well,Destination Plate Name,Destination Well,Transfer Volume\n"
        ));
        assert!(text.contains("oligos_plate_1,A2,pcr_plate_1,B1,250\n"));
    }

    #[test]
    fn test_sorted_output() {
        let (_, pcrs, _) = parts::tests::sample_worksheets();
        let legs = generate(TransferMethod::Pcr, Worksheet::Pcr(&pcrs)).unwrap();
        let keys: Vec<_> = legs
            .iter()
            .map(|l| (l.source_plate.clone(), l.destination_plate.clone(), l.source_well, l.destination_well))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(legs.len(), 3 * pcrs.len());
    }

    #[test]
    fn test_zag_drops_unstamped_rows() {
        let mut stamped = pcr_row();
        stamped.parts_plate = Some("parts_plate_1".to_string());
        stamped.parts_well = Some(w("A1"));
        stamped.zag_plate = Some("zag_plate_1".to_string());
        stamped.zag_well = Some(w("A1"));
        let mut bare = pcr_row();
        bare.zag_plate = None;
        let legs = generate(TransferMethod::Zag, Worksheet::Pcr(&[stamped, bare])).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].volume, 500);
    }

    #[test]
    fn test_mismatched_worksheet() {
        let rows = vec![pcr_row()];
        assert!(matches!(
            generate(TransferMethod::Assembly, Worksheet::Pcr(&rows)),
            Err(CompileError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_custom_sheet() {
        let text = "\
Number,Part(s) 1,Part(s) 1 ID,Part(s) 1 Source Plate,Part(s) 1 Well,Part(s) 2,Part(s) 2 ID,Part(s) 2 Source Plate,Part(s) 2 Well,Assembly Plate,Assembly Well
0,promoter,1,parts_plate_1,B3,gfp,2,parts_plate_1,A1,assembly_plate_1,A1
1,promoter,1,parts_plate_1,B3,,,,,assembly_plate_1,B1
";
        let legs = from_csv(TransferMethod::Custom, text).unwrap();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].source_well, w("A1"));
        assert_eq!(legs[1].source_well, w("B3"));
        assert_eq!(legs[1].destination_well, w("A1"));
        assert_eq!(legs[2].destination_well, w("B1"));
        assert!(legs.iter().all(|l| l.volume == 2000));
    }

    fn blank_cell(text: &str, row: usize, column: &str) -> String {
        let mut sheet = Sheet::from_csv(text).unwrap();
        let column = sheet.require(column).unwrap();
        sheet.rows[row][column] = String::new();
        sheet.to_csv().unwrap()
    }

    #[test]
    fn test_from_csv_drops_leg_with_blank_well() {
        let mut second = pcr_row();
        second.output_well = w("B2");
        let text = table::to_csv(&[pcr_row(), second]).unwrap();
        let legs = from_csv(TransferMethod::Pcr, &blank_cell(&text, 1, "PRIMER1_WELL")).unwrap();
        assert_eq!(legs.len(), 5);
        assert_eq!(legs.iter().filter(|l| l.destination_well == w("B1")).count(), 3);
        assert!(
            !legs
                .iter()
                .any(|l| l.destination_well == w("B2") && l.source_well == w("A2"))
        );
    }

    #[test]
    fn test_from_csv_drops_leg_with_blank_volume_or_plate() {
        let (design, pcrs, digests) = parts::tests::sample_worksheets();
        let plate = parts::parts_plate(&design, &pcrs, &digests).unwrap();
        let text = table::to_csv(&parts::quant_worksheet(&plate)).unwrap();
        let text = blank_cell(&text, 0, "QUANT_VOLUME");
        let legs = from_csv(TransferMethod::Quant, &blank_cell(&text, 1, "PART_PLATE")).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_from_csv_requires_destination_columns() {
        let text = table::to_csv(&[pcr_row()]).unwrap();
        assert!(matches!(
            from_csv(TransferMethod::RedoPcr, &text),
            Err(CompileError::InvalidInput(_))
        ));
        assert_eq!(from_csv(TransferMethod::Pcr, &text).unwrap().len(), 3);
    }

    #[test]
    fn test_redo_legs_go_to_redo_well() {
        let rows = vec![RedoRow {
            pcr: pcr_row(),
            redo_plate: "redo_plate_1".to_string(),
            redo_well: w("C4"),
        }];
        let legs = generate(TransferMethod::RedoPcr, Worksheet::Redo(&rows)).unwrap();
        assert_eq!(legs.len(), 3);
        assert!(
            legs.iter()
                .all(|l| l.destination_plate == "redo_plate_1" && l.destination_well == w("C4"))
        );
    }

    #[test]
    fn test_quant_from_csv() {
        let (design, pcrs, digests) = parts::tests::sample_worksheets();
        let plate = parts::parts_plate(&design, &pcrs, &digests).unwrap();
        let quant = parts::quant_worksheet(&plate);
        let legs = from_csv(TransferMethod::Quant, &table::to_csv(&quant).unwrap()).unwrap();
        assert_eq!(legs.len(), 3);
        assert!(legs.iter().all(|l| l.volume == 1000 && l.destination_plate == "quant_plate_1"));
    }
}
