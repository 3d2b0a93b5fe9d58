//! Liquid-handler (Biomek) sheets. The methods on the instrument read a
//! block of `variable, value` pairs next to the per-well columns, so every
//! sheet is built as an untyped [`Sheet`] and written with CRLF endings.

use crate::assembly::ConstructRow;
use crate::error::Result;
use crate::pcr::PcrRow;
use crate::table::{self, Sheet};
use crate::wells::{self, Well};
use std::collections::BTreeMap;

const PCR_DNA_UL: f64 = 0.6;
const PCR_WATER_UL: f64 = 14.4;
const PCR_MASTER_MIX_UL: f64 = 15.0;
/// Master mix tubes hold 2 mL, filled to 90 %.
const MASTER_MIX_TUBE_UL: f64 = 2.0 * 0.9 * 1000.0;
const DEAD_VOLUME: f64 = 0.9;

pub fn to_csv(sheet: &Sheet) -> Result<String> {
    table::write_records(&sheet.headers, &sheet.rows, true)
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// A `variable, value` block placed beside `rows`, padding whichever side
/// is shorter.
fn with_variables(variables: &[(&str, String)], width: usize, rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let height = variables.len().max(rows.len());
    let mut rows = rows.into_iter();
    (0..height)
        .map(|i| {
            let mut row = match variables.get(i) {
                Some((name, value)) => vec![name.to_string(), value.clone()],
                None => vec![String::new(), String::new()],
            };
            row.extend(rows.next().unwrap_or_else(|| vec![String::new(); width]));
            row
        })
        .collect()
}

/// Destination plates as `dest_N` with their 1-based well indices joined
/// as `"1, 2, "`.
fn destination_sheet(
    names: [&str; 2],
    destinations: impl Iterator<Item = (String, Well)>,
    samples: usize,
) -> Result<Sheet> {
    let mut plates: BTreeMap<String, String> = BTreeMap::new();
    for (plate, well) in destinations {
        let index = wells::biomek_index(well)?;
        plates.entry(plate).or_default().push_str(&format!("{index}, "));
    }
    let rows = plates
        .values()
        .enumerate()
        .map(|(i, wells)| vec![format!("dest_{}", i + 1), wells.clone()])
        .collect();
    let variables = [
        ("dest_plt_num", plates.len().to_string()),
        ("sample_num", samples.to_string()),
    ];
    Ok(Sheet {
        headers: headers(&[names[0], names[1], "dest_pos", "dest_well"]),
        rows: with_variables(&variables, 2, rows),
    })
}

/// DpnI master mix dispensed into every PCR well.
pub fn dpni_sheet(pcrs: &[PcrRow]) -> Result<Sheet> {
    destination_sheet(
        ["variable_name_1", "value_1"],
        pcrs.iter().map(|r| (r.output_plate.clone(), r.output_well)),
        pcrs.len(),
    )
}

/// Assembly master mix dispensed into every construct well.
pub fn assembly_sheet(constructs: &[ConstructRow]) -> Result<Sheet> {
    destination_sheet(
        ["variable_name", "value"],
        constructs.iter().map(|c| (c.src_plate.clone(), c.src_well)),
        constructs.len(),
    )
}

/// Bead cleanup of every PCR well.
pub fn bead_sheet(pcrs: &[PcrRow]) -> Sheet {
    let rows = pcrs
        .iter()
        .map(|r| {
            let well = r.output_well.to_string();
            vec![
                "Bead_Res_40".to_string(),
                "1".to_string(),
                "Samples".to_string(),
                well.clone(),
                "39".to_string(),
                "Sample_PCR".to_string(),
                well,
                "30".to_string(),
                "Waste_container".to_string(),
                "1".to_string(),
                "69".to_string(),
            ]
        })
        .collect();
    Sheet {
        headers: headers(&[
            "Bead_Reservoir",
            "Bead_Res_Section",
            "Biorad_Dest_Plate",
            "Biorad_Dest_Well",
            "Bead_Transfer_Vol",
            "PCR_Source_plate",
            "PCR_Source_Well",
            "PCR_Transfer_Vol",
            "Waste",
            "Section2 ",
            "Supernatant removal volume",
        ]),
        rows,
    }
}

/// Water and master mix for the PCR plate(s).
pub fn pcr_sheet(pcrs: &[PcrRow], email: &str) -> Result<Sheet> {
    let n = pcrs.len();
    let variables = [
        ("Email_to", email.to_string()),
        ("ExpID", "PCR".to_string()),
        ("Samples", n.to_string()),
        ("DNA_vol", PCR_DNA_UL.to_string()),
        ("Water_vol", PCR_WATER_UL.to_string()),
        ("Water_reqVol", (n as f64 * PCR_WATER_UL / 1000.0 / DEAD_VOLUME).to_string()),
        ("MasterMix_Vol", PCR_MASTER_MIX_UL.to_string()),
        (
            "MasterMix_reqVol",
            (n as f64 * PCR_MASTER_MIX_UL / 1000.0 / DEAD_VOLUME).to_string(),
        ),
    ];
    let mut rows = Vec::with_capacity(n);
    for (i, row) in pcrs.iter().enumerate() {
        let index = wells::biomek_index(row.output_well)?.to_string();
        let tube = ((i + 1) as f64 * PCR_MASTER_MIX_UL / MASTER_MIX_TUBE_UL).floor() as usize + 1;
        rows.push(vec![
            index.clone(),
            index,
            PCR_DNA_UL.to_string(),
            tube.to_string(),
            PCR_MASTER_MIX_UL.to_string(),
        ]);
    }
    Ok(Sheet {
        headers: headers(&[
            "Variable_name",
            "Value",
            "Well_user",
            "Well",
            "Src_vol",
            "MasterMix_well",
            "MasterMix_TFFvol",
        ]),
        rows: with_variables(&variables, 5, rows),
    })
}
