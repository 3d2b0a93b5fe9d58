//! Redo and consolidation of PCR trials.
//!
//! After a PCR plate has been analyzed, the failed reactions are set up
//! again on a new trial generation (`redo_pcr_plate_T{n}`). Once the trials
//! are done, the good reactions of every trial are consolidated back onto the
//! original plate layout. Earlier generations are never modified.

use crate::bundle::Bundle;
use crate::error::{CompileError, Result};
use crate::instructions::{self, TransferMethod, Worksheet};
use crate::pcr::PcrRow;
use crate::table::{self, Sheet, Tabular, flag};
use crate::wells::{self, PlateFormat, Well, WellOrder};
use itertools::Itertools;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

pub const PCR_RESULTS: &str = "pcr_results.csv";
pub const ANALYZE_STEP: &str = "Analyze_PCRs";
pub const CONSOLIDATE_STEP: &str = "Consolidate_PCRs";
/// Volume each good reaction contributes to the consolidated plate, in µL.
pub const CONSOLIDATION_VOLUME_UL: u32 = 50;

/// Worksheets produced by earlier runs, keyed by (step, trial, name).
#[derive(Debug, Clone, Default)]
pub struct WorksheetStore {
    sheets: HashMap<(String, u32, String), String>,
}

impl WorksheetStore {
    pub fn insert(&mut self, step: &str, trial: u32, name: &str, text: impl Into<String>) {
        self.sheets
            .insert((step.to_string(), trial, name.to_string()), text.into());
    }

    pub fn get(&self, step: &str, trial: u32, name: &str) -> Result<&str> {
        self.sheets
            .get(&(step.to_string(), trial, name.to_string()))
            .map(String::as_str)
            .ok_or_else(|| CompileError::MissingWorksheet {
                step: step.to_string(),
                trial,
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(rename = "GOOD", with = "flag")]
    good: bool,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RedoTarget {
    #[serde(rename = "REDO_PLATE")]
    redo_plate: String,
    #[serde(rename = "REDO_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    redo_well: Well,
}

/// A failed PCR reaction and the well it is repeated in.
#[derive(Debug, Clone, PartialEq)]
pub struct RedoRow {
    pub pcr: PcrRow,
    pub redo_plate: String,
    pub redo_well: Well,
}

/// PCR worksheet rows with their GOOD verdict.
pub fn read_pcr_results(text: &str) -> Result<Vec<(PcrRow, bool)>> {
    let rows: Vec<PcrRow> = table::from_csv(text)?;
    let verdicts: Vec<Verdict> = table::from_csv(text)?;
    Ok(rows
        .into_iter()
        .zip(verdicts.into_iter().map(|v| v.good))
        .collect())
}

pub fn read_redo_worksheet(text: &str) -> Result<Vec<RedoRow>> {
    let rows: Vec<PcrRow> = table::from_csv(text)?;
    let targets: Vec<RedoTarget> = table::from_csv(text)?;
    Ok(rows
        .into_iter()
        .zip(targets)
        .map(|(pcr, target)| RedoRow {
            pcr,
            redo_plate: target.redo_plate,
            redo_well: target.redo_well,
        })
        .collect())
}

pub fn redo_worksheet_csv(rows: &[RedoRow]) -> Result<String> {
    let headers: Vec<String> = PcrRow::COLUMNS
        .iter()
        .chain(&["REDO_PLATE", "REDO_WELL"])
        .map(|c| c.to_string())
        .collect();
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = table::to_record(&row.pcr)?;
        record.push(row.redo_plate.clone());
        record.push(row.redo_well.to_string());
        records.push(record);
    }
    table::write_records(&headers, &records, false)
}

pub fn redo_plate_prefix(next_trial: u32) -> String {
    format!("redo_pcr_plate_T{next_trial}")
}

/// Failed reactions of one trial laid out for the next. When the failures
/// fit on as many plates as the results used, each keeps its well and only
/// the plate prefix changes; otherwise they are packed column-major onto
/// fresh plates.
pub fn redo_worksheet(results: &[(PcrRow, bool)], next_trial: u32) -> Vec<RedoRow> {
    let failed: Vec<&PcrRow> = results
        .iter()
        .filter(|(_, good)| !good)
        .map(|(row, _)| row)
        .collect();
    let Some(&first) = failed.first() else {
        return vec![];
    };
    let prefix = redo_plate_prefix(next_trial);
    let plates = results.iter().map(|(r, _)| &r.output_plate).unique().count();
    let min_plates = (failed.len() - 1) / 96 + 1;
    if plates <= min_plates {
        let old = wells::plate_prefix(&first.output_plate);
        debug!("Redo keeps the {old} layout");
        failed
            .into_iter()
            .map(|row| RedoRow {
                pcr: row.clone(),
                redo_plate: row.output_plate.replacen(old, &prefix, 1),
                redo_well: row.output_well,
            })
            .collect()
    } else {
        debug!("Redo consolidates {} reactions from {plates} plates", failed.len());
        failed
            .into_iter()
            .enumerate()
            .map(|(i, row)| RedoRow {
                pcr: row.clone(),
                redo_plate: wells::plate_name(&format!("{prefix}_{{}}"), i, 96),
                redo_well: wells::well_at(i, WellOrder::ColumnMajor, PlateFormat::Plate96),
            })
            .collect()
    }
}

/// Redo worksheet and Echo instructions for the failures of `trial`.
pub fn create_pcr_redo(store: &WorksheetStore, trial: u32) -> Result<Bundle> {
    let results = read_pcr_results(store.get(ANALYZE_STEP, trial, PCR_RESULTS)?)?;
    let rows = redo_worksheet(&results, trial + 1);
    let echo = instructions::generate(TransferMethod::RedoPcr, Worksheet::Redo(&rows))?;
    info!("Trial {trial}: {} PCRs to redo", rows.len());
    let mut bundle = Bundle::default();
    bundle.insert("redo_pcr_worksheet.csv", redo_worksheet_csv(&rows)?);
    bundle.insert("redo_pcr_echo_instructions.csv", table::to_csv(&echo)?);
    Ok(bundle)
}

fn normalized_well(text: &str) -> String {
    Well::parse(text)
        .map(|w| w.to_string())
        .unwrap_or_else(|_| text.trim().to_string())
}

const TRIAL_COLUMNS: [&str; 6] = [
    "REDO_PLATE",
    "REDO_WELL",
    "trial",
    "src_plate",
    "src_well",
    "src_location",
];

/// Adds the source columns derived from OUTPUT_LOCATION (`plate#well`).
fn annotate_trial(sheet: &Sheet, trial: &str) -> Result<Sheet> {
    let location = sheet.require("OUTPUT_LOCATION")?;
    let mut headers: Vec<String> = sheet
        .headers
        .iter()
        .filter(|h| !h.is_empty() && !h.starts_with("Unnamed") && !TRIAL_COLUMNS.contains(&h.as_str()))
        .cloned()
        .collect();
    let keep: Vec<usize> = headers.iter().filter_map(|h| sheet.column(h)).collect();
    headers.extend(TRIAL_COLUMNS.iter().map(|c| c.to_string()));
    let mut rows = Vec::with_capacity(sheet.rows.len());
    for i in 0..sheet.rows.len() {
        let text = sheet.cell(i, location).unwrap_or_default();
        let (plate, well) = text.split_once('#').ok_or_else(|| {
            CompileError::InvalidInput(format!("{trial}: OUTPUT_LOCATION '{text}' is not plate#well"))
        })?;
        let mut row: Vec<String> = keep
            .iter()
            .map(|c| sheet.rows[i].get(*c).cloned().unwrap_or_default())
            .collect();
        row.extend([
            plate.to_string(),
            well.to_string(),
            trial.to_string(),
            plate.to_string(),
            well.to_string(),
            format!("{trial}#{plate}#{well}"),
        ]);
        rows.push(row);
    }
    Ok(Sheet { headers, rows })
}

fn is_good(sheet: &Sheet, row: usize, good: usize) -> bool {
    sheet
        .cell(row, good)
        .is_some_and(|c| matches!(c.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "t"))
}

/// Starts from trial 1; a good reaction of any trial replaces a reaction
/// at the same OUTPUT_PLATE / OUTPUT_WELL that has not succeeded yet.
pub fn consolidate_pcr_trials(trials: &[Sheet]) -> Result<Sheet> {
    let annotated: Vec<Sheet> = trials
        .iter()
        .enumerate()
        .map(|(i, sheet)| annotate_trial(sheet, &format!("trial_{}", i + 1)))
        .collect::<Result<_>>()?;
    let Some(first) = annotated.first() else {
        return Err(CompileError::MissingWorksheet {
            step: CONSOLIDATE_STEP.to_string(),
            trial: 1,
            name: PCR_RESULTS.to_string(),
        });
    };
    let mut consolidated = first.clone();
    let key_columns = |sheet: &Sheet| -> Result<(usize, usize, usize)> {
        Ok((
            sheet.require("OUTPUT_PLATE")?,
            sheet.require("OUTPUT_WELL")?,
            sheet.require("GOOD")?,
        ))
    };
    let (plate, well, good) = key_columns(&consolidated)?;
    let key = |sheet: &Sheet, row: usize, plate: usize, well: usize| {
        (
            sheet.cell(row, plate).unwrap_or_default().to_string(),
            normalized_well(sheet.cell(row, well).unwrap_or_default()),
        )
    };
    let index: HashMap<(String, String), usize> = (0..consolidated.rows.len())
        .map(|r| (key(&consolidated, r, plate, well), r))
        .collect();

    for trial in &annotated {
        let (t_plate, t_well, t_good) = key_columns(trial)?;
        for r in (0..trial.rows.len()).filter(|r| is_good(trial, *r, t_good)) {
            let k = key(trial, r, t_plate, t_well);
            let Some(&target) = index.get(&k) else {
                warn!("No trial_1 reaction at {}#{}, skipped", k.0, k.1);
                continue;
            };
            if is_good(&consolidated, target, good) {
                continue;
            }
            consolidated.rows[target] = consolidated
                .headers
                .iter()
                .map(|h| {
                    trial
                        .column(h)
                        .and_then(|c| trial.rows[r].get(c).cloned())
                        .unwrap_or_default()
                })
                .collect();
        }
    }
    Ok(consolidated)
}

/// Human transfer sheet, plate map and Biomek sheet for moving every good
/// consolidated reaction back onto its output plate.
pub fn consolidation_instructions(consolidated: &Sheet) -> Result<(Sheet, Sheet, Sheet)> {
    let good = consolidated.require("GOOD")?;
    let trial = consolidated.require("trial")?;
    let src_plate = consolidated.require("src_plate")?;
    let src_well = consolidated.require("src_well")?;
    let dest_plate = consolidated.require("OUTPUT_PLATE")?;
    let dest_well = consolidated.require("OUTPUT_WELL")?;
    let transfers: Vec<[String; 4]> = (0..consolidated.rows.len())
        .filter(|r| is_good(consolidated, *r, good))
        .map(|r| {
            let cell = |c| consolidated.cell(r, c).unwrap_or_default().to_string();
            [
                format!("{}#{}", cell(trial), cell(src_plate)),
                cell(src_well),
                cell(dest_plate),
                cell(dest_well),
            ]
        })
        .collect();

    let sources: BTreeSet<&str> = transfers.iter().map(|t| t[0].as_str()).collect();
    let destinations: BTreeSet<&str> = transfers.iter().map(|t| t[2].as_str()).collect();
    let variables = [
        ("src_plt_num", sources.len()),
        ("dest_plt_num", destinations.len()),
        ("sample_num", transfers.len()),
    ];
    let headers: Vec<String> = ["variable_name", "value", "src_plt", "src_well", "dest_plt", "dest_well", "vol"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows: Vec<Vec<String>> = (0..transfers.len().max(variables.len()))
        .map(|i| {
            let mut row = match variables.get(i) {
                Some((name, value)) => vec![name.to_string(), value.to_string()],
                None => vec![String::new(), String::new()],
            };
            match transfers.get(i) {
                Some(t) => {
                    row.extend(t.iter().cloned());
                    row.push(CONSOLIDATION_VOLUME_UL.to_string());
                }
                None => row.extend(std::iter::repeat_n(String::new(), 5)),
            }
            row
        })
        .collect();
    let human = Sheet { headers, rows };

    let map: Vec<(String, String)> = sources
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("src_{}", i + 1), p.to_string()))
        .chain(
            destinations
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("dest_{}", i + 1), p.to_string())),
        )
        .collect();
    let plate_map = Sheet {
        headers: vec!["biomek_name".to_string(), "plate_name".to_string()],
        rows: map.iter().map(|(b, p)| vec![b.clone(), p.clone()]).collect(),
    };

    let rename: HashMap<&str, &str> = map.iter().map(|(b, p)| (p.as_str(), b.as_str())).collect();
    let mut biomek = human.clone();
    for row in &mut biomek.rows {
        for cell in row.iter_mut() {
            if let Some(name) = rename.get(cell.as_str()) {
                *cell = name.to_string();
            }
        }
    }
    Ok((human, plate_map, biomek))
}

/// Consolidates trials 1 to `trials` from the store.
pub fn consolidate_from_store(store: &WorksheetStore, trials: u32) -> Result<Bundle> {
    let sheets: Vec<Sheet> = (1..=trials)
        .map(|t| Sheet::from_csv(store.get(CONSOLIDATE_STEP, t, PCR_RESULTS)?))
        .collect::<Result<_>>()?;
    let consolidated = consolidate_pcr_trials(&sheets)?;
    let (human, plate_map, biomek) = consolidation_instructions(&consolidated)?;
    info!("Consolidated {trials} PCR trials");
    let mut bundle = Bundle::default();
    bundle.insert("consolidated_pcr_worksheet.csv", consolidated.to_csv()?);
    bundle.insert("consolidate_instructions.csv", human.to_csv()?);
    bundle.insert("biomek_plate_map.csv", plate_map.to_csv()?);
    bundle.insert(
        "biomek_instructions.csv",
        table::write_records(&biomek.headers, &biomek.rows, true)?,
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts;

    fn results(plates: usize, per_plate: usize, failed: &[usize]) -> Vec<(PcrRow, bool)> {
        let (_, pcrs, _) = parts::tests::sample_worksheets();
        (0..plates * per_plate)
            .map(|i| {
                let mut row = pcrs[0].clone();
                row.output_plate = format!("pcr_plate_{}", i / per_plate + 1);
                row.output_well = wells::well_at(i % per_plate, WellOrder::ColumnMajor, PlateFormat::Plate96);
                (row, !failed.contains(&i))
            })
            .collect()
    }

    #[test]
    fn test_store_names_missing_worksheet() {
        let store = WorksheetStore::default();
        match create_pcr_redo(&store, 2) {
            Err(CompileError::MissingWorksheet { step, trial, name }) => {
                assert_eq!(step, ANALYZE_STEP);
                assert_eq!(trial, 2);
                assert_eq!(name, PCR_RESULTS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_single_plate_keeps_wells() {
        let rows = redo_worksheet(&results(1, 10, &[3, 7]), 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].redo_plate, "redo_pcr_plate_T2_1");
        assert_eq!(rows[0].redo_well, rows[0].pcr.output_well);
        assert_eq!(rows[1].redo_well.to_string(), "H1");
    }

    #[test]
    fn test_many_plates_consolidate() {
        let rows = redo_worksheet(&results(3, 10, &[1, 12, 25]), 1);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.redo_plate == "redo_pcr_plate_T1_1"));
        assert_eq!(
            rows.iter().map(|r| r.redo_well.to_string()).collect::<Vec<_>>(),
            vec!["A1", "B1", "C1"]
        );
    }

    #[test]
    fn test_no_failures() {
        assert!(redo_worksheet(&results(1, 4, &[]), 2).is_empty());
    }

    #[test]
    fn test_redo_from_store() {
        let results = results(1, 4, &[2]);
        let headers: Vec<String> = PcrRow::COLUMNS
            .iter()
            .chain(&["GOOD"])
            .map(|c| c.to_string())
            .collect();
        let records: Vec<Vec<String>> = results
            .iter()
            .map(|(row, good)| {
                let mut record = table::to_record(row).unwrap();
                record.push(if *good { "True" } else { "False" }.to_string());
                record
            })
            .collect();
        let mut store = WorksheetStore::default();
        store.insert(
            ANALYZE_STEP,
            1,
            PCR_RESULTS,
            table::write_records(&headers, &records, false).unwrap(),
        );
        let bundle = create_pcr_redo(&store, 1).unwrap();
        let worksheet = read_redo_worksheet(bundle.get("redo_pcr_worksheet.csv").unwrap()).unwrap();
        assert_eq!(worksheet.len(), 1);
        assert_eq!(worksheet[0].redo_plate, "redo_pcr_plate_T2_1");
        assert_eq!(worksheet[0].redo_well.to_string(), "C1");
        let echo = bundle.get("redo_pcr_echo_instructions.csv").unwrap();
        assert_eq!(echo.lines().count(), 4);
        assert!(echo.contains(",redo_pcr_plate_T2_1,C1,"));
    }

    const TRIAL_1: &str = "\
,OUTPUT_PLATE,OUTPUT_WELL,OUTPUT_LOCATION,GOOD
0,pcr_plate_1,A1,pcr_plate_1#A01,True
1,pcr_plate_1,B1,pcr_plate_1#B01,False
2,pcr_plate_1,C1,pcr_plate_1#C01,False
";
    const TRIAL_2: &str = "\
,OUTPUT_PLATE,OUTPUT_WELL,OUTPUT_LOCATION,GOOD
0,pcr_plate_1,B1,redo_pcr_plate_T2_1#B01,True
1,pcr_plate_1,C1,redo_pcr_plate_T2_1#C01,False
";

    #[test]
    fn test_consolidate_trials() {
        let trials = [Sheet::from_csv(TRIAL_1).unwrap(), Sheet::from_csv(TRIAL_2).unwrap()];
        let consolidated = consolidate_pcr_trials(&trials).unwrap();
        assert!(consolidated.column("Unnamed: 0").is_none());
        let trial = consolidated.require("trial").unwrap();
        let src = consolidated.require("src_plate").unwrap();
        assert_eq!(consolidated.cell(0, trial), Some("trial_1"));
        assert_eq!(consolidated.cell(1, trial), Some("trial_2"));
        assert_eq!(consolidated.cell(1, src), Some("redo_pcr_plate_T2_1"));
        assert_eq!(consolidated.cell(2, trial), Some("trial_1"));

        let (human, plate_map, biomek) = consolidation_instructions(&consolidated).unwrap();
        assert_eq!(human.rows.len(), 3);
        assert_eq!(human.rows[0][..2], ["src_plt_num".to_string(), "2".to_string()]);
        assert_eq!(human.rows[2][..2], ["sample_num".to_string(), "2".to_string()]);
        assert_eq!(human.rows[1][2], "trial_2#redo_pcr_plate_T2_1");
        assert_eq!(human.rows[1][6], "50");
        assert_eq!(human.rows[2][2], "");
        assert_eq!(plate_map.rows[0], vec!["src_1", "trial_1#pcr_plate_1"]);
        assert_eq!(plate_map.rows[2], vec!["dest_1", "pcr_plate_1"]);
        assert_eq!(biomek.rows[0][2], "src_1");
        assert_eq!(biomek.rows[0][4], "dest_1");
    }

    #[test]
    fn test_consolidate_from_store() {
        let mut store = WorksheetStore::default();
        store.insert(CONSOLIDATE_STEP, 1, PCR_RESULTS, TRIAL_1);
        assert!(matches!(
            consolidate_from_store(&store, 2),
            Err(CompileError::MissingWorksheet { trial: 2, .. })
        ));
        store.insert(CONSOLIDATE_STEP, 2, PCR_RESULTS, TRIAL_2);
        let bundle = consolidate_from_store(&store, 2).unwrap();
        assert!(bundle.get("biomek_instructions.csv").unwrap().contains("\r\n"));
        assert_eq!(bundle.len(), 4);
    }
}
