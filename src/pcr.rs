//! PCR worksheet: one row per PCR reaction instance, placed in a
//! thermocycler zone, then stamped onto the parts and zag plates.

use crate::design::{Design, SourceKind};
use crate::distribute;
use crate::error::{CompileError, Result};
use crate::plates::PlateWell;
use crate::table::Tabular;
use crate::thermocycler::{self, ZoneProgram};
use crate::tm_service::AnnealingTemperatureService;
use crate::volume::AssemblyVolume;
use crate::wells::{self, PlateFormat, Well, WellOrder};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Transfer volumes into a PCR reaction, in nL.
pub const TEMPLATE_VOLUME_NL: u32 = 100;
pub const PRIMER_VOLUME_NL: u32 = 250;
/// The zag plate leaves H12 free for a ladder.
const ZAG_WELLS: usize = 95;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrRow {
    #[serde(rename = "REACTION_NUMBER")]
    pub reaction: u32,
    #[serde(rename = "TEMPLATE_NAME")]
    pub template_name: String,
    #[serde(rename = "TEMPLATE_PLATE")]
    pub template_plate: String,
    #[serde(rename = "TEMPLATE_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub template_well: Well,
    #[serde(rename = "TEMPLATE_VOLUME")]
    pub template_volume: u32,
    #[serde(rename = "PRIMER1_NAME")]
    pub primer1_name: String,
    #[serde(rename = "PRIMER1_PLATE")]
    pub primer1_plate: String,
    #[serde(rename = "PRIMER1_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub primer1_well: Well,
    #[serde(rename = "PRIMER1_VOLUME")]
    pub primer1_volume: u32,
    #[serde(rename = "PRIMER2_NAME")]
    pub primer2_name: String,
    #[serde(rename = "PRIMER2_PLATE")]
    pub primer2_plate: String,
    #[serde(rename = "PRIMER2_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub primer2_well: Well,
    #[serde(rename = "PRIMER2_VOLUME")]
    pub primer2_volume: u32,
    #[serde(rename = "Mean Oligo Tm")]
    pub mean_oligo_tm: f64,
    #[serde(rename = "Mean Oligo Tm (NEB)")]
    pub mean_oligo_tm_neb: f64,
    #[serde(rename = "OUTPUT_PLATE")]
    pub output_plate: String,
    #[serde(rename = "OUTPUT_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub output_well: Well,
    #[serde(rename = "OPTIMAL_ANNEALING_TEMP")]
    pub optimal_annealing_temp: f64,
    #[serde(rename = "THERMOCYCLER_BLOCK")]
    pub block: usize,
    #[serde(rename = "THERMOCYCLER_ZONE")]
    pub zone: usize,
    #[serde(rename = "THERMOCYCLER_ZONE_ANNEALING_TEMP")]
    pub zone_annealing_temp: f64,
    #[serde(rename = "EXPECTED_SIZE")]
    pub expected_size: usize,
    #[serde(rename = "PARTS_SOURCE_PLATE", default)]
    pub parts_plate: Option<String>,
    #[serde(rename = "PARTS_WELL", default)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub parts_well: Option<Well>,
    #[serde(rename = "ZAG_PLATE", default)]
    pub zag_plate: Option<String>,
    #[serde(rename = "ZAG_WELL", default)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub zag_well: Option<Well>,
}

impl Tabular for PcrRow {
    const COLUMNS: &'static [&'static str] = &[
        "REACTION_NUMBER",
        "TEMPLATE_NAME",
        "TEMPLATE_PLATE",
        "TEMPLATE_WELL",
        "TEMPLATE_VOLUME",
        "PRIMER1_NAME",
        "PRIMER1_PLATE",
        "PRIMER1_WELL",
        "PRIMER1_VOLUME",
        "PRIMER2_NAME",
        "PRIMER2_PLATE",
        "PRIMER2_WELL",
        "PRIMER2_VOLUME",
        "Mean Oligo Tm",
        "Mean Oligo Tm (NEB)",
        "OUTPUT_PLATE",
        "OUTPUT_WELL",
        "OPTIMAL_ANNEALING_TEMP",
        "THERMOCYCLER_BLOCK",
        "THERMOCYCLER_ZONE",
        "THERMOCYCLER_ZONE_ANNEALING_TEMP",
        "EXPECTED_SIZE",
        "PARTS_SOURCE_PLATE",
        "PARTS_WELL",
        "ZAG_PLATE",
        "ZAG_WELL",
    ];
}

/// A reaction instance before it has been placed on a PCR plate.
struct Instance<'a> {
    reaction: u32,
    template: &'a PlateWell,
    primer1: &'a PlateWell,
    primer2: &'a PlateWell,
    pair: (String, String),
    mean_oligo_tm: f64,
    expected_size: usize,
}

fn lookup<'a>(plate: &HashMap<&str, &'a PlateWell>, name: &str, what: &str, reaction: u32) -> Result<&'a PlateWell> {
    plate.get(name).copied().ok_or_else(|| {
        CompileError::InvalidInput(format!("{what} '{name}' of PCR {reaction} is not on any plate"))
    })
}

/// Summed uses of the PCR-kind parts per PCR reaction ID.
pub fn pcr_uses(volumes: &[AssemblyVolume]) -> HashMap<u32, usize> {
    let mut uses = HashMap::new();
    for volume in volumes
        .iter()
        .filter(|v| v.part_type.source_kind() == SourceKind::Pcr)
    {
        *uses.entry(volume.type_id).or_insert(0) += volume.uses;
    }
    uses
}

/// Builds the PCR worksheet and the thermocycler program. Each PCR is
/// repeated once per reaction its parts need; instances are clustered by
/// annealing temperature and laid out zone by zone.
pub fn distribute_pcr(
    design: &Design,
    templates: &[PlateWell],
    oligos: &[PlateWell],
    volumes: &[AssemblyVolume],
    max_well_uses: usize,
    tm_service: &dyn AnnealingTemperatureService,
) -> Result<(Vec<PcrRow>, Vec<ZoneProgram>)> {
    let template_wells: HashMap<&str, &PlateWell> =
        templates.iter().map(|t| (t.liquid.as_str(), t)).collect();
    let oligo_wells: HashMap<&str, &PlateWell> =
        oligos.iter().map(|o| (o.liquid.as_str(), o)).collect();
    let sequences: HashMap<&str, &str> = design
        .oligos
        .iter()
        .map(|o| (o.name.as_str(), o.sequence.as_str()))
        .collect();
    let uses = pcr_uses(volumes);

    let mut instances = vec![];
    for pcr in &design.pcrs {
        let count = distribute::reactions_for_uses(uses.get(&pcr.id).copied().unwrap_or(0), max_well_uses);
        if count == 0 {
            warn!("PCR {} is not used by any part, skipping", pcr.id);
            continue;
        }
        let sequence = |name: &str| {
            sequences.get(name).map(|s| s.to_string()).ok_or_else(|| {
                CompileError::InvalidInput(format!("primer '{name}' of PCR {} has no sequence", pcr.id))
            })
        };
        let pair = (
            sequence(&pcr.forward_primer_name)?,
            sequence(&pcr.reverse_primer_name)?,
        );
        let template = lookup(&template_wells, &pcr.primary_template, "template", pcr.id)?;
        let primer1 = lookup(&oligo_wells, &pcr.forward_primer_name, "primer", pcr.id)?;
        let primer2 = lookup(&oligo_wells, &pcr.reverse_primer_name, "primer", pcr.id)?;
        for _ in 0..count {
            instances.push(Instance {
                reaction: pcr.id,
                template,
                primer1,
                primer2,
                pair: pair.clone(),
                mean_oligo_tm: pcr.mean_oligo_tm,
                expected_size: pcr.length,
            });
        }
    }
    if instances.is_empty() {
        return Ok((vec![], vec![]));
    }

    let pairs: Vec<(String, String)> = instances.iter().map(|i| i.pair.clone()).collect();
    let temperatures = tm_service.annealing_temperatures(&pairs)?;
    let clustering = thermocycler::cluster_zones(&temperatures)?;
    debug!(
        "Clustered {} PCR instances into {} zones",
        instances.len(),
        clustering.zone_count()
    );

    let order: Vec<usize> = (0..instances.len())
        .sorted_by(|a, b| {
            clustering.labels[*a]
                .cmp(&clustering.labels[*b])
                .then(temperatures[*a].total_cmp(&temperatures[*b]))
                .then(instances[*a].reaction.cmp(&instances[*b].reaction))
        })
        .collect();
    let zones: Vec<usize> = order.iter().map(|i| clustering.labels[*i]).collect();
    let outputs = thermocycler::assign_zone_wells(&zones)?;

    let rows: Vec<PcrRow> = order
        .iter()
        .zip(outputs)
        .map(|(index, output)| {
            let instance = &instances[*index];
            let zone = clustering.labels[*index];
            PcrRow {
                reaction: instance.reaction,
                template_name: instance.template.liquid.clone(),
                template_plate: instance.template.plate.clone(),
                template_well: instance.template.well,
                template_volume: TEMPLATE_VOLUME_NL,
                primer1_name: instance.primer1.liquid.clone(),
                primer1_plate: instance.primer1.plate.clone(),
                primer1_well: instance.primer1.well,
                primer1_volume: PRIMER_VOLUME_NL,
                primer2_name: instance.primer2.liquid.clone(),
                primer2_plate: instance.primer2.plate.clone(),
                primer2_well: instance.primer2.well,
                primer2_volume: PRIMER_VOLUME_NL,
                mean_oligo_tm: instance.mean_oligo_tm,
                mean_oligo_tm_neb: temperatures[*index],
                output_plate: output.plate,
                output_well: output.well,
                optimal_annealing_temp: temperatures[*index],
                block: thermocycler::block_of(zone),
                zone,
                zone_annealing_temp: clustering.centroids[zone],
                expected_size: instance.expected_size,
                parts_plate: None,
                parts_well: None,
                zag_plate: None,
                zag_well: None,
            }
        })
        .collect();
    let program = thermocycler::program(
        rows.iter()
            .map(|r| (r.zone, r.zone_annealing_temp, r.expected_size)),
    );
    Ok((rows, program))
}

/// Adds the parts plate and zag plate destinations. Four PCR plates share
/// one 384-well parts plate, one quadrant each.
pub fn stamp_pcrs(rows: &mut [PcrRow]) -> Result<()> {
    for (i, row) in rows.iter_mut().enumerate() {
        let n = wells::plate_number(&row.output_plate)?;
        row.parts_plate = Some(format!("parts_plate_{}", (n - 1) / 4 + 1));
        row.parts_well = Some(wells::stamp(row.output_well, (n - 1) % 4)?);
        row.zag_plate = Some(format!("zag_plate_{}", i / ZAG_WELLS + 1));
        row.zag_well = Some(wells::well_at(i % ZAG_WELLS, WellOrder::RowMajor, PlateFormat::Plate96));
    }
    Ok(())
}

/// Distinct PCR plate names, in worksheet order.
pub fn output_plates(rows: &[PcrRow]) -> Vec<String> {
    rows.iter().map(|r| r.output_plate.clone()).unique().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;
    use crate::plates;
    use crate::tm_service::DesignTmService;
    use crate::volume;

    fn sample() -> (Design, Vec<PlateWell>, Vec<PlateWell>, Vec<AssemblyVolume>) {
        let design = Design::parse(SAMPLE_DESIGN).unwrap();
        let templates = plates::templates_plate(&design);
        let oligos = plates::oligos_plate(&design);
        let volumes = volume::assembly_volumes(&design);
        (design, templates, oligos, volumes)
    }

    struct FixedTm(f64);

    impl AnnealingTemperatureService for FixedTm {
        fn annealing_temperatures(&self, pairs: &[(String, String)]) -> Result<Vec<f64>> {
            Ok(vec![self.0; pairs.len()])
        }
    }

    #[test]
    fn test_sample_worksheet() {
        let (design, templates, oligos, volumes) = sample();
        let service = DesignTmService::from_design(&design);
        let (rows, program) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &service).unwrap();
        assert_eq!(rows.len(), 2);
        // fewer than six reactions: one zone each, coolest first
        assert_eq!(rows[0].reaction, 0);
        assert_eq!(rows[0].zone, 0);
        assert_eq!(rows[0].output_well.to_string(), "A1");
        assert_eq!(rows[1].zone, 1);
        assert_eq!(rows[1].output_well.to_string(), "A3");
        assert_eq!(rows[1].template_name, "pGFP");
        assert_eq!(rows[1].primer1_name, "oligo_c");
        assert_eq!(rows[1].primer2_well.to_string(), "A4");
        assert_eq!(rows[1].optimal_annealing_temp, 62.5);
        assert_eq!(rows[0].template_volume, 100);
        assert_eq!(rows[0].primer1_volume, 250);
        assert_eq!(program.len(), 2);
        assert_eq!(program[1].annealing_temp, 62.5);
    }

    #[test]
    fn test_high_use_pcr_is_repeated() {
        let (design, templates, oligos, mut volumes) = sample();
        volumes[2].uses = 17;
        let (rows, _) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &FixedTm(60.0)).unwrap();
        assert_eq!(rows.iter().filter(|r| r.reaction == 1).count(), 3);
        assert_eq!(rows.len(), 4);
        // six or fewer, all one temperature: each gets its own zone column
        let wells: Vec<String> = rows.iter().map(|r| r.output_well.to_string()).collect();
        assert_eq!(wells, vec!["A1", "A3", "A5", "A7"]);
    }

    #[test]
    fn test_unused_pcr_is_skipped() {
        let (design, templates, oligos, mut volumes) = sample();
        volumes[1].uses = 0;
        let (rows, _) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &FixedTm(60.0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reaction, 1);
    }

    #[test]
    fn test_zone_cap_on_large_runs() {
        let (design, templates, oligos, mut volumes) = sample();
        volumes[1].uses = 8 * 30;
        volumes[2].uses = 8 * 30;
        let (rows, program) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &DesignTmService::from_design(&design))
                .unwrap();
        assert_eq!(rows.len(), 60);
        let sizes = rows.iter().counts_by(|r| r.zone);
        assert_eq!(sizes.len(), 6);
        assert!(sizes.values().all(|s| *s <= 16));
        let placed: std::collections::HashSet<(String, Well)> =
            rows.iter().map(|r| (r.output_plate.clone(), r.output_well)).collect();
        assert_eq!(placed.len(), 60);
        assert_eq!(program.len(), 6);
    }

    #[test]
    fn test_stamp_pcrs() {
        let (design, templates, oligos, volumes) = sample();
        let (mut rows, _) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &FixedTm(60.0)).unwrap();
        rows[1].output_plate = "pcr_plate_6".to_string();
        stamp_pcrs(&mut rows).unwrap();
        assert_eq!(rows[0].parts_plate.as_deref(), Some("parts_plate_1"));
        assert_eq!(rows[0].parts_well.unwrap().to_string(), "A1");
        assert_eq!(rows[1].parts_plate.as_deref(), Some("parts_plate_2"));
        // plate 6 is quadrant 1 of parts plate 2; A3 stamps to A6
        assert_eq!(rows[1].parts_well.unwrap().to_string(), "A6");
        assert_eq!(rows[1].zag_plate.as_deref(), Some("zag_plate_1"));
        assert_eq!(rows[1].zag_well.unwrap().to_string(), "A2");
    }

    #[test]
    fn test_zag_skips_h12() {
        let (design, templates, oligos, mut volumes) = sample();
        volumes[1].uses = 8 * 50;
        volumes[2].uses = 8 * 50;
        let (mut rows, _) =
            distribute_pcr(&design, &templates, &oligos, &volumes, 8, &FixedTm(60.0)).unwrap();
        stamp_pcrs(&mut rows).unwrap();
        assert_eq!(rows[94].zag_well.unwrap().to_string(), "H11");
        assert_eq!(rows[95].zag_plate.as_deref(), Some("zag_plate_2"));
        assert_eq!(rows[95].zag_well.unwrap().to_string(), "A1");
        let text = crate::table::to_csv(&rows).unwrap();
        let back: Vec<PcrRow> = crate::table::from_csv(&text).unwrap();
        assert_eq!(back[95], rows[95]);
    }
}
