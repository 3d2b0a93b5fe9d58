//! Compiles designs into the workflow bundle, one protocol step at a time.
//!
//! A [`PipelineContext`] carries the settings, the condensed design and
//! every worksheet produced so far from step to step. Each step writes its
//! files into `Step_{n}-{Title}/` and records plates and instruction sets
//! in the [`WorkflowRecord`].

use crate::assembly::{self, ConstructRow};
use crate::biomek;
use crate::bundle::Bundle;
use crate::condense;
use crate::design::Design;
use crate::digests::{self, DigestRow};
use crate::equimolar;
use crate::error::{CompileError, Result};
use crate::input::DesignBundle;
use crate::instructions::{self, TransferMethod, Worksheet};
use crate::parts::{self, QuantRow};
use crate::pcr::{self, PcrRow};
use crate::plates::{self, PlateKind, PlateWell};
use crate::readme;
use crate::registry;
use crate::settings::CompilerSettings;
use crate::table::{self, Tabular};
use crate::tm_service::{self, AnnealingTemperatureService};
use crate::volume::{self, AssemblyVolume};
use crate::wells::{Location, PlateFormat};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

pub const INPUT_DIR: &str = "Input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolStep {
    OrderGenes,
    OrderOligos,
    PrepareTemplates,
    PerformPcrs,
    AnalyzePcrs,
    RedoPcrs,
    ConsolidatePcrs,
    RestrictionDigests,
    PcrCleanup,
    QuantifyPartYield,
    PerformAssembly,
    YeastPlasmidPrep,
    EcoliTransformation,
    ColonyPicking,
    RequestNgs,
    SubmitNgsSamples,
    AnalyzeNgsResults,
    CherrypickConstructs,
    SubmitToRegistry,
}

impl ProtocolStep {
    pub const ALL: [ProtocolStep; 19] = [
        ProtocolStep::OrderGenes,
        ProtocolStep::OrderOligos,
        ProtocolStep::PrepareTemplates,
        ProtocolStep::PerformPcrs,
        ProtocolStep::AnalyzePcrs,
        ProtocolStep::RedoPcrs,
        ProtocolStep::ConsolidatePcrs,
        ProtocolStep::RestrictionDigests,
        ProtocolStep::PcrCleanup,
        ProtocolStep::QuantifyPartYield,
        ProtocolStep::PerformAssembly,
        ProtocolStep::YeastPlasmidPrep,
        ProtocolStep::EcoliTransformation,
        ProtocolStep::ColonyPicking,
        ProtocolStep::RequestNgs,
        ProtocolStep::SubmitNgsSamples,
        ProtocolStep::AnalyzeNgsResults,
        ProtocolStep::CherrypickConstructs,
        ProtocolStep::SubmitToRegistry,
    ];

    /// 1-based position in the protocol.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn title(self) -> &'static str {
        match self {
            ProtocolStep::OrderGenes => "Order_genes",
            ProtocolStep::OrderOligos => "Order_oligos",
            ProtocolStep::PrepareTemplates => "Prepare_templates",
            ProtocolStep::PerformPcrs => "Perform_PCRs",
            ProtocolStep::AnalyzePcrs => "Analyze_PCRs",
            ProtocolStep::RedoPcrs => "Redo_PCRs",
            ProtocolStep::ConsolidatePcrs => "Consolidate_PCRs",
            ProtocolStep::RestrictionDigests => "Restriction_Digests",
            ProtocolStep::PcrCleanup => "PCR_Cleanup",
            ProtocolStep::QuantifyPartYield => "Quantify_Part_Yield",
            ProtocolStep::PerformAssembly => "Perform_Assembly",
            ProtocolStep::YeastPlasmidPrep => "Yeast_Plasmid_Prep",
            ProtocolStep::EcoliTransformation => "Ecoli_Transformation",
            ProtocolStep::ColonyPicking => "Colony_Picking",
            ProtocolStep::RequestNgs => "Request_NGS",
            ProtocolStep::SubmitNgsSamples => "Submit_NGS_Samples",
            ProtocolStep::AnalyzeNgsResults => "Analyze_NGS_Results",
            ProtocolStep::CherrypickConstructs => "Cherrypick_Constructs",
            ProtocolStep::SubmitToRegistry => "Submit_To_Registry",
        }
    }

    pub fn dir_name(self) -> String {
        format!("Step_{}-{}", self.number(), self.title())
    }

    /// Steps done by hand or by an outside provider; they only get a README.
    pub fn is_manual(self) -> bool {
        matches!(
            self,
            ProtocolStep::RedoPcrs
                | ProtocolStep::ConsolidatePcrs
                | ProtocolStep::YeastPlasmidPrep
                | ProtocolStep::EcoliTransformation
                | ProtocolStep::ColonyPicking
                | ProtocolStep::SubmitNgsSamples
                | ProtocolStep::AnalyzeNgsResults
                | ProtocolStep::CherrypickConstructs
                | ProtocolStep::SubmitToRegistry
        )
    }
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateCsv {
    pub name: String,
    pub size: usize,
    pub plate_type: PlateKind,
    pub plate_names: Vec<String>,
    pub raw_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub category: String,
    pub trial: u32,
    pub data: String,
    pub associations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub number: u32,
    pub title: String,
    pub status: StepStatus,
}

/// What a compilation produced, in a form a tracking database can load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub plate_csvs: Vec<PlateCsv>,
    pub instructions: Vec<InstructionRecord>,
    pub steps: Vec<StepRecord>,
}

impl WorkflowRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Worksheets handed from one step to the next.
#[derive(Debug, Default)]
struct Worksheets {
    volumes: Vec<AssemblyVolume>,
    pcrs: Vec<PcrRow>,
    digests: Vec<DigestRow>,
    locations: BTreeMap<u32, Vec<Location>>,
    quant: Vec<QuantRow>,
    constructs: Vec<ConstructRow>,
}

pub struct PipelineContext<'a> {
    settings: &'a CompilerSettings,
    tm_service: &'a dyn AnnealingTemperatureService,
    design: Design,
    sheets: Worksheets,
    files: BTreeMap<ProtocolStep, Vec<String>>,
    bundle: Bundle,
    record: WorkflowRecord,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        settings: &'a CompilerSettings,
        tm_service: &'a dyn AnnealingTemperatureService,
        design: Design,
    ) -> Self {
        Self {
            settings,
            tm_service,
            design,
            sheets: Worksheets::default(),
            files: BTreeMap::new(),
            bundle: Bundle::default(),
            record: WorkflowRecord::default(),
        }
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    fn emit(&mut self, step: ProtocolStep, file: &str, text: String) {
        self.bundle.insert(format!("{}/{file}", step.dir_name()), text);
        self.files.entry(step).or_default().push(file.to_string());
    }

    fn emit_table<T: Tabular>(&mut self, step: ProtocolStep, file: &str, rows: &[T]) -> Result<String> {
        let text = table::to_csv(rows)?;
        self.emit(step, file, text.clone());
        Ok(text)
    }

    fn record_plate(
        &mut self,
        file: &str,
        plate_type: PlateKind,
        format: PlateFormat,
        plate_names: Vec<String>,
        raw_data: String,
    ) {
        self.record.plate_csvs.push(PlateCsv {
            name: file.to_string(),
            size: format.capacity(),
            plate_type,
            plate_names,
            raw_data,
        });
    }

    fn record_instruction(&mut self, category: &str, data: String, associations: &[&str]) {
        self.record.instructions.push(InstructionRecord {
            category: category.to_string(),
            trial: 1,
            data,
            associations: associations.iter().map(|a| a.to_string()).collect(),
        });
    }

    fn emit_transfers(
        &mut self,
        step: ProtocolStep,
        file: &str,
        method: TransferMethod,
        worksheet: Worksheet<'_>,
        associations: &[&str],
    ) -> Result<()> {
        let transfers = instructions::generate(method, worksheet)?;
        let text = self.emit_table(step, file, &transfers)?;
        self.record_instruction(file, text, associations);
        Ok(())
    }

    fn emit_biomek(
        &mut self,
        step: ProtocolStep,
        file: &str,
        sheet: &table::Sheet,
        associations: &[&str],
    ) -> Result<()> {
        let text = biomek::to_csv(sheet)?;
        self.emit(step, file, text.clone());
        self.record_instruction(file, text, associations);
        Ok(())
    }

    /// Runs one step against the worksheets of the steps before it.
    pub fn run(&mut self, step: ProtocolStep) -> Result<()> {
        debug!(step = %step, "running step");
        match step {
            ProtocolStep::OrderGenes => self.order_genes(),
            ProtocolStep::OrderOligos => self.order_oligos(),
            ProtocolStep::PrepareTemplates => self.prepare_templates(),
            ProtocolStep::PerformPcrs => self.perform_pcrs(),
            ProtocolStep::AnalyzePcrs => self.analyze_pcrs(),
            ProtocolStep::RestrictionDigests => self.restriction_digests(),
            ProtocolStep::PcrCleanup => {
                let sheet = biomek::bead_sheet(&self.sheets.pcrs);
                self.emit_biomek(step, "bead_biomek_instructions.csv", &sheet, &["pcr"])
            }
            ProtocolStep::QuantifyPartYield => self.quantify_part_yield(),
            ProtocolStep::PerformAssembly => self.perform_assembly(),
            ProtocolStep::RequestNgs => self.request_ngs(),
            manual => {
                debug!(step = %manual, "manual step");
                Ok(())
            }
        }
    }

    fn order_genes(&mut self) -> Result<()> {
        let synths = plates::synths_plate(&self.design);
        let names = plates::plate_names(synths.iter().map(|s| s.plate.as_str()));
        let text = self.emit_table(ProtocolStep::OrderGenes, "synths_plate.csv", &synths)?;
        self.record_plate("synths_plate.csv", PlateKind::Synth, PlateFormat::Plate96, names, text);
        Ok(())
    }

    fn order_oligos(&mut self) -> Result<()> {
        let step = ProtocolStep::OrderOligos;
        let oligo_plate = plates::oligos_plate(&self.design);
        let order_96 = plates::oligo_order_form(&oligo_plate, &self.design.oligos, PlateFormat::Plate96)?;
        let order_384 = plates::oligo_order_form(&oligo_plate, &self.design.oligos, PlateFormat::Plate384)?;
        let backup = plates::backup_oligos_plate(&oligo_plate, &order_96)?;

        let names = plates::plate_names(oligo_plate.iter().map(|w| w.plate.as_str()));
        let text = self.emit_table(step, "oligos_plate.csv", &oligo_plate)?;
        self.record_plate("oligos_plate.csv", PlateKind::Oligo, PlateFormat::Plate384, names, text);
        let text = self.emit_table(step, "oligos_order_96.csv", &order_96)?;
        self.record_instruction("oligos_order_96.csv", text, &["oligo"]);
        let text = self.emit_table(step, "oligos_order_384.csv", &order_384)?;
        self.record_instruction("oligos_order_384.csv", text, &["oligo"]);
        self.emit_table(step, "backup_oligos_plate.csv", &backup)?;
        Ok(())
    }

    fn prepare_templates(&mut self) -> Result<()> {
        let step = ProtocolStep::PrepareTemplates;
        let templates = plates::templates_plate(&self.design);
        let backup = plates::backup_templates_plate(&templates)?;
        let names = plates::plate_names(templates.iter().map(|w| w.plate.as_str()));
        let text = self.emit_table(step, "templates_plate.csv", &templates)?;
        self.record_plate("templates_plate.csv", PlateKind::Template, PlateFormat::Plate384, names, text);
        self.emit_table(step, "backup_templates_plate.csv", &backup)?;
        Ok(())
    }

    fn perform_pcrs(&mut self) -> Result<()> {
        let step = ProtocolStep::PerformPcrs;
        let templates: Vec<PlateWell> = plates::templates_plate(&self.design);
        let oligos = plates::oligos_plate(&self.design);
        let volumes = volume::assembly_volumes(&self.design);
        let (mut pcrs, programs) = pcr::distribute_pcr(
            &self.design,
            &templates,
            &oligos,
            &volumes,
            self.settings.max_well_uses,
            self.tm_service,
        )?;
        pcr::stamp_pcrs(&mut pcrs)?;
        debug!(reactions = pcrs.len(), zones = programs.len(), "PCRs placed");

        let text = self.emit_table(step, "clean_pcr_worksheet.csv", &pcrs)?;
        self.record_plate(
            "clean_pcr_worksheet.csv",
            PlateKind::Pcr,
            PlateFormat::Plate96,
            pcr::output_plates(&pcrs),
            text.clone(),
        );
        self.record_instruction("pcr_worksheet", text, &["pcr", "template", "oligo", "part"]);
        self.emit_transfers(
            step,
            "pcr_echo_instructions.csv",
            TransferMethod::Pcr,
            Worksheet::Pcr(&pcrs),
            &["pcr", "template", "oligo"],
        )?;
        let sheet = biomek::pcr_sheet(&pcrs, &self.settings.operator_email)?;
        self.emit_biomek(step, "pcr_biomek_instructions.csv", &sheet, &["pcr", "template", "oligo"])?;
        self.emit_table(step, "pcr_thermocycler_instructions.csv", &programs)?;

        self.sheets.volumes = volumes;
        self.sheets.pcrs = pcrs;
        Ok(())
    }

    fn analyze_pcrs(&mut self) -> Result<()> {
        let pcrs = std::mem::take(&mut self.sheets.pcrs);
        let result = self.emit_transfers(
            ProtocolStep::AnalyzePcrs,
            "zag_echo_instructions.csv",
            TransferMethod::Zag,
            Worksheet::Pcr(&pcrs),
            &["pcr"],
        );
        self.sheets.pcrs = pcrs;
        result
    }

    fn restriction_digests(&mut self) -> Result<()> {
        let step = ProtocolStep::RestrictionDigests;
        let pcr_plates = pcr::output_plates(&self.sheets.pcrs).len();
        let digests = digests::create_digests(
            &self.design,
            &self.sheets.volumes,
            self.settings.max_well_uses,
            pcr_plates,
        )?;
        let names = plates::plate_names(digests.iter().map(|d| d.digest_plate.as_str()));
        let text = self.emit_table(step, "digests_plate.csv", &digests)?;
        self.record_plate("digests_plate.csv", PlateKind::Digest, PlateFormat::Plate96, names, text);
        let sheet = biomek::dpni_sheet(&self.sheets.pcrs)?;
        self.emit_biomek(step, "dpni_biomek_instructions.csv", &sheet, &["pcr"])?;
        self.sheets.digests = digests;
        Ok(())
    }

    fn quantify_part_yield(&mut self) -> Result<()> {
        let step = ProtocolStep::QuantifyPartYield;
        let parts_plate = parts::parts_plate(&self.design, &self.sheets.pcrs, &self.sheets.digests)?;
        let locations = parts::part_locations(&self.design, &self.sheets.pcrs, &self.sheets.digests)?;
        let verified = volume::verify_volumes(&self.sheets.volumes, &locations);
        let short = verified.iter().filter(|v| !v.enough).count();
        if short > 0 {
            warn!("{short} part(s) may not yield enough volume");
        }
        let quant = parts::quant_worksheet(&parts_plate);

        let names = plates::plate_names(parts_plate.iter().map(|p| p.part_plate.as_str()));
        let text = self.emit_table(step, "parts_plate.csv", &parts_plate)?;
        self.record_plate("parts_plate.csv", PlateKind::Part, PlateFormat::Plate384, names, text.clone());
        self.record_instruction("part_worksheet", text, &["part"]);
        let text = self.emit_table(step, "quant_worksheet.csv", &quant)?;
        self.record_instruction("quant_worksheet.csv", text, &["quant"]);
        self.emit_transfers(
            step,
            "quant_echo_instructions.csv",
            TransferMethod::Quant,
            Worksheet::Quant(&quant),
            &["quant", "part"],
        )?;
        self.emit_table(step, "volume_verification.csv", &verified)?;

        self.sheets.locations = locations;
        self.sheets.quant = quant;
        Ok(())
    }

    fn perform_assembly(&mut self) -> Result<()> {
        let step = ProtocolStep::PerformAssembly;
        let worksheet =
            assembly::assembly_worksheet(&self.design, &self.sheets.locations, self.settings.max_well_uses)?;
        let constructs = assembly::construct_worksheet(&worksheet);
        let equimolar = equimolar::equimolar_worksheet(&worksheet, &self.sheets.quant, &self.settings.equimolar);

        let text = self.emit_table(step, "clean_assembly_worksheet.csv", &worksheet)?;
        self.record_instruction("clean_assembly_worksheet", text, &["assembly"]);
        self.emit_transfers(
            step,
            "assembly_echo_instructions.csv",
            TransferMethod::Assembly,
            Worksheet::Assembly(&worksheet),
            &["assembly", "part"],
        )?;
        let sheet = biomek::assembly_sheet(&constructs)?;
        self.emit_biomek(step, "assembly_biomek_instructions.csv", &sheet, &["assembly"])?;
        let text = self.emit_table(step, "construct_worksheet.csv", &constructs)?;
        self.record_instruction("construct_worksheet.csv", text, &["construct"]);
        self.emit_table(step, "equimolar_assembly_worksheet.csv", &equimolar)?;
        self.emit_transfers(
            step,
            "equimolar_assembly_echo_instructions.csv",
            TransferMethod::Equimolar,
            Worksheet::Equimolar(&equimolar),
            &["assembly", "part"],
        )?;
        self.sheets.constructs = constructs;
        Ok(())
    }

    fn request_ngs(&mut self) -> Result<()> {
        let step = ProtocolStep::RequestNgs;
        let form = registry::registry_form(&self.sheets.constructs, &self.settings.registry);
        let sequences = registry::registry_sequences(&self.sheets.constructs);
        let text = self.emit_table(step, "registry_submission_form.csv", &form)?;
        self.record_instruction("registry_submission_form.csv", text, &["registry"]);
        let text = self.emit_table(step, "registry_submission_sequences.csv", &sequences)?;
        self.record_instruction("registry_submission_sequences.csv", text, &["registry"]);
        Ok(())
    }

    /// Copies the inputs under `Input/`.
    fn write_inputs(&mut self, input: &DesignBundle) -> Result<()> {
        for duplicate in registry::duplicate_plasmids(&input.plasmid_maps) {
            warn!("Plasmid map {duplicate} appears more than once");
        }
        self.bundle
            .insert(format!("{INPUT_DIR}/master_j5.csv"), self.design.to_csv()?);
        self.bundle.insert(
            format!("{INPUT_DIR}/benchling_plasmid_sequences.csv"),
            table::to_csv(&registry::plasmid_sequences(&input.plasmid_maps)?)?,
        );
        self.bundle.insert(
            format!("{INPUT_DIR}/benchling_aa_sequences.csv"),
            table::to_csv(&registry::aa_sequences(&self.design))?,
        );
        self.bundle.insert(
            format!("{INPUT_DIR}/benchling_gene_sequences.csv"),
            table::to_csv(&registry::gene_sequences(&self.design))?,
        );
        for map in &input.plasmid_maps {
            self.bundle.insert(
                format!("{INPUT_DIR}/plasmid_maps/{}", map.filename),
                map.contents.clone(),
            );
        }
        Ok(())
    }

    /// READMEs, inputs and the step list; consumes the context.
    pub fn finish(mut self, input: &DesignBundle) -> Result<(Bundle, WorkflowRecord)> {
        self.write_inputs(input)?;
        self.bundle
            .insert("README.md", readme::root_readme(&input.design_names()));
        for step in ProtocolStep::ALL {
            let files = self.files.remove(&step).unwrap_or_default();
            let files: Vec<&str> = files.iter().map(String::as_str).collect();
            self.bundle.insert(
                format!("{}/README.md", step.dir_name()),
                readme::step_readme(step, &files),
            );
            self.record.steps.push(StepRecord {
                name: step.dir_name(),
                number: step.number(),
                title: step.title().to_string(),
                status: StepStatus::Incomplete,
            });
        }
        Ok((self.bundle, self.record))
    }
}

/// Parses, validates and condenses every design of `input`, then runs all
/// protocol steps. Without an explicit `tm_service` the one selected by the
/// settings is used.
pub fn compile(
    input: &DesignBundle,
    settings: &CompilerSettings,
    tm_service: Option<&dyn AnnealingTemperatureService>,
) -> Result<(Bundle, WorkflowRecord)> {
    if input.designs.is_empty() {
        return Err(CompileError::InvalidInput("no design files given".to_string()));
    }
    let designs = input.parse_designs()?;
    for (i, design) in designs.iter().enumerate() {
        design.validate_references(i)?;
    }
    let design = condense::condense(&designs)?;
    debug!(
        designs = designs.len(),
        parts = design.parts.len(),
        assemblies = design.assemblies.len(),
        "designs condensed"
    );

    let configured: Box<dyn AnnealingTemperatureService>;
    let tm_service = match tm_service {
        Some(service) => service,
        None => {
            configured = tm_service::service_for(&settings.tm_service, &design)?;
            configured.as_ref()
        }
    };

    let mut context = PipelineContext::new(settings, tm_service, design);
    for step in ProtocolStep::ALL {
        context.run(step)?;
    }
    let (bundle, record) = context.finish(input)?;
    info!(files = bundle.len(), "workflow bundle compiled");
    Ok((bundle, record))
}

/// Compiles independent inputs in parallel; results keep input order.
pub fn compile_many(
    inputs: &[DesignBundle],
    settings: &CompilerSettings,
    tm_service: Option<&dyn AnnealingTemperatureService>,
) -> Vec<Result<(Bundle, WorkflowRecord)>> {
    inputs
        .par_iter()
        .map(|input| compile(input, settings, tm_service))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;
    use crate::input::DesignFile;
    use crate::registry::tests::SAMPLE_GENBANK;
    use crate::registry::PlasmidMap;
    use crate::settings::TmServiceMode;

    fn sample_input() -> DesignBundle {
        DesignBundle {
            designs: vec![DesignFile {
                name: "demo".to_string(),
                text: SAMPLE_DESIGN.to_string(),
            }],
            plasmid_maps: vec![PlasmidMap {
                filename: "construct_1.gb".to_string(),
                contents: SAMPLE_GENBANK.to_string(),
            }],
        }
    }

    fn offline_settings() -> CompilerSettings {
        let mut settings = CompilerSettings::default();
        settings.tm_service.mode = TmServiceMode::Design;
        settings
    }

    #[test]
    fn test_step_names() {
        assert_eq!(ProtocolStep::ALL.len(), 19);
        assert_eq!(ProtocolStep::OrderGenes.dir_name(), "Step_1-Order_genes");
        assert_eq!(ProtocolStep::PerformPcrs.dir_name(), "Step_4-Perform_PCRs");
        assert_eq!(ProtocolStep::SubmitToRegistry.number(), 19);
        let manual = ProtocolStep::ALL.iter().filter(|s| s.is_manual()).count();
        assert_eq!(manual, 9);
    }

    #[test]
    fn test_compile_writes_every_step() {
        let (bundle, record) = compile(&sample_input(), &offline_settings(), None).unwrap();
        for step in ProtocolStep::ALL {
            assert!(bundle.contains(&format!("{}/README.md", step.dir_name())), "{step}");
        }
        for path in [
            "README.md",
            "Input/master_j5.csv",
            "Input/benchling_plasmid_sequences.csv",
            "Input/plasmid_maps/construct_1.gb",
            "Step_1-Order_genes/synths_plate.csv",
            "Step_2-Order_oligos/oligos_order_96.csv",
            "Step_3-Prepare_templates/backup_templates_plate.csv",
            "Step_4-Perform_PCRs/pcr_thermocycler_instructions.csv",
            "Step_5-Analyze_PCRs/zag_echo_instructions.csv",
            "Step_8-Restriction_Digests/dpni_biomek_instructions.csv",
            "Step_9-PCR_Cleanup/bead_biomek_instructions.csv",
            "Step_10-Quantify_Part_Yield/quant_echo_instructions.csv",
            "Step_11-Perform_Assembly/equimolar_assembly_echo_instructions.csv",
            "Step_15-Request_NGS/registry_submission_form.csv",
        ] {
            assert!(bundle.contains(path), "{path}");
        }
        assert_eq!(
            bundle.paths().filter(|p| p.starts_with("Step_6-")).count(),
            1
        );

        let echo = bundle.get("Step_4-Perform_PCRs/pcr_echo_instructions.csv").unwrap();
        assert!(echo.starts_with(
            "Source Plate Name,Source Well,Destination Plate Name,Destination Well,Transfer Volume\n"
        ));
        assert_eq!(echo.lines().count(), 1 + 2 * 3);

        let readme = bundle.get("Step_4-Perform_PCRs/README.md").unwrap();
        assert!(readme.contains("* `clean_pcr_worksheet.csv`"));

        assert_eq!(record.steps.len(), 19);
        assert_eq!(record.steps[3].title, "Perform_PCRs");
        assert_eq!(record.steps[3].name, "Step_4-Perform_PCRs");
        let kinds: Vec<PlateKind> = record.plate_csvs.iter().map(|p| p.plate_type).collect();
        assert_eq!(
            kinds,
            vec![
                PlateKind::Synth,
                PlateKind::Oligo,
                PlateKind::Template,
                PlateKind::Pcr,
                PlateKind::Digest,
                PlateKind::Part
            ]
        );
        assert_eq!(record.plate_csvs[3].plate_names, vec!["pcr_plate_1"]);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"status\": \"incomplete\""));
        assert!(json.contains("\"plate_type\": \"template\""));
    }

    #[test]
    fn test_compile_is_deterministic_and_parallel() {
        let inputs = vec![sample_input(), sample_input()];
        let results = compile_many(&inputs, &offline_settings(), None);
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_compile_rejects_empty_and_broken_input() {
        let settings = offline_settings();
        assert!(matches!(
            compile(&DesignBundle::default(), &settings, None),
            Err(CompileError::InvalidInput(_))
        ));
        let mut broken = sample_input();
        broken.designs[0].text = broken.designs[0]
            .text
            .replace("1,\"(promoter)\",\"PCR\",0,", "1,\"(promoter)\",\"PCR\",7,");
        assert!(matches!(
            compile(&broken, &settings, None),
            Err(CompileError::ReferenceResolution { .. })
        ));
    }
}
