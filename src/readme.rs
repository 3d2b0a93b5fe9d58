//! README.md text for the bundle root and every protocol step.

use crate::pipeline::ProtocolStep;

pub fn root_readme(design_names: &[String]) -> String {
    let mut text = String::from(
        "# DNA assembly workflow\n\n\
         Each `Step_N-*` directory holds the files for one stage of the build.\n\
         Work through the steps in order; optional steps say so in their title.\n\
         The `Input` directory keeps the design and plasmid maps this bundle\n\
         was compiled from.\n",
    );
    if !design_names.is_empty() {
        text.push_str("\n## Designs\n\n");
        for name in design_names {
            text.push_str(&format!("* {name}\n"));
        }
    }
    text
}

fn guidance(step: ProtocolStep) -> &'static str {
    match step {
        ProtocolStep::OrderGenes => {
            "Order every gene in `synths_plate.csv` from a synthesis vendor. \
             The `Sequence` column holds the bases to order and `PLATE ID` / \
             `PLATE WELL` give where each fragment goes once it arrives."
        }
        ProtocolStep::OrderOligos => {
            "Order the oligos with `oligos_order_96.csv` (96-well plates) or \
             `oligos_order_384.csv`. Aliquot them at 50 uM into a 384PP Echo \
             plate following `oligos_plate.csv`; `backup_oligos_plate.csv` maps \
             the same oligos onto 96-well backup plates."
        }
        ProtocolStep::PrepareTemplates => {
            "Fill a 384PP Echo plate with 50 uL of every template listed in \
             `templates_plate.csv` (cultures at 1X, plasmids and synthetic DNA \
             at 10 ng/uL). `backup_templates_plate.csv` is the 96-well copy."
        }
        ProtocolStep::PerformPcrs => {
            "Transfer primers and templates with the Echo using \
             `pcr_echo_instructions.csv`, add water and master mix with the Biomek \
             using `pcr_biomek_instructions.csv`, then program the thermocycler \
             zones from `pcr_thermocycler_instructions.csv`. Every zone spans two \
             plate columns; `clean_pcr_worksheet.csv` lists the zone of each reaction."
        }
        ProtocolStep::AnalyzePcrs => {
            "Fill a 96-well plate with dilution buffer, keep H12 for the ladder \
             and move 0.5 uL of every PCR with `zag_echo_instructions.csv`. Run \
             the fragment analyzer and mark each reaction GOOD or not in the PCR \
             results sheet."
        }
        ProtocolStep::RedoPcrs => {
            "Optional. Compile a redo from the PCR results to repeat failed \
             reactions on `redo_pcr_plate_T{n}` plates."
        }
        ProtocolStep::ConsolidatePcrs => {
            "Only when PCRs were redone. Consolidating the trials yields human \
             and Biomek instructions that move every good reaction back onto \
             its original plate position."
        }
        ProtocolStep::RestrictionDigests => {
            "Add DpnI master mix to every PCR well with the Biomek using \
             `dpni_biomek_instructions.csv`, then digest for 1 h at 37 C and \
             inactivate for 15 min at 80 C. Linearize the plasmids listed in \
             `digests_plate.csv`."
        }
        ProtocolStep::PcrCleanup => {
            "Purify the PCR products with magnetic beads on the Biomek using \
             `bead_biomek_instructions.csv`."
        }
        ProtocolStep::QuantifyPartYield => {
            "Optional. Move 1 uL of every part with `quant_echo_instructions.csv` \
             onto a dark 96-well plate, add the standards to column 12 and read \
             the plate. Record concentrations in the `Conc (ng/uL)` column of \
             `quant_worksheet.csv`; the equimolar files assume 50 ng/uL until then. \
             `volume_verification.csv` flags parts that may run short."
        }
        ProtocolStep::PerformAssembly => {
            "Pool the parts with the Echo using `assembly_echo_instructions.csv` \
             (equal volumes) or `equimolar_assembly_echo_instructions.csv` \
             (equal molar amounts, topped off with water from `water_plate_N`). \
             Add assembly master mix with `assembly_biomek_instructions.csv` and \
             incubate as the master mix vendor specifies. `construct_worksheet.csv` \
             lists the well of every construct."
        }
        ProtocolStep::YeastPlasmidPrep => "Only for yeast assemblies. Manual.",
        ProtocolStep::EcoliTransformation => "Transform the assemblies into E. coli. Manual.",
        ProtocolStep::ColonyPicking => {
            "Pick colonies of every construct into glycerol plates, column-major."
        }
        ProtocolStep::RequestNgs => {
            "Request sequencing. `registry_submission_form.csv` and \
             `registry_submission_sequences.csv` describe every construct."
        }
        ProtocolStep::SubmitNgsSamples => {
            "Boil 20 uL of each overnight culture in 20 uL of water for 10 minutes \
             and submit the samples."
        }
        ProtocolStep::AnalyzeNgsResults => {
            "Analyze the sequencing data as the provider instructs and record \
             which constructs are correct."
        }
        ProtocolStep::CherrypickConstructs => "Cherry-pick the verified constructs.",
        ProtocolStep::SubmitToRegistry => "Submit the verified constructs to the registry.",
    }
}

/// README of one step, listing the files the step directory holds.
pub fn step_readme(step: ProtocolStep, files: &[&str]) -> String {
    let mut text = format!(
        "# Step {} - {}\n\n{}\n",
        step.number(),
        step.title().replace('_', " "),
        guidance(step)
    );
    if !files.is_empty() {
        text.push_str("\n## Files\n\n");
        for file in files {
            text.push_str(&format!("* `{file}`\n"));
        }
    }
    text
}
