//! Registry submission form and the Benchling sequence tables.

use crate::assembly::ConstructRow;
use crate::design::Design;
use crate::error::{CompileError, Result};
use crate::settings::RegistryOptions;
use crate::table::{Tabular, flag};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A plasmid GenBank map shipped with a design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlasmidMap {
    pub filename: String,
    pub contents: String,
}

impl PlasmidMap {
    pub fn name(&self) -> &str {
        self.filename.strip_suffix(".gb").unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedSequence {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Bases")]
    pub bases: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

impl Tabular for TypedSequence {
    const COLUMNS: &'static [&'static str] = &["Name", "Bases", "Type"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSequence {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Bases")]
    pub bases: String,
}

impl Tabular for GeneSequence {
    const COLUMNS: &'static [&'static str] = &["Name", "Bases"];
}

/// Upper-case sequence of the first record of a GenBank file.
pub fn read_genbank_sequence(genbank: &str) -> Result<String> {
    let record = gb_io::reader::SeqReader::new(genbank.as_bytes())
        .next()
        .ok_or_else(|| CompileError::InvalidInput("GenBank file holds no record".to_string()))?
        .map_err(|e| CompileError::InvalidInput(format!("unreadable GenBank file: {e}")))?;
    Ok(String::from_utf8_lossy(&record.seq).to_ascii_uppercase())
}

pub fn plasmid_sequences(maps: &[PlasmidMap]) -> Result<Vec<TypedSequence>> {
    let mut rows = maps
        .iter()
        .map(|map| {
            Ok(TypedSequence {
                name: map.name().to_string(),
                bases: read_genbank_sequence(&map.contents)?,
                kind: "cloning".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(rows)
}

pub fn aa_sequences(design: &Design) -> Vec<TypedSequence> {
    design
        .part_sources
        .iter()
        .map(|source| TypedSequence {
            name: source.name.clone(),
            bases: source.aa_sequence.clone(),
            kind: "AA".to_string(),
        })
        .collect()
}

pub fn gene_sequences(design: &Design) -> Vec<GeneSequence> {
    design
        .part_sources
        .iter()
        .map(|source| GeneSequence {
            name: source.name.clone(),
            bases: source.sequence.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryRow {
    #[serde(rename = "Principal Investigator")]
    pub principal_investigator: String,
    #[serde(rename = "Principal Investigator Email")]
    pub principal_investigator_email: String,
    #[serde(rename = "Intellectual Property")]
    pub intellectual_property: String,
    #[serde(rename = "BioSafety Level")]
    pub biosafety_level: u8,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Keywords")]
    pub keywords: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "Notes")]
    pub notes: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Creator")]
    pub creator: String,
    #[serde(rename = "Creator Email")]
    pub creator_email: String,
    #[serde(rename = "Genus and Species")]
    pub genus_and_species: String,
    #[serde(rename = "Genotype or Phenotype")]
    pub genotype: String,
    #[serde(rename = "Selection Markers")]
    pub selection_markers: String,
    #[serde(rename = "Plasmid Principal Investigator")]
    pub plasmid_principal_investigator: String,
    #[serde(rename = "Plasmid Principal Investigator Email")]
    pub plasmid_principal_investigator_email: String,
    #[serde(rename = "Plasmid Intellectual Property")]
    pub plasmid_intellectual_property: String,
    #[serde(rename = "Plasmid BioSafety Level")]
    pub plasmid_biosafety_level: u8,
    #[serde(rename = "Plasmid Name")]
    pub plasmid_name: String,
    #[serde(rename = "Plasmid Keywords")]
    pub plasmid_keywords: String,
    #[serde(rename = "Plasmid Summary")]
    pub plasmid_summary: String,
    #[serde(rename = "Plasmid Notes")]
    pub plasmid_notes: String,
    #[serde(rename = "Plasmid Status")]
    pub plasmid_status: String,
    #[serde(rename = "Plasmid Creator")]
    pub plasmid_creator: String,
    #[serde(rename = "Plasmid Creator Email")]
    pub plasmid_creator_email: String,
    #[serde(rename = "Plasmid Circular", serialize_with = "flag::serialize")]
    pub plasmid_circular: bool,
    #[serde(rename = "Plasmid Backbone")]
    pub plasmid_backbone: String,
    #[serde(rename = "Plasmid Promoters")]
    pub plasmid_promoters: String,
    #[serde(rename = "Plasmid Replicates In")]
    pub plasmid_replicates_in: String,
    #[serde(rename = "Plasmid Origin of Replication")]
    pub plasmid_ori: String,
    #[serde(rename = "Plasmid Selection Marker")]
    pub plasmid_selection_marker: String,
    #[serde(rename = "Plasmid Plasmid Use")]
    pub plasmid_use: String,
}

impl Tabular for RegistryRow {
    const COLUMNS: &'static [&'static str] = &[
        "Principal Investigator",
        "Principal Investigator Email",
        "Intellectual Property",
        "BioSafety Level",
        "Name",
        "Keywords",
        "Summary",
        "Notes",
        "Status",
        "Creator",
        "Creator Email",
        "Genus and Species",
        "Genotype or Phenotype",
        "Selection Markers",
        "Plasmid Principal Investigator",
        "Plasmid Principal Investigator Email",
        "Plasmid Intellectual Property",
        "Plasmid BioSafety Level",
        "Plasmid Name",
        "Plasmid Keywords",
        "Plasmid Summary",
        "Plasmid Notes",
        "Plasmid Status",
        "Plasmid Creator",
        "Plasmid Creator Email",
        "Plasmid Circular",
        "Plasmid Backbone",
        "Plasmid Promoters",
        "Plasmid Replicates In",
        "Plasmid Origin of Replication",
        "Plasmid Selection Marker",
        "Plasmid Plasmid Use",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceFileRow {
    #[serde(rename = "Plasmid Sequence File")]
    pub file: String,
}

impl Tabular for SequenceFileRow {
    const COLUMNS: &'static [&'static str] = &["Plasmid Sequence File"];
}

/// One strain/plasmid pair per construct, numbered from the configured
/// strain prefix.
pub fn registry_form(constructs: &[ConstructRow], options: &RegistryOptions) -> Vec<RegistryRow> {
    constructs
        .iter()
        .enumerate()
        .map(|(i, construct)| {
            let summary = format!("Plasmid consisting of parts: {}", construct.parts);
            RegistryRow {
                principal_investigator: options.principal_investigator.clone(),
                principal_investigator_email: options.principal_investigator_email.clone(),
                intellectual_property: options.intellectual_property.clone(),
                biosafety_level: options.biosafety_level,
                name: format!("{}{i}", options.strain_name_prefix),
                keywords: options.keywords.clone(),
                summary: format!("{} carrying {summary}", options.host),
                notes: options.notes.clone(),
                status: options.status.clone(),
                creator: options.creator.clone(),
                creator_email: options.creator_email.clone(),
                genus_and_species: options.host.clone(),
                genotype: options.genotype.clone(),
                selection_markers: options.strain_selection_marker.clone(),
                plasmid_principal_investigator: options.principal_investigator.clone(),
                plasmid_principal_investigator_email: options.principal_investigator_email.clone(),
                plasmid_intellectual_property: options.intellectual_property.clone(),
                plasmid_biosafety_level: options.biosafety_level,
                plasmid_name: construct.name.clone(),
                plasmid_keywords: options.keywords.clone(),
                plasmid_summary: summary,
                plasmid_notes: options.notes.clone(),
                plasmid_status: options.status.clone(),
                plasmid_creator: options.creator.clone(),
                plasmid_creator_email: options.creator_email.clone(),
                plasmid_circular: options.circular,
                plasmid_backbone: options.backbone.clone(),
                plasmid_promoters: options.promoters.clone(),
                plasmid_replicates_in: options.replicates_in.clone(),
                plasmid_ori: options.ori.clone(),
                plasmid_selection_marker: options.selection_marker.clone(),
                plasmid_use: options.plasmid_use.clone(),
            }
        })
        .collect()
}

pub fn registry_sequences(constructs: &[ConstructRow]) -> Vec<SequenceFileRow> {
    constructs
        .iter()
        .map(|c| SequenceFileRow {
            file: format!("{}.gb", c.name),
        })
        .collect()
}

/// Names shared by more than one plasmid map.
pub fn duplicate_plasmids(maps: &[PlasmidMap]) -> Vec<&str> {
    maps.iter().map(PlasmidMap::name).duplicates().collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::design::{AssemblyMethod, SAMPLE_DESIGN};
    use crate::table;
    use crate::wells::Well;

    pub(crate) const SAMPLE_GENBANK: &str = "\
LOCUS       construct_1               40 bp    DNA     circular SYN 01-JAN-2020
DEFINITION  construct_1.
FEATURES             Location/Qualifiers
ORIGIN
        1 acgtacgtaa cccgggtttt aaaccctttg ttgcatgcaa
//
";

    fn construct(name: &str, parts: &str) -> ConstructRow {
        ConstructRow {
            j5_construct_id: 0,
            name: name.to_string(),
            parts: parts.to_string(),
            assembly_method: AssemblyMethod::SlicGibsonCpec,
            src_plate: "gibson_plate_1".to_string(),
            src_well: Well::new(0, 0),
        }
    }

    #[test]
    fn test_genbank_sequence() {
        let seq = read_genbank_sequence(SAMPLE_GENBANK).unwrap();
        assert_eq!(seq, "ACGTACGTAACCCGGGTTTTAAACCCTTTGTTGCATGCAA");
        assert!(read_genbank_sequence("").is_err());
    }

    #[test]
    fn test_plasmid_sequences_sorted() {
        let maps = vec![
            PlasmidMap {
                filename: "zeta.gb".to_string(),
                contents: SAMPLE_GENBANK.to_string(),
            },
            PlasmidMap {
                filename: "alpha.gb".to_string(),
                contents: SAMPLE_GENBANK.to_string(),
            },
        ];
        let rows = plasmid_sequences(&maps).unwrap();
        assert_eq!(rows[0].name, "alpha");
        assert_eq!(rows[1].kind, "cloning");
        assert!(duplicate_plasmids(&maps).is_empty());
    }

    #[test]
    fn test_design_sequences() {
        let design = Design::parse(SAMPLE_DESIGN).unwrap();
        let genes = gene_sequences(&design);
        let aa = aa_sequences(&design);
        assert_eq!(genes.len(), design.part_sources.len());
        assert!(aa.iter().all(|s| s.kind == "AA"));
    }

    #[test]
    fn test_registry_form() {
        let constructs = vec![construct("construct_1", "promoter + gfp"), construct("construct_2", "gfp")];
        let options = RegistryOptions::default();
        let form = registry_form(&constructs, &options);
        assert_eq!(form[1].name, "strain_1");
        assert_eq!(form[0].plasmid_summary, "Plasmid consisting of parts: promoter + gfp");
        assert_eq!(form[0].summary, "E. coli carrying Plasmid consisting of parts: promoter + gfp");
        let text = table::to_csv(&form).unwrap();
        assert!(text.lines().nth(1).unwrap().contains(",True,pET28,"));
        let files = registry_sequences(&constructs);
        assert_eq!(files[1].file, "construct_2.gb");
    }
}
