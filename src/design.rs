//! Typed tables of a j5 combinatorial design and the parser for its
//! blank-line separated section format.

use crate::error::{CompileError, Result};
use crate::sequence;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const DIGESTS_TITLE: &str = "Digest Linearized Pieces";
pub const PART_SOURCES_TITLE: &str = "Non-degenerate Part IDs and Sources";
pub const SYNTHESIS_TITLE: &str = "Direct Synthesis";
pub const OLIGOS_TITLE: &str = "Oligo Synthesis";
pub const PCRS_TITLE: &str = "PCR Reactions";
pub const GIBSON_PARTS_TITLE: &str = "Assembly Pieces (SLIC/Gibson/CPEC)";
pub const GOLDEN_GATE_PARTS_TITLE: &str = "Assembly Pieces (Golden-gate)";
pub const ASSEMBLIES_TITLE: &str = "Combinations of Assembly Pieces";

const IGNORED_TITLES: &[&str] = &[
    "Suggested Assembly Piece Contigs For Hierarchical Assembly",
    "Assembly Parameters",
    "Note",
    "Combinatorial overhang/overlap design:",
    "Target Bin Selected Relative Overlap Positions and Extra",
    "Target Bin Selected Relative Overhang Positions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssemblyMethod {
    #[serde(rename = "SLIC/Gibson/CPEC")]
    SlicGibsonCpec,
    #[serde(rename = "Golden-gate")]
    GoldenGate,
}

impl AssemblyMethod {
    pub fn label(self) -> &'static str {
        match self {
            AssemblyMethod::SlicGibsonCpec => "SLIC/Gibson/CPEC",
            AssemblyMethod::GoldenGate => "Golden-gate",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "SLIC/Gibson/CPEC" => Some(AssemblyMethod::SlicGibsonCpec),
            "Golden-gate" => Some(AssemblyMethod::GoldenGate),
            _ => None,
        }
    }

    /// Prefix of the destination plates of this method's assembly reactions.
    pub fn plate_prefix(self) -> &'static str {
        match self {
            AssemblyMethod::SlicGibsonCpec => "gibson",
            AssemblyMethod::GoldenGate => "golden-gate",
        }
    }

    fn section_title(self) -> &'static str {
        match self {
            AssemblyMethod::SlicGibsonCpec => GIBSON_PARTS_TITLE,
            AssemblyMethod::GoldenGate => GOLDEN_GATE_PARTS_TITLE,
        }
    }
}

impl fmt::Display for AssemblyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a part comes from. Variants are declared in label order so the
/// derived ordering matches sorting by the label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartType {
    #[serde(rename = "Digest Linearized")]
    DigestLinearized,
    #[serde(rename = "Direct Synthesis/PCR")]
    DirectSynthesisPcr,
    #[serde(rename = "PCR")]
    Pcr,
    #[serde(rename = "SOE")]
    Soe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pcr,
    Digest,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Pcr => "pcr",
            SourceKind::Digest => "digest",
        }
    }
}

impl PartType {
    pub fn label(self) -> &'static str {
        match self {
            PartType::DigestLinearized => "Digest Linearized",
            PartType::DirectSynthesisPcr => "Direct Synthesis/PCR",
            PartType::Pcr => "PCR",
            PartType::Soe => "SOE",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Digest Linearized" => Some(PartType::DigestLinearized),
            "Direct Synthesis/PCR" => Some(PartType::DirectSynthesisPcr),
            "PCR" => Some(PartType::Pcr),
            "SOE" => Some(PartType::Soe),
            _ => None,
        }
    }

    pub fn source_kind(self) -> SourceKind {
        match self {
            PartType::DigestLinearized => SourceKind::Digest,
            _ => SourceKind::Pcr,
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub id: u32,
    pub sequence_source: String,
    pub length: usize,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oligo {
    pub id: u32,
    pub name: String,
    pub length: usize,
    pub tm: f64,
    pub tm_3prime: f64,
    pub cost: f64,
    pub sequence: String,
    pub sequence_3prime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub id: u32,
    pub name: String,
    pub length: usize,
    pub cost: f64,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSource {
    pub id: u32,
    pub name: String,
    pub source_plasmid: String,
    pub reverse_complement: bool,
    pub start: i64,
    pub end: i64,
    pub size: i64,
    pub sequence: String,
    pub aa_sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrReaction {
    pub id: u32,
    pub primary_template: String,
    pub alternate_template: Option<String>,
    pub forward_primer_id: u32,
    pub forward_primer_name: String,
    pub reverse_primer_id: u32,
    pub reverse_primer_name: String,
    pub note: String,
    pub mean_oligo_tm: f64,
    pub delta_oligo_tm: f64,
    pub mean_oligo_tm_3prime: f64,
    pub delta_oligo_tm_3prime: f64,
    pub length: usize,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: u32,
    pub name: String,
    pub method: AssemblyMethod,
    pub part_type: PartType,
    pub type_id: u32,
    /// Method specific overlap/overhang columns, kept verbatim in header order.
    pub annotations: Vec<(String, String)>,
    pub sequence_length: usize,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyPiece {
    pub part_name: String,
    pub part_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    pub number: u32,
    pub name: String,
    pub method: AssemblyMethod,
    /// One entry per bin; empty cells of the combination table are `None`.
    pub bins: Vec<Option<AssemblyPiece>>,
}

/// One part of one assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinnyAssembly {
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
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Design {
    pub header: String,
    pub digests: Vec<Digest>,
    pub part_sources: Vec<PartSource>,
    pub synthesis: Vec<Synthesis>,
    pub oligos: Vec<Oligo>,
    pub pcrs: Vec<PcrReaction>,
    pub parts: Vec<Part>,
    pub assemblies: Vec<Assembly>,
    pub skinny_assemblies: Vec<SkinnyAssembly>,
}

/// Flattens assemblies into one row per filled bin, sorted by
/// (Number, Part Order).
pub fn make_skinny(assemblies: &[Assembly]) -> Vec<SkinnyAssembly> {
    let mut rows: Vec<SkinnyAssembly> = assemblies
        .iter()
        .flat_map(|assembly| {
            assembly
                .bins
                .iter()
                .enumerate()
                .filter_map(move |(order, piece)| {
                    piece.as_ref().map(|piece| SkinnyAssembly {
                        number: assembly.number,
                        name: assembly.name.clone(),
                        method: assembly.method,
                        part_name: piece.part_name.clone(),
                        part_id: piece.part_id,
                        part_order: order,
                    })
                })
        })
        .collect();
    rows.sort_by_key(|row| (row.number, row.part_order));
    rows
}

/// Header and records of one section, with duplicate column names
/// disambiguated as `X`, `X.1`, `X.2`...
struct SectionTable {
    section: String,
    columns: HashMap<String, usize>,
    headers: Vec<String>,
    records: Vec<csv::StringRecord>,
}

impl SectionTable {
    fn read(section: &str, body: &str, preamble: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());
        let mut records = reader.records().skip(preamble);
        let header = match records.next() {
            Some(record) => record?,
            None => {
                return Ok(Self {
                    section: section.to_string(),
                    columns: HashMap::new(),
                    headers: vec![],
                    records: vec![],
                });
            }
        };
        let headers = mangle_duplicates(header.iter().map(|h| h.trim().to_string()));
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        let mut rows = vec![];
        for record in records {
            let record = record?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(record);
        }
        Ok(Self {
            section: section.to_string(),
            columns,
            headers,
            records: rows,
        })
    }

    fn error(&self, row: usize, message: impl Into<String>) -> CompileError {
        CompileError::invalid_design(&self.section, row, message)
    }

    fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = *self.columns.get(column)?;
        self.records[row]
            .get(index)
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
    }

    fn text(&self, row: usize, column: &str) -> Result<String> {
        self.cell(row, column)
            .map(str::to_string)
            .ok_or_else(|| self.error(row, format!("missing value in column '{column}'")))
    }

    fn optional_text(&self, row: usize, column: &str) -> Option<String> {
        self.cell(row, column).map(str::to_string)
    }

    fn float(&self, row: usize, column: &str) -> Result<f64> {
        let text = self.text(row, column)?;
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.error(row, format!("'{text}' in column '{column}' is not a number")))
    }

    fn integer(&self, row: usize, column: &str) -> Result<i64> {
        let text = self.text(row, column)?;
        if let Ok(v) = text.parse::<i64>() {
            return Ok(v);
        }
        match text.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
            _ => Err(self.error(
                row,
                format!("'{text}' in column '{column}' is not an integer"),
            )),
        }
    }

    fn id(&self, row: usize, column: &str) -> Result<u32> {
        let value = self.integer(row, column)?;
        u32::try_from(value)
            .map_err(|_| self.error(row, format!("{column} must be non-negative, got {value}")))
    }

    fn positive(&self, row: usize, column: &str) -> Result<usize> {
        let value = self.integer(row, column)?;
        if value <= 0 {
            return Err(self.error(row, format!("{column} must be positive, got {value}")));
        }
        Ok(value as usize)
    }

    fn boolean(&self, row: usize, column: &str) -> Result<bool> {
        let text = self.text(row, column)?;
        match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(self.error(row, format!("'{text}' in column '{column}' is not a boolean"))),
        }
    }

    fn dna(&self, row: usize, column: &str) -> Result<String> {
        let text = self.text(row, column)?;
        if !sequence::is_dna(&text) {
            return Err(self.error(row, format!("column '{column}' is not a DNA sequence")));
        }
        Ok(text)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

fn mangle_duplicates(headers: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .map(|header| {
            let count = seen.entry(header.clone()).or_insert(0);
            let name = if *count == 0 {
                header
            } else {
                format!("{header}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

fn check_unique_ids<T>(
    section: &str,
    rows: &[T],
    id: impl Fn(&T) -> u32,
    label: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for (row, item) in rows.iter().enumerate() {
        if !seen.insert(id(item)) {
            return Err(CompileError::invalid_design(
                section,
                row,
                format!("duplicate {label} {}", id(item)),
            ));
        }
    }
    Ok(())
}

fn check_unique_names<T>(
    section: &str,
    rows: &[T],
    name: impl Fn(&T) -> &str,
    label: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for (row, item) in rows.iter().enumerate() {
        if !seen.insert(name(item)) {
            return Err(CompileError::invalid_design(
                section,
                row,
                format!("duplicate {label} '{}'", name(item)),
            ));
        }
    }
    Ok(())
}

/// Splits text into sections at blank lines.
fn split_sections(text: &str) -> Vec<String> {
    let mut sections = vec![];
    let mut current: Vec<&str> = vec![];
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        sections.push(current.join("\n"));
    }
    sections
}

fn title_of(section: &str) -> &str {
    section.lines().next().unwrap_or_default()
}

fn title_matches(title: &str, expected: &str) -> bool {
    title.trim_start().trim_start_matches('"').starts_with(expected)
}

impl Design {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let sections = split_sections(&text);
        let mut design = Design::default();
        let mut sections = sections.into_iter();
        if let Some(header) = sections.next() {
            design.header = header;
        }
        for section in sections {
            let title = title_of(&section).to_string();
            if title_matches(&title, DIGESTS_TITLE) {
                design.digests = parse_digests(&SectionTable::read(DIGESTS_TITLE, &section, 1)?)?;
            } else if title_matches(&title, PART_SOURCES_TITLE) {
                design.part_sources =
                    parse_part_sources(&SectionTable::read(PART_SOURCES_TITLE, &section, 2)?)?;
            } else if title_matches(&title, SYNTHESIS_TITLE) {
                design.synthesis =
                    parse_synthesis(&SectionTable::read(SYNTHESIS_TITLE, &section, 1)?)?;
            } else if title_matches(&title, OLIGOS_TITLE) {
                design.oligos = parse_oligos(&SectionTable::read(OLIGOS_TITLE, &section, 1)?)?;
            } else if title_matches(&title, PCRS_TITLE) {
                design.pcrs = parse_pcrs(&SectionTable::read(PCRS_TITLE, &section, 1)?)?;
            } else if title_matches(&title, GIBSON_PARTS_TITLE) {
                let table = SectionTable::read(GIBSON_PARTS_TITLE, &section, 1)?;
                design
                    .parts
                    .extend(parse_parts(&table, AssemblyMethod::SlicGibsonCpec)?);
            } else if title_matches(&title, GOLDEN_GATE_PARTS_TITLE) {
                let table = SectionTable::read(GOLDEN_GATE_PARTS_TITLE, &section, 1)?;
                design
                    .parts
                    .extend(parse_parts(&table, AssemblyMethod::GoldenGate)?);
            } else if title_matches(&title, ASSEMBLIES_TITLE) {
                design.assemblies =
                    parse_assemblies(&SectionTable::read(ASSEMBLIES_TITLE, &section, 2)?)?;
            } else if IGNORED_TITLES.iter().any(|t| title_matches(&title, t)) {
                continue;
            } else {
                return Err(CompileError::StructuralParse { title });
            }
        }
        check_unique_ids("Assembly Pieces", &design.parts, |p| p.id, "ID Number")?;
        design.skinny_assemblies = make_skinny(&design.assemblies);
        Ok(design)
    }

    /// Checks that every foreign reference resolves inside this design.
    /// `design` is the index reported in errors.
    pub fn validate_references(&self, design: usize) -> Result<()> {
        let pcr_ids: HashSet<u32> = self.pcrs.iter().map(|p| p.id).collect();
        let digest_ids: HashSet<u32> = self.digests.iter().map(|d| d.id).collect();
        let oligo_ids: HashSet<u32> = self.oligos.iter().map(|o| o.id).collect();
        let oligo_names: HashSet<&str> = self.oligos.iter().map(|o| o.name.as_str()).collect();
        let part_ids: HashSet<u32> = self.parts.iter().map(|p| p.id).collect();

        for (row, pcr) in self.pcrs.iter().enumerate() {
            for (name, id) in [
                (&pcr.forward_primer_name, pcr.forward_primer_id),
                (&pcr.reverse_primer_name, pcr.reverse_primer_id),
            ] {
                if !oligo_names.contains(name.as_str()) && !oligo_ids.contains(&id) {
                    return Err(CompileError::ReferenceResolution {
                        design,
                        entity: "oligo".to_string(),
                        row,
                        reference: format!("{name} ({id})"),
                    });
                }
            }
        }
        for (row, part) in self.parts.iter().enumerate() {
            let ids = match part.part_type.source_kind() {
                SourceKind::Pcr => &pcr_ids,
                SourceKind::Digest => &digest_ids,
            };
            if !ids.contains(&part.type_id) {
                return Err(CompileError::ReferenceResolution {
                    design,
                    entity: part.part_type.source_kind().label().to_string(),
                    row,
                    reference: part.type_id.to_string(),
                });
            }
        }
        for (row, entry) in self.skinny_assemblies.iter().enumerate() {
            if !part_ids.contains(&entry.part_id) {
                return Err(CompileError::ReferenceResolution {
                    design,
                    entity: "part".to_string(),
                    row,
                    reference: entry.part_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Re-serializes the design in the sectioned j5 form `parse` reads.
    pub fn to_csv(&self) -> Result<String> {
        let mut sections = vec![self.header.clone()];
        if !self.part_sources.is_empty() {
            sections.push(section_text(
                PART_SOURCES_TITLE,
                true,
                &[
                    "ID Number",
                    "Name",
                    "Source Plasmid",
                    "Reverse Complement",
                    "Start (bp)",
                    "End (bp)",
                    "Size (bp)",
                    "Sequence",
                ],
                self.part_sources.iter().map(|s| {
                    vec![
                        s.id.to_string(),
                        s.name.clone(),
                        s.source_plasmid.clone(),
                        if s.reverse_complement { "TRUE" } else { "FALSE" }.to_string(),
                        s.start.to_string(),
                        s.end.to_string(),
                        s.size.to_string(),
                        s.sequence.clone(),
                    ]
                }),
            )?);
        }
        if !self.digests.is_empty() {
            sections.push(section_text(
                DIGESTS_TITLE,
                false,
                &["ID Number", "Sequence Source", "Length", "Sequence"],
                self.digests.iter().map(|d| {
                    vec![
                        d.id.to_string(),
                        d.sequence_source.clone(),
                        d.length.to_string(),
                        d.sequence.clone(),
                    ]
                }),
            )?);
        }
        if !self.synthesis.is_empty() {
            sections.push(section_text(
                SYNTHESIS_TITLE,
                false,
                &["ID Number", "Name", "Length", "Cost", "Sequence"],
                self.synthesis.iter().map(|s| {
                    vec![
                        s.id.to_string(),
                        s.name.clone(),
                        s.length.to_string(),
                        s.cost.to_string(),
                        s.sequence.clone(),
                    ]
                }),
            )?);
        }
        if !self.oligos.is_empty() {
            sections.push(section_text(
                OLIGOS_TITLE,
                false,
                &[
                    "ID Number",
                    "Name",
                    "Length",
                    "Tm",
                    "Tm (3' only)",
                    "Cost",
                    "Sequence",
                    "Sequence (3' only)",
                ],
                self.oligos.iter().map(|o| {
                    vec![
                        o.id.to_string(),
                        o.name.clone(),
                        o.length.to_string(),
                        o.tm.to_string(),
                        o.tm_3prime.to_string(),
                        o.cost.to_string(),
                        o.sequence.clone(),
                        o.sequence_3prime.clone(),
                    ]
                }),
            )?);
        }
        if !self.pcrs.is_empty() {
            sections.push(section_text(
                PCRS_TITLE,
                false,
                &[
                    "ID Number",
                    "Primary Template",
                    "Alternate Template",
                    "ID Number",
                    "Name",
                    "ID Number",
                    "Name",
                    "Note",
                    "Mean Oligo Tm",
                    "Delta Oligo Tm",
                    "Mean Oligo Tm (3' only)",
                    "Delta Oligo Tm (3' only)",
                    "Length",
                    "Sequence",
                ],
                self.pcrs.iter().map(|p| {
                    vec![
                        p.id.to_string(),
                        p.primary_template.clone(),
                        p.alternate_template.clone().unwrap_or_default(),
                        p.forward_primer_id.to_string(),
                        p.forward_primer_name.clone(),
                        p.reverse_primer_id.to_string(),
                        p.reverse_primer_name.clone(),
                        p.note.clone(),
                        p.mean_oligo_tm.to_string(),
                        p.delta_oligo_tm.to_string(),
                        p.mean_oligo_tm_3prime.to_string(),
                        p.delta_oligo_tm_3prime.to_string(),
                        p.length.to_string(),
                        p.sequence.clone(),
                    ]
                }),
            )?);
        }
        for method in [AssemblyMethod::SlicGibsonCpec, AssemblyMethod::GoldenGate] {
            let parts: Vec<&Part> = self.parts.iter().filter(|p| p.method == method).collect();
            if parts.is_empty() {
                continue;
            }
            let mut extra: Vec<String> = vec![];
            for part in &parts {
                for (key, _) in &part.annotations {
                    if !extra.contains(key) {
                        extra.push(key.clone());
                    }
                }
            }
            let mut headers: Vec<&str> = vec!["ID Number", "Part(s)", "Type", "Type ID Number"];
            headers.extend(extra.iter().map(String::as_str));
            headers.extend(["Sequence Length", "Sequence"]);
            sections.push(section_text(
                method.section_title(),
                false,
                &headers,
                parts.iter().map(|p| {
                    let mut row = vec![
                        p.id.to_string(),
                        p.name.clone(),
                        p.part_type.label().to_string(),
                        p.type_id.to_string(),
                    ];
                    for key in &extra {
                        let value = p
                            .annotations
                            .iter()
                            .find(|(k, _)| k == key)
                            .map(|(_, v)| v.clone())
                            .unwrap_or_default();
                        row.push(value);
                    }
                    row.push(p.sequence_length.to_string());
                    row.push(p.sequence.clone());
                    row
                }),
            )?);
        }
        if !self.assemblies.is_empty() {
            let bins = self.assemblies.iter().map(|a| a.bins.len()).max().unwrap_or(0);
            let mut headers = vec!["Number", "Name", "Assembly Method"];
            for _ in 0..bins {
                headers.extend(["Part(s)", "Assembly Piece ID Number"]);
            }
            sections.push(section_text(
                ASSEMBLIES_TITLE,
                true,
                &headers,
                self.assemblies.iter().map(|a| {
                    let mut row = vec![
                        a.number.to_string(),
                        a.name.clone(),
                        a.method.label().to_string(),
                    ];
                    for bin in 0..bins {
                        match a.bins.get(bin).and_then(Option::as_ref) {
                            Some(piece) => {
                                row.push(piece.part_name.clone());
                                row.push(piece.part_id.to_string());
                            }
                            None => row.extend([String::new(), String::new()]),
                        }
                    }
                    row
                }),
            )?);
        }
        Ok(sections.join("\n\n") + "\n")
    }
}

fn section_text(
    title: &str,
    preamble: bool,
    headers: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(vec![]);
    writer.write_record([title])?;
    if preamble {
        writer.write_record(vec![""; headers.len()])?;
    }
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CompileError::Io(e.into_error()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CompileError::InvalidInput(format!("non UTF-8 design: {e}")))?;
    Ok(text.trim_end().to_string())
}

fn parse_digests(table: &SectionTable) -> Result<Vec<Digest>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        rows.push(Digest {
            id: table.id(row, "ID Number")?,
            sequence_source: table.text(row, "Sequence Source")?,
            length: table.positive(row, "Length")?,
            sequence: table.dna(row, "Sequence")?,
        });
    }
    check_unique_ids(&table.section, &rows, |d| d.id, "ID Number")?;
    check_unique_names(&table.section, &rows, |d| d.sequence_source.as_str(), "Sequence Source")?;
    Ok(rows)
}

fn parse_oligos(table: &SectionTable) -> Result<Vec<Oligo>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let cost = table.float(row, "Cost")?;
        if cost < 0.0 {
            return Err(table.error(row, "Cost must not be negative"));
        }
        rows.push(Oligo {
            id: table.id(row, "ID Number")?,
            name: table.text(row, "Name")?,
            length: table.positive(row, "Length")?,
            tm: table.float(row, "Tm")?,
            tm_3prime: table.float(row, "Tm (3' only)")?,
            cost,
            sequence: table.dna(row, "Sequence")?,
            sequence_3prime: table.dna(row, "Sequence (3' only)")?,
        });
    }
    check_unique_ids(&table.section, &rows, |o| o.id, "ID Number")?;
    check_unique_names(&table.section, &rows, |o| o.name.as_str(), "Name")?;
    Ok(rows)
}

fn parse_synthesis(table: &SectionTable) -> Result<Vec<Synthesis>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        rows.push(Synthesis {
            id: table.id(row, "ID Number")?,
            name: table.text(row, "Name")?,
            length: table.positive(row, "Length")?,
            cost: table.float(row, "Cost")?,
            sequence: table.dna(row, "Sequence")?,
        });
    }
    check_unique_ids(&table.section, &rows, |s| s.id, "ID Number")?;
    check_unique_names(&table.section, &rows, |s| s.name.as_str(), "Name")?;
    Ok(rows)
}

fn parse_part_sources(table: &SectionTable) -> Result<Vec<PartSource>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let start = table.integer(row, "Start (bp)")?;
        if start < 1 {
            return Err(table.error(row, "Start (bp) must be at least 1"));
        }
        let sequence = table.dna(row, "Sequence")?;
        rows.push(PartSource {
            id: table.id(row, "ID Number")?,
            name: table.text(row, "Name")?,
            source_plasmid: table.text(row, "Source Plasmid")?,
            reverse_complement: table.boolean(row, "Reverse Complement")?,
            start,
            end: table.integer(row, "End (bp)")?,
            size: table.integer(row, "Size (bp)")?,
            aa_sequence: sequence::translate(&sequence),
            sequence,
        });
    }
    check_unique_ids(&table.section, &rows, |s| s.id, "ID Number")?;
    check_unique_names(&table.section, &rows, |s| s.name.as_str(), "Name")?;
    Ok(rows)
}

fn parse_pcrs(table: &SectionTable) -> Result<Vec<PcrReaction>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        rows.push(PcrReaction {
            id: table.id(row, "ID Number")?,
            primary_template: table.text(row, "Primary Template")?,
            alternate_template: table.optional_text(row, "Alternate Template"),
            forward_primer_id: table.id(row, "ID Number.1")?,
            forward_primer_name: table.text(row, "Name")?,
            reverse_primer_id: table.id(row, "ID Number.2")?,
            reverse_primer_name: table.text(row, "Name.1")?,
            note: table.optional_text(row, "Note").unwrap_or_default(),
            mean_oligo_tm: table.float(row, "Mean Oligo Tm")?,
            delta_oligo_tm: table.float(row, "Delta Oligo Tm")?,
            mean_oligo_tm_3prime: table.float(row, "Mean Oligo Tm (3' only)")?,
            delta_oligo_tm_3prime: table.float(row, "Delta Oligo Tm (3' only)")?,
            length: table.positive(row, "Length")?,
            sequence: table.dna(row, "Sequence")?,
        });
    }
    check_unique_ids(&table.section, &rows, |p| p.id, "ID Number")?;
    Ok(rows)
}

const PART_CORE_COLUMNS: &[&str] = &[
    "ID Number",
    "Part(s)",
    "Type",
    "Type ID Number",
    "Sequence Length",
    "Sequence",
];

fn parse_parts(table: &SectionTable, method: AssemblyMethod) -> Result<Vec<Part>> {
    let extra: Vec<&String> = table
        .headers
        .iter()
        .filter(|h| !h.is_empty() && !PART_CORE_COLUMNS.contains(&h.as_str()))
        .collect();
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let type_text = table.text(row, "Type")?;
        let part_type = PartType::parse(&type_text)
            .ok_or_else(|| table.error(row, format!("unknown part type '{type_text}'")))?;
        rows.push(Part {
            id: table.id(row, "ID Number")?,
            name: table.text(row, "Part(s)")?,
            method,
            part_type,
            type_id: table.id(row, "Type ID Number")?,
            annotations: extra
                .iter()
                .map(|h| {
                    (
                        h.to_string(),
                        table.optional_text(row, h).unwrap_or_default(),
                    )
                })
                .collect(),
            sequence_length: table.positive(row, "Sequence Length")?,
            sequence: table.dna(row, "Sequence")?,
        });
    }
    Ok(rows)
}

fn bin_columns(table: &SectionTable) -> Vec<(String, String)> {
    let count = table
        .headers
        .iter()
        .filter(|h| h.as_str() == "Part(s)" || h.starts_with("Part(s)."))
        .count();
    (0..count)
        .map(|i| {
            if i == 0 {
                ("Part(s)".to_string(), "Assembly Piece ID Number".to_string())
            } else {
                (format!("Part(s).{i}"), format!("Assembly Piece ID Number.{i}"))
            }
        })
        .collect()
}

fn parse_assemblies(table: &SectionTable) -> Result<Vec<Assembly>> {
    let bins = bin_columns(table);
    let mut rows = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let method_text = table.text(row, "Assembly Method")?;
        let method = AssemblyMethod::parse(&method_text)
            .ok_or_else(|| table.error(row, format!("unknown assembly method '{method_text}'")))?;
        let mut pieces = Vec::with_capacity(bins.len());
        for (name_column, id_column) in &bins {
            let piece = match (
                table.optional_text(row, name_column),
                table.cell(row, id_column),
            ) {
                (Some(part_name), Some(_)) => Some(AssemblyPiece {
                    part_name,
                    part_id: table.id(row, id_column)?,
                }),
                _ => None,
            };
            pieces.push(piece);
        }
        rows.push(Assembly {
            number: table.id(row, "Number")?,
            name: table.text(row, "Name")?,
            method,
            bins: pieces,
        });
    }
    check_unique_ids(&table.section, &rows, |a| a.number, "Number")?;
    check_unique_names(&table.section, &rows, |a| a.name.as_str(), "Name")?;
    Ok(rows)
}

/// Small two-assembly Gibson design used across the crate's tests.
#[cfg(test)]
pub(crate) const SAMPLE_DESIGN: &str = r#""Assembly Method:","SLIC/Gibson/CPEC"
"Design:","demo"

"Non-degenerate Part IDs and Sources"
,,,,,,,
"ID Number","Name","Source Plasmid","Reverse Complement","Start (bp)","End (bp)","Size (bp)","Sequence"
0,"gfp","pGFP","FALSE",1,12,12,"ATGAGCAAGTGA"
1,"promoter","pUC19","FALSE",1,12,12,"ATGGCCAAATAA"

"Digest Linearized Pieces"
"ID Number","Sequence Source","Length","Sequence"
0,"pBackbone",20,"ACGTACGTACGTACGTACGT"

"Oligo Synthesis"
"ID Number","Name","Length","Tm","Tm (3' only)","Cost","Sequence","Sequence (3' only)"
0,"oligo_a",10,60,55.5,1.2,"ACGTACGTAA","ACGTAA"
1,"oligo_b",10,61,56.5,1.2,"TTGCATGCAA","TGCAA"
2,"oligo_c",10,62,57.5,1.2,"GGGCCCAAAT","CAAAT"
3,"oligo_d",10,63,58.5,1.2,"CCATGGTTTA","GTTTA"

"PCR Reactions"
"ID Number","Primary Template","Alternate Template","ID Number","Name","ID Number","Name","Note","Mean Oligo Tm","Delta Oligo Tm","Mean Oligo Tm (3' only)","Delta Oligo Tm (3' only)","Length","Sequence"
0,"pUC19",,0,"oligo_a",1,"oligo_b","Normal",60.5,1,56,1,30,"ACGTACGTAAGGGGGGGGGGTTGCATGCAA"
1,"pGFP",,2,"oligo_c",3,"oligo_d","Normal",62.5,1,58,1,30,"GGGCCCAAATGGGGGGGGGGCCATGGTTTA"

"Assembly Pieces (SLIC/Gibson/CPEC)"
"ID Number","Part(s)","Type","Type ID Number","Relative Overlap Position","Overlap with Next (bps)","Sequence Length","Sequence"
0,"(backbone)","Digest Linearized",0,,,20,"ACGTACGTACGTACGTACGT"
1,"(promoter)","PCR",0,-10,20,30,"ACGTACGTAAGGGGGGGGGGTTGCATGCAA"
2,"(gfp)","PCR",1,-10,20,30,"GGGCCCAAATGGGGGGGGGGCCATGGTTTA"

"Combinations of Assembly Pieces"
,,,,,,,,
"Number","Name","Assembly Method","Part(s)","Assembly Piece ID Number","Part(s)","Assembly Piece ID Number","Part(s)","Assembly Piece ID Number"
0,"construct_1","SLIC/Gibson/CPEC","(promoter)",1,"(gfp)",2,"(backbone)",0
1,"construct_2","SLIC/Gibson/CPEC","(gfp)",2,,,"(backbone)",0

"Assembly Parameters"
"Parameter","Value"
"Gibson Overlap (bps)",20
"#;
