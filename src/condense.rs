//! Merges several designs into one, deduplicating entities and re-linking
//! every cross reference through per-design old->new ID maps.

use crate::design::{Assembly, Design, Part, PcrReaction, SourceKind, make_skinny};
use crate::error::{CompileError, Result};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// old ID -> new ID, one map per source design.
type IdMaps = Vec<HashMap<u32, u32>>;

fn condense_table<T, K>(
    tables: &[&[T]],
    key: impl Fn(&T) -> K,
    compare: impl FnMut(&T, &T) -> Ordering,
    mut renumber: impl FnMut(&mut T, u32),
) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
{
    let mut rows: Vec<T> = tables
        .iter()
        .flat_map(|table| table.iter())
        .unique_by(|row| key(row))
        .cloned()
        .collect();
    rows.sort_by(compare);
    for (i, row) in rows.iter_mut().enumerate() {
        renumber(row, i as u32);
    }
    rows
}

fn id_maps<T, K>(
    tables: &[&[T]],
    condensed: &[T],
    key: impl Fn(&T) -> K,
    id: impl Fn(&T) -> u32,
) -> IdMaps
where
    K: Eq + Hash,
{
    let index: HashMap<K, u32> = condensed.iter().map(|row| (key(row), id(row))).collect();
    tables
        .iter()
        .map(|table| {
            table
                .iter()
                .filter_map(|row| index.get(&key(row)).map(|new| (id(row), *new)))
                .collect()
        })
        .collect()
}

fn first_by_sequence<'a, T>(
    rows: &'a [T],
    sequence: impl Fn(&'a T) -> &'a str,
    id: impl Fn(&T) -> u32,
) -> HashMap<&'a str, u32> {
    let mut index = HashMap::new();
    for row in rows {
        index.entry(sequence(row)).or_insert_with(|| id(row));
    }
    index
}

fn unresolved(design: usize, entity: &str, row: usize, reference: String) -> CompileError {
    CompileError::ReferenceResolution {
        design,
        entity: entity.to_string(),
        row,
        reference,
    }
}

/// Condenses `designs` into a single design. The result is a fresh table
/// generation; inputs are never modified.
pub fn condense(designs: &[Design]) -> Result<Design> {
    debug!(designs = designs.len(), "condensing designs");

    let digest_tables: Vec<&[_]> = designs.iter().map(|d| d.digests.as_slice()).collect();
    let digests = condense_table(
        &digest_tables,
        |d| d.sequence.clone(),
        |a, b| a.sequence_source.cmp(&b.sequence_source),
        |d, id| d.id = id,
    );
    let digest_maps = id_maps(&digest_tables, &digests, |d| d.sequence.clone(), |d| d.id);

    let source_tables: Vec<&[_]> = designs.iter().map(|d| d.part_sources.as_slice()).collect();
    let part_sources = condense_table(
        &source_tables,
        |s| s.sequence.clone(),
        |a, b| a.name.cmp(&b.name),
        |s, id| s.id = id,
    );

    let synthesis_tables: Vec<&[_]> = designs.iter().map(|d| d.synthesis.as_slice()).collect();
    let synthesis = condense_table(
        &synthesis_tables,
        |s| s.sequence.clone(),
        |a, b| a.name.cmp(&b.name),
        |s, id| s.id = id,
    );

    let oligo_tables: Vec<&[_]> = designs.iter().map(|d| d.oligos.as_slice()).collect();
    let oligos = condense_table(
        &oligo_tables,
        |o| o.sequence.clone(),
        |a, b| a.name.cmp(&b.name),
        |o, id| o.id = id,
    );
    let oligo_maps = id_maps(&oligo_tables, &oligos, |o| o.sequence.clone(), |o| o.id);
    let mut oligo_by_name: HashMap<&str, u32> = HashMap::new();
    for oligo in &oligos {
        oligo_by_name.entry(oligo.name.as_str()).or_insert(oligo.id);
    }

    let pcr_key = |p: &PcrReaction| {
        (
            p.forward_primer_name.clone(),
            p.reverse_primer_name.clone(),
            p.sequence.clone(),
        )
    };
    let mut relinked_pcrs: Vec<Vec<PcrReaction>> = Vec::with_capacity(designs.len());
    for (design_index, design) in designs.iter().enumerate() {
        let mut rows = Vec::with_capacity(design.pcrs.len());
        for (row, pcr) in design.pcrs.iter().enumerate() {
            let link = |name: &str, old: u32| {
                oligo_by_name
                    .get(name)
                    .copied()
                    .or_else(|| oligo_maps[design_index].get(&old).copied())
                    .ok_or_else(|| unresolved(design_index, "oligo", row, format!("{name} ({old})")))
            };
            let mut pcr = pcr.clone();
            pcr.forward_primer_id = link(&pcr.forward_primer_name, pcr.forward_primer_id)?;
            pcr.reverse_primer_id = link(&pcr.reverse_primer_name, pcr.reverse_primer_id)?;
            rows.push(pcr);
        }
        relinked_pcrs.push(rows);
    }
    let pcr_tables: Vec<&[PcrReaction]> = relinked_pcrs.iter().map(Vec::as_slice).collect();
    let pcrs = condense_table(
        &pcr_tables,
        pcr_key,
        |a, b| {
            (&a.forward_primer_name, &a.reverse_primer_name)
                .cmp(&(&b.forward_primer_name, &b.reverse_primer_name))
        },
        |p, id| p.id = id,
    );
    let pcr_maps = id_maps(&pcr_tables, &pcrs, pcr_key, |p| p.id);

    let pcr_by_sequence = first_by_sequence(&pcrs, |p| p.sequence.as_str(), |p| p.id);
    let digest_by_sequence = first_by_sequence(&digests, |d| d.sequence.as_str(), |d| d.id);
    let mut relinked_parts: Vec<Vec<Part>> = Vec::with_capacity(designs.len());
    for (design_index, design) in designs.iter().enumerate() {
        let mut rows = Vec::with_capacity(design.parts.len());
        for (row, part) in design.parts.iter().enumerate() {
            let kind = part.part_type.source_kind();
            let (by_sequence, maps) = match kind {
                SourceKind::Pcr => (&pcr_by_sequence, &pcr_maps),
                SourceKind::Digest => (&digest_by_sequence, &digest_maps),
            };
            let type_id = by_sequence
                .get(part.sequence.as_str())
                .copied()
                .or_else(|| maps[design_index].get(&part.type_id).copied())
                .ok_or_else(|| {
                    unresolved(design_index, kind.label(), row, part.type_id.to_string())
                })?;
            let mut part = part.clone();
            part.type_id = type_id;
            rows.push(part);
        }
        relinked_parts.push(rows);
    }
    let part_tables: Vec<&[Part]> = relinked_parts.iter().map(Vec::as_slice).collect();
    let parts = condense_table(
        &part_tables,
        |p| p.sequence.clone(),
        |a, b| (a.part_type, a.type_id).cmp(&(b.part_type, b.type_id)),
        |p, id| p.id = id,
    );
    let part_maps = id_maps(&part_tables, &parts, |p| p.sequence.clone(), |p| p.id);

    let mut relinked_assemblies: Vec<Vec<Assembly>> = Vec::with_capacity(designs.len());
    for (design_index, design) in designs.iter().enumerate() {
        let mut rows = Vec::with_capacity(design.assemblies.len());
        for (row, assembly) in design.assemblies.iter().enumerate() {
            let mut assembly = assembly.clone();
            for piece in assembly.bins.iter_mut().flatten() {
                piece.part_id = part_maps[design_index]
                    .get(&piece.part_id)
                    .copied()
                    .ok_or_else(|| {
                        unresolved(design_index, "part", row, piece.part_id.to_string())
                    })?;
            }
            rows.push(assembly);
        }
        relinked_assemblies.push(rows);
    }
    let assembly_tables: Vec<&[Assembly]> =
        relinked_assemblies.iter().map(Vec::as_slice).collect();
    let mut assemblies = condense_table(
        &assembly_tables,
        |a| a.name.clone(),
        |a, b| a.name.cmp(&b.name),
        |a, number| a.number = number,
    );
    let bins = assemblies.iter().map(|a| a.bins.len()).max().unwrap_or(0);
    for assembly in &mut assemblies {
        assembly.bins.resize(bins, None);
    }

    let condensed = Design {
        header: designs.iter().map(|d| d.header.as_str()).join("\n"),
        skinny_assemblies: make_skinny(&assemblies),
        digests,
        part_sources,
        synthesis,
        oligos,
        pcrs,
        parts,
        assemblies,
    };
    debug!(
        oligos = condensed.oligos.len(),
        pcrs = condensed.pcrs.len(),
        parts = condensed.parts.len(),
        assemblies = condensed.assemblies.len(),
        "condensed design"
    );
    Ok(condensed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;

    fn sample() -> Design {
        Design::parse(SAMPLE_DESIGN).unwrap()
    }

    /// The sample with its oligo_a renamed and a third construct, as a second
    /// designer would have produced it.
    fn variant() -> Design {
        let text = SAMPLE_DESIGN
            .replace("\"oligo_a\"", "\"oligo_a_copy\"")
            .replace(
                "1,\"construct_2\",\"SLIC/Gibson/CPEC\",\"(gfp)\",2,,,\"(backbone)\",0",
                "1,\"construct_3\",\"SLIC/Gibson/CPEC\",\"(promoter)\",1,,,\"(backbone)\",0",
            );
        Design::parse(&text).unwrap()
    }

    #[test]
    fn test_single_design_is_stable() {
        let design = sample();
        let condensed = condense(std::slice::from_ref(&design)).unwrap();
        assert_eq!(condensed.oligos, design.oligos);
        assert_eq!(condensed.pcrs, design.pcrs);
        assert_eq!(condensed.parts, design.parts);
        assert_eq!(condensed.assemblies, design.assemblies);
        assert_eq!(condensed.skinny_assemblies, design.skinny_assemblies);
    }

    #[test]
    fn test_condense_is_idempotent() {
        let once = condense(&[sample(), variant()]).unwrap();
        let twice = condense(std::slice::from_ref(&once)).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_same_sequence_oligos_merge() {
        let condensed = condense(&[sample(), variant()]).unwrap();
        assert_eq!(condensed.oligos.len(), 4);
        assert!(condensed.oligos.iter().any(|o| o.name == "oligo_a"));
        assert!(!condensed.oligos.iter().any(|o| o.name == "oligo_a_copy"));
        // the renamed primer falls back to the old ID map
        assert_eq!(condensed.pcrs.len(), 3);
        let copy = condensed
            .pcrs
            .iter()
            .find(|p| p.forward_primer_name == "oligo_a_copy")
            .unwrap();
        let oligo_a = condensed.oligos.iter().find(|o| o.name == "oligo_a").unwrap();
        assert_eq!(copy.forward_primer_id, oligo_a.id);
    }

    #[test]
    fn test_assemblies_relinked_and_sorted() {
        let condensed = condense(&[sample(), variant()]).unwrap();
        let names: Vec<&str> = condensed.assemblies.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["construct_1", "construct_2", "construct_3"]);
        let numbers: Vec<u32> = condensed.assemblies.iter().map(|a| a.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        condensed.validate_references(0).unwrap();
        let part_ids: Vec<u32> = condensed.parts.iter().map(|p| p.id).collect();
        for entry in &condensed.skinny_assemblies {
            assert!(part_ids.contains(&entry.part_id));
        }
        let backbone = condensed.parts.iter().find(|p| p.name == "(backbone)").unwrap();
        let third: Vec<u32> = condensed
            .skinny_assemblies
            .iter()
            .filter(|s| s.number == 2)
            .map(|s| s.part_id)
            .collect();
        assert_eq!(third.last(), Some(&backbone.id));
    }

    #[test]
    fn test_unresolved_part_reference_is_fatal() {
        let mut broken = sample();
        let promoter = broken
            .parts
            .iter_mut()
            .find(|p| p.name == "(promoter)")
            .unwrap();
        promoter.sequence = "TTTTTTTTTT".to_string();
        promoter.type_id = 7;
        match condense(&[sample(), broken]) {
            Err(CompileError::ReferenceResolution { design, entity, .. }) => {
                assert_eq!(design, 1);
                assert_eq!(entity, "pcr");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
