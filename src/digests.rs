//! Restriction digest worksheet for the digest-linearized parts.

use crate::design::{Design, PartType, SourceKind};
use crate::distribute;
use crate::error::{CompileError, Result};
use crate::table::Tabular;
use crate::volume::AssemblyVolume;
use crate::wells::{self, PlateFormat, Well, WellOrder};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::HashMap;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRow {
    #[serde(rename = "REACTION_NUMBER")]
    pub reaction: u32,
    #[serde(rename = "SEQUENCE_SOURCE")]
    pub sequence_source: String,
    #[serde(rename = "SEQUENCE_LENGTH")]
    pub sequence_length: usize,
    #[serde(rename = "DIGEST_SOURCE_PLATE")]
    pub digest_plate: String,
    #[serde(rename = "DIGEST_SOURCE_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub digest_well: Well,
    #[serde(rename = "PARTS_SOURCE_PLATE")]
    pub parts_plate: String,
    #[serde(rename = "PARTS_WELL")]
    #[serde_as(as = "DisplayFromStr")]
    pub parts_well: Well,
    #[serde(rename = "PART_TYPE")]
    pub part_type: SourceKind,
}

impl Tabular for DigestRow {
    const COLUMNS: &'static [&'static str] = &[
        "REACTION_NUMBER",
        "SEQUENCE_SOURCE",
        "SEQUENCE_LENGTH",
        "DIGEST_SOURCE_PLATE",
        "DIGEST_SOURCE_WELL",
        "PARTS_SOURCE_PLATE",
        "PARTS_WELL",
        "PART_TYPE",
    ];
}

/// One digest reaction per required reaction of every digest-linearized
/// part, placed row-major on 96-well digest plates and stamped into the
/// parts plate quadrants left after the `pcr_plates` PCR plates.
pub fn create_digests(
    design: &Design,
    volumes: &[AssemblyVolume],
    max_well_uses: usize,
    pcr_plates: usize,
) -> Result<Vec<DigestRow>> {
    let digests: HashMap<u32, _> = design.digests.iter().map(|d| (d.id, d)).collect();
    let mut reactions = vec![];
    for volume in volumes
        .iter()
        .filter(|v| v.part_type == PartType::DigestLinearized)
    {
        let digest = digests.get(&volume.type_id).ok_or_else(|| {
            CompileError::InvalidInput(format!(
                "part {} references missing digest {}",
                volume.part_id, volume.type_id
            ))
        })?;
        for _ in 0..distribute::reactions_for_uses(volume.uses, max_well_uses) {
            reactions.push(*digest);
        }
    }
    reactions
        .into_iter()
        .enumerate()
        .map(|(i, digest)| {
            let digest_plate = wells::plate_name("digest_plate_{}", i, 96);
            let digest_well = wells::well_at(i, WellOrder::RowMajor, PlateFormat::Plate96);
            let d = wells::plate_number(&digest_plate)?;
            Ok(DigestRow {
                reaction: digest.id,
                sequence_source: digest.sequence_source.clone(),
                sequence_length: digest.length,
                parts_plate: format!("parts_plate_{}", (i + 96 * pcr_plates) / 384 + 1),
                parts_well: wells::stamp(digest_well, (d - 1 + pcr_plates) % 4)?,
                digest_plate,
                digest_well,
                part_type: SourceKind::Digest,
            })
        })
        .collect()
}
