//! Nucleotide helpers shared by the parser, the registry exports and the
//! colony PCR simulation.

use bio::alphabets::dna;
use std::sync::LazyLock;
use thiserror::Error;

/// Standard genetic code in TCAG codon order (NCBI table 1).
const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

static DNA_ALPHABET: LazyLock<bio::alphabets::Alphabet> =
    LazyLock::new(|| bio::alphabets::Alphabet::new(b"ACGTacgt"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("primer will not anneal: {0}")]
    PrimerWillNotAnneal(String),
    #[error("primer anneals multiple times: {0}")]
    PrimerAnnealsMultipleTimes(String),
}

/// True when the sequence only holds A, C, G and T (any case).
pub fn is_dna(sequence: &str) -> bool {
    DNA_ALPHABET.is_word(sequence.as_bytes())
}

pub fn reverse_complement(sequence: &str) -> String {
    String::from_utf8_lossy(&dna::revcomp(sequence.as_bytes())).into_owned()
}

fn codon_index(codon: &[u8]) -> Option<usize> {
    codon.iter().try_fold(0usize, |acc, base| {
        let value = match base.to_ascii_uppercase() {
            b'T' => 0,
            b'C' => 1,
            b'A' => 2,
            b'G' => 3,
            _ => return None,
        };
        Some(acc * 4 + value)
    })
}

/// Translates a coding sequence. Sequences whose length is not a multiple
/// of three translate to an empty string; unknown codons become `X`.
pub fn translate(sequence: &str) -> String {
    let bytes = sequence.as_bytes();
    if bytes.len() % 3 != 0 {
        return String::new();
    }
    bytes
        .chunks(3)
        .map(|codon| match codon_index(codon) {
            Some(i) => STANDARD_CODE[i] as char,
            None => 'X',
        })
        .collect()
}

/// Slices a circular sequence from `start` (inclusive) to `stop` (exclusive),
/// wrapping through the origin when `stop <= start`.
fn slice_circular(template: &str, start: usize, stop: usize) -> String {
    if stop > start {
        template[start..stop].to_string()
    } else {
        format!("{}{}", &template[start..], &template[..stop.min(template.len())])
    }
}

fn single_site(template: &str, primer: &str, label: &str) -> Result<usize, SimulationError> {
    let start = template
        .find(primer)
        .ok_or_else(|| SimulationError::PrimerWillNotAnneal(format!("{label}: {primer}")))?;
    if template[start + 1..].contains(primer) {
        return Err(SimulationError::PrimerAnnealsMultipleTimes(format!(
            "{label}: {primer}"
        )));
    }
    Ok(start)
}

/// In-silico PCR on a circular template. Returns the product length and
/// sequence.
pub fn simulate_pcr(
    template: &str,
    forward: &str,
    reverse: &str,
) -> Result<(usize, String), SimulationError> {
    let template = template.to_ascii_uppercase();
    let forward = forward.to_ascii_uppercase();
    let reverse = reverse.to_ascii_uppercase();
    let start = single_site(&template, &forward, "Forward primer")?;
    let reverse_site = reverse_complement(&reverse);
    let stop = single_site(&template, &reverse_site, "Reverse primer")?;
    let end = (stop + reverse.len()) % (template.len().max(1));
    let product = slice_circular(&template, start, if end == 0 { template.len() } else { end });
    Ok((product.len(), product))
}
