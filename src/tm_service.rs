//! Annealing temperatures for primer pairs, either from the NEB Tm batch
//! service or from the Tm values already carried by the design.

use crate::design::Design;
use crate::error::{CompileError, Result};
use crate::settings::{TmServiceMode, TmServiceSettings};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// (primer 1 sequence, primer 2 sequence)
pub type PrimerPair = (String, String);

pub trait AnnealingTemperatureService: Send + Sync {
    /// One annealing temperature per input pair, in input order.
    fn annealing_temperatures(&self, pairs: &[PrimerPair]) -> Result<Vec<f64>>;
}

#[derive(Debug, Serialize)]
struct TmRequest<'a> {
    seqpairs: Vec<[&'a str; 2]>,
    conc: f64,
    prodcode: &'a str,
    email: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TmRecord {
    seq1: String,
    seq2: String,
    ta: f64,
}

#[derive(Debug, Deserialize)]
struct TmResponse {
    data: Vec<TmRecord>,
}

/// What one HTTP exchange amounted to.
#[derive(Debug)]
enum Reply {
    Records(Vec<TmRecord>),
    /// 413: the batch has to be split.
    TooLarge,
    Transient(String),
    Fatal(String),
}

fn classify_status(status: u16, body: &str) -> Reply {
    match status {
        413 => Reply::TooLarge,
        429 | 500..=599 => Reply::Transient(format!("HTTP {status}")),
        _ => Reply::Fatal(format!("HTTP {status}: {}", body.trim())),
    }
}

fn parse_body(body: &str) -> Reply {
    match serde_json::from_str::<TmResponse>(body) {
        Ok(response) => Reply::Records(response.data),
        Err(e) => Reply::Fatal(format!("malformed response: {e}")),
    }
}

/// Sends `batch` with up to `attempts` tries, halving it whenever the
/// service answers 413.
fn resolve<F>(
    batch: &[PrimerPair],
    attempts: usize,
    backoff: Duration,
    send: &mut F,
) -> Result<Vec<TmRecord>>
where
    F: FnMut(&[PrimerPair]) -> Reply,
{
    let mut last_error = String::from("no attempt made");
    for attempt in 1..=attempts.max(1) {
        match send(batch) {
            Reply::Records(records) => return Ok(records),
            Reply::TooLarge if batch.len() > 1 => {
                debug!("Tm batch of {} pairs too large, splitting", batch.len());
                let (left, right) = batch.split_at(batch.len() / 2);
                let mut records = resolve(left, attempts, backoff, send)?;
                records.extend(resolve(right, attempts, backoff, send)?);
                return Ok(records);
            }
            Reply::TooLarge => {
                return Err(CompileError::ExternalService(
                    "request entity too large for a single pair".to_string(),
                ));
            }
            Reply::Fatal(message) => return Err(CompileError::ExternalService(message)),
            Reply::Transient(message) => {
                warn!("Tm service attempt {attempt} failed: {message}");
                last_error = message;
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }
    Err(CompileError::ExternalService(format!(
        "giving up after {attempts} attempts: {last_error}"
    )))
}

/// Looks up every input pair in the service answers.
fn match_records(pairs: &[PrimerPair], records: Vec<TmRecord>) -> Result<Vec<f64>> {
    let mut by_pair: HashMap<(String, String), f64> = HashMap::new();
    for record in records {
        by_pair.entry((record.seq1, record.seq2)).or_insert(record.ta);
    }
    pairs
        .iter()
        .map(|pair| {
            by_pair.get(pair).copied().ok_or_else(|| {
                CompileError::ExternalService(format!(
                    "no annealing temperature returned for {} / {}",
                    pair.0, pair.1
                ))
            })
        })
        .collect()
}

pub struct NebTmClient {
    client: reqwest::blocking::Client,
    settings: TmServiceSettings,
}

impl NebTmClient {
    pub fn new(settings: &TmServiceSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| CompileError::ExternalService(format!("could not build HTTP client: {e}")))?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn send(&self, batch: &[PrimerPair]) -> Reply {
        let request = TmRequest {
            seqpairs: batch.iter().map(|(a, b)| [a.as_str(), b.as_str()]).collect(),
            conc: self.settings.concentration,
            prodcode: &self.settings.prodcode,
            email: &self.settings.email,
        };
        let response = match self.client.post(&self.settings.url).json(&request).send() {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                return Reply::Transient(e.to_string());
            }
            Err(e) => return Reply::Fatal(e.to_string()),
        };
        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => return Reply::Transient(format!("could not read response: {e}")),
        };
        if status.is_success() {
            parse_body(&body)
        } else {
            classify_status(status.as_u16(), &body)
        }
    }
}

impl AnnealingTemperatureService for NebTmClient {
    fn annealing_temperatures(&self, pairs: &[PrimerPair]) -> Result<Vec<f64>> {
        let unique: Vec<PrimerPair> = pairs.iter().unique().cloned().collect();
        debug!("Querying {} for {} primer pairs", self.settings.url, unique.len());
        let backoff = Duration::from_millis(self.settings.backoff_ms);
        let mut records = vec![];
        for chunk in unique.chunks(self.settings.max_batch.max(1)) {
            records.extend(resolve(
                chunk,
                self.settings.attempts,
                backoff,
                &mut |batch| self.send(batch),
            )?);
        }
        match_records(pairs, records)
    }
}

/// Offline mode: the design's Mean Oligo Tm per (forward, reverse) primer
/// sequence pair.
#[derive(Debug, Clone, Default)]
pub struct DesignTmService {
    temperatures: HashMap<PrimerPair, f64>,
}

impl DesignTmService {
    pub fn from_design(design: &Design) -> Self {
        let sequences: HashMap<&str, &str> = design
            .oligos
            .iter()
            .map(|o| (o.name.as_str(), o.sequence.as_str()))
            .collect();
        let temperatures = design
            .pcrs
            .iter()
            .filter_map(|pcr| {
                let forward = sequences.get(pcr.forward_primer_name.as_str())?;
                let reverse = sequences.get(pcr.reverse_primer_name.as_str())?;
                Some(((forward.to_string(), reverse.to_string()), pcr.mean_oligo_tm))
            })
            .collect();
        Self { temperatures }
    }
}

impl AnnealingTemperatureService for DesignTmService {
    fn annealing_temperatures(&self, pairs: &[PrimerPair]) -> Result<Vec<f64>> {
        pairs
            .iter()
            .map(|pair| {
                self.temperatures.get(pair).copied().ok_or_else(|| {
                    CompileError::InvalidInput(format!(
                        "design has no Mean Oligo Tm for primers {} / {}",
                        pair.0, pair.1
                    ))
                })
            })
            .collect()
    }
}

/// Builds the service selected by the settings.
pub fn service_for(
    settings: &TmServiceSettings,
    design: &Design,
) -> Result<Box<dyn AnnealingTemperatureService>> {
    Ok(match settings.mode {
        TmServiceMode::Neb => Box::new(NebTmClient::new(settings)?),
        TmServiceMode::Design => Box::new(DesignTmService::from_design(design)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;

    fn pairs(n: usize) -> Vec<PrimerPair> {
        (0..n).map(|i| (format!("A{i}"), format!("T{i}"))).collect()
    }

    fn answer(batch: &[PrimerPair]) -> Vec<TmRecord> {
        batch
            .iter()
            .enumerate()
            .map(|(i, (a, b))| TmRecord {
                seq1: a.clone(),
                seq2: b.clone(),
                ta: 60.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(413, ""), Reply::TooLarge));
        assert!(matches!(classify_status(429, ""), Reply::Transient(_)));
        assert!(matches!(classify_status(503, ""), Reply::Transient(_)));
        assert!(matches!(classify_status(400, "bad"), Reply::Fatal(_)));
        assert!(matches!(classify_status(404, ""), Reply::Fatal(_)));
    }

    #[test]
    fn test_parse_body() {
        let body = r#"{"success":true,"data":[{"seq1":"AC","seq2":"GT","tm1":60,"tm2":61,"ta":62.5}]}"#;
        match parse_body(body) {
            Reply::Records(records) => assert_eq!(records[0].ta, 62.5),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse_body("<html>"), Reply::Fatal(_)));
    }

    #[test]
    fn test_too_large_halves_batch() {
        let mut sizes = vec![];
        let mut send = |batch: &[PrimerPair]| {
            sizes.push(batch.len());
            if batch.len() > 2 {
                Reply::TooLarge
            } else {
                Reply::Records(answer(batch))
            }
        };
        let records = resolve(&pairs(5), 3, Duration::ZERO, &mut send).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(sizes, vec![5, 2, 3, 1, 2]);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let mut calls = 0;
        let mut send = |batch: &[PrimerPair]| {
            calls += 1;
            if calls < 3 {
                Reply::Transient("HTTP 503".to_string())
            } else {
                Reply::Records(answer(batch))
            }
        };
        let records = resolve(&pairs(2), 3, Duration::ZERO, &mut send).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausted_retries_fail() {
        let mut calls = 0;
        let mut send = |_: &[PrimerPair]| {
            calls += 1;
            Reply::Transient("timeout".to_string())
        };
        let err = resolve(&pairs(1), 3, Duration::ZERO, &mut send).unwrap_err();
        assert!(matches!(err, CompileError::ExternalService(_)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let mut calls = 0;
        let mut send = |_: &[PrimerPair]| {
            calls += 1;
            Reply::Fatal("HTTP 400".to_string())
        };
        assert!(resolve(&pairs(1), 3, Duration::ZERO, &mut send).is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_match_records_keeps_input_order() {
        let input = vec![
            ("B".to_string(), "b".to_string()),
            ("A".to_string(), "a".to_string()),
            ("B".to_string(), "b".to_string()),
        ];
        let records = vec![
            TmRecord {
                seq1: "A".to_string(),
                seq2: "a".to_string(),
                ta: 55.0,
            },
            TmRecord {
                seq1: "B".to_string(),
                seq2: "b".to_string(),
                ta: 65.0,
            },
        ];
        assert_eq!(match_records(&input, records).unwrap(), vec![65.0, 55.0, 65.0]);
        assert!(match_records(&pairs(1), vec![]).is_err());
    }

    #[test]
    fn test_design_service() {
        let design = Design::parse(SAMPLE_DESIGN).unwrap();
        let service = DesignTmService::from_design(&design);
        let temps = service
            .annealing_temperatures(&[
                ("GGGCCCAAAT".to_string(), "CCATGGTTTA".to_string()),
                ("ACGTACGTAA".to_string(), "TTGCATGCAA".to_string()),
            ])
            .unwrap();
        assert_eq!(temps, vec![62.5, 60.5]);
        assert!(
            service
                .annealing_temperatures(&[("A".to_string(), "C".to_string())])
                .is_err()
        );
    }
}
