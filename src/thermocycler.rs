//! Groups PCR reactions into thermocycler zones with a shared annealing
//! temperature. Every block has six zones; each zone covers two plate
//! columns and therefore at most 16 reactions.

use crate::error::{CompileError, Result};
use crate::table::Tabular;
use crate::wells::{Location, Well};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ZONES_PER_BLOCK: usize = 6;
pub const ZONE_CAPACITY: usize = 16;
const REACTIONS_PER_BLOCK: usize = 96;

/// Zone label per reaction plus the zone centroids, indexed by label.
/// Labels ascend with the centroid temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub centroids: Vec<f64>,
}

impl Clustering {
    pub fn zone_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn zone_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for label in &self.labels {
            sizes[*label] += 1;
        }
        sizes
    }
}

struct PrefixSums {
    sum: Vec<f64>,
    squares: Vec<f64>,
}

impl PrefixSums {
    fn new(values: &[f64]) -> Self {
        let mut sum = vec![0.0; values.len() + 1];
        let mut squares = vec![0.0; values.len() + 1];
        for (i, v) in values.iter().enumerate() {
            sum[i + 1] = sum[i] + v;
            squares[i + 1] = squares[i] + v * v;
        }
        Self { sum, squares }
    }

    /// Squared error of `values[start..end]` around its mean.
    fn cost(&self, start: usize, end: usize) -> f64 {
        let n = (end - start) as f64;
        let s = self.sum[end] - self.sum[start];
        let sq = self.squares[end] - self.squares[start];
        (sq - s * s / n).max(0.0)
    }

    fn mean(&self, start: usize, end: usize) -> f64 {
        (self.sum[end] - self.sum[start]) / (end - start) as f64
    }
}

/// Optimal split of ascending `sorted` values into exactly `k` contiguous
/// groups of 1..=`cap` members, minimizing the summed squared error.
/// Returns the group boundaries as `(start, end)` ranges, or `None` when no
/// split satisfies the size limits.
pub(crate) fn segment_sorted(sorted: &[f64], k: usize, cap: usize) -> Option<Vec<(usize, usize)>> {
    let n = sorted.len();
    if k == 0 || k > n || k * cap < n {
        return None;
    }
    let sums = PrefixSums::new(sorted);
    // best[g][i]: cost of the first i values in g groups
    let mut best = vec![vec![f64::INFINITY; n + 1]; k + 1];
    let mut split = vec![vec![0usize; n + 1]; k + 1];
    best[0][0] = 0.0;
    for g in 1..=k {
        for i in g..=n {
            let lowest = i.saturating_sub(cap).max(g - 1);
            for j in lowest..i {
                if best[g - 1][j].is_infinite() {
                    continue;
                }
                let candidate = best[g - 1][j] + sums.cost(j, i);
                if candidate < best[g][i] {
                    best[g][i] = candidate;
                    split[g][i] = j;
                }
            }
        }
    }
    if best[k][n].is_infinite() {
        return None;
    }
    let mut ranges = Vec::with_capacity(k);
    let mut end = n;
    for g in (1..=k).rev() {
        let start = split[g][end];
        ranges.push((start, end));
        end = start;
    }
    ranges.reverse();
    Some(ranges)
}

/// Zone count for `n` reaction instances: six per started block of 96.
pub fn zone_count(n: usize) -> usize {
    ZONES_PER_BLOCK * n.div_ceil(REACTIONS_PER_BLOCK)
}

/// Assigns each temperature to a zone. Fewer than six reactions get one
/// zone each; otherwise `zone_count` zones are fitted by exact 1-D
/// k-means, capped at 16 members once there are at least 16 reactions.
pub fn cluster_zones(temperatures: &[f64]) -> Result<Clustering> {
    let n = temperatures.len();
    let order: Vec<usize> = (0..n)
        .sorted_by(|a, b| temperatures[*a].total_cmp(&temperatures[*b]))
        .collect();
    let mut labels = vec![0; n];
    if n < ZONES_PER_BLOCK {
        for (zone, index) in order.iter().enumerate() {
            labels[*index] = zone;
        }
        let centroids = order.iter().map(|i| temperatures[*i]).collect();
        return Ok(Clustering { labels, centroids });
    }
    let cap = if n >= ZONE_CAPACITY { ZONE_CAPACITY } else { n };
    let sorted: Vec<f64> = order.iter().map(|i| temperatures[*i]).collect();
    let k = zone_count(n).min(n);
    let ranges = segment_sorted(&sorted, k, cap).ok_or_else(|| {
        CompileError::InvalidInput(format!("{n} reactions do not fit {k} zones of at most {cap}"))
    })?;
    let sums = PrefixSums::new(&sorted);
    let mut centroids = Vec::with_capacity(ranges.len());
    for (zone, (start, end)) in ranges.iter().enumerate() {
        centroids.push(sums.mean(*start, *end));
        for position in *start..*end {
            labels[order[position]] = zone;
        }
    }
    Ok(relabel_by_centroid(Clustering { labels, centroids }))
}

/// Renumbers zones so that labels follow ascending centroid temperature.
fn relabel_by_centroid(clustering: Clustering) -> Clustering {
    let ranking: Vec<usize> = (0..clustering.centroids.len())
        .sorted_by(|a, b| clustering.centroids[*a].total_cmp(&clustering.centroids[*b]))
        .collect();
    let mut new_label = vec![0; ranking.len()];
    for (rank, old) in ranking.iter().enumerate() {
        new_label[*old] = rank;
    }
    Clustering {
        labels: clustering.labels.iter().map(|l| new_label[*l]).collect(),
        centroids: ranking.iter().map(|i| clustering.centroids[*i]).collect(),
    }
}

pub fn block_of(zone: usize) -> usize {
    zone / ZONES_PER_BLOCK
}

pub fn block_plate(block: usize) -> String {
    format!("pcr_plate_{}", block + 1)
}

/// The `n`-th well of a block-relative zone: down column `2z+1`, then down
/// column `2z+2`. `None` past the zone's 16 wells or the block's six zones.
pub fn zone_well(zone_id: usize, n: usize) -> Option<Well> {
    if zone_id >= ZONES_PER_BLOCK || n >= ZONE_CAPACITY {
        return None;
    }
    let column = zone_id * 2 + n / 8;
    Some(Well::new((n % 8) as u8, column as u8))
}

/// Output location for each reaction, given their zones in worksheet order.
/// Reactions of the same zone fill that zone's wells in turn.
pub fn assign_zone_wells(zones: &[usize]) -> Result<Vec<Location>> {
    let mut used: HashMap<usize, usize> = HashMap::new();
    zones
        .iter()
        .map(|zone| {
            let n = used.entry(*zone).or_insert(0);
            let well = zone_well(zone % ZONES_PER_BLOCK, *n).ok_or_else(|| {
                CompileError::InvalidInput(format!("zone {zone} holds more than {ZONE_CAPACITY} reactions"))
            })?;
            *n += 1;
            Ok(Location::new(block_plate(block_of(*zone)), well))
        })
        .collect()
}

/// Extension time for a product, 30 s per kb, rendered like a timedelta.
pub fn extension_time(length: usize) -> String {
    let seconds = length * 30 / 1000;
    format!(
        "0 days {:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

/// One row of the thermocycler program: a zone of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneProgram {
    #[serde(rename = "BLOCK ID")]
    pub block_id: usize,
    #[serde(rename = "BLOCK ZONE")]
    pub block_zone: usize,
    #[serde(rename = "THERMOCYCLER_ZONE_ANNEALING_TEMP")]
    pub annealing_temp: f64,
    #[serde(rename = "BLOCK_NAME")]
    pub block_name: String,
    #[serde(rename = "PLATE_LONGEST_PCR")]
    pub longest_pcr: usize,
    #[serde(rename = "PLATE_EXTENSION_TIME")]
    pub extension_time: String,
}

impl Tabular for ZoneProgram {
    const COLUMNS: &'static [&'static str] = &[
        "BLOCK ID",
        "BLOCK ZONE",
        "THERMOCYCLER_ZONE_ANNEALING_TEMP",
        "BLOCK_NAME",
        "PLATE_LONGEST_PCR",
        "PLATE_EXTENSION_TIME",
    ];
}

/// Program rows from (zone, zone temperature, expected size) per reaction,
/// sorted by zone.
pub fn program(reactions: impl IntoIterator<Item = (usize, f64, usize)>) -> Vec<ZoneProgram> {
    reactions
        .into_iter()
        .into_group_map_by(|(zone, _, _)| *zone)
        .into_iter()
        .sorted_by_key(|(zone, _)| *zone)
        .map(|(zone, members)| {
            let annealing_temp = members[0].1;
            let longest_pcr = members.iter().map(|m| m.2).max().unwrap_or(0);
            let block = block_of(zone);
            ZoneProgram {
                block_id: block,
                block_zone: zone % ZONES_PER_BLOCK,
                annealing_temp,
                block_name: block_plate(block),
                longest_pcr,
                extension_time: extension_time(longest_pcr),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(sorted: &[f64], k: usize, cap: usize) -> f64 {
        let n = sorted.len();
        let mut best = f64::INFINITY;
        let total = k.pow(n as u32);
        for code in 0..total {
            let mut groups = vec![vec![]; k];
            let mut c = code;
            for v in sorted {
                groups[c % k].push(*v);
                c /= k;
            }
            if groups.iter().any(|g| g.is_empty() || g.len() > cap) {
                continue;
            }
            let cost: f64 = groups
                .iter()
                .map(|g| {
                    let mean = g.iter().sum::<f64>() / g.len() as f64;
                    g.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                })
                .sum();
            best = best.min(cost);
        }
        best
    }

    fn segmented_cost(sorted: &[f64], ranges: &[(usize, usize)]) -> f64 {
        let sums = PrefixSums::new(sorted);
        ranges.iter().map(|(s, e)| sums.cost(*s, *e)).sum()
    }

    #[test]
    fn test_segmentation_matches_brute_force() {
        let cases: &[&[f64]] = &[
            &[50.0, 51.0, 52.0, 60.0, 61.0, 70.0],
            &[55.0, 55.0, 55.0, 55.0, 56.0, 72.0, 72.5],
            &[58.1, 59.4, 60.0, 63.3, 63.9, 64.2, 66.0, 71.7],
        ];
        for values in cases {
            for cap in [2, 3, 8] {
                let k = 3;
                let ranges = match segment_sorted(values, k, cap) {
                    Some(ranges) => ranges,
                    None => {
                        assert!(k * cap < values.len());
                        continue;
                    }
                };
                assert!(ranges.iter().all(|(s, e)| e - s >= 1 && e - s <= cap));
                let expected = brute_force(values, k, cap);
                assert!((segmented_cost(values, &ranges) - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_small_inputs_get_one_zone_each() {
        let clustering = cluster_zones(&[65.0, 55.0, 60.0]).unwrap();
        assert_eq!(clustering.labels, vec![2, 0, 1]);
        assert_eq!(clustering.centroids, vec![55.0, 60.0, 65.0]);
    }

    #[test]
    fn test_zone_count_rule() {
        assert_eq!(zone_count(6), 6);
        assert_eq!(zone_count(96), 6);
        assert_eq!(zone_count(97), 12);
        assert_eq!(zone_count(200), 18);
    }

    #[test]
    fn test_clusters_are_capped_and_ordered() {
        let temps: Vec<f64> = (0..40).map(|i| 55.0 + (i % 7) as f64 * 2.5).collect();
        let clustering = cluster_zones(&temps).unwrap();
        assert_eq!(clustering.zone_count(), 6);
        assert!(clustering.zone_sizes().iter().all(|s| *s >= 1 && *s <= 16));
        assert!(clustering.centroids.windows(2).all(|w| w[0] <= w[1]));
        for (t, label) in temps.iter().zip(&clustering.labels) {
            assert!((t - clustering.centroids[*label]).abs() <= 7.5);
        }
    }

    #[test]
    fn test_large_runs_span_blocks() {
        let temps: Vec<f64> = (0..150).map(|i| 50.0 + (i as f64) * 0.1).collect();
        let clustering = cluster_zones(&temps).unwrap();
        assert_eq!(clustering.zone_count(), 12);
        assert!(clustering.zone_sizes().iter().all(|s| *s <= 16));
        assert_eq!(clustering.zone_sizes().iter().sum::<usize>(), 150);
    }

    #[test]
    fn test_zone_wells() {
        let names: Vec<String> = (0..10).map(|n| zone_well(1, n).unwrap().to_string()).collect();
        assert_eq!(names[0], "A3");
        assert_eq!(names[7], "H3");
        assert_eq!(names[8], "A4");
        assert_eq!(zone_well(5, 15).unwrap().to_string(), "H12");
        assert_eq!(zone_well(5, 16), None);
        assert_eq!(zone_well(6, 0), None);
        let locations = assign_zone_wells(&[0, 0, 1, 6]).unwrap();
        assert_eq!(locations[1].to_string(), "pcr_plate_1#B1");
        assert_eq!(locations[2].to_string(), "pcr_plate_1#A3");
        assert_eq!(locations[3].to_string(), "pcr_plate_2#A1");
    }

    #[test]
    fn test_overfull_zone_is_an_error() {
        assert!(assign_zone_wells(&[3; 16]).is_ok());
        assert!(matches!(
            assign_zone_wells(&[3; 17]),
            Err(CompileError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_full_block_wells_stay_on_plate() {
        for n in [6, 15, 16, 96, 97, 192] {
            let temps: Vec<f64> = (0..n).map(|i| 52.0 + ((i * 37) % 23) as f64 * 0.5).collect();
            let clustering = cluster_zones(&temps).unwrap();
            let mut zones = clustering.labels.clone();
            zones.sort();
            let locations = assign_zone_wells(&zones).unwrap();
            assert!(locations.iter().all(|l| l.well.column() < 12 && l.well.row() < 8));
            assert_eq!(locations.iter().unique().count(), n);
        }
    }

    #[test]
    fn test_program_rows() {
        assert_eq!(extension_time(3000), "0 days 00:01:30");
        assert_eq!(extension_time(999), "0 days 00:00:29");
        let rows = program([(7, 61.0, 900), (0, 55.0, 1200), (7, 61.0, 4200)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].block_zone, 0);
        assert_eq!(rows[1].block_id, 1);
        assert_eq!(rows[1].block_zone, 1);
        assert_eq!(rows[1].block_name, "pcr_plate_2");
        assert_eq!(rows[1].longest_pcr, 4200);
        assert_eq!(rows[1].extension_time, "0 days 00:02:06");
    }
}
