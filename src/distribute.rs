//! Spreads the draws on a part across its source wells so no well is
//! sampled more than the reuse budget allows.

use crate::error::{CompileError, Result};
use crate::wells::Location;

pub const DEFAULT_MAX_WELL_USES: usize = 8;

/// Reactions needed so that `uses` draws fit a budget of `max_uses` per well.
pub fn reactions_for_uses(uses: usize, max_uses: usize) -> usize {
    if uses == 0 {
        0
    } else {
        uses.div_ceil(max_uses.max(1))
    }
}

/// Assigns each of `uses` draws to a location, exhausting earlier locations
/// first: draw `i` goes to `locations[i / max_uses]`.
pub fn distribute_wells(
    uses: usize,
    locations: &[Location],
    max_uses: usize,
    subject: &str,
) -> Result<Vec<Location>> {
    let required = reactions_for_uses(uses, max_uses);
    if required > locations.len() {
        return Err(CompileError::ResourceExhaustion {
            subject: subject.to_string(),
            required,
            available: locations.len(),
        });
    }
    let max_uses = max_uses.max(1);
    Ok((0..uses).map(|i| locations[i / max_uses].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wells::Well;
    use itertools::Itertools;

    fn locations(wells: &[&str]) -> Vec<Location> {
        wells
            .iter()
            .map(|w| Location::new("parts_plate_1", Well::parse(w).unwrap()))
            .collect()
    }

    #[test]
    fn test_reactions_for_uses() {
        assert_eq!(reactions_for_uses(0, 8), 0);
        assert_eq!(reactions_for_uses(1, 8), 1);
        assert_eq!(reactions_for_uses(8, 8), 1);
        assert_eq!(reactions_for_uses(9, 8), 2);
        assert_eq!(reactions_for_uses(5, 4), 2);
    }

    #[test]
    fn test_earlier_wells_fill_first() {
        let wells = distribute_wells(6, &locations(&["M20", "O20"]), 4, "part 1").unwrap();
        let text: Vec<String> = wells.iter().map(|l| l.well.to_string()).collect();
        assert_eq!(text, vec!["M20", "M20", "M20", "M20", "O20", "O20"]);
        let exact = distribute_wells(5, &locations(&["M20", "O20"]), 5, "part 1").unwrap();
        assert!(exact.iter().all(|l| l.well.to_string() == "M20"));
    }

    #[test]
    fn test_budget_never_exceeded() {
        let available = locations(&["A1", "A3", "C1", "C3"]);
        for uses in 0..=32 {
            let wells = distribute_wells(uses, &available, 8, "part").unwrap();
            assert_eq!(wells.len(), uses);
            let counts = wells.iter().counts();
            assert!(counts.values().all(|c| *c <= 8));
        }
    }

    #[test]
    fn test_overflow_reports_counts() {
        let available = locations(&["A1", "A3"]);
        match distribute_wells(20, &available, 8, "part 7") {
            Err(CompileError::ResourceExhaustion {
                subject,
                required,
                available,
            }) => {
                assert_eq!(subject, "part 7");
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
