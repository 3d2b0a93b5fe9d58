//! Well coordinates, plate formats and the 96/384 stamping maps.

use crate::error::{CompileError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

const ROW_LETTERS: &[u8; 16] = b"ABCDEFGHIJKLMNOP";

static WELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Pa-p])0*([1-9][0-9]?)\s*$").expect("well pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlateFormat {
    Plate96,
    Plate384,
}

impl PlateFormat {
    pub fn from_size(size: usize) -> Result<Self> {
        match size {
            96 => Ok(PlateFormat::Plate96),
            384 => Ok(PlateFormat::Plate384),
            other => Err(CompileError::InvalidInput(format!(
                "plate size must be 96 or 384, got {other}"
            ))),
        }
    }

    pub fn rows(self) -> u8 {
        match self {
            PlateFormat::Plate96 => 8,
            PlateFormat::Plate384 => 16,
        }
    }

    pub fn columns(self) -> u8 {
        match self {
            PlateFormat::Plate96 => 12,
            PlateFormat::Plate384 => 24,
        }
    }

    pub fn capacity(self) -> usize {
        self.rows() as usize * self.columns() as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellOrder {
    /// A1, A2, ... A12, B1, ...
    RowMajor,
    /// A1, B1, ... H1, A2, ...
    ColumnMajor,
}

/// A plate coordinate. Row and column are stored 0-based; ordering is row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Well {
    row: u8,
    column: u8,
}

impl Well {
    pub fn new(row: u8, column: u8) -> Self {
        Self { row, column }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let caps = WELL_RE
            .captures(text)
            .ok_or_else(|| CompileError::InvalidWell(text.to_string()))?;
        let letter = caps[1].to_ascii_uppercase().as_bytes()[0];
        let column: u8 = caps[2]
            .parse()
            .map_err(|_| CompileError::InvalidWell(text.to_string()))?;
        if column == 0 || column > 24 {
            return Err(CompileError::InvalidWell(text.to_string()));
        }
        Ok(Self {
            row: letter - b'A',
            column: column - 1,
        })
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    pub fn row_letter(&self) -> char {
        ROW_LETTERS[self.row as usize] as char
    }

    pub fn fits(&self, format: PlateFormat) -> bool {
        self.row < format.rows() && self.column < format.columns()
    }

    pub fn validate(self, format: PlateFormat) -> Result<Self> {
        if self.fits(format) {
            Ok(self)
        } else {
            Err(CompileError::InvalidWell(format!(
                "{self} does not exist on a {}-well plate",
                format.capacity()
            )))
        }
    }

    /// Zero-padded notation, e.g. `A01`.
    pub fn three_char(&self) -> String {
        format!("{}{:02}", self.row_letter(), self.column + 1)
    }

    /// Position in row-major order on the given format.
    pub fn index(&self, format: PlateFormat) -> usize {
        self.row as usize * format.columns() as usize + self.column as usize
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.column + 1)
    }
}

impl FromStr for Well {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        Well::parse(s)
    }
}

/// A well on a named plate. Written as `plate#well`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub plate: String,
    pub well: Well,
}

impl Location {
    pub fn new(plate: impl Into<String>, well: Well) -> Self {
        Self {
            plate: plate.into(),
            well,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.plate, self.well)
    }
}

impl FromStr for Location {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        let (plate, well) = s
            .rsplit_once('#')
            .ok_or_else(|| CompileError::InvalidInput(format!("'{s}' is not a plate#well location")))?;
        Ok(Self::new(plate.trim(), Well::parse(well)?))
    }
}

/// Places a 96-well coordinate into quadrant `quadrant` of a 384-well plate.
/// Quadrants 0..3 are top-left, top-right, bottom-left, bottom-right.
pub fn stamp(well: Well, quadrant: usize) -> Result<Well> {
    let well = well.validate(PlateFormat::Plate96)?;
    if quadrant > 3 {
        return Err(CompileError::InvalidInput(format!(
            "quadrant must be 0..=3, got {quadrant}"
        )));
    }
    let q = quadrant as u8;
    Ok(Well::new(well.row * 2 + q / 2, well.column * 2 + q % 2))
}

/// Inverse of [`stamp`], dropping the quadrant.
pub fn unstamp(well: Well) -> Result<Well> {
    let well = well.validate(PlateFormat::Plate384)?;
    Ok(Well::new(well.row / 2, well.column / 2))
}

/// Quadrant a 384-well coordinate belongs to.
pub fn quadrant_of(well: Well) -> Result<usize> {
    let well = well.validate(PlateFormat::Plate384)?;
    Ok(((well.row % 2) * 2 + well.column % 2) as usize)
}

/// Maps a row-major oligo plate position (384 format) onto the matching
/// position of the 96-well order plate holding the same block of 96 oligos.
pub fn unstamp_oligos(well: Well) -> Result<Well> {
    let well = well.validate(PlateFormat::Plate384)?;
    let row = (well.row * 2 + well.column % 2) % 8;
    Ok(Well::new(row, well.column / 2))
}

pub fn well_at(index: usize, order: WellOrder, format: PlateFormat) -> Well {
    let index = index % format.capacity();
    let rows = format.rows() as usize;
    let columns = format.columns() as usize;
    match order {
        WellOrder::RowMajor => Well::new((index / columns) as u8, (index % columns) as u8),
        WellOrder::ColumnMajor => Well::new((index % rows) as u8, (index / rows) as u8),
    }
}

/// `n` wells in the requested order, wrapping onto the next plate at capacity.
pub fn well_column(n: usize, order: WellOrder, format: PlateFormat) -> Vec<Well> {
    (0..n).map(|i| well_at(i, order, format)).collect()
}

pub fn plate_name(template: &str, index: usize, per_plate: usize) -> String {
    template.replace("{}", &(index / per_plate + 1).to_string())
}

/// Plate names for `n` consecutive entries, `{}` replaced by the 1-based plate number.
pub fn plate_column(n: usize, template: &str, format: PlateFormat) -> Vec<String> {
    (0..n)
        .map(|i| plate_name(template, i, format.capacity()))
        .collect()
}

pub fn index_to_well(index: usize, format: PlateFormat) -> Well {
    well_at(index, WellOrder::RowMajor, format)
}

/// 1-based row-major index of a 96-well coordinate, as used by liquid handlers.
pub fn biomek_index(well: Well) -> Result<usize> {
    let well = well.validate(PlateFormat::Plate96)?;
    Ok(well.index(PlateFormat::Plate96) + 1)
}

/// Trailing number of a plate name such as `pcr_plate_3`.
pub fn plate_number(name: &str) -> Result<usize> {
    name.rsplit('_')
        .next()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| CompileError::InvalidInput(format!("plate name '{name}' has no number")))
}

/// Everything before the trailing `_N` of a plate name.
pub fn plate_prefix(name: &str) -> &str {
    name.rsplit_once('_').map(|(prefix, _)| prefix).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> Well {
        Well::parse(s).unwrap()
    }

    #[test]
    fn test_parse_both_notations() {
        assert_eq!(w("A1"), w("A01"));
        assert_eq!(w("p24"), Well::new(15, 23));
        assert_eq!(w("B03").to_string(), "B3");
        assert_eq!(w("H12").three_char(), "H12");
        assert_eq!(w("C4").three_char(), "C04");
        assert!(Well::parse("Q1").is_err());
        assert!(Well::parse("A0").is_err());
        assert!(Well::parse("A25").is_err());
        assert!(Well::parse("").is_err());
    }

    #[test]
    fn test_stamp_examples() {
        assert_eq!(stamp(w("A1"), 0).unwrap(), w("A1"));
        assert_eq!(stamp(w("A1"), 3).unwrap(), w("B2"));
        assert_eq!(stamp(w("A2"), 0).unwrap(), w("A3"));
        assert_eq!(stamp(w("H12"), 3).unwrap(), w("P24"));
        assert_eq!(stamp(w("B1"), 1).unwrap(), w("C2"));
        assert!(stamp(w("I1"), 0).is_err());
        assert!(stamp(w("A1"), 4).is_err());
    }

    #[test]
    fn test_stamp_unstamp_round_trip() {
        for well in well_column(96, WellOrder::RowMajor, PlateFormat::Plate96) {
            for q in 0..4 {
                let stamped = stamp(well, q).unwrap();
                assert!(stamped.fits(PlateFormat::Plate384));
                assert_eq!(unstamp(stamped).unwrap(), well);
                assert_eq!(quadrant_of(stamped).unwrap(), q);
            }
        }
    }

    #[test]
    fn test_stamp_is_bijection_onto_384() {
        let mut seen = std::collections::HashSet::new();
        for well in well_column(96, WellOrder::RowMajor, PlateFormat::Plate96) {
            for q in 0..4 {
                assert!(seen.insert(stamp(well, q).unwrap()));
            }
        }
        assert_eq!(seen.len(), 384);
    }

    #[test]
    fn test_unstamp_examples() {
        assert_eq!(unstamp(w("A2")).unwrap(), w("A1"));
        assert_eq!(unstamp(w("A3")).unwrap(), w("A2"));
        assert_eq!(unstamp(w("B5")).unwrap(), w("A3"));
        assert_eq!(unstamp(w("C5")).unwrap(), w("B3"));
    }

    #[test]
    fn test_unstamp_oligos_examples() {
        assert_eq!(unstamp_oligos(w("A1")).unwrap(), w("A1"));
        assert_eq!(unstamp_oligos(w("A2")).unwrap(), w("B1"));
        assert_eq!(unstamp_oligos(w("A3")).unwrap(), w("A2"));
        assert_eq!(unstamp_oligos(w("B5")).unwrap(), w("C3"));
        assert_eq!(unstamp_oligos(w("C5")).unwrap(), w("E3"));
    }

    #[test]
    fn test_unstamp_oligos_fills_each_order_plate_once() {
        let wells = well_column(384, WellOrder::RowMajor, PlateFormat::Plate384);
        for block in wells.chunks(96) {
            let unique: std::collections::HashSet<Well> =
                block.iter().map(|x| unstamp_oligos(*x).unwrap()).collect();
            assert_eq!(unique.len(), 96);
        }
    }

    #[test]
    fn test_well_and_plate_columns() {
        let rows = well_column(14, WellOrder::RowMajor, PlateFormat::Plate96);
        assert_eq!(rows[11], w("A12"));
        assert_eq!(rows[12], w("B1"));
        let cols = well_column(10, WellOrder::ColumnMajor, PlateFormat::Plate96);
        assert_eq!(cols[7], w("H1"));
        assert_eq!(cols[8], w("A2"));
        let wrapped = well_column(97, WellOrder::RowMajor, PlateFormat::Plate96);
        assert_eq!(wrapped[96], w("A1"));
        let plates = plate_column(385, "oligos_plate_{}", PlateFormat::Plate384);
        assert_eq!(plates[383], "oligos_plate_1");
        assert_eq!(plates[384], "oligos_plate_2");
    }

    #[test]
    fn test_location_text() {
        let location: Location = "pcr_plate_1#B03".parse().unwrap();
        assert_eq!(location, Location::new("pcr_plate_1", w("B3")));
        assert_eq!(location.to_string(), "pcr_plate_1#B3");
        assert!("pcr_plate_1".parse::<Location>().is_err());
    }

    #[test]
    fn test_biomek_index_and_plate_names() {
        assert_eq!(biomek_index(w("A1")).unwrap(), 1);
        assert_eq!(biomek_index(w("B1")).unwrap(), 13);
        assert_eq!(biomek_index(w("H12")).unwrap(), 96);
        assert!(biomek_index(w("I1")).is_err());
        assert_eq!(plate_number("pcr_plate_12").unwrap(), 12);
        assert!(plate_number("water").is_err());
        assert_eq!(plate_prefix("pcr_plate_12"), "pcr_plate");
        assert_eq!(index_to_well(24, PlateFormat::Plate384), w("B1"));
    }
}
