use std::fmt;

use serde::{Deserialize, Serialize};

use crate::row::{ROWS_PER_MEASURE, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum NoteType {
    Step = 0,
    Mine = 1,
    Roll = 2,
    Lift = 3,
    Fake = 4,
}

impl NoteType {
    pub const ALL: [NoteType; 5] = [Self::Step, Self::Mine, Self::Roll, Self::Lift, Self::Fake];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Whether a note of this type can span more than one row.
    pub fn can_hold(self) -> bool {
        matches!(self, Self::Step | Self::Roll)
    }
}

/// Quantizations in divisions per measure, coarsest first.
const QUANTS: [i32; 10] = [4, 8, 12, 16, 24, 32, 48, 64, 96, 192];

/// The coarsest standard quantization (divisions per measure) that has a
/// line on `row`.
pub fn quant_for_row(row: Row) -> u8 {
    let pos = row.rem_euclid(ROWS_PER_MEASURE);
    for q in QUANTS {
        if (pos * q) % ROWS_PER_MEASURE == 0 {
            return q as u8;
        }
    }
    192
}

/// A placed note. A step with `end_row > row` is a hold; a roll always spans
/// more than one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub row: Row,
    pub end_row: Row,
    pub col: u8,
    pub player: u8,
    pub kind: NoteType,
    pub quant: u8,
}

impl Note {
    fn new(row: Row, end_row: Row, col: u8, kind: NoteType) -> Self {
        Self {
            row,
            end_row,
            col,
            player: 0,
            kind,
            quant: quant_for_row(row),
        }
    }

    pub fn step(row: Row, col: u8) -> Self {
        Self::new(row, row, col, NoteType::Step)
    }

    pub fn hold(row: Row, end_row: Row, col: u8) -> Self {
        Self::new(row, end_row, col, NoteType::Step)
    }

    pub fn roll(row: Row, end_row: Row, col: u8) -> Self {
        Self::new(row, end_row, col, NoteType::Roll)
    }

    pub fn mine(row: Row, col: u8) -> Self {
        Self::new(row, row, col, NoteType::Mine)
    }

    pub fn lift(row: Row, col: u8) -> Self {
        Self::new(row, row, col, NoteType::Lift)
    }

    pub fn fake(row: Row, col: u8) -> Self {
        Self::new(row, row, col, NoteType::Fake)
    }

    pub fn with_player(mut self, player: u8) -> Self {
        self.player = player;
        self
    }

    pub fn is_hold(&self) -> bool {
        self.end_row > self.row
    }

    /// Identity within a note list.
    pub fn key(&self) -> (Row, u8) {
        (self.row, self.col)
    }

    /// Same note cut or extended to `[row, end_row]`, keeping its type valid.
    pub fn with_span(&self, row: Row, end_row: Row) -> Self {
        Self {
            row,
            end_row,
            quant: quant_for_row(row),
            ..*self
        }
        .normalized()
    }

    /// Canonical form: non-holdable types are zero length, end rows never
    /// precede the start, a zero-length roll becomes a step and a missing
    /// quantization is derived from the row.
    pub fn normalized(mut self) -> Self {
        if !self.kind.can_hold() || self.end_row < self.row {
            self.end_row = self.row;
        }
        if self.kind == NoteType::Roll && self.end_row == self.row {
            self.kind = NoteType::Step;
        }
        if self.quant == 0 {
            self.quant = quant_for_row(self.row);
        }
        self
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.kind, self.is_hold()) {
            (NoteType::Step, true) => "hold",
            (NoteType::Step, false) => "step",
            (NoteType::Mine, _) => "mine",
            (NoteType::Roll, _) => "roll",
            (NoteType::Lift, _) => "lift",
            (NoteType::Fake, _) => "fake",
        };
        if self.is_hold() {
            write!(f, "{kind} {}-{} col {}", self.row, self.end_row, self.col)
        } else {
            write!(f, "{kind} {} col {}", self.row, self.col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_from_row() {
        assert_eq!(quant_for_row(0), 4);
        assert_eq!(quant_for_row(48), 4);
        assert_eq!(quant_for_row(24), 8);
        assert_eq!(quant_for_row(16), 12);
        assert_eq!(quant_for_row(12), 16);
        assert_eq!(quant_for_row(8), 24);
        assert_eq!(quant_for_row(1), 192);
        assert_eq!(quant_for_row(192 + 24), 8);
    }

    #[test]
    fn normalization() {
        let mine = Note {
            end_row: 96,
            ..Note::mine(48, 0)
        };
        assert_eq!(mine.normalized().end_row, 48);

        let flat_roll = Note::roll(48, 48, 1).normalized();
        assert_eq!(flat_roll.kind, NoteType::Step);

        let backwards = Note::hold(96, 48, 2).normalized();
        assert_eq!(backwards.end_row, 96);
        assert!(!backwards.is_hold());

        let unquantized = Note {
            quant: 0,
            ..Note::step(24, 0)
        };
        assert_eq!(unquantized.normalized().quant, 8);
    }

    #[test]
    fn clipping_a_roll_to_nothing_makes_a_step() {
        let roll = Note::roll(0, 96, 0);
        let clipped = roll.with_span(0, 0);
        assert_eq!(clipped.kind, NoteType::Step);
        assert!(!clipped.is_hold());
    }

    #[test]
    fn display() {
        assert_eq!(Note::hold(0, 48, 2).to_string(), "hold 0-48 col 2");
        assert_eq!(Note::mine(12, 1).to_string(), "mine 12 col 1");
    }
}
