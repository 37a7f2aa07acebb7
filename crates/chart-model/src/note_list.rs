use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EditError};
use crate::note::{Note, NoteType};
use crate::row::Row;
use crate::stream::{Decoded, Reader, RowMode, Writer};

type NoteKey = (Row, u8);

/// Notes sorted by (row, column), one per key. Not checked for overlaps;
/// used for edit input, deltas and the clipboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSet {
    notes: Vec<Note>,
}

impl NoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a note, replacing one at the same row and column.
    pub fn insert(&mut self, note: Note) {
        match self.notes.binary_search_by_key(&note.key(), Note::key) {
            Ok(i) => self.notes[i] = note,
            Err(i) => self.notes.insert(i, note),
        }
    }

    pub fn with(mut self, note: Note) -> Self {
        self.insert(note);
        self
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    pub fn first_row(&self) -> Option<Row> {
        self.notes.first().map(|n| n.row)
    }

    pub fn description(&self) -> String {
        describe_notes(self.notes.iter())
    }

    pub fn encode(&self, writer: &mut Writer, mode: &RowMode<'_>) {
        writer.write_varint(self.notes.len() as u32);
        for note in &self.notes {
            mode.write_row(writer, note.row);
            mode.write_row(writer, note.end_row);
            writer.write_u8(note.col);
            writer.write_u8(note.player);
            writer.write_u8(note.kind as u8);
            writer.write_u8(note.quant);
        }
    }

    /// Decodes a note stream, keeping the notes read before an error.
    pub fn decode(reader: &mut Reader<'_>, mode: &RowMode<'_>) -> Decoded<NoteSet> {
        let mut set = NoteSet::new();
        let error = decode_notes(reader, mode, &mut set).err();
        if let Some(e) = &error {
            debug!("note stream failed at byte {}: {e}", reader.position());
        }
        Decoded { value: set, error }
    }
}

fn decode_notes(
    reader: &mut Reader<'_>,
    mode: &RowMode<'_>,
    set: &mut NoteSet,
) -> Result<(), DecodeError> {
    let count = reader.read_count(mode.min_row_size() * 2 + 4)?;
    for _ in 0..count {
        let row = mode.read_row(reader)?;
        let end_row = mode.read_row(reader)?;
        let col = reader.read_u8()?;
        let player = reader.read_u8()?;
        let kind_byte = reader.read_u8()?;
        let Some(kind) = NoteType::from_byte(kind_byte) else {
            return Err(reader.invalid("note type", kind_byte as u32));
        };
        let quant = reader.read_u8()?;
        set.insert(Note {
            row,
            end_row,
            col,
            player,
            kind,
            quant,
        });
    }
    Ok(())
}

impl FromIterator<Note> for NoteSet {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        let mut set = NoteSet::new();
        for note in iter {
            set.insert(note);
        }
        set
    }
}

fn describe_notes<'a>(notes: impl Iterator<Item = &'a Note>) -> String {
    const NOUNS: [(&str, &str); 6] = [
        ("step", "steps"),
        ("hold", "holds"),
        ("roll", "rolls"),
        ("mine", "mines"),
        ("lift", "lifts"),
        ("fake", "fakes"),
    ];
    let mut counts = [0usize; 6];
    for note in notes {
        let slot = match note.kind {
            NoteType::Step if note.is_hold() => 1,
            NoteType::Step => 0,
            NoteType::Roll => 2,
            NoteType::Mine => 3,
            NoteType::Lift => 4,
            NoteType::Fake => 5,
        };
        counts[slot] += 1;
    }
    let parts: Vec<String> = counts
        .iter()
        .zip(NOUNS)
        .filter(|(n, _)| **n > 0)
        .map(|(n, (one, many))| format!("{n} {}", if *n == 1 { one } else { many }))
        .collect();
    if parts.is_empty() {
        "no notes".to_string()
    } else {
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEdit {
    pub add: NoteSet,
    pub remove: NoteSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEditResult {
    pub add: NoteSet,
    pub remove: NoteSet,
}

impl NoteEditResult {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn inverse(&self) -> Self {
        Self {
            add: self.remove.clone(),
            remove: self.add.clone(),
        }
    }

    pub fn description(&self) -> String {
        match (self.add.is_empty(), self.remove.is_empty()) {
            (true, true) => "no changes".to_string(),
            (false, true) => format!("added {}", self.add.description()),
            (true, false) => format!("removed {}", self.remove.description()),
            (false, false) => format!(
                "added {}, removed {}",
                self.add.description(),
                self.remove.description()
            ),
        }
    }
}

/// Notes of one chart, sorted by (row, column). Within a column no note
/// starts before the previous one ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteList {
    num_columns: u8,
    notes: Vec<Note>,
}

impl NoteList {
    pub fn new(num_columns: u8) -> Self {
        Self {
            num_columns,
            notes: Vec::new(),
        }
    }

    /// Builds a list from arbitrary notes, sanitizing them.
    pub fn from_set(num_columns: u8, set: &NoteSet, owner: &str) -> Self {
        let mut list = Self {
            num_columns,
            notes: set.notes.clone(),
        };
        list.sanitize(owner);
        list
    }

    pub fn num_columns(&self) -> u8 {
        self.num_columns
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    pub fn get(&self, row: Row, col: u8) -> Option<&Note> {
        self.notes
            .binary_search_by_key(&(row, col), Note::key)
            .ok()
            .map(|i| &self.notes[i])
    }

    pub fn column(&self, col: u8) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |n| n.col == col)
    }

    /// Notes starting at `begin <= row < end`.
    pub fn range(&self, begin: Row, end: Row) -> &[Note] {
        let lo = self.notes.partition_point(|n| n.row < begin);
        let hi = self.notes.partition_point(|n| n.row < end).max(lo);
        &self.notes[lo..hi]
    }

    pub fn to_set(&self) -> NoteSet {
        NoteSet {
            notes: self.notes.clone(),
        }
    }

    pub fn description(&self) -> String {
        describe_notes(self.notes.iter())
    }

    fn accepts(&self, note: &Note) -> bool {
        note.row >= 0 && note.col < self.num_columns
    }

    /// Diffs a proposed edit against the current notes.
    ///
    /// Removals apply only to exact matches. With `clear_region`, the rows
    /// `[first added row, last added end row]` are cleared in every column an
    /// added note uses; holds crossing the region edges are cut and the parts
    /// outside the region are kept. Added notes always win: notes they cover
    /// are removed and a hold running into an added note is cut at its row.
    pub fn prepare_edit(&self, edit: &NoteEdit, clear_region: bool) -> NoteEditResult {
        let mut target: BTreeMap<NoteKey, Note> =
            self.notes.iter().map(|n| (n.key(), *n)).collect();

        for note in edit.remove.iter() {
            if target.get(&note.key()) == Some(note) {
                target.remove(&note.key());
            }
        }

        let adds: Vec<Note> = edit
            .add
            .iter()
            .map(|n| n.normalized())
            .filter(|n| self.accepts(n))
            .collect();

        if clear_region
            && let (Some(begin), Some(last)) = (
                adds.iter().map(|n| n.row).min(),
                adds.iter().map(|n| n.end_row).max(),
            )
        {
            let end = last.saturating_add(1);
            let cols: BTreeSet<u8> = adds.iter().map(|n| n.col).collect();
            clear_region_in(&mut target, begin, end, &cols);
        }

        for add in &adds {
            let covered_end = add.end_row.max(add.row.saturating_add(1));
            let hits: Vec<Note> = target
                .values()
                .filter(|n| n.col == add.col && n.key() != add.key())
                .filter(|n| n.row < covered_end && n.end_row > add.row)
                .copied()
                .collect();
            for note in hits {
                target.remove(&note.key());
                if note.row < add.row {
                    let head = note.with_span(note.row, add.row);
                    target.insert(head.key(), head);
                }
            }
            target.insert(add.key(), *add);
        }

        let mut result = NoteEditResult::default();
        for note in &self.notes {
            if target.get(&note.key()) != Some(note) {
                result.remove.insert(*note);
            }
        }
        for note in target.values() {
            if self.get(note.row, note.col) != Some(note) {
                result.add.insert(*note);
            }
        }
        result
    }

    /// Applies a delta atomically. On error the list is unchanged.
    pub fn apply(&mut self, result: &NoteEditResult) -> Result<(), EditError> {
        if result.is_empty() {
            return Ok(());
        }
        let mut next: BTreeMap<NoteKey, Note> =
            self.notes.iter().map(|n| (n.key(), *n)).collect();
        for note in result.remove.iter() {
            if next.get(&note.key()) != Some(note) {
                return Err(EditError::MissingNote {
                    row: note.row,
                    col: note.col,
                });
            }
            next.remove(&note.key());
        }
        for note in result.add.iter() {
            if note.col >= self.num_columns {
                return Err(EditError::ColumnOutOfRange {
                    col: note.col,
                    num_columns: self.num_columns,
                });
            }
            if note.row < 0 || next.contains_key(&note.key()) {
                return Err(EditError::NoteConflict {
                    row: note.row,
                    col: note.col,
                });
            }
            next.insert(note.key(), *note);
        }

        let mut column_end: HashMap<u8, Row> = HashMap::new();
        for note in next.values() {
            if column_end.get(&note.col).is_some_and(|end| *end > note.row) {
                return Err(EditError::NoteConflict {
                    row: note.row,
                    col: note.col,
                });
            }
            column_end.insert(note.col, note.end_row);
        }

        self.notes = next.into_values().collect();
        Ok(())
    }

    /// Restores the list invariants after a bulk load. Returns the number of
    /// notes dropped.
    pub fn sanitize(&mut self, owner: &str) -> usize {
        let mut notes: Vec<Note> = std::mem::take(&mut self.notes)
            .into_iter()
            .map(Note::normalized)
            .collect();
        let before = notes.len();
        notes.sort_by_key(Note::key);

        let mut kept: Vec<Note> = Vec::with_capacity(notes.len());
        let mut column_end: HashMap<u8, Row> = HashMap::new();
        for note in notes {
            if note.row < 0 {
                warn!("{owner}: dropped note at negative row {}", note.row);
            } else if note.col >= self.num_columns {
                warn!(
                    "{owner}: dropped note in column {} of {}",
                    note.col, self.num_columns
                );
            } else if kept.last().is_some_and(|n| n.key() == note.key()) {
                warn!("{owner}: dropped duplicate {note}");
            } else if column_end.get(&note.col).is_some_and(|end| *end > note.row) {
                warn!("{owner}: dropped overlapping {note}");
            } else {
                column_end.insert(note.col, note.end_row);
                kept.push(note);
            }
        }
        self.notes = kept;
        before.saturating_sub(self.notes.len())
    }

    pub fn encode(&self, writer: &mut Writer, mode: &RowMode<'_>) {
        NoteSet {
            notes: self.notes.clone(),
        }
        .encode(writer, mode);
    }

    /// Decodes a note stream into a sanitized list, keeping whatever was read
    /// before an error.
    pub fn decode(
        reader: &mut Reader<'_>,
        mode: &RowMode<'_>,
        num_columns: u8,
        owner: &str,
    ) -> Decoded<Self> {
        NoteSet::decode(reader, mode).map(|set| Self::from_set(num_columns, &set, owner))
    }
}

// Clears [begin, end) in `cols`, keeping the parts of holds outside it.
fn clear_region_in(
    target: &mut BTreeMap<NoteKey, Note>,
    begin: Row,
    end: Row,
    cols: &BTreeSet<u8>,
) {
    let hits: Vec<Note> = target
        .values()
        .filter(|n| cols.contains(&n.col))
        .filter(|n| (n.row >= begin && n.row < end) || (n.row < begin && n.end_row > begin))
        .copied()
        .collect();
    for note in hits {
        target.remove(&note.key());
        if note.row < begin {
            let head = note.with_span(note.row, begin);
            target.insert(head.key(), head);
        }
        if note.end_row > end {
            let tail = note.with_span(end, note.end_row);
            target.insert(tail.key(), tail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(notes: &[Note]) -> NoteList {
        NoteList::from_set(4, &notes.iter().copied().collect(), "test")
    }

    fn edit(add: &[Note], remove: &[Note]) -> NoteEdit {
        NoteEdit {
            add: add.iter().copied().collect(),
            remove: remove.iter().copied().collect(),
        }
    }

    fn spans(set: &NoteSet) -> Vec<(Row, Row, u8)> {
        set.iter().map(|n| (n.row, n.end_row, n.col)).collect()
    }

    #[test]
    fn description_counts_kinds() {
        let notes = list(&[
            Note::step(0, 0),
            Note::step(0, 1),
            Note::hold(48, 96, 0),
            Note::mine(48, 1),
            Note::mine(96, 1),
        ]);
        assert_eq!(notes.description(), "2 steps, 1 hold, 2 mines");
        assert_eq!(NoteList::new(4).description(), "no notes");
    }

    #[test]
    fn clear_region_clips_straddling_hold() {
        let notes = list(&[Note::hold(0, 96, 0), Note::step(48, 1)]);
        let result = notes.prepare_edit(&edit(&[Note::hold(48, 72, 0)], &[]), true);
        assert_eq!(spans(&result.remove), vec![(0, 96, 0)]);
        assert_eq!(
            spans(&result.add),
            vec![(0, 48, 0), (48, 72, 0), (73, 96, 0)]
        );

        let mut applied = notes.clone();
        applied.apply(&result).unwrap();
        assert_eq!(applied.len(), 4);
        assert_eq!(applied.get(48, 1), Some(&Note::step(48, 1)));
    }

    #[test]
    fn clear_region_keeps_tail_of_hold_starting_inside() {
        let notes = list(&[Note::hold(60, 120, 0)]);
        let result = notes.prepare_edit(
            &edit(&[Note::step(48, 0), Note::step(72, 0)], &[]),
            true,
        );
        assert_eq!(spans(&result.remove), vec![(60, 120, 0)]);
        assert_eq!(
            spans(&result.add),
            vec![(48, 48, 0), (72, 72, 0), (73, 120, 0)]
        );
    }

    #[test]
    fn added_step_cuts_existing_hold() {
        let notes = list(&[Note::hold(0, 96, 2)]);
        let result = notes.prepare_edit(&edit(&[Note::step(48, 2)], &[]), false);
        assert_eq!(spans(&result.add), vec![(0, 48, 2), (48, 48, 2)]);
        assert_eq!(spans(&result.remove), vec![(0, 96, 2)]);
    }

    #[test]
    fn added_hold_removes_covered_notes() {
        let notes = list(&[Note::step(24, 0), Note::step(48, 0), Note::step(96, 0)]);
        let result = notes.prepare_edit(&edit(&[Note::hold(0, 96, 0)], &[]), false);
        assert_eq!(spans(&result.remove), vec![(24, 24, 0), (48, 48, 0)]);
        let mut applied = notes.clone();
        applied.apply(&result).unwrap();
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn noop_edit_is_empty() {
        let notes = list(&[Note::step(0, 0)]);
        let result = notes.prepare_edit(
            &edit(&[Note::step(0, 0)], &[Note::mine(48, 3)]),
            true,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn out_of_range_column_is_ignored() {
        let notes = NoteList::new(4);
        let result = notes.prepare_edit(&edit(&[Note::step(0, 9)], &[]), false);
        assert!(result.is_empty());
    }

    #[test]
    fn apply_is_atomic() {
        let mut notes = list(&[Note::hold(0, 96, 0)]);
        let snapshot = notes.clone();
        let bad = NoteEditResult {
            add: NoteSet::new().with(Note::step(48, 0)),
            remove: NoteSet::new(),
        };
        assert!(matches!(
            notes.apply(&bad),
            Err(EditError::NoteConflict { row: 48, col: 0 })
        ));
        assert_eq!(notes, snapshot);

        let wrong_col = NoteEditResult {
            add: NoteSet::new().with(Note::step(0, 7)),
            remove: NoteSet::new(),
        };
        assert!(matches!(
            notes.apply(&wrong_col),
            Err(EditError::ColumnOutOfRange { col: 7, .. })
        ));
    }

    #[test]
    fn inverse_restores_previous_state() {
        let notes = list(&[Note::hold(0, 96, 0), Note::mine(12, 3)]);
        let result = notes.prepare_edit(&edit(&[Note::roll(24, 48, 0)], &[]), true);
        let mut applied = notes.clone();
        applied.apply(&result).unwrap();
        applied.apply(&result.inverse()).unwrap();
        assert_eq!(applied, notes);
    }

    #[test]
    fn sanitize_drops_bad_notes() {
        let raw: NoteSet = [
            Note::step(0, 0),
            Note::hold(48, 144, 1),
            Note::step(96, 1),
            Note::step(96, 8),
            Note::step(-4, 2),
        ]
        .into_iter()
        .collect();
        let notes = NoteList::from_set(4, &raw, "test");
        assert_eq!(notes.len(), 2);
        assert!(notes.get(96, 1).is_none());
    }

    #[test]
    fn encode_decode_relative_to_base() {
        let notes = list(&[Note::step(192, 0), Note::hold(240, 288, 1)]);
        let mut w = Writer::new();
        notes.encode(&mut w, &RowMode::Rows { base: 192 });
        let mut r = Reader::new(w.as_bytes());
        let pasted = NoteSet::decode(&mut r, &RowMode::Rows { base: 0 });
        assert!(pasted.is_complete());
        assert_eq!(
            spans(&pasted.value),
            vec![(0, 0, 0), (48, 96, 1)]
        );
    }

    #[test]
    fn note_on_last_row_is_added() {
        let notes = list(&[Note::step(0, 0), Note::hold(96, 192, 0)]);
        for clear in [false, true] {
            let result = notes.prepare_edit(&edit(&[Note::step(Row::MAX, 0)], &[]), clear);
            assert_eq!(spans(&result.add), vec![(Row::MAX, Row::MAX, 0)]);
            assert!(result.remove.is_empty());
        }
        let cut = notes.prepare_edit(&edit(&[Note::hold(144, Row::MAX, 0)], &[]), false);
        assert_eq!(spans(&cut.add), vec![(96, 144, 0), (144, Row::MAX, 0)]);
    }

    #[test]
    fn bad_note_type_stops_decoding() {
        let mut w = Writer::new();
        w.write_varint(2);
        for kind in [0u8, 9] {
            RowMode::RAW.write_row(&mut w, 0);
            RowMode::RAW.write_row(&mut w, 0);
            w.write_u8(kind);
            w.write_u8(0);
            w.write_u8(kind);
            w.write_u8(4);
        }
        let mut r = Reader::new(w.as_bytes());
        let decoded = NoteList::decode(&mut r, &RowMode::RAW, 4, "test");
        assert!(matches!(
            decoded.error,
            Some(DecodeError::InvalidValue { value: 9, .. })
        ));
        assert_eq!(decoded.value.len(), 1);
    }
}
