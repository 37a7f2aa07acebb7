#![no_main]

use arbitrary::Arbitrary;
use chart_model::{Note, NoteEdit, NoteList, NoteSet, Row};
use libfuzzer_sys::fuzz_target;

const COLUMNS: u8 = 4;

#[derive(Debug, Arbitrary)]
struct FuzzNote {
    row: u8,
    length: u8,
    col: u8,
}

impl FuzzNote {
    fn to_note(&self) -> Note {
        let row = self.row as Row * 12;
        let col = self.col % COLUMNS;
        match self.length % 4 {
            0 => Note::step(row, col),
            n => Note::hold(row, row + n as Row * 12, col),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct Input {
    existing: Vec<FuzzNote>,
    add: Vec<FuzzNote>,
    clear_region: bool,
}

fuzz_target!(|input: Input| {
    let existing: NoteSet = input.existing.iter().map(FuzzNote::to_note).collect();
    let mut list = NoteList::from_set(COLUMNS, &existing, "fuzz");
    let before = list.clone();

    let edit = NoteEdit {
        add: input.add.iter().map(FuzzNote::to_note).collect(),
        remove: NoteSet::new(),
    };
    let result = list.prepare_edit(&edit, input.clear_region);
    list.apply(&result).expect("prepared edit applies");
    list.apply(&result.inverse()).expect("inverse applies");
    assert_eq!(list, before);
});
