#![no_main]

use chart_model::{NoteList, Reader, RowMode, Writer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&columns, rest)) = data.split_first() else {
        return;
    };
    let columns = columns % 16 + 1;
    let notes = NoteList::decode(&mut Reader::new(rest), &RowMode::RAW, columns, "fuzz").value;

    let mut writer = Writer::new();
    notes.encode(&mut writer, &RowMode::RAW);
    let bytes = writer.into_bytes();
    let again = NoteList::decode(&mut Reader::new(&bytes), &RowMode::RAW, columns, "fuzz");
    assert!(again.error.is_none());
    assert_eq!(again.value, notes);
});
