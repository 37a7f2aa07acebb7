#![no_main]

use chart_model::{Reader, RowMode, SegmentGroup, Writer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = Reader::new(data);
    let group = SegmentGroup::decode(&mut reader, &RowMode::RAW, "fuzz").value;

    // whatever survived decoding is sanitized and must survive a second pass unchanged
    let mut writer = Writer::new();
    group.encode(&mut writer, &RowMode::RAW);
    let bytes = writer.into_bytes();
    let again = SegmentGroup::decode(&mut Reader::new(&bytes), &RowMode::RAW, "fuzz");
    assert!(again.error.is_none());
    assert_eq!(again.value, group);
});
