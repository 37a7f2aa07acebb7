use chart_model::{
    BpmChange, Note, NoteEdit, NoteList, NoteSet, Reader, Row, RowMode, SegmentEdit,
    SegmentGroup, SegmentSet, SegmentTrack, Stop, TimingData, Writer,
};

fn bpm_rows(group: &SegmentGroup) -> Vec<(Row, f64)> {
    group.bpms().iter().map(|(r, v)| (r, v.bpm)).collect()
}

#[test]
fn test_bpm_persistent_scenario() {
    let mut group = SegmentGroup::new();
    assert_eq!(bpm_rows(&group), vec![(0, 120.0)]);

    let first = group.modify([(100, Some(BpmChange::new(150.0)))]);
    assert_eq!(bpm_rows(&group), vec![(0, 120.0), (100, 150.0)]);
    assert_eq!(first.len(), 1);

    let second = group.modify([(200, Some(BpmChange::new(150.0)))]);
    assert!(second.is_empty(), "setting the effective value is a no-op");

    let third = group.modify([(50, Some(BpmChange::new(150.0)))]);
    assert_eq!(bpm_rows(&group), vec![(0, 120.0), (50, 150.0)]);
    let summary: Vec<(Row, f64, f64)> = third
        .iter()
        .filter_map(|c| c.downcast::<BpmChange>())
        .map(|c| (c.row, c.before.value.bpm, c.after.value.bpm))
        .collect();
    assert_eq!(summary, vec![(50, 120.0, 150.0), (100, 150.0, 150.0)]);

    group.undo(&third).unwrap();
    group.undo(&first).unwrap();
    assert_eq!(bpm_rows(&group), vec![(0, 120.0)]);
}

#[test]
fn test_stop_isolated_scenario() {
    let mut track = SegmentTrack::<Stop>::new();
    let a = track.modify([(100, Some(Stop::new(1.0)))]);
    let b = track.modify([(200, Some(Stop::new(2.0)))]);
    let rows: Vec<(Row, f64)> = track.iter().map(|(r, s)| (r, s.seconds)).collect();
    assert_eq!(rows, vec![(100, 1.0), (200, 2.0)]);
    assert_eq!(a[0].before.value.seconds, 0.0);
    assert_eq!(b[0].after.value.seconds, 2.0);

    track.undo(&b).unwrap();
    track.undo(&a).unwrap();
    assert!(track.is_empty());
}

#[test]
fn test_stop_time_conversion() {
    let set = SegmentSet::new().with(100, Stop::new(1.0));
    let timing = TimingData::new(0.0, &SegmentGroup::from_set(&set, "test"));
    let at_stop = timing.row_to_time(100.0);
    assert!((at_stop - 100.0 * 0.5 / 48.0).abs() < 1e-9);
    for eps in [0.001, 0.5, 12.0] {
        let expected = at_stop + 1.0 + eps * 0.5 / 48.0;
        assert!((timing.row_to_time(100.0 + eps) - expected).abs() < 1e-9);
    }
}

#[test]
fn test_time_paste_across_tempo_change() {
    // copy four beats of notes at 120 BPM and paste them by time into a chart at 240 BPM
    let source_group = SegmentGroup::new();
    let source_timing = TimingData::new(0.0, &source_group);
    let notes: NoteSet = [Note::step(0, 0), Note::step(48, 1), Note::step(96, 2)]
        .into_iter()
        .collect();
    let mut w = Writer::new();
    notes.encode(
        &mut w,
        &RowMode::Time {
            timing: &source_timing,
            base: 0,
        },
    );

    let fast = SegmentGroup::from_set(&SegmentSet::new().with(0, BpmChange::new(240.0)), "fast");
    let fast_timing = TimingData::new(0.0, &fast);
    let mut r = Reader::new(w.as_bytes());
    let pasted = NoteSet::decode(
        &mut r,
        &RowMode::Time {
            timing: &fast_timing,
            base: 192,
        },
    )
    .into_result()
    .unwrap();
    let rows: Vec<Row> = pasted.iter().map(|n| n.row).collect();
    assert_eq!(rows, vec![192, 288, 384]);
}

#[test]
fn test_note_edit_then_undo() {
    let mut list = NoteList::new(4);
    let edit = NoteEdit {
        add: [Note::hold(0, 192, 0), Note::step(48, 1)].into_iter().collect(),
        remove: NoteSet::new(),
    };
    let placed = list.prepare_edit(&edit, true);
    list.apply(&placed).unwrap();
    assert_eq!(list.description(), "1 step, 1 hold");

    let cut = list.prepare_edit(
        &NoteEdit {
            add: NoteSet::new().with(Note::mine(96, 0)),
            remove: NoteSet::new(),
        },
        true,
    );
    list.apply(&cut).unwrap();
    let col0: Vec<(Row, Row)> = list.column(0).map(|n| (n.row, n.end_row)).collect();
    assert_eq!(col0, vec![(0, 96), (96, 96), (97, 192)]);

    list.apply(&cut.inverse()).unwrap();
    list.apply(&placed.inverse()).unwrap();
    assert!(list.is_empty());
}

#[test]
fn test_segment_edit_description() {
    let group = SegmentGroup::new();
    let edit = SegmentEdit {
        add: SegmentSet::new()
            .with(48, BpmChange::new(150.0))
            .with(96, BpmChange::new(180.0))
            .with(96, Stop::new(0.5)),
        remove: SegmentSet::new(),
    };
    let result = group.prepare_edit(&edit, false);
    assert_eq!(result.description(), "added 2 BPM changes, 1 stop");
    assert!(result.touches_timing());
}
