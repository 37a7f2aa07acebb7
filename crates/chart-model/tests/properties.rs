use chart_model::{
    BpmChange, Label, Note, NoteList, NoteSet, Reader, Row, RowMode, SegmentEdit, SegmentGroup,
    SegmentSet, SegmentTrack, Stop, Warp, Writer,
};
use proptest::prelude::*;

fn bpm_value() -> impl Strategy<Value = Option<BpmChange>> {
    prop_oneof![
        1 => Just(None),
        4 => prop::sample::select(vec![90.0, 120.0, 150.0, 200.0]).prop_map(|b| Some(BpmChange::new(b))),
    ]
}

fn bpm_edits() -> impl Strategy<Value = Vec<Vec<(Row, Option<BpmChange>)>>> {
    prop::collection::vec(
        prop::collection::vec((0..8i32, bpm_value()).prop_map(|(r, v)| (r * 24, v)), 1..4),
        0..12,
    )
}

fn build_track(edits: &[Vec<(Row, Option<BpmChange>)>]) -> SegmentTrack<BpmChange> {
    let mut track = SegmentTrack::new();
    for batch in edits {
        track.modify(batch.iter().cloned());
    }
    track
}

fn segment_set() -> impl Strategy<Value = SegmentSet> {
    let entry = prop_oneof![
        (0..64i32, 60.0..300.0f64).prop_map(|(r, b)| (r * 12, 0u8, b, String::new())),
        (0..64i32, 0.0..3.0f64).prop_map(|(r, s)| (r * 12, 1u8, s, String::new())),
        (0..64i32, 1..48i32).prop_map(|(r, n)| (r * 12, 3u8, n as f64, String::new())),
        (0..64i32, "[a-z]{1,8}").prop_map(|(r, t)| (r * 12, 10u8, 0.0, t)),
    ];
    prop::collection::vec(entry, 0..24).prop_map(|entries| {
        let mut set = SegmentSet::new();
        for (row, kind, value, text) in entries {
            set = match kind {
                0 => set.with(row, BpmChange::new(value)),
                1 => set.with(row, Stop::new(value)),
                3 => set.with(row, Warp::new(value as i32)),
                _ => set.with(row, Label::new(text)),
            };
        }
        set
    })
}

fn note_set() -> impl Strategy<Value = NoteSet> {
    let note = (0..32i32, 0..4u8, 0..3u8, 0..4i32).prop_map(|(r, col, kind, len)| {
        let row = r * 12;
        match kind {
            0 => Note::step(row, col),
            1 => Note::hold(row, row + len * 12, col),
            _ => Note::mine(row, col),
        }
    });
    prop::collection::vec(note, 0..24).prop_map(|notes| notes.into_iter().collect())
}

proptest! {
    #[test]
    fn row_zero_floor_survives_any_history(edits in bpm_edits()) {
        let track = build_track(&edits);
        prop_assert!(track.get_exact(0).is_some());
        prop_assert!(track.get(0).bpm > 0.0);
    }

    #[test]
    fn undo_then_reapply_is_exact(
        history in bpm_edits(),
        batch in prop::collection::vec((0..8i32, bpm_value()).prop_map(|(r, v)| (r * 24, v)), 1..6),
    ) {
        let mut track = build_track(&history);
        let before = track.clone();
        let changes = track.modify(batch);
        let after = track.clone();

        track.undo(&changes).unwrap();
        prop_assert_eq!(&track, &before);
        track.reapply(&changes).unwrap();
        prop_assert_eq!(&track, &after);
    }

    #[test]
    fn setting_the_effective_value_is_a_noop(history in bpm_edits(), row in 0..200i32) {
        let mut track = build_track(&history);
        let current = track.get(row);
        let changes = track.modify([(row, Some(current))]);
        prop_assert!(changes.is_empty());
    }

    #[test]
    fn group_round_trips_through_stream(set in segment_set()) {
        let group = SegmentGroup::from_set(&set, "prop");
        let mut w = Writer::new();
        group.encode(&mut w, &RowMode::RAW);
        let mut r = Reader::new(w.as_bytes());
        let decoded = SegmentGroup::decode(&mut r, &RowMode::RAW, "prop");
        prop_assert!(decoded.is_complete());
        prop_assert_eq!(decoded.value, group);
    }

    #[test]
    fn note_list_round_trips_through_stream(set in note_set()) {
        let list = NoteList::from_set(4, &set, "prop");
        let mut w = Writer::new();
        list.encode(&mut w, &RowMode::RAW);
        let mut r = Reader::new(w.as_bytes());
        let decoded = NoteList::decode(&mut r, &RowMode::RAW, 4, "prop");
        prop_assert!(decoded.is_complete());
        prop_assert_eq!(decoded.value, list);
    }

    #[test]
    fn clear_region_leaves_only_the_added_stops(existing in segment_set(), adds in segment_set()) {
        let mut group = SegmentGroup::from_set(&existing, "prop");
        let add: SegmentSet = adds
            .of_type::<Stop>()
            .into_iter()
            .filter(|(_, s)| s.seconds > 0.0)
            .fold(SegmentSet::new(), |set, (row, stop)| set.with(row, stop));
        let rows: Vec<Row> = add.iter().map(|s| s.row).collect();
        let edit = SegmentEdit { add: add.clone(), remove: SegmentSet::new() };

        let result = group.prepare_edit(&edit, true);
        group.apply(&result).unwrap();

        if let (Some(lo), Some(hi)) = (rows.iter().min(), rows.iter().max()) {
            let inside: Vec<(Row, Stop)> = group
                .stops()
                .iter()
                .filter(|(r, _)| r >= lo && r <= hi)
                .map(|(r, s)| (r, *s))
                .collect();
            prop_assert_eq!(inside, add.of_type::<Stop>());
        }
        prop_assert!(group.prepare_edit(&edit, true).is_empty());
    }

    #[test]
    fn note_edit_inverse_restores_list(existing in note_set(), adds in note_set()) {
        let list = NoteList::from_set(4, &existing, "prop");
        let edit = chart_model::NoteEdit { add: adds, remove: NoteSet::new() };
        let result = list.prepare_edit(&edit, true);
        let mut applied = list.clone();
        applied.apply(&result).unwrap();
        applied.apply(&result.inverse()).unwrap();
        prop_assert_eq!(applied, list);
    }
}
