use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EditError};
use crate::row::Row;
use crate::segment::{
    BpmChange, Combo, Delay, Fake, Label, Scroll, Segment, SegmentKind, SegmentType,
    SegmentValue, Speed, Stop, TickCount, TimeSignature, Warp,
};
use crate::stream::{Decoded, Reader, RowMode, Writer};
use crate::track::{ChangeSet, SegmentChange, SegmentTrack};

/// Generic callback over every track of a group.
pub trait TrackVisitor {
    fn visit<T: SegmentKind>(&mut self, track: &SegmentTrack<T>);
}

pub trait TrackVisitorMut {
    fn visit<T: SegmentKind>(&mut self, track: &mut SegmentTrack<T>);
}

/// One track per segment type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentGroup {
    pub(crate) bpms: SegmentTrack<BpmChange>,
    pub(crate) stops: SegmentTrack<Stop>,
    pub(crate) delays: SegmentTrack<Delay>,
    pub(crate) warps: SegmentTrack<Warp>,
    pub(crate) time_signatures: SegmentTrack<TimeSignature>,
    pub(crate) tick_counts: SegmentTrack<TickCount>,
    pub(crate) combos: SegmentTrack<Combo>,
    pub(crate) speeds: SegmentTrack<Speed>,
    pub(crate) scrolls: SegmentTrack<Scroll>,
    pub(crate) fakes: SegmentTrack<Fake>,
    pub(crate) labels: SegmentTrack<Label>,
}

/// Type-erased segments sorted by (type, row), at most one per type and row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSet {
    segments: Vec<Segment>,
}

fn sort_key(segment: &Segment) -> (SegmentType, Row) {
    (segment.segment_type(), segment.row)
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a segment, replacing one of the same type at the same row.
    pub fn insert(&mut self, segment: Segment) {
        let key = sort_key(&segment);
        match self.segments.binary_search_by_key(&key, sort_key) {
            Ok(i) => self.segments[i] = segment,
            Err(i) => self.segments.insert(i, segment),
        }
    }

    pub fn with(mut self, row: Row, value: impl SegmentKind) -> Self {
        self.insert(Segment::new(row, value));
        self
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Segments of one type, as typed `(row, value)` pairs.
    pub fn of_type<T: SegmentKind>(&self) -> Vec<(Row, T)> {
        self.segments
            .iter()
            .filter_map(|s| T::from_value(&s.value).map(|v| (s.row, v.clone())))
            .collect()
    }

    pub fn contains_type(&self, ty: SegmentType) -> bool {
        self.segments.iter().any(|s| s.segment_type() == ty)
    }

    pub fn touches_timing(&self) -> bool {
        self.segments.iter().any(|s| s.segment_type().affects_timing())
    }

    /// Smallest row in the set.
    pub fn first_row(&self) -> Option<Row> {
        self.segments.iter().map(|s| s.row).min()
    }

    /// Summary such as "2 BPM changes, 1 stop".
    pub fn description(&self) -> String {
        let counts = SegmentType::ALL.map(|ty| {
            let n = self.segments.iter().filter(|s| s.segment_type() == ty).count();
            (ty, n)
        });
        describe_counts(&counts)
    }

    pub fn encode(&self, writer: &mut Writer, mode: &RowMode<'_>) {
        for ty in SegmentType::ALL {
            let start = self.segments.partition_point(|s| s.segment_type() < ty);
            let end = self.segments.partition_point(|s| s.segment_type() <= ty);
            let run = &self.segments[start..end];
            if run.is_empty() {
                continue;
            }
            writer.write_varint(run.len() as u32);
            writer.write_u8(ty.tag());
            for segment in run {
                mode.write_row(writer, segment.row);
                segment.value.encode(writer);
            }
        }
        writer.write_varint(0);
    }

    /// Decodes a segment stream. Entries read before an error are kept; an
    /// unknown type tag abandons the rest of the stream.
    pub fn decode(reader: &mut Reader<'_>, mode: &RowMode<'_>) -> Decoded<SegmentSet> {
        let mut set = SegmentSet::new();
        let error = decode_runs(reader, mode, &mut set).err();
        if let Some(e) = &error {
            debug!("segment stream failed at byte {}: {e}", reader.position());
        }
        Decoded { value: set, error }
    }
}

fn decode_runs(
    reader: &mut Reader<'_>,
    mode: &RowMode<'_>,
    set: &mut SegmentSet,
) -> Result<(), DecodeError> {
    loop {
        // each entry holds at least one row byte plus one payload byte
        let count = reader.read_count(mode.min_row_size() + 1)?;
        if count == 0 {
            return Ok(());
        }
        let tag = reader.read_u8()?;
        let Some(ty) = SegmentType::from_tag(tag) else {
            return Err(reader.unknown_tag(tag));
        };
        for _ in 0..count {
            let row = mode.read_row(reader)?;
            let value = SegmentValue::decode(ty, reader)?;
            set.insert(Segment { row, value });
        }
    }
}

impl FromIterator<Segment> for SegmentSet {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        let mut set = SegmentSet::new();
        for segment in iter {
            set.insert(segment);
        }
        set
    }
}

fn describe_counts(counts: &[(SegmentType, usize)]) -> String {
    let parts: Vec<String> = counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(ty, n)| format!("{n} {}", ty.noun(*n)))
        .collect();
    if parts.is_empty() {
        "no segments".to_string()
    } else {
        parts.join(", ")
    }
}

/// Proposed edit: segments the caller wants present and segments it wants gone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentEdit {
    pub add: SegmentSet,
    pub remove: SegmentSet,
}

/// Concrete delta that takes a group from one state to another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentEditResult {
    pub add: SegmentSet,
    pub remove: SegmentSet,
}

impl SegmentEditResult {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn inverse(&self) -> Self {
        Self {
            add: self.remove.clone(),
            remove: self.add.clone(),
        }
    }

    pub fn touches_timing(&self) -> bool {
        self.add.touches_timing() || self.remove.touches_timing()
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

struct Planner<'a> {
    edit: &'a SegmentEdit,
    clear_region: bool,
    result: SegmentEditResult,
}

impl TrackVisitor for Planner<'_> {
    fn visit<T: SegmentKind>(&mut self, track: &SegmentTrack<T>) {
        let add = self.edit.add.of_type::<T>();
        let remove = self.edit.remove.of_type::<T>();
        if add.is_empty() && remove.is_empty() {
            return;
        }
        let (to_add, to_remove) = track.plan_edit(&add, &remove, self.clear_region);
        for (row, value) in to_add {
            self.result.add.insert(Segment::new(row, value));
        }
        for (row, value) in to_remove {
            self.result.remove.insert(Segment::new(row, value));
        }
    }
}

struct Applier<'a> {
    result: &'a SegmentEditResult,
    error: Option<EditError>,
}

impl TrackVisitorMut for Applier<'_> {
    fn visit<T: SegmentKind>(&mut self, track: &mut SegmentTrack<T>) {
        if self.error.is_some() {
            return;
        }
        let add = self.result.add.of_type::<T>();
        let remove = self.result.remove.of_type::<T>();
        if let Err(e) = track.apply_delta(&add, &remove) {
            self.error = Some(e);
        }
    }
}

struct Sanitizer<'a> {
    owner: &'a str,
    dropped: usize,
}

impl TrackVisitorMut for Sanitizer<'_> {
    fn visit<T: SegmentKind>(&mut self, track: &mut SegmentTrack<T>) {
        self.dropped += track.sanitize(self.owner);
    }
}

// `None` collects every row.
struct Collector<'a> {
    range: Option<(Row, Row)>,
    set: &'a mut SegmentSet,
}

impl TrackVisitor for Collector<'_> {
    fn visit<T: SegmentKind>(&mut self, track: &SegmentTrack<T>) {
        let entries = match self.range {
            Some((begin, end)) => track.range(begin, end),
            None => track.entries(),
        };
        for (row, value) in entries {
            self.set.insert(Segment::new(*row, value.clone()));
        }
    }
}

impl SegmentGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a group from arbitrary segments and sanitizes every track.
    pub fn from_set(set: &SegmentSet, owner: &str) -> Self {
        let mut group = SegmentGroup {
            bpms: SegmentTrack::from_raw(set.of_type()),
            stops: SegmentTrack::from_raw(set.of_type()),
            delays: SegmentTrack::from_raw(set.of_type()),
            warps: SegmentTrack::from_raw(set.of_type()),
            time_signatures: SegmentTrack::from_raw(set.of_type()),
            tick_counts: SegmentTrack::from_raw(set.of_type()),
            combos: SegmentTrack::from_raw(set.of_type()),
            speeds: SegmentTrack::from_raw(set.of_type()),
            scrolls: SegmentTrack::from_raw(set.of_type()),
            fakes: SegmentTrack::from_raw(set.of_type()),
            labels: SegmentTrack::from_raw(set.of_type()),
        };
        group.sanitize(owner);
        group
    }

    pub fn track<T: SegmentKind>(&self) -> &SegmentTrack<T> {
        T::track(self)
    }

    pub fn bpms(&self) -> &SegmentTrack<BpmChange> {
        &self.bpms
    }

    pub fn stops(&self) -> &SegmentTrack<Stop> {
        &self.stops
    }

    pub fn delays(&self) -> &SegmentTrack<Delay> {
        &self.delays
    }

    pub fn warps(&self) -> &SegmentTrack<Warp> {
        &self.warps
    }

    pub fn visit<V: TrackVisitor>(&self, visitor: &mut V) {
        visitor.visit(&self.bpms);
        visitor.visit(&self.stops);
        visitor.visit(&self.delays);
        visitor.visit(&self.warps);
        visitor.visit(&self.time_signatures);
        visitor.visit(&self.tick_counts);
        visitor.visit(&self.combos);
        visitor.visit(&self.speeds);
        visitor.visit(&self.scrolls);
        visitor.visit(&self.fakes);
        visitor.visit(&self.labels);
    }

    fn visit_mut<V: TrackVisitorMut>(&mut self, visitor: &mut V) {
        visitor.visit(&mut self.bpms);
        visitor.visit(&mut self.stops);
        visitor.visit(&mut self.delays);
        visitor.visit(&mut self.warps);
        visitor.visit(&mut self.time_signatures);
        visitor.visit(&mut self.tick_counts);
        visitor.visit(&mut self.combos);
        visitor.visit(&mut self.speeds);
        visitor.visit(&mut self.scrolls);
        visitor.visit(&mut self.fakes);
        visitor.visit(&mut self.labels);
    }

    /// Number of segments of each type, in tag order.
    pub fn counts(&self) -> [(SegmentType, usize); SegmentType::COUNT] {
        SegmentType::ALL.map(|ty| (ty, self.len_of(ty)))
    }

    pub fn len_of(&self, ty: SegmentType) -> usize {
        match ty {
            SegmentType::Bpm => self.bpms.len(),
            SegmentType::Stop => self.stops.len(),
            SegmentType::Delay => self.delays.len(),
            SegmentType::Warp => self.warps.len(),
            SegmentType::TimeSignature => self.time_signatures.len(),
            SegmentType::TickCount => self.tick_counts.len(),
            SegmentType::Combo => self.combos.len(),
            SegmentType::Speed => self.speeds.len(),
            SegmentType::Scroll => self.scrolls.len(),
            SegmentType::Fake => self.fakes.len(),
            SegmentType::Label => self.labels.len(),
        }
    }

    /// Summary such as "2 BPM changes, 1 stop".
    pub fn description(&self) -> String {
        describe_counts(&self.counts())
    }

    /// Every stored segment with `begin <= row < end`.
    pub fn collect_range(&self, begin: Row, end: Row) -> SegmentSet {
        let mut set = SegmentSet::new();
        self.visit(&mut Collector {
            range: Some((begin, end)),
            set: &mut set,
        });
        set
    }

    pub fn to_set(&self) -> SegmentSet {
        let mut set = SegmentSet::new();
        self.visit(&mut Collector {
            range: None,
            set: &mut set,
        });
        set
    }

    /// Diffs a proposed edit against the current state.
    ///
    /// Removals only apply to segments that match exactly; the persistent
    /// row-0 segments are never removed. With `clear_region`, every stored
    /// segment of a type between the lowest and highest added row of that
    /// type is removed first. The result holds only the additions and
    /// removals that change something.
    pub fn prepare_edit(&self, edit: &SegmentEdit, clear_region: bool) -> SegmentEditResult {
        let mut planner = Planner {
            edit,
            clear_region,
            result: SegmentEditResult::default(),
        };
        self.visit(&mut planner);
        planner.result
    }

    /// Applies a delta atomically. On error the group is unchanged.
    pub fn apply(&mut self, result: &SegmentEditResult) -> Result<(), EditError> {
        if result.is_empty() {
            return Ok(());
        }
        let mut next = self.clone();
        let mut applier = Applier {
            result,
            error: None,
        };
        next.visit_mut(&mut applier);
        match applier.error {
            Some(e) => Err(e),
            None => {
                *self = next;
                Ok(())
            }
        }
    }

    /// Typed modify on one track; the change set comes back type-erased.
    pub fn modify<T: SegmentKind>(
        &mut self,
        edits: impl IntoIterator<Item = (Row, Option<T>)>,
    ) -> ChangeSet<SegmentValue> {
        T::track_mut(self)
            .modify(edits)
            .into_iter()
            .map(SegmentChange::erase)
            .collect()
    }

    pub fn undo(&mut self, changes: &[SegmentChange<SegmentValue>]) -> Result<(), EditError> {
        self.replay(changes, true)
    }

    pub fn reapply(&mut self, changes: &[SegmentChange<SegmentValue>]) -> Result<(), EditError> {
        self.replay(changes, false)
    }

    fn replay(
        &mut self,
        changes: &[SegmentChange<SegmentValue>],
        undo: bool,
    ) -> Result<(), EditError> {
        let Some(first) = changes.first() else {
            return Ok(());
        };
        match first.before.value.segment_type() {
            SegmentType::Bpm => replay_typed(&mut self.bpms, changes, undo),
            SegmentType::Stop => replay_typed(&mut self.stops, changes, undo),
            SegmentType::Delay => replay_typed(&mut self.delays, changes, undo),
            SegmentType::Warp => replay_typed(&mut self.warps, changes, undo),
            SegmentType::TimeSignature => replay_typed(&mut self.time_signatures, changes, undo),
            SegmentType::TickCount => replay_typed(&mut self.tick_counts, changes, undo),
            SegmentType::Combo => replay_typed(&mut self.combos, changes, undo),
            SegmentType::Speed => replay_typed(&mut self.speeds, changes, undo),
            SegmentType::Scroll => replay_typed(&mut self.scrolls, changes, undo),
            SegmentType::Fake => replay_typed(&mut self.fakes, changes, undo),
            SegmentType::Label => replay_typed(&mut self.labels, changes, undo),
        }
    }

    /// Drops entries that break track invariants, logging each one against
    /// `owner`. Returns the number dropped.
    pub fn sanitize(&mut self, owner: &str) -> usize {
        let mut sanitizer = Sanitizer { owner, dropped: 0 };
        self.visit_mut(&mut sanitizer);
        sanitizer.dropped
    }

    pub fn encode(&self, writer: &mut Writer, mode: &RowMode<'_>) {
        self.to_set().encode(writer, mode);
    }

    /// Decodes a group stream, keeping whatever was read before an error.
    /// The result is always sanitized.
    pub fn decode(reader: &mut Reader<'_>, mode: &RowMode<'_>, owner: &str) -> Decoded<Self> {
        SegmentSet::decode(reader, mode).map(|set| Self::from_set(&set, owner))
    }
}

fn replay_typed<T: SegmentKind>(
    track: &mut SegmentTrack<T>,
    changes: &[SegmentChange<SegmentValue>],
    undo: bool,
) -> Result<(), EditError> {
    let mut typed = Vec::with_capacity(changes.len());
    for change in changes {
        match change.downcast::<T>() {
            Some(c) => typed.push(c),
            None => {
                return Err(EditError::MissingSegment {
                    kind: T::TYPE.singular(),
                    row: change.row,
                });
            }
        }
    }
    if undo {
        track.undo(&typed)
    } else {
        track.reapply(&typed)
    }
}
