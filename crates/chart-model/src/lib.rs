// Chart timing and note model: segment tracks, timing data, note lists, binary stream codec

mod error;
mod group;
mod note;
mod note_list;
mod row;
mod segment;
pub mod stream;
mod timing;
mod track;

pub use error::{DecodeError, EditError};
pub use group::{
    SegmentEdit, SegmentEditResult, SegmentGroup, SegmentSet, TrackVisitor, TrackVisitorMut,
};
pub use note::{Note, NoteType, quant_for_row};
pub use note_list::{NoteEdit, NoteEditResult, NoteList, NoteSet};
pub use row::{
    DEFAULT_BPM, ROWS_PER_BEAT, ROWS_PER_MEASURE, Row, beat_to_row, row_to_beat,
    seconds_per_row,
};
pub use segment::{
    BpmChange, Combo, Delay, Fake, Label, Scroll, Segment, SegmentKind, SegmentType,
    SegmentValue, Speed, SpeedUnit, Stop, TickCount, TimeSignature, Warp,
};
pub use stream::{Decoded, Reader, RowMode, Writer};
pub use timing::{TimeTracker, TimingData, TimingEvent};
pub use track::{ChangeSet, Revision, SegmentChange, SegmentTrack};
