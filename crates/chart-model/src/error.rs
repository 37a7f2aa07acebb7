use thiserror::Error;

use crate::row::Row;

/// Malformed binary input. Decoding stops at the first error; entries decoded
/// before it are kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("varint does not fit in 32 bits")]
    VarintOverflow,

    #[error("unknown segment type tag {0}")]
    UnknownTag(u8),

    #[error("count {count} exceeds the {remaining} bytes left in the stream")]
    CountOutOfRange { count: u32, remaining: usize },

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid {what} value {value}")]
    InvalidValue { what: &'static str, value: u32 },

    #[error("stream already failed")]
    StreamFailed,
}

/// An edit delta that does not match the live state it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no {kind} at row {row} matches the edit")]
    MissingSegment { kind: &'static str, row: Row },

    #[error("a {kind} already exists at row {row}")]
    SegmentConflict { kind: &'static str, row: Row },

    #[error("the {kind} at row 0 cannot be removed")]
    RowZeroFloor { kind: &'static str },

    #[error("no note at row {row}, column {col} matches the edit")]
    MissingNote { row: Row, col: u8 },

    #[error("note at row {row}, column {col} overlaps another note")]
    NoteConflict { row: Row, col: u8 },

    #[error("column {col} is outside the {num_columns} columns of the note list")]
    ColumnOutOfRange { col: u8, num_columns: u8 },
}
