use chart_model::{DecodeError, EditError};
use thiserror::Error;

use crate::simfile::ChartId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("{0} does not exist")]
    UnknownChart(ChartId),

    #[error("offset is {found}s, expected {expected}s")]
    StaleOffset { expected: f64, found: f64 },

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("clipboard data is malformed: {0}")]
    Decode(#[from] DecodeError),
}
