use chart_model::{ChangeSet, NoteEditResult, SegmentEditResult, SegmentValue};
use serde::{Deserialize, Serialize};

use crate::error::ApplyError;
use crate::history::{Direction, Undoable};
use crate::simfile::{ChartId, Simfile, TempoTarget};

/// Recorded edit. Each variant carries the delta and the object it was
/// applied to; targets are resolved before recording, so replay never
/// depends on which chart is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditAction {
    Segments {
        target: TempoTarget,
        result: SegmentEditResult,
    },
    Modify {
        target: TempoTarget,
        changes: ChangeSet<SegmentValue>,
    },
    Notes {
        chart: ChartId,
        result: NoteEditResult,
    },
    Offset {
        target: TempoTarget,
        before: f64,
        after: f64,
    },
}

impl Undoable for EditAction {
    type Target = Simfile;
    type Error = ApplyError;

    fn apply(&self, simfile: &mut Simfile, direction: Direction) -> Result<(), ApplyError> {
        match self {
            EditAction::Segments { target, result } => {
                let tempo = simfile.target_tempo_mut(*target)?;
                match direction {
                    Direction::Undo => tempo.apply_segments(&result.inverse())?,
                    Direction::Redo => tempo.apply_segments(result)?,
                }
            }
            EditAction::Modify { target, changes } => {
                let tempo = simfile.target_tempo_mut(*target)?;
                match direction {
                    Direction::Undo => tempo.undo_changes(changes)?,
                    Direction::Redo => tempo.reapply_changes(changes)?,
                }
            }
            EditAction::Notes { chart, result } => {
                let chart = simfile.chart_mut(*chart)?;
                match direction {
                    Direction::Undo => chart.apply_notes(&result.inverse())?,
                    Direction::Redo => chart.apply_notes(result)?,
                }
            }
            EditAction::Offset {
                target,
                before,
                after,
            } => {
                let tempo = simfile.target_tempo_mut(*target)?;
                let (expected, value) = match direction {
                    Direction::Undo => (*after, *before),
                    Direction::Redo => (*before, *after),
                };
                if tempo.offset() != expected {
                    return Err(ApplyError::StaleOffset {
                        expected,
                        found: tempo.offset(),
                    });
                }
                tempo.set_offset(value);
            }
        }
        Ok(())
    }

    fn description(&self) -> String {
        match self {
            EditAction::Segments { result, .. } => result.description(),
            EditAction::Modify { changes, .. } => {
                let ty = changes.first().map(|c| c.before.value.segment_type());
                match ty {
                    Some(ty) => format!("edited {} at {} rows", ty.plural(), changes.len()),
                    None => "no changes".to_string(),
                }
            }
            EditAction::Notes { result, .. } => result.description(),
            EditAction::Offset { before, after, .. } => {
                format!("offset {before:.3}s -> {after:.3}s")
            }
        }
    }
}
