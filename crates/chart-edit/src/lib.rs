// Editing layer: tempo ownership, charts, undo history and the editor entry points

mod action;
mod chart;
mod editor;
mod error;
mod history;
mod simfile;
mod tempo;

pub use action::EditAction;
pub use chart::Chart;
pub use editor::Editor;
pub use error::ApplyError;
pub use history::{Direction, History, Undoable};
pub use simfile::{ChartId, Simfile, TempoTarget};
pub use tempo::Tempo;
