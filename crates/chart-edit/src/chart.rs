use chart_model::{EditError, NoteEditResult, NoteList};

use crate::tempo::Tempo;

/// One playable chart. A chart with its own tempo uses split timing;
/// otherwise it follows the song tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub description: String,
    notes: NoteList,
    tempo: Option<Tempo>,
}

impl Chart {
    pub fn new(description: impl Into<String>, num_columns: u8) -> Self {
        Self {
            description: description.into(),
            notes: NoteList::new(num_columns),
            tempo: None,
        }
    }

    pub fn with_notes(mut self, notes: NoteList) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_tempo(mut self, tempo: Tempo) -> Self {
        self.tempo = Some(tempo);
        self
    }

    pub fn num_columns(&self) -> u8 {
        self.notes.num_columns()
    }

    pub fn notes(&self) -> &NoteList {
        &self.notes
    }

    pub fn has_own_tempo(&self) -> bool {
        self.tempo.is_some()
    }

    pub fn tempo(&self) -> Option<&Tempo> {
        self.tempo.as_ref()
    }

    pub(crate) fn tempo_mut(&mut self) -> Option<&mut Tempo> {
        self.tempo.as_mut()
    }

    pub fn apply_notes(&mut self, result: &NoteEditResult) -> Result<(), EditError> {
        self.notes.apply(result)
    }
}
