use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chart::Chart;
use crate::error::ApplyError;
use crate::tempo::Tempo;

/// Stable handle to a chart. Slots of removed charts are never reused, so a
/// stale id resolves to nothing rather than to another chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChartId(u32);

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chart #{}", self.0)
    }
}

/// Which tempo an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TempoTarget {
    Song,
    /// The chart's own tempo, or the song tempo if the chart has none.
    Chart(ChartId),
}

/// A song: the shared tempo and its charts.
#[derive(Debug, Clone, Default)]
pub struct Simfile {
    tempo: Tempo,
    charts: Vec<Option<Chart>>,
}

impl Simfile {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            charts: Vec::new(),
        }
    }

    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    pub fn add_chart(&mut self, chart: Chart) -> ChartId {
        let id = ChartId(self.charts.len() as u32);
        self.charts.push(Some(chart));
        id
    }

    pub fn remove_chart(&mut self, id: ChartId) -> Option<Chart> {
        self.charts.get_mut(id.0 as usize).and_then(Option::take)
    }

    pub fn chart(&self, id: ChartId) -> Option<&Chart> {
        self.charts.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn chart_mut(&mut self, id: ChartId) -> Result<&mut Chart, ApplyError> {
        self.charts
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ApplyError::UnknownChart(id))
    }

    pub fn charts(&self) -> impl Iterator<Item = (ChartId, &Chart)> {
        self.charts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ChartId(i as u32), c)))
    }

    /// Tempo that governs a chart: its own under split timing, else the song's.
    pub fn tempo_for(&self, id: ChartId) -> Option<&Tempo> {
        self.chart(id).map(|c| c.tempo().unwrap_or(&self.tempo))
    }

    /// Pins a target to the tempo it currently means, so a recorded edit
    /// keeps applying to the same tempo.
    pub fn resolve(&self, target: TempoTarget) -> Result<TempoTarget, ApplyError> {
        match target {
            TempoTarget::Song => Ok(TempoTarget::Song),
            TempoTarget::Chart(id) => match self.chart(id) {
                None => Err(ApplyError::UnknownChart(id)),
                Some(chart) if chart.has_own_tempo() => Ok(target),
                Some(_) => Ok(TempoTarget::Song),
            },
        }
    }

    pub fn target_tempo(&self, target: TempoTarget) -> Result<&Tempo, ApplyError> {
        match target {
            TempoTarget::Song => Ok(&self.tempo),
            TempoTarget::Chart(id) => self.tempo_for(id).ok_or(ApplyError::UnknownChart(id)),
        }
    }

    pub(crate) fn target_tempo_mut(&mut self, target: TempoTarget) -> Result<&mut Tempo, ApplyError> {
        match target {
            TempoTarget::Song => Ok(&mut self.tempo),
            TempoTarget::Chart(id) => {
                let chart = self
                    .charts
                    .get_mut(id.0 as usize)
                    .and_then(Option::as_mut)
                    .ok_or(ApplyError::UnknownChart(id))?;
                Ok(match chart.tempo_mut() {
                    Some(tempo) => tempo,
                    None => &mut self.tempo,
                })
            }
        }
    }

    /// Name used in log messages about a tempo.
    pub fn owner_name(&self, target: TempoTarget) -> String {
        match target {
            TempoTarget::Song => "song tempo".to_string(),
            TempoTarget::Chart(id) => match self.chart(id) {
                Some(chart) => format!("{} ({id})", chart.description),
                None => id.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_model::{BpmChange, SegmentGroup, SegmentSet};

    #[test]
    fn removed_ids_are_not_reused() {
        let mut simfile = Simfile::default();
        let a = simfile.add_chart(Chart::new("Easy", 4));
        assert!(simfile.remove_chart(a).is_some());
        let b = simfile.add_chart(Chart::new("Hard", 4));
        assert_ne!(a, b);
        assert!(simfile.chart(a).is_none());
        assert_eq!(simfile.charts().count(), 1);
    }

    #[test]
    fn split_timing_resolution() {
        let mut simfile = Simfile::default();
        let shared = simfile.add_chart(Chart::new("Easy", 4));
        let fast = SegmentGroup::from_set(&SegmentSet::new().with(0, BpmChange::new(240.0)), "test");
        let split = simfile.add_chart(Chart::new("Hard", 4).with_tempo(Tempo::new(0.0, fast)));

        assert_eq!(simfile.resolve(TempoTarget::Chart(shared)), Ok(TempoTarget::Song));
        assert_eq!(simfile.resolve(TempoTarget::Chart(split)), Ok(TempoTarget::Chart(split)));
        assert_eq!(simfile.tempo_for(split).map(|t| t.timing().bpm_at(0)), Some(240.0));
        assert_eq!(simfile.tempo_for(shared).map(|t| t.timing().bpm_at(0)), Some(120.0));
    }
}
