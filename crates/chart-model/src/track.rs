use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::EditError;
use crate::row::Row;
use crate::segment::{SegmentKind, SegmentValue};

/// State of one row before or after a change.
///
/// `value` is the value in effect at the row; `stored` says whether a segment
/// physically exists there. A persistent row without a stored segment still
/// has an effective value (the most recent segment before it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision<T> {
    pub value: T,
    pub stored: bool,
}

impl<T> Revision<T> {
    pub fn stored(value: T) -> Self {
        Self {
            value,
            stored: true,
        }
    }

    pub fn implicit(value: T) -> Self {
        Self {
            value,
            stored: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Revision<U> {
        Revision {
            value: f(self.value),
            stored: self.stored,
        }
    }

    fn stored_value(&self) -> Option<&T> {
        self.stored.then_some(&self.value)
    }
}

/// One row whose stored state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentChange<T> {
    pub row: Row,
    pub before: Revision<T>,
    pub after: Revision<T>,
}

impl<T: SegmentKind> SegmentChange<T> {
    pub fn erase(self) -> SegmentChange<SegmentValue> {
        SegmentChange {
            row: self.row,
            before: self.before.map(T::into_value),
            after: self.after.map(T::into_value),
        }
    }
}

impl SegmentChange<SegmentValue> {
    /// Recovers the typed change, or `None` if either side holds another type.
    pub fn downcast<T: SegmentKind>(&self) -> Option<SegmentChange<T>> {
        Some(SegmentChange {
            row: self.row,
            before: Revision {
                value: T::from_value(&self.before.value)?.clone(),
                stored: self.before.stored,
            },
            after: Revision {
                value: T::from_value(&self.after.value)?.clone(),
                stored: self.after.stored,
            },
        })
    }
}

/// Ordered record of a `modify` call. Undo replays it back to front.
pub type ChangeSet<T> = Vec<SegmentChange<T>>;

/// Row-sorted, row-unique segments of one type.
///
/// Persistent tracks always hold a segment at row 0, so [`get`](Self::get)
/// has an answer for every row.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTrack<T> {
    entries: Vec<(Row, T)>,
}

impl<T: SegmentKind> Default for SegmentTrack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SegmentKind> SegmentTrack<T> {
    pub fn new() -> Self {
        let entries = if T::TYPE.is_persistent() {
            vec![(0, T::default())]
        } else {
            Vec::new()
        };
        Self { entries }
    }

    /// Builds a track from arbitrary entries, sanitizing them.
    pub fn from_entries(entries: impl IntoIterator<Item = (Row, T)>, owner: &str) -> Self {
        let mut track = Self::from_raw(entries.into_iter().collect());
        track.sanitize(owner);
        track
    }

    pub(crate) fn from_raw(entries: Vec<(Row, T)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Row, T)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (Row, &T)> {
        self.entries.iter().map(|(row, value)| (*row, value))
    }

    fn search(&self, row: Row) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&row, |(r, _)| *r)
    }

    pub fn get_exact(&self, row: Row) -> Option<&T> {
        self.search(row).ok().map(|i| &self.entries[i].1)
    }

    /// Greatest stored segment at or before `row`.
    pub fn get_recent(&self, row: Row) -> Option<(Row, &T)> {
        let idx = self.entries.partition_point(|(r, _)| *r <= row);
        idx.checked_sub(1)
            .map(|i| (self.entries[i].0, &self.entries[i].1))
    }

    /// Value in effect at `row`.
    ///
    /// Persistent: the most recent segment (rows before 0 use the row-0
    /// segment). Isolated: the segment at exactly `row`, else the default.
    pub fn get(&self, row: Row) -> T {
        if T::TYPE.is_persistent() {
            self.get_recent(row)
                .map(|(_, v)| v)
                .or_else(|| self.entries.first().map(|(_, v)| v))
                .cloned()
                .unwrap_or_default()
        } else {
            self.get_exact(row).cloned().unwrap_or_default()
        }
    }

    /// Segments with `begin <= row < end`.
    pub fn range(&self, begin: Row, end: Row) -> &[(Row, T)] {
        let lo = self.entries.partition_point(|(r, _)| *r < begin);
        let hi = self.entries.partition_point(|(r, _)| *r < end).max(lo);
        &self.entries[lo..hi]
    }

    fn set_stored(&mut self, row: Row, value: Option<T>) {
        match (self.search(row), value) {
            (Ok(i), Some(v)) => self.entries[i].1 = v,
            (Ok(i), None) => {
                self.entries.remove(i);
            }
            (Err(i), Some(v)) => self.entries.insert(i, (row, v)),
            (Err(_), None) => {}
        }
    }

    /// Sets or clears segments row by row, in ascending row order.
    ///
    /// `None` asks for the row to stop holding a segment: persistent rows fall
    /// back to the previous value (row 0 is kept), isolated rows to the
    /// default. Returns one record per row whose stored state changed;
    /// setting a row to the value already in effect there records nothing.
    pub fn modify(&mut self, edits: impl IntoIterator<Item = (Row, Option<T>)>) -> ChangeSet<T> {
        let edits: BTreeMap<Row, Option<T>> = edits.into_iter().collect();
        let mut changes = Vec::new();
        for (row, value) in edits {
            if row < 0 {
                warn!("ignoring {} at negative row {row}", T::TYPE.singular());
                continue;
            }
            if let Some(v) = &value
                && !v.is_valid()
            {
                warn!("ignoring invalid {} at row {row}: {v}", T::TYPE.singular());
                continue;
            }
            let changed = if T::TYPE.is_persistent() {
                self.modify_persistent(row, value, &mut changes)
            } else {
                self.modify_isolated(row, value, &mut changes)
            };
            if changed && T::TYPE.is_persistent() {
                self.fold_next(row, &mut changes);
            }
        }
        changes
    }

    fn modify_persistent(&mut self, row: Row, value: Option<T>, changes: &mut ChangeSet<T>) -> bool {
        let Some(value) = value else {
            if row == 0 {
                return false;
            }
            let Ok(i) = self.search(row) else {
                return false;
            };
            let (_, old) = self.entries.remove(i);
            let now = self.get(row);
            changes.push(SegmentChange {
                row,
                before: Revision::stored(old),
                after: Revision::implicit(now),
            });
            return true;
        };

        match self.search(row) {
            Ok(i) => {
                if self.entries[i].1 == value {
                    return false;
                }
                let prev = i.checked_sub(1).map(|p| &self.entries[p].1);
                if row != 0 && value.is_redundant(prev) {
                    let (_, old) = self.entries.remove(i);
                    changes.push(SegmentChange {
                        row,
                        before: Revision::stored(old),
                        after: Revision::implicit(value),
                    });
                } else {
                    let old = std::mem::replace(&mut self.entries[i].1, value.clone());
                    changes.push(SegmentChange {
                        row,
                        before: Revision::stored(old),
                        after: Revision::stored(value),
                    });
                }
            }
            Err(i) => {
                let effective = self.get(row);
                if effective == value {
                    return false;
                }
                self.entries.insert(i, (row, value.clone()));
                changes.push(SegmentChange {
                    row,
                    before: Revision::implicit(effective),
                    after: Revision::stored(value),
                });
            }
        }
        true
    }

    // Later segments that now repeat the value in effect at `row` are dropped.
    fn fold_next(&mut self, row: Row, changes: &mut ChangeSet<T>) {
        loop {
            let next = self.entries.partition_point(|(r, _)| *r <= row);
            if next == 0 || next >= self.entries.len() {
                return;
            }
            if self.entries[next].1 != self.entries[next - 1].1 {
                return;
            }
            let (r, value) = self.entries.remove(next);
            changes.push(SegmentChange {
                row: r,
                before: Revision::stored(value.clone()),
                after: Revision::implicit(value),
            });
        }
    }

    fn modify_isolated(&mut self, row: Row, value: Option<T>, changes: &mut ChangeSet<T>) -> bool {
        let value = value.unwrap_or_default();
        let is_default = value.is_redundant(None);
        match self.search(row) {
            Ok(i) if is_default => {
                let (_, old) = self.entries.remove(i);
                changes.push(SegmentChange {
                    row,
                    before: Revision::stored(old),
                    after: Revision::implicit(value),
                });
            }
            Ok(i) => {
                if self.entries[i].1 == value {
                    return false;
                }
                let old = std::mem::replace(&mut self.entries[i].1, value.clone());
                changes.push(SegmentChange {
                    row,
                    before: Revision::stored(old),
                    after: Revision::stored(value),
                });
            }
            Err(_) if is_default => return false,
            Err(i) => {
                self.entries.insert(i, (row, value.clone()));
                changes.push(SegmentChange {
                    row,
                    before: Revision::implicit(T::default()),
                    after: Revision::stored(value),
                });
            }
        }
        true
    }

    /// Restores the state from before `changes` was produced. Fails without
    /// touching the track if the current state is not the one the change set
    /// left behind.
    pub fn undo(&mut self, changes: &[SegmentChange<T>]) -> Result<(), EditError> {
        let steps = changes.iter().rev().map(|c| (c.row, &c.after, &c.before));
        self.verify_replay(steps)?;
        for change in changes.iter().rev() {
            self.set_stored(change.row, change.before.stored_value().cloned());
        }
        Ok(())
    }

    /// Replays `changes` forward onto the state they were produced from.
    pub fn reapply(&mut self, changes: &[SegmentChange<T>]) -> Result<(), EditError> {
        let steps = changes.iter().map(|c| (c.row, &c.before, &c.after));
        self.verify_replay(steps)?;
        for change in changes {
            self.set_stored(change.row, change.after.stored_value().cloned());
        }
        Ok(())
    }

    fn verify_replay<'c>(
        &self,
        steps: impl Iterator<Item = (Row, &'c Revision<T>, &'c Revision<T>)>,
    ) -> Result<(), EditError> {
        let kind = T::TYPE.singular();
        let mut overlay: HashMap<Row, Option<&T>> = HashMap::new();
        for (row, expect, next) in steps {
            let current = match overlay.get(&row) {
                Some(v) => *v,
                None => self.get_exact(row),
            };
            match (expect.stored_value(), current) {
                (Some(want), Some(have)) if want == have => {}
                (None, None) => {}
                (None, Some(_)) => return Err(EditError::SegmentConflict { kind, row }),
                (Some(_), _) => return Err(EditError::MissingSegment { kind, row }),
            }
            if row == 0 && !next.stored && T::TYPE.is_persistent() {
                return Err(EditError::RowZeroFloor { kind });
            }
            overlay.insert(row, next.stored_value());
        }
        Ok(())
    }

    /// Computes the add/remove delta that takes this track to the target
    /// described by an edit. See [`SegmentGroup::prepare_edit`].
    ///
    /// [`SegmentGroup::prepare_edit`]: crate::SegmentGroup::prepare_edit
    pub(crate) fn plan_edit(
        &self,
        add: &[(Row, T)],
        remove: &[(Row, T)],
        clear_region: bool,
    ) -> (Vec<(Row, T)>, Vec<(Row, T)>) {
        let persistent = T::TYPE.is_persistent();
        let mut target: BTreeMap<Row, T> = self.entries.iter().cloned().collect();

        for (row, value) in remove {
            if persistent && *row == 0 {
                continue;
            }
            if target.get(row) == Some(value) {
                target.remove(row);
            }
        }

        let add: Vec<&(Row, T)> = add
            .iter()
            .filter(|(row, value)| *row >= 0 && value.is_valid())
            .collect();

        if clear_region
            && let (Some(lo), Some(hi)) = (
                add.iter().map(|(r, _)| *r).min(),
                add.iter().map(|(r, _)| *r).max(),
            )
        {
            let doomed: Vec<Row> = target
                .range(lo..=hi)
                .map(|(r, _)| *r)
                .filter(|r| !(persistent && *r == 0))
                .collect();
            for row in doomed {
                target.remove(&row);
            }
        }

        for (row, value) in add {
            target.insert(*row, value.clone());
        }

        let mut normalized: Vec<(Row, T)> = Vec::with_capacity(target.len());
        for (row, value) in target {
            let prev = normalized.last().map(|(_, v)| v);
            let redundant = if persistent {
                row != 0 && value.is_redundant(prev)
            } else {
                value.is_redundant(None)
            };
            if !redundant {
                normalized.push((row, value));
            }
        }

        let kept = |entry: &(Row, T)| {
            normalized
                .binary_search_by_key(&entry.0, |(r, _)| *r)
                .is_ok_and(|i| normalized[i].1 == entry.1)
        };
        let to_remove = self
            .entries
            .iter()
            .filter(|entry| !kept(entry))
            .cloned()
            .collect();
        let to_add = normalized
            .into_iter()
            .filter(|(row, value)| self.get_exact(*row) != Some(value))
            .collect();
        (to_add, to_remove)
    }

    /// Applies a delta atomically: either every removal matches a stored
    /// segment and every addition lands on a free row, or nothing changes.
    pub(crate) fn apply_delta(
        &mut self,
        add: &[(Row, T)],
        remove: &[(Row, T)],
    ) -> Result<(), EditError> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        let kind = T::TYPE.singular();
        let mut next: BTreeMap<Row, T> = self.entries.iter().cloned().collect();
        for (row, value) in remove {
            if next.get(row) != Some(value) {
                return Err(EditError::MissingSegment { kind, row: *row });
            }
            next.remove(row);
        }
        for (row, value) in add {
            if *row < 0 || next.contains_key(row) {
                return Err(EditError::SegmentConflict { kind, row: *row });
            }
            next.insert(*row, value.clone());
        }
        if T::TYPE.is_persistent() && !next.contains_key(&0) {
            return Err(EditError::RowZeroFloor { kind });
        }
        self.entries = next.into_iter().collect();
        Ok(())
    }

    /// Restores the track invariants after a bulk load: sorted unique rows,
    /// valid payloads, no redundant segments and, for persistent tracks, a
    /// segment at row 0. Returns the number of entries dropped.
    pub fn sanitize(&mut self, owner: &str) -> usize {
        let noun = T::TYPE.singular();
        let mut entries = std::mem::take(&mut self.entries);
        let before = entries.len();
        entries.sort_by_key(|(row, _)| *row);

        let mut kept: Vec<(Row, T)> = Vec::with_capacity(entries.len());
        for (row, value) in entries {
            if row < 0 {
                warn!("{owner}: dropped {noun} at negative row {row}");
            } else if !value.is_valid() {
                warn!("{owner}: dropped invalid {noun} at row {row} ({value})");
            } else if kept.last().is_some_and(|(r, _)| *r == row) {
                warn!("{owner}: dropped duplicate {noun} at row {row}");
            } else {
                kept.push((row, value));
            }
        }

        if T::TYPE.is_persistent() {
            match kept.first_mut() {
                Some(first) if first.0 != 0 => {
                    warn!("{owner}: moved first {noun} from row {} to row 0", first.0);
                    first.0 = 0;
                }
                None => kept.push((0, T::default())),
                _ => {}
            }
        }

        let mut out: Vec<(Row, T)> = Vec::with_capacity(kept.len());
        for (row, value) in kept {
            let redundant = if T::TYPE.is_persistent() {
                value.is_redundant(out.last().map(|(_, v)| v))
            } else {
                value.is_redundant(None)
            };
            if redundant {
                warn!("{owner}: dropped redundant {noun} at row {row}");
                continue;
            }
            out.push((row, value));
        }

        self.entries = out;
        before.saturating_sub(self.entries.len())
    }
}
