use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::group::SegmentGroup;
use crate::row::{DEFAULT_BPM, ROWS_PER_MEASURE, Row};
use crate::stream::{Reader, Writer};
use crate::track::SegmentTrack;

/// The closed set of timeline event types. The discriminant is the type tag
/// byte used by the binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SegmentType {
    Bpm = 0,
    Stop = 1,
    Delay = 2,
    Warp = 3,
    TimeSignature = 4,
    TickCount = 5,
    Combo = 6,
    Speed = 7,
    Scroll = 8,
    Fake = 9,
    Label = 10,
}

impl SegmentType {
    pub const COUNT: usize = 11;

    pub const ALL: [SegmentType; Self::COUNT] = [
        Self::Bpm,
        Self::Stop,
        Self::Delay,
        Self::Warp,
        Self::TimeSignature,
        Self::TickCount,
        Self::Combo,
        Self::Speed,
        Self::Scroll,
        Self::Fake,
        Self::Label,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Persistent segments stay in effect until the next segment of the same
    /// type; isolated segments only act at their own row.
    pub fn is_persistent(self) -> bool {
        matches!(
            self,
            Self::Bpm
                | Self::TimeSignature
                | Self::TickCount
                | Self::Combo
                | Self::Speed
                | Self::Scroll
        )
    }

    /// Types that feed the row/time mapping.
    pub fn affects_timing(self) -> bool {
        matches!(self, Self::Bpm | Self::Stop | Self::Delay | Self::Warp)
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Bpm => "BPM change",
            Self::Stop => "stop",
            Self::Delay => "delay",
            Self::Warp => "warp",
            Self::TimeSignature => "time signature",
            Self::TickCount => "tick count",
            Self::Combo => "combo segment",
            Self::Speed => "speed segment",
            Self::Scroll => "scroll segment",
            Self::Fake => "fake segment",
            Self::Label => "label",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Bpm => "BPM changes",
            Self::Stop => "stops",
            Self::Delay => "delays",
            Self::Warp => "warps",
            Self::TimeSignature => "time signatures",
            Self::TickCount => "tick counts",
            Self::Combo => "combo segments",
            Self::Speed => "speed segments",
            Self::Scroll => "scroll segments",
            Self::Fake => "fake segments",
            Self::Label => "labels",
        }
    }

    pub fn noun(self, count: usize) -> &'static str {
        if count == 1 {
            self.singular()
        } else {
            self.plural()
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// Payload of one segment type.
///
/// Implementors are the typed payload structs below; generic track and group
/// code is monomorphised per type, and [`SegmentValue`] is the type-erased
/// form used where segments of mixed types travel together.
pub trait SegmentKind: Clone + PartialEq + Default + fmt::Debug + fmt::Display + 'static {
    const TYPE: SegmentType;

    /// Whether the payload may be stored at all (e.g. BPM must be positive).
    fn is_valid(&self) -> bool {
        true
    }

    fn encode(&self, writer: &mut Writer);

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;

    fn into_value(self) -> SegmentValue;

    fn from_value(value: &SegmentValue) -> Option<&Self>;

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self>;

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self>;

    /// Whether storing `self` would change nothing. For persistent types
    /// `prev` is the value in effect just before the row; isolated types are
    /// redundant when they carry the default (no-effect) payload.
    fn is_redundant(&self, prev: Option<&Self>) -> bool {
        if Self::TYPE.is_persistent() {
            prev == Some(self)
        } else {
            *self == Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmChange {
    pub bpm: f64,
}

impl BpmChange {
    pub fn new(bpm: f64) -> Self {
        Self { bpm }
    }
}

impl Default for BpmChange {
    fn default() -> Self {
        Self { bpm: DEFAULT_BPM }
    }
}

impl fmt::Display for BpmChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}

impl SegmentKind for BpmChange {
    const TYPE: SegmentType = SegmentType::Bpm;

    fn is_valid(&self) -> bool {
        self.bpm.is_finite() && self.bpm > 0.0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_f64(self.bpm);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            bpm: reader.read_f64()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Bpm(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Bpm(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.bpms
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.bpms
    }
}

/// Pause after the notes of its row have been hit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stop {
    pub seconds: f64,
}

impl Stop {
    pub fn new(seconds: f64) -> Self {
        Self { seconds }
    }
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s stop", self.seconds)
    }
}

impl SegmentKind for Stop {
    const TYPE: SegmentType = SegmentType::Stop;

    fn is_valid(&self) -> bool {
        self.seconds.is_finite() && self.seconds >= 0.0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_f64(self.seconds);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            seconds: reader.read_f64()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Stop(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Stop(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.stops
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.stops
    }
}

/// Pause before the notes of its row are hit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Delay {
    pub seconds: f64,
}

impl Delay {
    pub fn new(seconds: f64) -> Self {
        Self { seconds }
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s delay", self.seconds)
    }
}

impl SegmentKind for Delay {
    const TYPE: SegmentType = SegmentType::Delay;

    fn is_valid(&self) -> bool {
        self.seconds.is_finite() && self.seconds >= 0.0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_f64(self.seconds);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            seconds: reader.read_f64()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Delay(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Delay(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.delays
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.delays
    }
}

/// Skips `num_rows` rows without advancing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warp {
    pub num_rows: Row,
}

impl Warp {
    pub fn new(num_rows: Row) -> Self {
        Self { num_rows }
    }
}

impl fmt::Display for Warp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warp over {} rows", self.num_rows)
    }
}

impl SegmentKind for Warp {
    const TYPE: SegmentType = SegmentType::Warp;

    fn is_valid(&self) -> bool {
        self.num_rows >= 0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_signed(self.num_rows);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            num_rows: reader.read_signed()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Warp(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Warp(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.warps
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.warps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub rows_per_measure: Row,
    pub beat_note: i32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            rows_per_measure: ROWS_PER_MEASURE,
            beat_note: 4,
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows per measure, 1/{}", self.rows_per_measure, self.beat_note)
    }
}

impl SegmentKind for TimeSignature {
    const TYPE: SegmentType = SegmentType::TimeSignature;

    fn is_valid(&self) -> bool {
        self.rows_per_measure > 0 && self.beat_note > 0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_signed(self.rows_per_measure);
        writer.write_signed(self.beat_note);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            rows_per_measure: reader.read_signed()?,
            beat_note: reader.read_signed()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::TimeSignature(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::TimeSignature(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.time_signatures
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.time_signatures
    }
}

/// Hold-note tick rate (ticks per beat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCount {
    pub ticks: i32,
}

impl Default for TickCount {
    fn default() -> Self {
        Self { ticks: 4 }
    }
}

impl fmt::Display for TickCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.ticks)
    }
}

impl SegmentKind for TickCount {
    const TYPE: SegmentType = SegmentType::TickCount;

    fn is_valid(&self) -> bool {
        self.ticks >= 0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_signed(self.ticks);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            ticks: reader.read_signed()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::TickCount(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::TickCount(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.tick_counts
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.tick_counts
    }
}

/// Combo multipliers for hits and misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub hit: i32,
    pub miss: i32,
}

impl Default for Combo {
    fn default() -> Self {
        Self { hit: 1, miss: 1 }
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "combo x{} / miss x{}", self.hit, self.miss)
    }
}

impl SegmentKind for Combo {
    const TYPE: SegmentType = SegmentType::Combo;

    fn is_valid(&self) -> bool {
        self.hit >= 0 && self.miss >= 0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_signed(self.hit);
        writer.write_signed(self.miss);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            hit: reader.read_signed()?,
            miss: reader.read_signed()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Combo(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Combo(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.combos
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.combos
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    #[default]
    Beats,
    Seconds,
}

/// Scroll-speed multiplier, eased in over `delay` beats or seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub ratio: f64,
    pub delay: f64,
    pub unit: SpeedUnit,
}

impl Default for Speed {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            delay: 0.0,
            unit: SpeedUnit::Beats,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            SpeedUnit::Beats => "beats",
            SpeedUnit::Seconds => "s",
        };
        write!(f, "speed x{} over {} {}", self.ratio, self.delay, unit)
    }
}

impl SegmentKind for Speed {
    const TYPE: SegmentType = SegmentType::Speed;

    fn is_valid(&self) -> bool {
        self.ratio.is_finite() && self.delay.is_finite() && self.delay >= 0.0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_f64(self.ratio);
        writer.write_f64(self.delay);
        writer.write_u8(match self.unit {
            SpeedUnit::Beats => 0,
            SpeedUnit::Seconds => 1,
        });
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let ratio = reader.read_f64()?;
        let delay = reader.read_f64()?;
        let unit = match reader.read_u8()? {
            0 => SpeedUnit::Beats,
            1 => SpeedUnit::Seconds,
            other => return Err(reader.invalid("speed unit", other as u32)),
        };
        Ok(Self { ratio, delay, unit })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Speed(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Speed(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.speeds
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.speeds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scroll {
    pub ratio: f64,
}

impl Default for Scroll {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl fmt::Display for Scroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scroll x{}", self.ratio)
    }
}

impl SegmentKind for Scroll {
    const TYPE: SegmentType = SegmentType::Scroll;

    fn is_valid(&self) -> bool {
        self.ratio.is_finite()
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_f64(self.ratio);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            ratio: reader.read_f64()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Scroll(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Scroll(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.scrolls
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.scrolls
    }
}

/// Notes within `num_rows` rows of this segment are not judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fake {
    pub num_rows: Row,
}

impl Fake {
    pub fn new(num_rows: Row) -> Self {
        Self { num_rows }
    }
}

impl fmt::Display for Fake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake over {} rows", self.num_rows)
    }
}

impl SegmentKind for Fake {
    const TYPE: SegmentType = SegmentType::Fake;

    fn is_valid(&self) -> bool {
        self.num_rows >= 0
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_signed(self.num_rows);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            num_rows: reader.read_signed()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Fake(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Fake(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.fakes
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.fakes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label \"{}\"", self.text)
    }
}

impl SegmentKind for Label {
    const TYPE: SegmentType = SegmentType::Label;

    fn encode(&self, writer: &mut Writer) {
        writer.write_str(&self.text);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            text: reader.read_string()?,
        })
    }

    fn into_value(self) -> SegmentValue {
        SegmentValue::Label(self)
    }

    fn from_value(value: &SegmentValue) -> Option<&Self> {
        match value {
            SegmentValue::Label(v) => Some(v),
            _ => None,
        }
    }

    fn track(group: &SegmentGroup) -> &SegmentTrack<Self> {
        &group.labels
    }

    fn track_mut(group: &mut SegmentGroup) -> &mut SegmentTrack<Self> {
        &mut group.labels
    }
}

/// Type-erased segment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SegmentValue {
    Bpm(BpmChange),
    Stop(Stop),
    Delay(Delay),
    Warp(Warp),
    TimeSignature(TimeSignature),
    TickCount(TickCount),
    Combo(Combo),
    Speed(Speed),
    Scroll(Scroll),
    Fake(Fake),
    Label(Label),
}

impl SegmentValue {
    pub fn segment_type(&self) -> SegmentType {
        match self {
            Self::Bpm(_) => SegmentType::Bpm,
            Self::Stop(_) => SegmentType::Stop,
            Self::Delay(_) => SegmentType::Delay,
            Self::Warp(_) => SegmentType::Warp,
            Self::TimeSignature(_) => SegmentType::TimeSignature,
            Self::TickCount(_) => SegmentType::TickCount,
            Self::Combo(_) => SegmentType::Combo,
            Self::Speed(_) => SegmentType::Speed,
            Self::Scroll(_) => SegmentType::Scroll,
            Self::Fake(_) => SegmentType::Fake,
            Self::Label(_) => SegmentType::Label,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Bpm(v) => v.is_valid(),
            Self::Stop(v) => v.is_valid(),
            Self::Delay(v) => v.is_valid(),
            Self::Warp(v) => v.is_valid(),
            Self::TimeSignature(v) => v.is_valid(),
            Self::TickCount(v) => v.is_valid(),
            Self::Combo(v) => v.is_valid(),
            Self::Speed(v) => v.is_valid(),
            Self::Scroll(v) => v.is_valid(),
            Self::Fake(v) => v.is_valid(),
            Self::Label(v) => v.is_valid(),
        }
    }

    pub fn encode(&self, writer: &mut Writer) {
        match self {
            Self::Bpm(v) => v.encode(writer),
            Self::Stop(v) => v.encode(writer),
            Self::Delay(v) => v.encode(writer),
            Self::Warp(v) => v.encode(writer),
            Self::TimeSignature(v) => v.encode(writer),
            Self::TickCount(v) => v.encode(writer),
            Self::Combo(v) => v.encode(writer),
            Self::Speed(v) => v.encode(writer),
            Self::Scroll(v) => v.encode(writer),
            Self::Fake(v) => v.encode(writer),
            Self::Label(v) => v.encode(writer),
        }
    }

    pub fn decode(ty: SegmentType, reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match ty {
            SegmentType::Bpm => Self::Bpm(BpmChange::decode(reader)?),
            SegmentType::Stop => Self::Stop(Stop::decode(reader)?),
            SegmentType::Delay => Self::Delay(Delay::decode(reader)?),
            SegmentType::Warp => Self::Warp(Warp::decode(reader)?),
            SegmentType::TimeSignature => Self::TimeSignature(TimeSignature::decode(reader)?),
            SegmentType::TickCount => Self::TickCount(TickCount::decode(reader)?),
            SegmentType::Combo => Self::Combo(Combo::decode(reader)?),
            SegmentType::Speed => Self::Speed(Speed::decode(reader)?),
            SegmentType::Scroll => Self::Scroll(Scroll::decode(reader)?),
            SegmentType::Fake => Self::Fake(Fake::decode(reader)?),
            SegmentType::Label => Self::Label(Label::decode(reader)?),
        })
    }
}

impl fmt::Display for SegmentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpm(v) => v.fmt(f),
            Self::Stop(v) => v.fmt(f),
            Self::Delay(v) => v.fmt(f),
            Self::Warp(v) => v.fmt(f),
            Self::TimeSignature(v) => v.fmt(f),
            Self::TickCount(v) => v.fmt(f),
            Self::Combo(v) => v.fmt(f),
            Self::Speed(v) => v.fmt(f),
            Self::Scroll(v) => v.fmt(f),
            Self::Fake(v) => v.fmt(f),
            Self::Label(v) => v.fmt(f),
        }
    }
}

/// A segment placed at a row, payload type-erased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub row: Row,
    pub value: SegmentValue,
}

impl Segment {
    pub fn new(row: Row, value: impl SegmentKind) -> Self {
        Self {
            row,
            value: value.into_value(),
        }
    }

    pub fn segment_type(&self) -> SegmentType {
        self.value.segment_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_declaration_order() {
        for (i, ty) in SegmentType::ALL.iter().enumerate() {
            assert_eq!(ty.tag() as usize, i);
            assert_eq!(SegmentType::from_tag(i as u8), Some(*ty));
        }
        assert_eq!(SegmentType::from_tag(11), None);
    }

    #[test]
    fn disciplines() {
        let persistent: Vec<_> = SegmentType::ALL
            .iter()
            .filter(|t| t.is_persistent())
            .collect();
        assert_eq!(persistent.len(), 6);
        assert!(!SegmentType::Stop.is_persistent());
        assert!(!SegmentType::Label.is_persistent());
        assert!(SegmentType::Warp.affects_timing());
        assert!(!SegmentType::Scroll.affects_timing());
    }

    #[test]
    fn redundancy_rules() {
        let bpm = BpmChange::new(150.0);
        assert!(bpm.is_redundant(Some(&BpmChange::new(150.0))));
        assert!(!bpm.is_redundant(Some(&BpmChange::new(120.0))));
        assert!(Stop::new(0.0).is_redundant(None));
        assert!(!Stop::new(0.5).is_redundant(None));
        assert!(Label::default().is_redundant(None));
    }

    #[test]
    fn validity_rules() {
        assert!(!BpmChange::new(0.0).is_valid());
        assert!(!BpmChange::new(f64::NAN).is_valid());
        assert!(!Stop::new(-1.0).is_valid());
        assert!(!Warp::new(-4).is_valid());
        assert!(
            !TimeSignature {
                rows_per_measure: 0,
                beat_note: 4
            }
            .is_valid()
        );
        assert!(SegmentValue::Bpm(BpmChange::new(200.0)).is_valid());
    }

    #[test]
    fn value_round_trip_through_stream() {
        let values = [
            SegmentValue::Speed(Speed {
                ratio: 2.0,
                delay: 1.5,
                unit: SpeedUnit::Seconds,
            }),
            SegmentValue::Label(Label::new("chorus")),
            SegmentValue::Combo(Combo { hit: 2, miss: 3 }),
        ];
        for value in values {
            let mut w = Writer::new();
            value.encode(&mut w);
            let mut r = Reader::new(w.as_bytes());
            let decoded = SegmentValue::decode(value.segment_type(), &mut r).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn bad_speed_unit_is_rejected() {
        let mut w = Writer::new();
        w.write_f64(1.0);
        w.write_f64(0.0);
        w.write_u8(7);
        let mut r = Reader::new(w.as_bytes());
        assert!(matches!(
            Speed::decode(&mut r),
            Err(DecodeError::InvalidValue { value: 7, .. })
        ));
        assert!(r.is_failed());
    }

    #[test]
    fn segment_serializes_to_json() {
        let seg = Segment::new(96, BpmChange::new(180.0));
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"row\":96"));
        assert!(json.contains("180"));
    }
}
