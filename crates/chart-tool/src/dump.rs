// Binary song dump: song tempo followed by every chart.
//
//   tempo  := offset:f64 segment-stream
//   song   := tempo chart-count:varint chart*
//   chart  := description:str num-columns:u8 has-tempo:u8 [tempo] note-stream

use chart_edit::{Chart, Simfile, Tempo};
use chart_model::{DecodeError, NoteList, Reader, RowMode, SegmentGroup, Writer};
use log::warn;

fn write_tempo(writer: &mut Writer, tempo: &Tempo) {
    writer.write_f64(tempo.offset());
    tempo.segments().encode(writer, &RowMode::RAW);
}

pub fn encode_simfile(simfile: &Simfile) -> Vec<u8> {
    let mut writer = Writer::new();
    write_tempo(&mut writer, simfile.tempo());
    let charts: Vec<&Chart> = simfile.charts().map(|(_, c)| c).collect();
    writer.write_varint(charts.len() as u32);
    for chart in charts {
        writer.write_str(&chart.description);
        writer.write_u8(chart.num_columns());
        match chart.tempo() {
            Some(tempo) => {
                writer.write_u8(1);
                write_tempo(&mut writer, tempo);
            }
            None => writer.write_u8(0),
        }
        chart.notes().encode(&mut writer, &RowMode::RAW);
    }
    writer.into_bytes()
}

fn read_tempo(reader: &mut Reader<'_>, owner: &str) -> (Tempo, Option<DecodeError>) {
    let offset = match reader.read_f64() {
        Ok(offset) => offset,
        Err(e) => return (Tempo::default(), Some(e)),
    };
    let decoded = SegmentGroup::decode(reader, &RowMode::RAW, owner);
    (Tempo::new(offset, decoded.value), decoded.error)
}

/// Decodes a dump. Everything read before the first error is kept; the error,
/// if any, is returned alongside.
pub fn decode_simfile(data: &[u8]) -> (Simfile, Option<DecodeError>) {
    let mut reader = Reader::new(data);
    let (tempo, error) = read_tempo(&mut reader, "song tempo");
    let mut simfile = Simfile::new(tempo);
    if error.is_some() {
        return (simfile, error);
    }
    let error = read_charts(&mut reader, &mut simfile).err();
    if let Some(e) = &error {
        warn!("song dump is damaged at byte {}: {e}", reader.position());
    }
    (simfile, error)
}

fn read_charts(reader: &mut Reader<'_>, simfile: &mut Simfile) -> Result<(), DecodeError> {
    // description length, columns, tempo flag and note count take a byte each
    let count = reader.read_count(4)?;
    for _ in 0..count {
        let description = reader.read_string()?;
        let num_columns = reader.read_u8()?;
        let mut chart = Chart::new(description, num_columns);
        match reader.read_u8()? {
            0 => {}
            1 => {
                let (tempo, error) = read_tempo(reader, &chart.description);
                chart = chart.with_tempo(tempo);
                if let Some(e) = error {
                    simfile.add_chart(chart);
                    return Err(e);
                }
            }
            other => return Err(reader.invalid("tempo flag", other as u32)),
        }
        let notes = NoteList::decode(reader, &RowMode::RAW, num_columns, &chart.description);
        chart = chart.with_notes(notes.value);
        simfile.add_chart(chart);
        if let Some(e) = notes.error {
            return Err(e);
        }
    }
    Ok(())
}
