// chart-tool: inspect song dumps and exercise the editing core from the command line.

mod config;
mod dump;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use chart_edit::{Chart, Editor, Simfile, Tempo, TempoTarget};
use chart_model::{
    BpmChange, Label, Note, NoteEdit, NoteSet, ROWS_PER_BEAT, ROWS_PER_MEASURE, Row, SegmentEdit,
    SegmentGroup, SegmentSet, Stop, TimeSignature,
};

use config::EditorConfig;

#[derive(Parser, Debug)]
#[command(name = "chart-tool", about = "Chart timing and note editing tool")]
struct Args {
    /// Path to the editor config JSON file.
    #[arg(long, env = "CHART_TOOL_CONFIG", default_value = "chart_tool.json")]
    config: PathBuf,

    /// Log edit details.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tempo and charts of a song dump.
    Describe { file: PathBuf },
    /// Print the time of every `step` rows of a chart's tempo.
    Timing {
        file: PathBuf,
        /// Chart index; the song tempo is used when omitted.
        #[arg(long)]
        chart: Option<usize>,
        #[arg(long, default_value_t = ROWS_PER_BEAT)]
        step: Row,
        #[arg(long, default_value_t = ROWS_PER_MEASURE * 8)]
        end: Row,
    },
    /// Build a small song through the editor and write it as a dump.
    Demo {
        #[arg(long, default_value = "demo.chart")]
        out: PathBuf,
    },
    /// Write the default config to a file.
    InitConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let config = EditorConfig::read_or_default(&args.config)?;
    match args.command {
        Command::Describe { file } => describe(&file),
        Command::Timing {
            file,
            chart,
            step,
            end,
        } => timing(&file, chart, step, end, config.output_precision),
        Command::Demo { out } => demo(&out, &config),
        Command::InitConfig { path } => {
            EditorConfig::default().write(&path)?;
            info!("wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Simfile> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (simfile, error) = dump::decode_simfile(&data);
    if let Some(e) = error {
        warn!("{}: partial load ({e})", path.display());
    }
    Ok(simfile)
}

fn describe(path: &Path) -> Result<()> {
    let simfile = load(path)?;
    let tempo = simfile.tempo();
    println!("song offset {:.3}s: {}", tempo.offset(), tempo.segments().description());
    for (id, chart) in simfile.charts() {
        println!(
            "{id} \"{}\" ({} columns): {}",
            chart.description,
            chart.num_columns(),
            chart.notes().description()
        );
        if let Some(own) = chart.tempo() {
            println!("  split timing, offset {:.3}s: {}", own.offset(), own.segments().description());
        }
    }
    Ok(())
}

fn timing(path: &Path, chart: Option<usize>, step: Row, end: Row, precision: usize) -> Result<()> {
    if step <= 0 {
        bail!("step must be positive, got {step}");
    }
    let simfile = load(path)?;
    let tempo = match chart {
        None => simfile.tempo(),
        Some(index) => {
            let Some((id, _)) = simfile.charts().nth(index) else {
                bail!("no chart at index {index}");
            };
            simfile
                .tempo_for(id)
                .with_context(|| format!("{id} has no tempo"))?
        }
    };
    let timing = tempo.timing();
    let mut tracker = timing.tracker();
    for row in sample_rows(step, end) {
        let seconds = tracker.advance(row as f64);
        let marker = if timing.is_warped(row) { " (warped)" } else { "" };
        println!(
            "{row:>8} {seconds:>12.precision$} {:>8.2} bpm{marker}",
            timing.bpm_at(row)
        );
    }
    Ok(())
}

/// Rows `0, step, 2 * step, ..` up to and including `end`.
fn sample_rows(step: Row, end: Row) -> impl Iterator<Item = Row> {
    std::iter::successors(Some(0), move |row: &Row| row.checked_add(step))
        .take_while(move |row| *row <= end)
}

fn demo(out: &Path, config: &EditorConfig) -> Result<()> {
    let song = SegmentGroup::from_set(
        &SegmentSet::new()
            .with(0, BpmChange::new(config.default_bpm))
            .with(0, TimeSignature::default()),
        "demo",
    );
    let mut editor = Editor::new(Simfile::new(Tempo::new(0.0, song)), config.history_limit);
    let chart = editor.add_chart(Chart::new("Demo", 4));

    editor.start_chain();
    editor.modify_segments(
        TempoTarget::Song,
        [(ROWS_PER_MEASURE * 2, Some(BpmChange::new(config.default_bpm * 1.5)))],
    )?;
    editor.modify_segments(TempoTarget::Song, [(ROWS_PER_MEASURE * 3, Some(Stop::new(0.5)))])?;
    editor.edit_segments(
        TempoTarget::Song,
        &SegmentEdit {
            add: SegmentSet::new().with(0, Label::new("intro")),
            remove: SegmentSet::new(),
        },
        false,
    )?;
    editor.finish_chain("demo tempo");

    let pattern: NoteSet = (0..8)
        .map(|i| Note::step(i * ROWS_PER_BEAT / 2, (i % 4) as u8))
        .chain([Note::hold(ROWS_PER_MEASURE * 2, ROWS_PER_MEASURE * 3, 0)])
        .collect();
    editor.edit_notes(
        chart,
        &NoteEdit {
            add: pattern,
            remove: NoteSet::new(),
        },
        false,
    )?;

    let data = editor.copy_notes(chart, 0, ROWS_PER_MEASURE, config.time_based_paste)?;
    let pasted = editor.paste_notes(
        chart,
        &data,
        ROWS_PER_MEASURE * 4,
        config.time_based_paste,
        config.clear_region_on_paste,
    )?;
    info!("pasted {}", pasted.description());

    // exercise the history once in each direction
    if let Some(name) = editor.undo() {
        info!("undid {name}");
    }
    if let Some(name) = editor.redo() {
        info!("redid {name}");
    }

    let bytes = dump::encode_simfile(editor.simfile());
    std::fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
    info!(
        "wrote {} bytes to {} ({} undo steps)",
        bytes.len(),
        out.display(),
        editor.history().undo_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rows() {
        let rows: Vec<Row> = sample_rows(48, 192).collect();
        assert_eq!(rows, vec![0, 48, 96, 144, 192]);
        assert_eq!(sample_rows(48, -1).count(), 0);
    }

    #[test]
    fn test_sample_rows_stop_at_last_row() {
        let step = Row::MAX / 2 + 1;
        let rows: Vec<Row> = sample_rows(step, Row::MAX).collect();
        assert_eq!(rows, vec![0, step]);
        assert_eq!(sample_rows(Row::MAX, Row::MAX).last(), Some(Row::MAX));
    }
}
