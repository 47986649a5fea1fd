use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use docs_autosave::{SaveEvent, Trigger};

use crate::session::{SessionReport, TimelineEntry};

const TRIGGER_ORDER: [Trigger; 5] = [
    Trigger::Interval,
    Trigger::Navigation,
    Trigger::Unload,
    Trigger::Manual,
    Trigger::Teardown,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCounts {
    pub dispatched: usize,
    pub saved: usize,
    pub failed: usize,
    pub bytes: usize,
}

pub fn print_summary(report: &SessionReport, store_root: &str) {
    println!("Document: {}", report.handle);
    println!("Store: {store_root}");
    print!("{}", render_timeline(&report.timeline));

    let counts = counts_by_trigger(&report.timeline);
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Trigger"),
        header_cell("Dispatched"),
        header_cell("Saved"),
        header_cell("Failed"),
        header_cell("Bytes"),
    ]);
    apply_table_style(&mut table);
    for index in 1..5 {
        align_column(&mut table, index, CellAlignment::Right);
    }

    let mut total = TriggerCounts::default();
    for trigger in TRIGGER_ORDER {
        let Some(row) = counts.get(&trigger) else {
            continue;
        };
        total.dispatched += row.dispatched;
        total.saved += row.saved;
        total.failed += row.failed;
        total.bytes += row.bytes;
        table.add_row(vec![
            Cell::new(trigger).fg(Color::Blue).add_attribute(Attribute::Bold),
            Cell::new(row.dispatched),
            Cell::new(row.saved),
            count_cell(row.failed, Color::Red),
            Cell::new(row.bytes),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(total.dispatched).add_attribute(Attribute::Bold),
        Cell::new(total.saved).add_attribute(Attribute::Bold),
        count_cell(total.failed, Color::Red).add_attribute(Attribute::Bold),
        Cell::new(total.bytes).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");

    match report.status.last_revision {
        Some(revision) => println!("Last acknowledged revision: {revision}"),
        None => println!("Last acknowledged revision: -"),
    }
    println!("Local edits observed: {}", report.status.local_updates);
    if report.teardown.final_flush {
        println!(
            "Teardown dispatched a final save ({} in flight).",
            report.teardown.in_flight
        );
    }
    if !report.status.eligible && report.status.dirty {
        println!("Unsaved edits were kept: saving was not allowed at teardown.");
    }
    println!("Search re-index requests: {}", report.reindex_requests);
    if let Some(error) = &report.status.last_error {
        eprintln!("Last save error: {error}");
    }
}

/// One line per save event.
pub fn render_timeline(timeline: &[TimelineEntry]) -> String {
    let mut out = String::new();
    for entry in timeline {
        let (trigger, detail) = match &entry.event {
            SaveEvent::Dispatched {
                trigger,
                dispatch,
                bytes,
            } => (*trigger, format!("dispatched #{dispatch} ({bytes} bytes)")),
            SaveEvent::Saved {
                trigger,
                dispatch,
                attempts,
                receipt,
            } => {
                let mut detail = format!(
                    "saved #{dispatch} rev {} sha256:{}",
                    receipt.revision,
                    receipt.short_digest()
                );
                if *attempts > 1 {
                    let _ = write!(detail, " after {attempts} attempts");
                }
                (*trigger, detail)
            }
            SaveEvent::Failed {
                trigger,
                dispatch,
                attempts,
                message,
            } => {
                let detail = match dispatch {
                    Some(dispatch) => {
                        format!("failed #{dispatch} after {attempts} attempt(s): {message}")
                    }
                    None => format!("not dispatched: {message}"),
                };
                (*trigger, detail)
            }
        };
        let _ = writeln!(
            out,
            "{:>9}  {:<10}  {}",
            format_offset(entry.at),
            trigger.to_string(),
            detail
        );
    }
    out
}

pub fn counts_by_trigger(timeline: &[TimelineEntry]) -> HashMap<Trigger, TriggerCounts> {
    let mut counts: HashMap<Trigger, TriggerCounts> = HashMap::new();
    for entry in timeline {
        match &entry.event {
            SaveEvent::Dispatched { trigger, bytes, .. } => {
                let row = counts.entry(*trigger).or_default();
                row.dispatched += 1;
                row.bytes += bytes;
            }
            SaveEvent::Saved { trigger, .. } => {
                counts.entry(*trigger).or_default().saved += 1;
            }
            SaveEvent::Failed { trigger, .. } => {
                counts.entry(*trigger).or_default().failed += 1;
            }
        }
    }
    counts
}

fn format_offset(at: Duration) -> String {
    format!("+{}.{:03}s", at.as_secs(), at.subsec_millis())
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count == 0 {
        Cell::new(count).fg(Color::DarkGrey)
    } else {
        Cell::new(count).fg(color)
    }
}
