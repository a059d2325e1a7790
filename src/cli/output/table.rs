//! Table output formatting for CLI commands
//!
//! Renders archive contents and dimension weights using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{CandidateOrigin, Dimension, DimensionWeights, WeightDeltas};
use crate::services::ArchivedCandidate;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format archive entries, one row per candidate, with per-dimension means.
    pub fn format_archive(&self, entries: &[ArchivedCandidate], dimensions: &[Dimension]) -> String {
        let mut table = self.create_base_table();

        let mut header = vec![
            bold("ID"),
            bold("Gen"),
            bold("Origin"),
            bold("Mean"),
            bold("Wins"),
        ];
        header.extend(dimensions.iter().map(|d| bold(d.as_str())));
        header.push(bold("Instruction"));
        table.set_header(header);

        for candidate in entries {
            let entry = &candidate.entry;
            let id = entry.id().to_string();
            let means = entry.dimension_means();

            let id_cell = if self.use_colors && candidate.on_frontier {
                Cell::new(&id[..8]).fg(Color::Green)
            } else if candidate.on_frontier {
                Cell::new(format!("*{}", &id[..8]))
            } else {
                Cell::new(&id[..8])
            };

            let mut row = vec![
                id_cell,
                Cell::new(entry.candidate.generation),
                Cell::new(origin_label(entry.candidate.origin)),
                Cell::new(format!("{:.3}", candidate.mean_aggregate)),
                Cell::new(candidate.win_count),
            ];
            row.extend(dimensions.iter().map(|d| {
                Cell::new(means.get(*d).map_or_else(|| "-".to_string(), |m| format!("{m:.3}")))
            }));
            row.push(Cell::new(truncate(
                &entry.candidate.instruction.replace('\n', " "),
                60,
            )));
            table.add_row(row);
        }

        table.to_string()
    }

    /// Format weights, optionally next to the deltas that produced them.
    pub fn format_weights(&self, weights: &DimensionWeights, deltas: Option<&WeightDeltas>) -> String {
        let mut table = self.create_base_table();

        let mut header = vec![bold("Dimension"), bold("Weight")];
        if deltas.is_some() {
            header.push(bold("Delta"));
        }
        table.set_header(header);

        for (dimension, weight) in weights.iter() {
            let mut row = vec![Cell::new(dimension.as_str()), Cell::new(format!("{weight:.4}"))];
            if let Some(deltas) = deltas {
                let delta = deltas.get(dimension);
                let cell = Cell::new(format!("{delta:+.3}"));
                row.push(match (self.use_colors, delta) {
                    (true, d) if d > 0.0 => cell.fg(Color::Green),
                    (true, d) if d < 0.0 => cell.fg(Color::Red),
                    _ => cell,
                });
            }
            table.add_row(row);
        }

        table.to_string()
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn origin_label(origin: CandidateOrigin) -> &'static str {
    match origin {
        CandidateOrigin::Seed => "seed",
        CandidateOrigin::Mutation => "mutation",
        CandidateOrigin::Merge => "merge",
    }
}

/// Check if the terminal supports colors
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}
