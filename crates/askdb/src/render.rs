//! Plain-text table rendering for results.

use crate::database::ScalarValue;

const MAX_CELL_WIDTH: usize = 40;

/// Render `columns`/`rows` as an ASCII grid. At most `max_rows` rows are
/// shown when a limit is given, followed by a note naming how many were cut.
pub fn render_table(columns: &[String], rows: &[Vec<ScalarValue>], max_rows: Option<usize>) -> String {
    if columns.is_empty() {
        return "(no rows)".to_string();
    }

    let shown = max_rows.map_or(rows.len(), |limit| limit.min(rows.len()));
    let cells: Vec<Vec<String>> = rows[..shown]
        .iter()
        .map(|row| row.iter().map(|v| clip(&v.to_string())).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| clip(c).chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border = border_line(&widths);
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    out.push_str(&row_line(&columns.iter().map(|c| clip(c)).collect::<Vec<_>>(), &widths));
    out.push('\n');
    out.push_str(&border);
    for row in &cells {
        out.push('\n');
        out.push_str(&row_line(row, &widths));
    }
    out.push('\n');
    out.push_str(&border);

    if rows.is_empty() {
        out.push_str("\n(0 rows)");
    } else if shown < rows.len() {
        out.push_str(&format!("\n({} of {} rows shown)", shown, rows.len()));
    } else {
        out.push_str(&format!("\n({} row{})", rows.len(), if rows.len() == 1 { "" } else { "s" }));
    }
    out
}

fn clip(value: &str) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        flat
    } else {
        let mut clipped: String = flat.chars().take(MAX_CELL_WIDTH - 3).collect();
        clipped.push_str("...");
        clipped
    }
}

fn border_line(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.push_str(&"-".repeat(w + 2));
        line.push('+');
    }
    line
}

fn row_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        let pad = w - cell.chars().count();
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(pad + 1));
        line.push('|');
    }
    line
}
