use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use faultforge::completion::time::get_time_str;
use faultforge::completion::InversionState;
use faultforge::constraints::ConstraintRange;
use faultforge::progress::AnnealingProgress;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn align_right(table: &mut Table, columns: std::ops::RangeInclusive<usize>) {
    for i in columns {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
}

pub fn print_ranges_table(ranges: &[ConstraintRange]) {
    let mut table = new_table();
    table.add_row(vec![
        Cell::new("Constraint").add_attribute(Attribute::Bold),
        Cell::new("Type"),
        Cell::new("Rows"),
        Cell::new("Start"),
        Cell::new("End"),
        Cell::new("Weight"),
        Cell::new("Weighting"),
    ]);
    align_right(&mut table, 2..=5);

    for r in ranges {
        let kind = if r.inequality {
            Cell::new("ineq").fg(Color::Yellow)
        } else {
            Cell::new("eq")
        };
        table.add_row(vec![
            Cell::new(&r.name).add_attribute(Attribute::Bold),
            kind,
            Cell::new(r.num_rows()),
            Cell::new(r.start_row),
            Cell::new(r.end_row),
            Cell::new(format!("{:.3e}", r.weight)),
            Cell::new(r.weighting.to_string()),
        ]);
    }
    println!("\n{}", table);
}

/// Names and energies must line up, total first.
pub fn print_energy_table(names: &[String], energy: &[f64]) {
    let total = energy.first().copied().unwrap_or(0.0);
    let mut table = new_table();
    table.add_row(vec![
        Cell::new("Energy").add_attribute(Attribute::Bold),
        Cell::new("Value").fg(Color::Cyan),
        Cell::new("% Total"),
    ]);
    align_right(&mut table, 1..=2);

    for (i, (name, &e)) in names.iter().zip(energy).enumerate() {
        let pct = if total > 0.0 { e / total * 100.0 } else { 0.0 };
        let name_cell = if i == 0 {
            Cell::new(name).add_attribute(Attribute::Bold)
        } else {
            Cell::new(name)
        };
        table.add_row(vec![
            name_cell,
            Cell::new(format!("{:.6e}", e)),
            Cell::new(format!("{:.1}%", pct)),
        ]);
    }
    println!("\n{}", table);
}

pub fn print_run_summary(state: &InversionState) {
    let mut table = new_table();
    table.add_row(vec![
        Cell::new("Elapsed").add_attribute(Attribute::Bold),
        Cell::new("Iterations"),
        Cell::new("Kept"),
        Cell::new("Worse Kept").fg(Color::Yellow),
        Cell::new("Non-zero"),
    ]);
    align_right(&mut table, 1..=4);
    table.add_row(vec![
        Cell::new(get_time_str(state.elapsed_millis)),
        Cell::new(state.iterations),
        Cell::new(state.num_perturbs_kept),
        Cell::new(state.num_worse_kept).fg(Color::Yellow),
        Cell::new(state.num_non_zero),
    ]);
    println!("\n{}", table);
}

/// Shows up to `rows` evenly spaced entries, always including the last.
pub fn print_progress_table(progress: &AnnealingProgress, rows: usize) {
    let mut table = new_table();
    let mut header = vec![
        Cell::new("Iterations").add_attribute(Attribute::Bold),
        Cell::new("Time"),
        Cell::new("Perturbs"),
        Cell::new("Non-zero"),
    ];
    header.extend(progress.energy_types().iter().map(Cell::new));
    header.push(Cell::new("Min Total").fg(Color::Green));
    let num_cols = header.len();
    table.add_row(header);
    align_right(&mut table, 0..=num_cols - 1);

    let len = progress.len();
    let mut indexes: Vec<usize> = if len <= rows {
        (0..len).collect()
    } else {
        (0..rows).map(|k| k * (len - 1) / (rows - 1)).collect()
    };
    indexes.dedup();

    for i in indexes {
        let mut row = vec![
            Cell::new(progress.iterations(i)),
            Cell::new(get_time_str(progress.time_millis(i))),
            Cell::new(progress.num_perturbations(i)),
            Cell::new(progress.num_non_zero(i)),
        ];
        row.extend(progress.energies(i).iter().map(|e| Cell::new(format!("{:.4e}", e))));
        row.push(Cell::new(format!("{:.4e}", progress.min_energy_so_far(i))).fg(Color::Green));
        table.add_row(row);
    }
    println!("\n{}", table);
}
