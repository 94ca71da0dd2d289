//! Markdown rendering of query results.

use crate::chat::query::{EntityProfile, QueryResult};

/// A small Markdown table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

impl MarkdownTable {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self { headers: headers.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    pub fn push<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.headers.iter().map(|h| escape_cell(h)).collect();
        out.push_str(&format!("| {} |\n", header.join(" | ")));
        out.push_str(&format!("|{}\n", "---|".repeat(self.headers.len())));
        for row in &self.rows {
            let cells: Vec<String> = (0..self.headers.len())
                .map(|i| row.get(i).map(|c| escape_cell(c)).unwrap_or_default())
                .collect();
            out.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        out
    }
}

/// Bulleted list, one item per line
pub fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(|i| format!("- {}\n", i.as_ref())).collect()
}

fn opt(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "-".to_string())
}

fn opt_num(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn render_profile(p: &EntityProfile) -> String {
    let mut out = format!("**{}: {}** ({} records)\n\n", p.column, p.values.join(", "), p.records);

    let mut months = MarkdownTable::new(["Month", "Total"]);
    for (month, total) in p.months() {
        months.push([month.to_string(), total.to_string()]);
    }
    months.push(["**Total**".to_string(), format!("**{}**", p.grand_total)]);
    out.push_str(&months.render());

    if !p.projects.is_empty() {
        out.push('\n');
        let mut projects = MarkdownTable::new([
            "PROJECT_DESCR", "CLIENT", "USER", "STATUS", "PLANNED_FTE", "ACTUAL_FTE", "ALLOCATED",
        ]);
        for line in &p.projects {
            projects.push([
                opt(&line.project),
                opt(&line.client),
                opt(&line.user),
                opt(&line.status),
                opt_num(line.planned_fte),
                opt_num(line.actual_fte),
                line.allocated.to_string(),
            ]);
        }
        out.push_str(&projects.render());
    }
    out
}

/// Render a result verbatim: tables for keyed rows, bullets for flat lists
pub fn render(result: &QueryResult) -> String {
    match result {
        QueryResult::Profile(p) => render_profile(p),
        QueryResult::Totals { column, rows } => {
            let mut table = MarkdownTable::new([column.name(), "Total"]);
            for (label, total) in rows {
                table.push([label.clone(), total.to_string()]);
            }
            format!("**Allocation by {}**\n\n{}", column, table.render())
        }
        QueryResult::Counts { column, rows } => {
            let mut table = MarkdownTable::new([column.name(), "Records"]);
            for (label, count) in rows {
                table.push([label.clone(), count.to_string()]);
            }
            format!("**Records by {}**\n\n{}", column, table.render())
        }
        QueryResult::Distinct { column, values } => {
            if values.is_empty() {
                format!("No values found for {column}.")
            } else {
                format!("**{} ({})**\n\n{}", column, values.len(), bullets(values))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Field;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_render() {
        let mut t = MarkdownTable::new(["A", "B"]);
        t.push(["1", "x|y"]);
        t.push(["2"]);
        assert_eq!(t.render(), "| A | B |\n|---|---|\n| 1 | x\\|y |\n| 2 |  |\n");
    }

    #[test]
    fn test_bullets_for_flat_lists() {
        let r = QueryResult::Distinct { column: Field::Client, values: vec!["Acme".into(), "Initech".into()] };
        assert_eq!(render(&r), "**CLIENT (2)**\n\n- Acme\n- Initech\n");
    }

    #[test]
    fn test_counts_render_as_table() {
        let r = QueryResult::Counts { column: Field::Status, rows: vec![("Open".into(), 3)] };
        assert!(render(&r).contains("| STATUS | Records |\n|---|---|\n| Open | 3 |\n"));
    }
}
