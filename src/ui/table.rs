use crate::ui::theme;
use owo_colors::OwoColorize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// One action definition
#[derive(Tabled)]
pub struct DefinitionRow {
    #[tabled(rename = "Action")]
    pub name: String,
    #[tabled(rename = "Body")]
    pub body: String,
}

/// One call site
#[derive(Tabled)]
pub struct CallRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Callee")]
    pub callee: String,
    #[tabled(rename = "At")]
    pub position: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn definition_table(rows: Vec<DefinitionRow>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let rows: Vec<_> = rows
        .into_iter()
        .map(|row| DefinitionRow {
            name: row.name.style(theme().action.clone()).to_string(),
            body: row.body.style(theme().position.clone()).to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn call_table(rows: Vec<CallRow>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let rows: Vec<_> = rows
        .into_iter()
        .map(|row| CallRow {
            position: row.position.style(theme().position.clone()).to_string(),
            ..row
        })
        .collect();
    Table::new(rows).with(Style::psql()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tables_render_nothing() {
        assert!(TableBuilder::new().build().is_empty());
        assert!(definition_table(Vec::new()).is_empty());
        assert!(call_table(Vec::new()).is_empty());
    }

    #[test]
    fn test_stats_table_lists_rows() {
        let table = stats_table(&[("Files", "3".to_string()), ("Calls", "7".to_string())]);
        assert!(table.contains("Files"));
        assert!(table.contains("Calls"));
        assert!(table.contains('7'));
    }
}
