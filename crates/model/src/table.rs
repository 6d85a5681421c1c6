//! Tree tables: columns plus header, body and footer rows, where body rows
//! may nest child rows and carry expanded/collapsed summary rows.

use crate::cell::Cell;
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: String,
    pub title: String,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Column {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    id: String,
    cells: Vec<Cell>,
    children: Vec<Row>,
    expanded_summary: Option<Box<Row>>,
    collapsed_summary: Option<Box<Row>>,
}

impl Row {
    pub fn new(id: impl Into<String>, cells: Vec<Cell>) -> Self {
        Row {
            id: id.into(),
            cells,
            children: Vec::new(),
            expanded_summary: None,
            collapsed_summary: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Row>) -> Self {
        self.children = children;
        self
    }

    /// Summary rows shown while the row's children are expanded / collapsed.
    pub fn with_summaries(mut self, expanded: Option<Row>, collapsed: Option<Row>) -> Self {
        self.expanded_summary = expanded.map(Box::new);
        self.collapsed_summary = collapsed.map(Box::new);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn children(&self) -> &[Row] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Row] {
        &mut self.children
    }

    pub fn expanded_summary(&self) -> Option<&Row> {
        self.expanded_summary.as_deref()
    }

    pub fn collapsed_summary(&self) -> Option<&Row> {
        self.collapsed_summary.as_deref()
    }

    pub(crate) fn expanded_summary_mut(&mut self) -> Option<&mut Row> {
        self.expanded_summary.as_deref_mut()
    }

    pub(crate) fn collapsed_summary_mut(&mut self) -> Option<&mut Row> {
        self.collapsed_summary.as_deref_mut()
    }

    /// This row followed by every nested row, depth first.
    pub fn descendants(&self) -> Vec<&Row> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        if let Some(summary) = self.expanded_summary() {
            out.extend(summary.descendants());
        }
        if let Some(summary) = self.collapsed_summary() {
            out.extend(summary.descendants());
        }
        out
    }

    fn span(&self) -> usize {
        self.cells.iter().map(Cell::span).sum()
    }
}

/// Row band of a tree table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Header,
    Body,
    Footer,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Header, Band::Body, Band::Footer];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeTable {
    columns: Vec<Column>,
    header_rows: Vec<Row>,
    rows: Vec<Row>,
    footer_rows: Vec<Row>,
}

impl TreeTable {
    /// Every row, nested rows included, must span exactly the column count.
    pub fn new(
        columns: Vec<Column>,
        header_rows: Vec<Row>,
        rows: Vec<Row>,
        footer_rows: Vec<Row>,
    ) -> Result<Self, ModelError> {
        let table = TreeTable {
            columns,
            header_rows,
            rows,
            footer_rows,
        };
        let expected = table.columns.len();
        for row in table.all_rows() {
            let actual = row.span();
            if actual != expected {
                return Err(ModelError::RowSpanMismatch {
                    row: row.id.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(table)
    }

    /// Table with body rows only.
    pub fn with_rows(columns: Vec<Column>, rows: Vec<Row>) -> Result<Self, ModelError> {
        Self::new(columns, Vec::new(), rows, Vec::new())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn band(&self, band: Band) -> &[Row] {
        match band {
            Band::Header => &self.header_rows,
            Band::Body => &self.rows,
            Band::Footer => &self.footer_rows,
        }
    }

    pub(crate) fn band_mut(&mut self, band: Band) -> &mut [Row] {
        match band {
            Band::Header => &mut self.header_rows,
            Band::Body => &mut self.rows,
            Band::Footer => &mut self.footer_rows,
        }
    }

    /// Every row in declaration order: header, body, footer, each depth first.
    pub fn all_rows(&self) -> Vec<&Row> {
        Band::ALL
            .iter()
            .flat_map(|b| self.band(*b).iter())
            .flat_map(Row::descendants)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(n: usize) -> Vec<Column> {
        (0..n)
            .map(|i| Column::new(format!("c{}", i), format!("Column {}", i)))
            .collect()
    }

    #[test]
    fn rows_must_span_all_columns() {
        let ok = TreeTable::with_rows(
            columns(2),
            vec![Row::new("r1", vec![Cell::null(1), Cell::null(1)])],
        );
        assert!(ok.is_ok());

        let err = TreeTable::with_rows(columns(2), vec![Row::new("r1", vec![Cell::null(1)])])
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::RowSpanMismatch {
                row: "r1".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn nested_rows_are_checked_too() {
        let parent = Row::new("parent", vec![Cell::null(2)])
            .with_children(vec![Row::new("child", vec![Cell::null(3)])]);
        let err = TreeTable::with_rows(columns(2), vec![parent]).unwrap_err();
        assert!(matches!(err, ModelError::RowSpanMismatch { row, .. } if row == "child"));
    }

    #[test]
    fn all_rows_is_depth_first_by_band() {
        let body = Row::new("b1", vec![Cell::null(1)])
            .with_children(vec![Row::new("b1.1", vec![Cell::null(1)])])
            .with_summaries(
                Some(Row::new("b1.sum+", vec![Cell::null(1)])),
                Some(Row::new("b1.sum-", vec![Cell::null(1)])),
            );
        let table = TreeTable::new(
            columns(1),
            vec![Row::new("h", vec![Cell::null(1)])],
            vec![body],
            vec![Row::new("f", vec![Cell::null(1)])],
        )
        .unwrap();
        let ids: Vec<&str> = table.all_rows().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["h", "b1", "b1.1", "b1.sum+", "b1.sum-", "f"]);
    }
}
