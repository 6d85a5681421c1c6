//! Reports, sections and whole-report cell traversal.

use std::collections::HashSet;

use crate::cell::Cell;
use crate::error::ModelError;
use crate::table::{Band, Row, TreeTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    id: String,
    title: String,
    table: TreeTable,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, table: TreeTable) -> Self {
        Section {
            id: id.into(),
            title: title.into(),
            table,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn table(&self) -> &TreeTable {
        &self.table
    }
}

// ──────────────────────────────────────────────
// Cell addresses
// ──────────────────────────────────────────────

/// One step from a row to a nested row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStep {
    /// Top-level row of the band for the first step, child row afterwards.
    Index(usize),
    ExpandedSummary,
    CollapsedSummary,
}

/// Structural position of a cell inside a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub section: usize,
    pub band: Band,
    pub path: Vec<RowStep>,
    pub cell: usize,
    pub slot: Option<String>,
}

impl CellAddress {
    /// Address of the slotted container when this addresses a slot.
    pub fn container(&self) -> CellAddress {
        CellAddress {
            slot: None,
            ..self.clone()
        }
    }
}

// ──────────────────────────────────────────────
// Report
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    id: String,
    sections: Vec<Section>,
}

impl Report {
    /// Sections, rows, columns and cells must each carry report-wide unique
    /// ids, and there must be at least one section.
    pub fn new(id: impl Into<String>, sections: Vec<Section>) -> Result<Self, ModelError> {
        let report = Report {
            id: id.into(),
            sections,
        };
        if report.sections.is_empty() {
            return Err(ModelError::NoSections { report: report.id });
        }

        check_unique("section", report.sections.iter().map(|s| s.id()))?;
        check_unique(
            "column",
            report
                .sections
                .iter()
                .flat_map(|s| s.table.columns().iter().map(|c| c.id.as_str())),
        )?;
        check_unique(
            "row",
            report
                .sections
                .iter()
                .flat_map(|s| s.table.all_rows().into_iter().map(Row::id)),
        )?;
        check_unique(
            "cell",
            report.cells().into_iter().filter_map(|(_, cell)| cell.id()),
        )?;
        Ok(report)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Every cell in declaration order.
    ///
    /// Depth first per section: header, body and footer bands; within a row
    /// its cells (a slotted cell followed by its slot contents), then child
    /// rows, then the expanded and collapsed summary rows.
    pub fn cells(&self) -> Vec<(CellAddress, &Cell)> {
        let mut out = Vec::new();
        for (s, section) in self.sections.iter().enumerate() {
            for band in Band::ALL {
                for (r, row) in section.table.band(band).iter().enumerate() {
                    collect_row(row, s, band, vec![RowStep::Index(r)], &mut out);
                }
            }
        }
        out
    }

    pub fn cell_at(&self, address: &CellAddress) -> Option<&Cell> {
        let table = &self.sections.get(address.section)?.table;
        let (first, rest) = address.path.split_first()?;
        let RowStep::Index(first) = first else {
            return None;
        };
        let mut row = table.band(address.band).get(*first)?;
        for step in rest {
            row = match step {
                RowStep::Index(i) => row.children().get(*i)?,
                RowStep::ExpandedSummary => row.expanded_summary()?,
                RowStep::CollapsedSummary => row.collapsed_summary()?,
            };
        }
        let cell = row.cells().get(address.cell)?;
        match &address.slot {
            None => Some(cell),
            Some(slot) => cell.as_slotted()?.slot(slot),
        }
    }

    pub fn cell_at_mut(&mut self, address: &CellAddress) -> Option<&mut Cell> {
        let table = &mut self.sections.get_mut(address.section)?.table;
        let (first, rest) = address.path.split_first()?;
        let RowStep::Index(first) = first else {
            return None;
        };
        let mut row = table.band_mut(address.band).get_mut(*first)?;
        for step in rest {
            row = match step {
                RowStep::Index(i) => row.children_mut().get_mut(*i)?,
                RowStep::ExpandedSummary => row.expanded_summary_mut()?,
                RowStep::CollapsedSummary => row.collapsed_summary_mut()?,
            };
        }
        let cell = row.cells_mut().get_mut(address.cell)?;
        match &address.slot {
            None => Some(cell),
            Some(slot) => match cell {
                Cell::Slotted(slotted) => slotted.slot_mut(slot),
                _ => None,
            },
        }
    }
}

fn collect_row<'a>(
    row: &'a Row,
    section: usize,
    band: Band,
    path: Vec<RowStep>,
    out: &mut Vec<(CellAddress, &'a Cell)>,
) {
    for (c, cell) in row.cells().iter().enumerate() {
        let address = CellAddress {
            section,
            band,
            path: path.clone(),
            cell: c,
            slot: None,
        };
        if let Cell::Slotted(slotted) = cell {
            out.push((address.clone(), cell));
            for (slot_id, inner) in slotted.slots() {
                out.push((
                    CellAddress {
                        slot: Some(slot_id.clone()),
                        ..address.clone()
                    },
                    inner,
                ));
            }
        } else {
            out.push((address, cell));
        }
    }
    for (i, child) in row.children().iter().enumerate() {
        let mut child_path = path.clone();
        child_path.push(RowStep::Index(i));
        collect_row(child, section, band, child_path, out);
    }
    if let Some(summary) = row.expanded_summary() {
        let mut summary_path = path.clone();
        summary_path.push(RowStep::ExpandedSummary);
        collect_row(summary, section, band, summary_path, out);
    }
    if let Some(summary) = row.collapsed_summary() {
        let mut summary_path = path;
        summary_path.push(RowStep::CollapsedSummary);
        collect_row(summary, section, band, summary_path, out);
    }
}

fn check_unique<'a>(
    category: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ModelError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ModelError::DuplicateId {
                category,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
