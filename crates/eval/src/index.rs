//! Read-only lookup tables over a report, and locator resolution.

use std::collections::HashMap;

use tabulon_model::{Cell, CellAddress, CellLocator, Report, SlotSelection};

use crate::error::EvalError;

/// A cell together with its position in the report.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub address: CellAddress,
    pub cell: &'a Cell,
}

impl<'a> Resolved<'a> {
    pub fn label(&self) -> &'a str {
        self.cell.label()
    }
}

/// Section and cell id maps, built once per agent.
///
/// Cell ids include cells held in slots, so a slot's own cell can also be
/// addressed directly by its id.
#[derive(Debug, Clone, Default)]
pub struct ReportIndex {
    sections: HashMap<String, usize>,
    cells: HashMap<String, CellAddress>,
}

impl ReportIndex {
    pub fn build(report: &Report) -> Self {
        let sections = report
            .sections()
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id().to_string(), i))
            .collect();
        let cells = report
            .cells()
            .into_iter()
            .filter_map(|(address, cell)| cell.id().map(|id| (id.to_string(), address)))
            .collect();
        ReportIndex { sections, cells }
    }

    pub fn section_index(&self, section: &str) -> Result<usize, EvalError> {
        self.sections
            .get(section)
            .copied()
            .ok_or_else(|| EvalError::SectionNotFound {
                section: section.to_string(),
            })
    }

    /// Resolve `locator` to a cell address. `current` is the cell being
    /// evaluated, needed by relative locators.
    pub fn locate(
        &self,
        report: &Report,
        locator: &CellLocator,
        current: Option<&CellAddress>,
    ) -> Result<CellAddress, EvalError> {
        let (section, cell_id, slot, selection) = match locator {
            CellLocator::InReport {
                section,
                cell,
                slot,
                selection,
            }
            | CellLocator::Standard {
                section,
                cell,
                slot,
                selection,
            } => (self.section_index(section)?, cell, slot, *selection),
            CellLocator::InSection {
                cell,
                slot,
                selection,
            } => {
                let current = current.ok_or_else(|| EvalError::NoCurrentCell {
                    locator: locator.to_string(),
                })?;
                (current.section, cell, slot, *selection)
            }
            CellLocator::SelfCell => {
                let current = current.ok_or_else(|| EvalError::NoCurrentCell {
                    locator: locator.to_string(),
                })?;
                return Ok(current.clone());
            }
        };

        let section_id = report
            .sections()
            .get(section)
            .map(|s| s.id().to_string())
            .unwrap_or_default();
        let address = self
            .cells
            .get(cell_id)
            .filter(|a| a.section == section)
            .ok_or_else(|| EvalError::CellNotFound {
                section: section_id.clone(),
                cell: cell_id.clone(),
            })?;
        let cell = report
            .cell_at(address)
            .ok_or_else(|| EvalError::CellNotFound {
                section: section_id,
                cell: cell_id.clone(),
            })?;

        match (cell, slot) {
            (Cell::Slotted(slotted), Some(slot)) => {
                if slotted.slot(slot).is_none() {
                    return Err(EvalError::SlotNotFound {
                        cell: cell_id.clone(),
                        slot: slot.clone(),
                    });
                }
                Ok(slot_address(address, slot))
            }
            (_, Some(slot)) => Err(EvalError::NotSlotted {
                cell: cell_id.clone(),
                slot: slot.clone(),
            }),
            (Cell::Slotted(slotted), None) => match selection {
                SlotSelection::DefaultSlot => Ok(slot_address(address, slotted.default_slot())),
                SlotSelection::RequireSlotId => Err(EvalError::SlotIdRequired {
                    cell: cell_id.clone(),
                }),
            },
            (_, None) => Ok(address.clone()),
        }
    }

    /// Resolve `locator` all the way to a cell.
    pub fn resolve<'a>(
        &self,
        report: &'a Report,
        locator: &CellLocator,
        current: Option<&CellAddress>,
    ) -> Result<Resolved<'a>, EvalError> {
        let address = self.locate(report, locator, current)?;
        let cell = report
            .cell_at(&address)
            .ok_or_else(|| EvalError::CellNotFound {
                section: report
                    .sections()
                    .get(address.section)
                    .map(|s| s.id().to_string())
                    .unwrap_or_default(),
                cell: locator.to_string(),
            })?;
        Ok(Resolved { address, cell })
    }
}

fn slot_address(container: &CellAddress, slot: &str) -> CellAddress {
    CellAddress {
        slot: Some(slot.to_string()),
        ..container.clone()
    }
}
