//! Cell addressing.
//!
//! A `CellLocator` names a cell either absolutely (section id + cell id) or
//! relative to the cell whose operation is currently being evaluated.
//! Slotted cells are narrowed to one slot by an explicit slot id or by the
//! locator's `SlotSelection`.

use std::fmt;

/// How a slotted cell is narrowed when the locator carries no slot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotSelection {
    /// Fail unless a slot id is given.
    #[default]
    RequireSlotId,
    /// Fall back to the slotted cell's designated default slot.
    DefaultSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellLocator {
    /// Absolute address used from inside a report's own operations.
    InReport {
        section: String,
        cell: String,
        slot: Option<String>,
        selection: SlotSelection,
    },
    /// Absolute address used by the top-level API.
    Standard {
        section: String,
        cell: String,
        slot: Option<String>,
        selection: SlotSelection,
    },
    /// A cell in the same section as the current cell.
    InSection {
        cell: String,
        slot: Option<String>,
        selection: SlotSelection,
    },
    /// The current cell itself.
    SelfCell,
}

impl CellLocator {
    pub fn in_report(section: impl Into<String>, cell: impl Into<String>) -> Self {
        CellLocator::InReport {
            section: section.into(),
            cell: cell.into(),
            slot: None,
            selection: SlotSelection::default(),
        }
    }

    pub fn standard(section: impl Into<String>, cell: impl Into<String>) -> Self {
        CellLocator::Standard {
            section: section.into(),
            cell: cell.into(),
            slot: None,
            selection: SlotSelection::default(),
        }
    }

    pub fn in_section(cell: impl Into<String>) -> Self {
        CellLocator::InSection {
            cell: cell.into(),
            slot: None,
            selection: SlotSelection::default(),
        }
    }

    pub fn self_cell() -> Self {
        CellLocator::SelfCell
    }

    /// Address a specific slot. Has no effect on `SelfCell`.
    pub fn with_slot(mut self, slot_id: impl Into<String>) -> Self {
        match &mut self {
            CellLocator::InReport { slot, .. }
            | CellLocator::Standard { slot, .. }
            | CellLocator::InSection { slot, .. } => *slot = Some(slot_id.into()),
            CellLocator::SelfCell => {}
        }
        self
    }

    /// Set the slot selection strategy. Has no effect on `SelfCell`.
    pub fn with_selection(mut self, strategy: SlotSelection) -> Self {
        match &mut self {
            CellLocator::InReport { selection, .. }
            | CellLocator::Standard { selection, .. }
            | CellLocator::InSection { selection, .. } => *selection = strategy,
            CellLocator::SelfCell => {}
        }
        self
    }

    pub fn slot(&self) -> Option<&str> {
        match self {
            CellLocator::InReport { slot, .. }
            | CellLocator::Standard { slot, .. }
            | CellLocator::InSection { slot, .. } => slot.as_deref(),
            CellLocator::SelfCell => None,
        }
    }

    pub fn selection(&self) -> SlotSelection {
        match self {
            CellLocator::InReport { selection, .. }
            | CellLocator::Standard { selection, .. }
            | CellLocator::InSection { selection, .. } => *selection,
            CellLocator::SelfCell => SlotSelection::default(),
        }
    }

    /// Whether resolving this locator needs a current cell.
    pub fn is_relative(&self) -> bool {
        matches!(self, CellLocator::InSection { .. } | CellLocator::SelfCell)
    }
}

impl fmt::Display for CellLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellLocator::InReport {
                section, cell, slot, ..
            }
            | CellLocator::Standard {
                section, cell, slot, ..
            } => {
                write!(f, "{}/{}", section, cell)?;
                if let Some(s) = slot {
                    write!(f, "[{}]", s)?;
                }
                Ok(())
            }
            CellLocator::InSection { cell, slot, .. } => {
                write!(f, "./{}", cell)?;
                if let Some(s) = slot {
                    write!(f, "[{}]", s)?;
                }
                Ok(())
            }
            CellLocator::SelfCell => write!(f, "self"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_slot_and_selection() {
        let loc = CellLocator::in_report("s1", "c1")
            .with_slot("b")
            .with_selection(SlotSelection::DefaultSlot);
        assert_eq!(loc.slot(), Some("b"));
        assert_eq!(loc.selection(), SlotSelection::DefaultSlot);
        assert!(!loc.is_relative());
    }

    #[test]
    fn self_ignores_slot() {
        let loc = CellLocator::self_cell().with_slot("a");
        assert_eq!(loc, CellLocator::SelfCell);
        assert!(loc.is_relative());
    }

    #[test]
    fn display() {
        assert_eq!(CellLocator::standard("s", "c").to_string(), "s/c");
        assert_eq!(CellLocator::in_section("c").with_slot("x").to_string(), "./c[x]");
        assert_eq!(CellLocator::self_cell().to_string(), "self");
    }
}
