use crate::value::ValueKind;

/// Errors raised while building report structures.
///
/// These are construction-time failures; nothing here is produced during
/// evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("slotted cell {cell} has no slots")]
    EmptySlotMap { cell: String },

    #[error("slotted cell {cell} has a blank slot id")]
    BlankSlotId { cell: String },

    #[error("slot {slot} of cell {cell} holds another slotted cell")]
    NestedSlottedCell { cell: String, slot: String },

    /// A slot's cell must span exactly as many columns as its container.
    #[error("slot {slot} of cell {cell} spans {actual} columns, expected {expected}")]
    SlotSpanMismatch {
        cell: String,
        slot: String,
        expected: usize,
        actual: usize,
    },

    #[error("default slot {default_slot} is not a slot of cell {cell}")]
    DefaultSlotMissing { cell: String, default_slot: String },

    #[error("{chain} chain must have at least one step")]
    EmptyChain { chain: &'static str },

    #[error("value of type {actual} is not a legal {expected}")]
    KindMismatch { expected: ValueKind, actual: String },

    #[error("report {report} has no sections")]
    NoSections { report: String },

    /// Section, row, column and cell ids are unique report-wide.
    #[error("duplicate {category} id: {id}")]
    DuplicateId { category: &'static str, id: String },

    #[error("row {row} spans {actual} columns, table has {expected}")]
    RowSpanMismatch {
        row: String,
        expected: usize,
        actual: usize,
    },
}
