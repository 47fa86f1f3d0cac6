//! Hybrid systems: modal models with level-crossing guards

mod automaton;
mod relation;

pub use automaton::{ModalModel, Mode, ModeId, Transition};
pub use relation::{Relation, RelationKind, RelationSample};
