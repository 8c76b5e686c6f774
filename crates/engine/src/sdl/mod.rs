//! SDL composition: the emitted GraphQL surface for a set of bindings.

mod compose;
pub mod naming;

pub use compose::{compose_sdl, input_type_for, is_filterable};
