pub mod handler;
pub mod hold_list;

pub use handler::{Generation, GenerationGuard, GenerationHandler};
pub use hold_list::GenerationHoldList;
