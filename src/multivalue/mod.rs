pub mod mapping;

pub use mapping::{MultiValueEntry, MultiValueMapping, MultiValueReadView};
