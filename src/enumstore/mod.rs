pub mod value;
pub mod dictionary;
pub mod enum_store;

pub use dictionary::{EnumIndex, FrozenDictionary, WriterDictionary};
pub use enum_store::{EnumCompaction, EnumReader, EnumStore, EnumStoreStats};
pub use value::{EnumValue, NumericType, OrdKey, fold_case};
