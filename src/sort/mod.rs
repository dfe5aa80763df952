pub mod missing;
pub mod converter;
pub mod writer;

pub use converter::{BlobConverter, LowercaseConverter};
pub use missing::MissingPolicy;
pub use writer::{NumericSortBlobWriter, SortBlobWriter, StringSortBlobWriter};
