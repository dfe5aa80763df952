pub mod change;
pub(crate) mod storage;
pub(crate) mod numeric;
pub(crate) mod string;
pub(crate) mod kind;
pub mod read_views;
pub mod vector;
pub mod persist;
pub mod explorer;
pub mod manager;

pub use change::{Change, ChangeKind, ChangeVector, WeightedSetFlags};
pub use explorer::AttributeVectorExplorer;
pub use manager::{AttributeContext, AttributeManager};
pub use persist::SaveHeader;
pub use read_views::ArrayViewType;
pub use storage::MultiValueStats;
pub use vector::AttributeVector;
