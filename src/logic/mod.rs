pub mod errors;
pub mod field_index;
pub mod hierarchy;
pub mod hydrate;
pub mod joins;
pub mod loader;

pub use errors::ErrorBag;
pub use field_index::SchemaFieldIndex;
pub use hierarchy::HierarchyResolver;
pub use hydrate::LinkHydrator;
pub use joins::{JoinEngine, DEFAULT_JOIN_LIMIT};
pub use loader::{LoadError, LoaderScope};
