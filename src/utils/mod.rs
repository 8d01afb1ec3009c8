//! Utility modules

pub mod fallback_archive;
pub mod local_archive;
pub mod memory_collaborators;
pub mod memory_storage;
pub mod validation;

pub use fallback_archive::*;
pub use local_archive::*;
pub use memory_collaborators::*;
pub use memory_storage::*;
pub use validation::*;
