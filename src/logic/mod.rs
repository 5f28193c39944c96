//! Logic modules - pure decisions over the module catalog.
//!
//! # Modules
//!
//! - `resolver` - Selection toggling, dependency expansion and validation

pub mod resolver;
