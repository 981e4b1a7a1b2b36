//! # revtree testkit
//!
//! Test utilities for revtree.
//!
//! This crate provides:
//! - Fixtures: the phone book model, address and identifier helpers, an
//!   event recorder and temporary JSON files
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use revtree_testkit::prelude::*;
//!
//! #[test]
//! fn john_has_a_phone() {
//!     let repository = phonebook_repository();
//!     assert!(repository.value_at(&addr("/repo/phonebook/john/phone")).is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
