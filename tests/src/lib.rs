//! # Microblock Pack Test Suite
//!
//! Unified test crate for cross-component behavior:
//!
//! ```text
//! tests/src/
//! └── integration/      # End-to-end scenarios and invariant properties
//!     ├── harness.rs    # In-process node: rings, tile, manual clock
//!     ├── scenarios.rs  # Concrete end-to-end scenarios
//!     └── properties.rs # Budget, cadence, capacity, TTL, conflict freedom
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pack-tests
//! cargo test -p pack-tests integration::scenarios::
//! ```

#![allow(dead_code)]

pub mod integration;
