//! Rebase-stack lifecycle module
//!
//! This module implements the sandboxed rebase core:
//! - Stack state machine and per-sandbox metadata record
//! - Sandbox lifecycle (create, query, tear down, apply)
//! - Conflict-marker parsing and resolution strategies
//! - Test-command detection and execution
//! - Pre-apply safety gate

pub mod gate;
pub mod manager;
pub mod metadata;
pub mod resolver;
pub mod state;
pub mod validation;

pub use gate::{GateCheck, GateReport, PreApplyGate};
pub use manager::{StackInfo, StackManager};
pub use metadata::{StackMetadata, METADATA_FILE};
pub use resolver::{ConflictRegion, ConflictResolver, Resolution, ResolutionStrategy};
pub use state::StackState;
pub use validation::{detect_test_command, TestResult, TestRunner};
