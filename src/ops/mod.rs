//! High-level operations.
//!
//! This module contains the implementation of espurna-build commands.

pub mod espurna_build;
pub mod firmware;

pub use espurna_build::{prepass, BuildOptions, BuildResult, Orchestrator};
pub use firmware::{
    add_target_build_and_copy, firmware_destination, firmware_filename, firmware_prefix,
    Destination, InstallEntry, InstallPlan,
};
