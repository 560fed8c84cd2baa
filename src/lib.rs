//! espurna-build - firmware build tasks for ESPurna
//!
//! This crate provides the extra build steps of the ESPurna firmware:
//! debug symbol extraction, compressed OTA images, the single-source build,
//! re2c grammar generation, the local elf2bin script and cache keys that let
//! environments share build results.

pub mod builder;
pub mod ops;
pub mod util;

pub use builder::{BuildEnv, Node, Phase, SignatureStrategy, TaskDef};
pub use ops::Orchestrator;
pub use util::Config;
