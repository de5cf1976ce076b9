//! Filesystem side of a femrun job.
//!
//! This crate provides:
//! - **JobDirectory**: exclusive per-run claim (in-process and through a
//!   lock marker across processes), path containment and
//!   all-or-nothing staged writes
//! - **Comparison** of generated files with per-format ignorable lines
//! - **FRD displacement reader** for CalculiX results
//! - **JSON persistence** for reports and configuration

pub mod compare;
pub mod error;
pub mod frd;
pub mod job_dir;
pub mod report;

pub use compare::{VariancePolicy, compare_files, compare_text, compare_trees, diff_lines};
pub use error::{IoError, Result};
pub use frd::Displacements;
pub use job_dir::{Artifact, JobDirectory, LOCK_FILE, is_claimed};
pub use report::{load_json, save_json};
