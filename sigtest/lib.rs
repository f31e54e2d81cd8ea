#![deny(unused_variables)]
#![deny(dead_code)]
pub mod aggregate;
pub mod config;
pub mod fdr;
pub mod io;
pub mod permutation;
pub mod pipeline;
pub mod plot;
pub mod progress;
pub mod report;
pub mod stats;
pub mod types;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod shared {
    pub use super::shared_files as files;
}
