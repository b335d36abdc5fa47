//! bds_core - Backend logic for bd-spatial
//!
//! Converts stereoscopic Blu-ray MVC sources (disc, ISO, MKV, MTS) into a
//! single MV-HEVC spatial-video file by driving a sequence of external
//! tools. This crate contains all pipeline logic with no CLI dependencies;
//! the `bds_cli` crate is a thin shell over [`runner::JobRunner`].

pub mod artifacts;
pub mod config;
pub mod fsutil;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod tools;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
