//! Occurrence density and elevation analysis for a single species within a
//! single country.
//!
//! Stages run in a fixed order: acquisition hands over raw records and the
//! boundary ([`occurrence`], [`boundary`]); [`pattern`] normalizes them;
//! [`kde`] estimates density over the bounding-box window and masks it to the
//! polygon; [`join`] attaches DEM samples ([`elevation`]); [`histogram`] bins
//! the elevations; [`render`] draws the figures. [`pipeline::run`] drives the
//! in-memory stages end to end.

pub mod boundary;
pub mod colormap;
pub mod config;
pub mod elevation;
pub mod error;
pub mod histogram;
pub mod join;
pub mod kde;
pub mod occurrence;
pub mod pattern;
pub mod pipeline;
pub mod render;

pub use error::{PipelineError, Result};
