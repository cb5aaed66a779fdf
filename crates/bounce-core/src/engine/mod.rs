//! Mixdown engine - per-track pipelines and the orchestrating mixer
//!
//! This module contains the core of the mixdown:
//! - TrackMixer: per-input pipeline (fetch, envelope, reverse, resample)
//! - Mixer: pulls blocks from every input, routes and sums them into
//!   output channels, and converts to the target format with dither

mod mixer;
mod track;

pub use mixer::*;
