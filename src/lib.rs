//! Tracto - a fiber-tractography streamline engine

pub mod core;
pub mod space;
pub mod image;
pub mod streamline;
pub mod pipeline;
pub mod filter;
pub mod tracker;
pub mod files;
pub mod sinks;
