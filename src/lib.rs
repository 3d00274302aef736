pub mod cache;
pub mod classify;
pub mod cluster;
pub mod collector;
pub mod config;
pub mod dot;
pub mod enrich;
pub mod exporter;
pub mod graph;
pub mod model;
pub mod output;
pub mod render;
pub mod tags;

// Re-export main types
pub use exporter::{ExportSettings, run_export};
pub use graph::{Edge, ServiceGraph, StackGraph};
pub use model::{EnrichedExport, ExportRecord, StackRecord};
