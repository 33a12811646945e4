//! Reactive view state for the facility dashboard
//!
//! Every dashboard screen is a view model built from the same parts: atoms
//! for inputs, derived views for chart-ready data, effects that load data
//! through a reconciler, and filter controllers over the loaded data.

// Core modules
pub mod dataflow;
pub mod config;
pub mod errors;

// View-state building blocks
pub mod filter_set;
pub mod loading;
pub mod range;

// Outer seams
pub mod app_context;
pub mod storage;
pub mod transport;

// View models and chart helpers
pub mod dashboard;
pub mod format;

#[cfg(test)]
mod testing;
