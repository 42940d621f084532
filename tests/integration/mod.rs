//! Integration tests for the mindgraph runtime

mod properties;
mod runtime_scenarios;
mod store_recovery;
