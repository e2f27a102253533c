//! Integration tests for nomad-harvest

mod crawl_tests;
mod recorder_tests;
