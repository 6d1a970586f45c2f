//! imprint: renders static HTML pages from content snapshots whenever
//! content is saved or published.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
