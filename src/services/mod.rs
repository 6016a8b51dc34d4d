pub mod analysis;
pub mod columns;
pub mod detection;
pub mod ingest;
pub mod regression;
pub mod stats;
pub mod store;
pub mod summary;
pub mod test_runner;
pub mod visualize;
