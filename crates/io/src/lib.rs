// Clash file I/O

pub mod csv;
pub mod ingest;
pub mod navisworks;
pub mod results;
pub mod xlsx;

pub use ingest::{ingest, select_blame};
pub use results::{read_assignments, run_scoped_output_path, write_results, WriteReport};
