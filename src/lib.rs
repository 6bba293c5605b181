pub mod algorithms;
pub mod error_storage;
pub mod errors;
pub mod generators;
pub mod grids;
pub mod refinement;
pub mod serialization;
pub mod storage;
pub mod utilities;
