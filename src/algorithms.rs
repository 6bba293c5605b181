pub mod coarsening;
pub mod refinement;
