pub mod ai;
pub mod intake;
pub mod repository;
pub mod triage;
