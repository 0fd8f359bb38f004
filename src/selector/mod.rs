pub mod best;
pub mod decision;
pub mod scoring;
