pub mod plan;
pub mod summary;
