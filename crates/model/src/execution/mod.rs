pub mod arguments;
pub mod errors;
pub mod spec;
