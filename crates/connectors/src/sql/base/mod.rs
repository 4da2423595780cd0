pub mod adapter;
pub mod error;
pub mod probe;
pub mod query;
pub mod statement;
