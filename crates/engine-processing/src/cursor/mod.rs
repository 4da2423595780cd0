pub mod arithmetic;
pub mod iterator;

pub use arithmetic::ScalarWindows;
pub use iterator::SubBatchIterator;
