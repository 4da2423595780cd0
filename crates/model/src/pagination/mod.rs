pub mod cursor;
pub mod range;
