pub mod common;
pub mod optimize;
pub mod print;
