pub mod archive;
pub mod history;
pub mod mirror;
