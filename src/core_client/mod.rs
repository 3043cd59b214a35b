pub mod error;
pub mod listing;
pub mod pasv;
pub mod reply;
pub mod session;
pub mod supervisor;
