pub mod api;
pub mod console;
pub mod csv;
pub mod download;
