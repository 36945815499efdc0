pub mod barcodes;
pub mod command;
pub mod file;
pub mod manifest;
pub mod parallel;
pub mod streams;
pub mod system;
