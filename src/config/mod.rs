pub mod defs;
pub mod kits;
pub mod workflows;
