pub mod apply;
pub mod phases;
pub mod profile;
