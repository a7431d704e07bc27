pub mod actions;
pub mod members;
