pub mod action;
pub mod member;
