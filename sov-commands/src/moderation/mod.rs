pub mod actions;
pub mod audit;
pub mod embeds;
pub mod history;
pub mod modlog;
pub mod status;
