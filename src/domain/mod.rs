pub mod models;
pub mod roster;
pub mod settings;
