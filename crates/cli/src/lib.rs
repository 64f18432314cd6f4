pub mod commands;
pub mod drain;
pub mod load;
