pub mod config;
pub mod pda;
