pub mod forecast;
pub mod indicators;
