pub mod cache;
pub mod catalog;
pub mod coingecko;
pub mod fx;
pub mod kv_store;
pub mod news;
pub mod types;
pub mod yahoo;
