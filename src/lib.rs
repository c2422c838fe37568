pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logger;
pub mod market;
pub mod store;
pub mod tick_size;

pub use config::EngineConfig;
pub use domain::{Instrument, OrderBookLevel, OrderBookSnapshot, TickDirection, TickEvent};
pub use engine::{DetailHandle, MarketEngine};
pub use error::EngineError;
pub use store::{InstrumentStore, StoreSnapshot};
