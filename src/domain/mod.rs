pub mod instrument;
pub mod order_book;
pub mod tick;

pub use instrument::{change_rate, Instrument};
pub use order_book::{OrderBookLevel, OrderBookSnapshot};
pub use tick::{TickDirection, TickEvent};
