pub mod detail_mover;
pub mod order_book;
pub mod tick_generator;

pub use detail_mover::DetailPriceMover;
pub use order_book::{synthesize, synthesize_with};
pub use tick_generator::TickGenerator;
