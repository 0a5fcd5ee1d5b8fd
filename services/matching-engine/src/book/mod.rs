//! Order book infrastructure module
//!
//! Contains price levels, bid book, and ask book implementations.

pub mod price_level;
pub mod bid_book;
pub mod ask_book;

pub use price_level::{PriceLevel, RestingEntry};
pub use bid_book::BidBook;
pub use ask_book::AskBook;
