pub mod binance;
pub mod telegram;

pub use binance::{BinanceClient, MarketData};
pub use telegram::{TelegramClient, Update};
