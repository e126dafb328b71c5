//! Alert delivery channels.

mod log_channel;
mod telegram;

pub use log_channel::LogAlertChannel;
pub use telegram::{TelegramAlertChannel, TelegramConfig};
