pub mod bot_client;

pub use bot_client::BotClient;
