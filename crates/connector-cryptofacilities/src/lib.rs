mod client;
mod parser;
mod subscription;

pub use client::{run_connector, WsConnection, WsTransport};
pub use parser::{parse_message, parse_price_level};
pub use subscription::{Subscription, SubscriptionCoordinator, SubscriptionState};
