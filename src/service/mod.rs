pub mod message_bus;

pub use message_bus::{BusEvent, MessageBusHandle, SendMessage};
