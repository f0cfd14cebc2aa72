pub mod client;
pub mod registry;
pub mod server;
pub mod store;

// Re-export generated protobuf types
pub mod pb {
    tonic::include_proto!("message_keeper");
}

/// Name the message service is bound under in the registry
pub const MESSAGE_KEEPER_NAME: &str = "//MessageKeeper";

pub use client::{MessageFeeder, MessageKeeper, RemoteMessageKeeper};
pub use registry::NameRegistry;
pub use server::MessageKeeperServer;
pub use store::{MessageStore, SqliteStore};
