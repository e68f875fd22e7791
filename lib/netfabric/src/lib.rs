pub mod connection;
pub mod delegate;
pub mod dispatcher_client;
pub mod endpoint;

pub use connection::Connection;
pub use delegate::DispatcherDelegate;
pub use dispatcher_client::{ClientType, DispatcherClient};
pub use endpoint::{ConnId, ConnectionChange, Endpoint};
