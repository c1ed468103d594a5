//! Background services owned by the API process.

pub mod dispatcher;

pub use dispatcher::CommandDispatcher;
