pub mod client;
pub mod entity;
pub mod error;
pub mod executor;

pub use client::{EntityClient, WriteMode, WriteOutcome};
pub use entity::Entity;
pub use error::ApiError;
pub use executor::{Completion, EntityBackend, HttpExecutor, Request, RequestTracker, Response, Slot, Ticket};
