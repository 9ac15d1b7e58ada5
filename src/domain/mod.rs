// Domain Events
pub mod events;

pub use events::QueueEvent;
