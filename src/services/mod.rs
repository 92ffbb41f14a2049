pub mod artifacts;
pub mod backends;
pub mod dispatcher;
pub mod registry;
pub mod scheduler;
