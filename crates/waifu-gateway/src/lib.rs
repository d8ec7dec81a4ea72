pub mod claim;
pub mod connection;
pub mod dispatcher;
pub mod dropper;
pub mod scheduler;
