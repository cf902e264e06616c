pub mod events;
pub mod launcher;
pub mod protocol;
pub mod transport;
