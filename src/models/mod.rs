pub mod booking;
pub mod capacity;
pub mod directory;
pub mod tracking;
