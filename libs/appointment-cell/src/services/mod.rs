pub mod booking;
pub mod lifecycle;
pub mod query;
pub mod slots;
pub mod status;
