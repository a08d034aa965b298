pub mod reviews;
pub mod trips;
pub mod users;
