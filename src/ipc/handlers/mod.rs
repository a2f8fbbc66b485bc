pub mod calendar;
pub mod core;
pub mod poll;
pub mod roles;
pub mod schedule;
pub mod setup;
