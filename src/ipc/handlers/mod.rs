pub mod assignments;
pub mod auth;
pub mod core;
pub mod dashboard;
pub mod groups;
pub mod public;
pub mod subjects;
pub mod tasks;
pub mod users;
