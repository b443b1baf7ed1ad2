pub mod attachments;
pub mod auth;
pub mod comments;
pub mod extract;
pub mod projects;
pub mod tags;
pub mod tasks;
