pub mod comments;
pub mod groups;
pub mod projects;
pub mod session;
pub mod settings;
pub mod tasks;
