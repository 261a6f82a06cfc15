pub mod auth;
pub mod callback;
pub mod home;

// Re-export handler functions for use in routing
pub use auth::{login_get, login_post, signup_get, signup_post};
pub use callback::{auth_callback, update_password};
pub use home::{health, root};
