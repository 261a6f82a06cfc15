pub mod extract;
pub mod response;
pub mod session;

pub use extract::{AuthUser, RequestSession};
pub use response::{ApiResponse, ApiResult};
pub use session::session_middleware;
