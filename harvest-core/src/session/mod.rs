mod cookies;
mod error;

pub use cookies::{CookieRecord, SessionCookies};
pub use error::{SessionError, SessionResult};
