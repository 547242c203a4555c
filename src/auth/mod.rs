//! Authentication: credentials, the SSO login state machine and cookie persistence.
//!
//! A successful login yields a [`Session`](crate::fetch::Session) whose cookies
//! are also written to the [`CookieStore`], so later runs can skip the browser
//! entirely while the cookies stay valid.

mod cookies;
mod credentials;
mod diagnostics;
mod login;

pub use cookies::{
    CookieStore, CookieStoreError, DEFAULT_COOKIE_FILE, StoredCookie, load_cookies_into_jar,
};
pub use credentials::{Credentials, MIN_SECRET_CHARS, validate_credentials};
pub use diagnostics::Diagnostics;
pub use login::{Authenticator, LoginSettings, LoginState};
