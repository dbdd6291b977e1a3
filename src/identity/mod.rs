//! Central identity and session handling for eventline.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod transport;
mod authenticator;
mod guard;
mod refresh;

pub use principal::Principal;
pub use token::{TokenCodec, TokenError};
pub use transport::TokenTransport;
pub use authenticator::Authenticator;
pub use guard::{ensure_owner, ensure_valid_id};
pub use refresh::with_session;
