//! OAuth 2.0 token lifecycle for the membership gateway.
//!
//! Implements the authorization code flow and keeps grants alive:
//! 1. Admin posts an OAuth panel; its button links to the provider with
//!    `state = <guild_id>:<role_id>`
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to `/callback` (see [`crate::api`])
//! 4. Code is exchanged for tokens, profile fetched, record stored
//! 5. The refresh sweep renews grants 6 hours ahead of expiry; joins renew
//!    just-in-time when less than a minute remains

mod exchange;
mod manager;
mod provider;
mod state;
mod sweep;

pub use exchange::{TokenBundle, UserProfile};
pub use manager::{SweepReport, TokenManager, DEFAULT_HTTP_TIMEOUT, DEFAULT_SWEEP_HORIZON_SECS};
pub use provider::{ProviderConfig, DEFAULT_API_BASE, DEFAULT_AUTHORIZE_URL, DEFAULT_SCOPES};
pub use state::{AuthState, StateError};
pub use sweep::{run_refresh_sweep, DEFAULT_SWEEP_INTERVAL};
