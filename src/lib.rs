//! Empire Core
//!
//! A persistent-session client core for a SmartFoxServer 2X-style game
//! backend: a Frame Codec for the two wire dialects, a Dispatcher routing
//! decoded packets to durable subscribers and one-shot waiters, a
//! Connection owning the WebSocket transport, a Session Manager driving
//! the login handshake, a State Store deriving the world model from
//! observed packets, and a Request API for typed request/response calls.
//!
//! ## Architecture
//!
//! ```text
//! SessionManager  (session.rs)   ← login handshake
//!   └── Connection  (connection.rs) ← transport + reader task
//!         └── Dispatcher  (dispatcher.rs) ← subscribe / wait_for
//!               ├── StateStore  (state/)   ← derived world model
//!               └── RequestApi  (request.rs) ← typed calls
//! codec.rs  ← wire framing shared by all of the above
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod session;
pub mod state;

pub use codec::{Dialect, Packet};
pub use config::{ClientConfig, LoginExtras};
pub use connection::{Connection, ConnectionStatus};
pub use dispatcher::{Dispatcher, SubscriptionHandle};
pub use error::{ClientError, Result};
pub use request::{AllianceInfo, PlayerInfo, RequestApi};
pub use session::SessionManager;
pub use state::{Movement, Player, StateStore};
