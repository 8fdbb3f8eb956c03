//! TLS secure channel.
//!
//! - [`channel`]: the handshake state machine and plaintext surface
//! - [`config`]: rustls config builders (server identity, client roots)
//! - [`executor`]: delegated processing pool

pub mod channel;
pub mod config;
pub mod executor;

pub use channel::{HandshakeOutcome, HandshakeState, RawIo, SecureChannel, TlsSession};
pub use config::{client_config, server_config};
pub use executor::TaskExecutor;
