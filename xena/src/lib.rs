#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Async client for Xena traffic-generator chassis.
//!
//! ```no_run
//! use xena::{Session, StreamState, DEFAULT_PASSWORD};
//!
//! # async fn run() -> Result<(), xena::Error> {
//! let mut session: Session = Session::default();
//! session.add_chassis("192.168.1.200", "lab", DEFAULT_PASSWORD).await?;
//!
//! let ports = session.reserve_ports(&["192.168.1.200/0/0", "192.168.1.200/0/1"], false).await?;
//! session.add_stream(ports[0], Some("video"), None, StreamState::Enabled).await?;
//!
//! session.start_traffic(&[]).await?;
//! session.stop_traffic(&[]).await?;
//! session.disconnect().await
//! # }
//! ```

pub use xena_session::*;
pub use xena_socket::{
    AttributeSource, Channel, ConnOptions, ConnStats, Connection, KeepAlive, DEFAULT_POLL_INTERVAL,
};
pub use xena_transport::{Config as TcpConfig, Tcp, Transport};
pub use xena_wire::{is_printable, quote, Address, Command, DataLine, Reply, DEFAULT_PORT};
