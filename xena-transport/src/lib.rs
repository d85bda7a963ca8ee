use tokio::io::{AsyncRead, AsyncWrite};

mod tcp;
pub use tcp::*;

/// Byte stream to a chassis. Blanket-implemented for every suitable stream so that
/// connections can be type-erased.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens byte streams to a chassis. One stream is opened per chassis and kept for the
/// lifetime of the session.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Io: Io;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connects to `addr`, given as `host:port`.
    async fn connect(&self, addr: &str) -> Result<Self::Io, Self::Error>;
}
