use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::{Command, Reply};

/// Replies longer than this are treated as a framing error. Capture packets are the
/// largest replies the chassis produces and stay well below it.
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Reply line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("Command {0:?} contains characters outside printable ASCII")]
    InvalidText(String),
}

/// Line codec. Encodes [`Command`]s terminated by `\r\n` and decodes one classified
/// [`Reply`] per received line.
#[derive(Debug, Default)]
pub struct Codec {
    /// Number of bytes already scanned for a line terminator.
    scanned: usize,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for Codec {
    type Item = Reply;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_LINE_LENGTH {
                return Err(Error::LineTooLong(MAX_LINE_LENGTH));
            }

            self.scanned = src.len();
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.scanned = 0;

        let line = src.split_to(end + 1);
        let line = line.strip_suffix(b"\n").unwrap_or(&line[..]);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        // Free text written by other tools may carry any encoding. The line still
        // answers exactly one command, so it is kept rather than failing the stream.
        let line = String::from_utf8_lossy(line);
        tracing::trace!(line = %line, "<-");

        Ok(Some(Reply::parse(&line)))
    }
}

impl Encoder<Command> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.validate()?;

        let line = item.to_string();
        tracing::trace!(line, "->");

        dst.reserve(line.len() + 2);
        dst.put(line.as_bytes());
        dst.put_slice(b"\r\n");

        Ok(())
    }
}
