//! Wire format of the Xena scripting protocol.
//!
//! The protocol is line oriented ASCII. A command is a single line of the form
//! `[<module>[/<port>]] <token> [\[<sub>\]] [args...]`, and every command is answered by
//! exactly one line, except bulk queries which are terminated by a [`SYNC`] round-trip.

pub mod codec;
pub mod command;
pub mod reply;

pub use codec::{Codec, Error};
pub use command::{is_printable, quote, Address, Command};
pub use reply::{DataLine, Reply};

/// The default TCP port of the chassis scripting interface.
pub const DEFAULT_PORT: u16 = 22611;

/// Command appended to bulk queries. The chassis echoes it as `<SYNC>` once every
/// preceding reply has been written, which marks the end of the block.
pub const SYNC: &str = "sync";
