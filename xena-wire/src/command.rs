use std::fmt;

use crate::Error;

/// Positional address of a command, derived from a resource index.
///
/// The first two index components (`module/port`) are written in front of the command
/// token, any remaining components are written as a bracketed sub-index after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    prefix: Option<String>,
    sub: Vec<u32>,
}

impl Address {
    /// The empty address, used by chassis-level commands.
    pub fn chassis() -> Self {
        Self::default()
    }

    /// Builds the address from the components of a hierarchical index.
    pub fn from_components(components: &[u32]) -> Self {
        let (head, tail) = components.split_at(components.len().min(2));
        let prefix = (!head.is_empty()).then(|| join(head, "/"));

        Self { prefix, sub: tail.to_vec() }
    }

    /// The `module` or `module/port` prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn sub_indices(&self) -> &[u32] {
        &self.sub
    }
}

/// A single protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    address: Address,
    token: String,
    args: Vec<String>,
}

impl Command {
    /// Creates a command without arguments. Tokens are case-insensitive on the wire and
    /// are kept lowercase here.
    pub fn new(address: Address, token: impl AsRef<str>) -> Self {
        Self { address, token: token.as_ref().to_ascii_lowercase(), args: Vec::new() }
    }

    /// Creates a query (`<token> ?`) for the given address.
    pub fn query(address: Address, token: impl AsRef<str>) -> Self {
        Self::new(address, token).arg("?")
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends all arguments, skipping empty ones.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into).filter(|a: &String| !a.is_empty()));
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns `true` if the command asks for a value rather than setting one.
    pub fn is_query(&self) -> bool {
        self.args.last().is_some_and(|a| a == "?")
    }

    /// Checks that the command fits on one protocol line.
    ///
    /// A line break inside an argument would reach the chassis as two commands and
    /// shift every later reply by one, so such commands are never written.
    pub fn validate(&self) -> Result<(), Error> {
        let printable = is_printable(&self.token) && self.args.iter().all(|a| is_printable(a));
        if printable {
            Ok(())
        } else {
            Err(Error::InvalidText(self.to_string()))
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.address.prefix() {
            write!(f, "{prefix} ")?;
        }

        f.write_str(&self.token)?;

        if !self.address.sub.is_empty() {
            write!(f, " [{}]", join(&self.address.sub, ","))?;
        }

        for arg in &self.args {
            write!(f, " {arg}")?;
        }

        Ok(())
    }
}

fn join(values: &[u32], separator: &str) -> String {
    let values: Vec<_> = values.iter().map(u32::to_string).collect();
    values.join(separator)
}

/// Returns `true` if `value` only holds printable ASCII, the only text the chassis
/// accepts.
pub fn is_printable(value: &str) -> bool {
    value.bytes().all(|b| (b' '..=b'~').contains(&b))
}

/// Wraps a free-text value in double quotes. The protocol has no escape sequence, so
/// embedded double quotes are replaced by single ones.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "'"))
}
