use std::{fmt, num::ParseIntError, str::FromStr};

use xena_wire::Address;

/// Hierarchical resource index, e.g. `module/port/stream`.
///
/// The index of a node always extends the index of its parent by one component (chassis
/// and session have the empty index), so the full address of a node is the index itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index(Vec<u32>);

impl Index {
    pub fn new(components: Vec<u32>) -> Self {
        Self(components)
    }

    /// The empty index of the session and of chassis nodes.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the index of a child at position `i` below this index.
    pub fn child(&self, i: u32) -> Self {
        let mut components = self.0.clone();
        components.push(i);
        Self(components)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// The last component, i.e. the position of the node among its siblings.
    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The positional command address for this index.
    pub fn address(&self) -> Address {
        Address::from_components(&self.0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(u32::to_string).collect::<Vec<_>>();
        f.write_str(&parts.join("/"))
    }
}

impl FromStr for Index {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }

        s.split('/').map(|c| c.trim().parse()).collect::<Result<_, _>>().map(Self)
    }
}
