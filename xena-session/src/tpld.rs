/// Hands out payload tag ids for new streams.
///
/// Ids are strictly increasing over the lifetime of the allocator, whether they are
/// assigned automatically, requested explicitly or discovered on a port, so two streams
/// created in the same session never share a tag. Once `u32::MAX` has been handed out
/// the automatic range is exhausted.
#[derive(Debug, Clone, Default)]
pub struct TpldAllocator {
    next: u64,
}

impl TpldAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: u32) -> Self {
        Self { next: u64::from(next) }
    }

    /// The id the next automatic assignment will return, or `None` once every id has
    /// been used.
    pub fn peek(&self) -> Option<u32> {
        u32::try_from(self.next).ok()
    }

    /// Returns `explicit` if given, the next free id otherwise, and moves past it.
    ///
    /// Returns `None` without changing state if no id was requested and the automatic
    /// range is exhausted.
    pub fn assign(&mut self, explicit: Option<u32>) -> Option<u32> {
        let id = match explicit {
            Some(id) => id,
            None => self.peek()?,
        };

        self.next = (self.next + 1).max(u64::from(id) + 1);
        Some(id)
    }

    /// Moves past ids that already exist on the chassis.
    pub fn observe(&mut self, ids: impl IntoIterator<Item = u32>) {
        if let Some(max) = ids.into_iter().max() {
            self.next = self.next.max(u64::from(max) + 1);
        }
    }
}
