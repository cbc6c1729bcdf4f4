//! Records with a stable identity.

/// A stored record addressed by id.
///
/// Two snapshots with the same id describe the same record, whatever their
/// flags, counters or secrets say at the moment they were read.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;

    fn is_same_record(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
