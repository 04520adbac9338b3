//! Slot identifiers and the tagged head word used by slab-backed stacks.
//!
//! A [`TaggedIndex`] packs an optional [`SlotIndex`] and a [`Tag`] into a
//! single `u64` so both can be compared and swapped as one atomic unit.
//! The tag moves on every successful update, which turns a recycled slot
//! index back on top of a list into a distinct word.

use std::fmt;

/// Raw index value reserved to mean "no slot".
pub const NIL_INDEX: u32 = u32::MAX;

/// Index of a node slot within a preallocated slab.
///
/// Valid indices are `0..u32::MAX`; `u32::MAX` is reserved as the nil
/// marker inside packed words and is never a live slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    /// Decode a raw `next` link, mapping [`NIL_INDEX`] to `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != NIL_INDEX).then_some(Self(raw))
    }

    /// Encode an optional index as a raw link.
    pub fn to_raw(index: Option<Self>) -> u32 {
        index.map_or(NIL_INDEX, |i| i.0)
    }

    /// The index as a `usize`, for slab lookups.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Modification counter carried alongside a list head.
///
/// Wraps on overflow. A reader stalled across exactly 2^32 head updates
/// could see the same tag again; this bound is accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl Tag {
    /// The tag following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A list head: the top slot (if any) plus the modification tag.
///
/// Layout of the packed word: high 32 bits tag, low 32 bits index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaggedIndex {
    /// Top slot of the list, or `None` for an empty list.
    pub index: Option<SlotIndex>,
    /// Modification tag.
    pub tag: Tag,
}

impl TaggedIndex {
    /// An empty list head with tag zero.
    pub const EMPTY: Self = Self {
        index: None,
        tag: Tag(0),
    };

    /// Create a head word from its parts.
    pub fn new(index: Option<SlotIndex>, tag: Tag) -> Self {
        Self { index, tag }
    }

    /// Pack into a single `u64` suitable for an atomic word.
    pub fn pack(self) -> u64 {
        (u64::from(self.tag.0) << 32) | u64::from(SlotIndex::to_raw(self.index))
    }

    /// Unpack a word produced by [`pack`](Self::pack).
    pub fn unpack(word: u64) -> Self {
        Self {
            index: SlotIndex::from_raw(word as u32),
            tag: Tag((word >> 32) as u32),
        }
    }

    /// The head that replaces this one when `index` becomes the new top.
    ///
    /// Always advances the tag, so the result never equals `self` even
    /// when `index` is unchanged.
    pub fn successor(self, index: Option<SlotIndex>) -> Self {
        Self {
            index,
            tag: self.tag.next(),
        }
    }

    /// Whether the list is empty.
    pub fn is_nil(self) -> bool {
        self.index.is_none()
    }
}

impl Default for TaggedIndex {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for TaggedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{index}@{}", self.tag),
            None => write!(f, "nil@{}", self.tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_round_trips_through_raw() {
        assert_eq!(SlotIndex::from_raw(NIL_INDEX), None);
        assert_eq!(SlotIndex::to_raw(None), NIL_INDEX);
        assert_eq!(SlotIndex::from_raw(7), Some(SlotIndex(7)));
    }

    #[test]
    fn empty_head_packs_to_nil_index() {
        let word = TaggedIndex::EMPTY.pack();
        assert_eq!(word as u32, NIL_INDEX);
        assert!(TaggedIndex::unpack(word).is_nil());
    }

    #[test]
    fn successor_changes_word_even_for_same_index() {
        let head = TaggedIndex::new(Some(SlotIndex(3)), Tag(41));
        let again = head.successor(Some(SlotIndex(3)));
        assert_ne!(head.pack(), again.pack());
        assert_eq!(again.tag, Tag(42));
    }

    #[test]
    fn tag_wraps_instead_of_overflowing() {
        let head = TaggedIndex::new(None, Tag(u32::MAX));
        assert_eq!(head.successor(None).tag, Tag(0));
    }

    #[test]
    fn display_shows_index_and_tag() {
        let head = TaggedIndex::new(Some(SlotIndex(5)), Tag(9));
        assert_eq!(head.to_string(), "5@9");
        assert_eq!(TaggedIndex::EMPTY.to_string(), "nil@0");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pack_unpack_preserves_parts(index in 0u32..NIL_INDEX, tag in any::<u32>()) {
                let head = TaggedIndex::new(Some(SlotIndex(index)), Tag(tag));
                prop_assert_eq!(TaggedIndex::unpack(head.pack()), head);
            }

            #[test]
            fn distinct_tags_give_distinct_words(index in 0u32..NIL_INDEX, a in any::<u32>(), b in any::<u32>()) {
                prop_assume!(a != b);
                let x = TaggedIndex::new(Some(SlotIndex(index)), Tag(a));
                let y = TaggedIndex::new(Some(SlotIndex(index)), Tag(b));
                prop_assert_ne!(x.pack(), y.pack());
            }
        }
    }
}
