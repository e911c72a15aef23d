//! Header for all heap objects
//!
//! Carries the collector state of an object. Marking is tri-colour:
//! an unmarked object is white, a marked object still awaiting edge
//! expansion is grey, and a marked object whose edges have all been
//! visited is black.

use std::fmt;

use bitmaps::Bitmap;

#[derive(Debug, Default, Clone)]
pub struct HeaderBits(Bitmap<2>);

const MARK_BIT: usize = 0;
const GREY_BIT: usize = 1;

impl HeaderBits {
    fn mark(&mut self) {
        self.0.set(MARK_BIT, true);
    }

    fn clear(&mut self) {
        self.0.clone_from(&Bitmap::new());
    }

    fn is_marked(&self) -> bool {
        self.0.get(MARK_BIT)
    }

    fn set_grey(&mut self, grey: bool) {
        self.0.set(GREY_BIT, grey);
    }

    fn is_grey(&self) -> bool {
        self.0.get(GREY_BIT)
    }
}

/// Tri-colour view of the header bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    White,
    Grey,
    Black,
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::White => write!(f, "white"),
            Colour::Grey => write!(f, "grey"),
            Colour::Black => write!(f, "black"),
        }
    }
}

/// Object Header
///
/// Outside a collection every header is white.
#[derive(Debug, Default, Clone)]
pub struct ObjectHeader {
    bits: HeaderBits,
}

impl ObjectHeader {
    /// Mark live and queue for expansion (white -> grey)
    ///
    /// Returns false if the object was already marked.
    pub fn shade(&mut self) -> bool {
        if self.bits.is_marked() {
            false
        } else {
            self.bits.mark();
            self.bits.set_grey(true);
            true
        }
    }

    /// Record that all edges have been visited (grey -> black)
    pub fn blacken(&mut self) {
        debug_assert!(self.bits.is_marked());
        self.bits.set_grey(false);
    }

    /// Reset to white ready for the next cycle
    pub fn unmark(&mut self) {
        self.bits.clear();
    }

    pub fn is_marked(&self) -> bool {
        self.bits.is_marked()
    }

    pub fn colour(&self) -> Colour {
        match (self.bits.is_marked(), self.bits.is_grey()) {
            (false, _) => Colour::White,
            (true, true) => Colour::Grey,
            (true, false) => Colour::Black,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    pub fn test_expected_bitmap_size() {
        assert_eq!(size_of::<HeaderBits>(), 1);
    }

    #[test]
    pub fn test_colour_transitions() {
        let mut header = ObjectHeader::default();
        assert_eq!(header.colour(), Colour::White);
        assert!(header.shade());
        assert_eq!(header.colour(), Colour::Grey);
        assert!(!header.shade());
        header.blacken();
        assert_eq!(header.colour(), Colour::Black);
        assert!(header.is_marked());
        header.unmark();
        assert_eq!(header.colour(), Colour::White);
        assert!(!header.is_marked());
    }
}
