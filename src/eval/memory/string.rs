//! Immutable heap string storage

use std::fmt;

use super::heap::HeapError;

/// UTF-8 string data owned by a heap object
///
/// The buffer is sized to the source exactly and released when the
/// owning object is swept.
#[derive(Clone, PartialEq, Eq)]
pub struct HeapString {
    data: Box<str>,
}

impl HeapString {
    /// Copy `source` into a freshly reserved buffer
    pub fn from_str(source: &str) -> Result<Self, HeapError> {
        let mut buffer = String::new();
        buffer.try_reserve_exact(source.len())?;
        buffer.push_str(source);
        Ok(HeapString {
            data: buffer.into_boxed_str(),
        })
    }

    /// Concatenate two strings into a new buffer
    pub fn concat(left: &HeapString, right: &HeapString) -> Result<Self, HeapError> {
        let length = left
            .byte_len()
            .checked_add(right.byte_len())
            .ok_or(HeapError::CapacityOverflow)?;
        let mut buffer = String::new();
        buffer.try_reserve_exact(length)?;
        buffer.push_str(left.as_str());
        buffer.push_str(right.as_str());
        Ok(HeapString {
            data: buffer.into_boxed_str(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.data.chars().count()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_length_counts_characters() {
        let s = HeapString::from_str("héllo").unwrap();
        assert_eq!(s.char_len(), 5);
        assert_eq!(s.byte_len(), 6);
    }

    #[test]
    pub fn test_concat() {
        let a = HeapString::from_str("ab").unwrap();
        let b = HeapString::from_str("cd").unwrap();
        assert_eq!(HeapString::concat(&a, &b).unwrap().as_str(), "abcd");
    }

    #[test]
    pub fn test_empty() {
        let s = HeapString::from_str("").unwrap();
        assert_eq!(s.char_len(), 0);
        assert_eq!(s.as_str(), "");
    }
}
