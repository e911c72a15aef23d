//! Tagged heap objects and the handles that address them

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};

use super::{
    array::HeapArray,
    header::{Colour, ObjectHeader},
    string::HeapString,
};

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one heap (and so one VM)
///
/// Handles carry the id of the heap that minted them so that a
/// handle from one VM can never resolve in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    pub fn fresh() -> Self {
        HeapId(NEXT_HEAP_ID.fetch_add(1, SeqCst))
    }
}

/// Handle to an object in a heap
///
/// The generation changes whenever the slot is freed, so a handle to
/// a collected object no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    heap: HeapId,
    index: u32,
    generation: u32,
}

impl ObjectRef {
    pub(crate) fn new(heap: HeapId, index: u32, generation: u32) -> Self {
        ObjectRef {
            heap,
            index,
            generation,
        }
    }

    pub fn heap(&self) -> HeapId {
        self.heap
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Integer,
    Float,
    String,
    Vector3,
    Array,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Integer => "integer",
            ObjectKind::Float => "float",
            ObjectKind::String => "string",
            ObjectKind::Vector3 => "vector3",
            ObjectKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// Object contents
///
/// Vector3 and Array hold edges to other objects in the same heap.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Integer(i64),
    Float(f64),
    String(HeapString),
    Vector3([ObjectRef; 3]),
    Array(HeapArray),
}

impl Payload {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Payload::Integer(_) => ObjectKind::Integer,
            Payload::Float(_) => ObjectKind::Float,
            Payload::String(_) => ObjectKind::String,
            Payload::Vector3(_) => ObjectKind::Vector3,
            Payload::Array(_) => ObjectKind::Array,
        }
    }

    /// Outgoing edges, in order
    pub fn edges(&self) -> Box<dyn Iterator<Item = ObjectRef> + '_> {
        match self {
            Payload::Vector3(xyz) => Box::new(xyz.iter().copied()),
            Payload::Array(array) => Box::new(array.edges()),
            _ => Box::new(std::iter::empty()),
        }
    }
}

/// An object in the heap: collector header plus payload
///
/// Edges are fixed by the constructors and by `array_set`, which check
/// that every target is live. The payload cannot be rewritten from
/// outside the crate:
///
/// ```compile_fail
/// use tracevm::eval::memory::{heap::Heap, mutator::Mutator, object::Payload};
///
/// let mut heap = Heap::new();
/// let one = heap.new_integer(1).unwrap();
/// let v = heap.new_vector3(one, one, one).unwrap();
/// *heap.resolve_mut(v).unwrap().payload_mut() = Payload::Vector3([v, v, v]);
/// ```
#[derive(Debug, Clone)]
pub struct HeapObject {
    header: ObjectHeader,
    payload: Payload,
}

impl HeapObject {
    pub fn new(payload: Payload) -> Self {
        HeapObject {
            header: ObjectHeader::default(),
            payload,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    pub fn is_marked(&self) -> bool {
        self.header.is_marked()
    }

    pub fn colour(&self) -> Colour {
        self.header.colour()
    }

    pub fn edges(&self) -> Box<dyn Iterator<Item = ObjectRef> + '_> {
        self.payload.edges()
    }

    /// Integer and Float count as 1, String counts characters, Vector3
    /// is always 3 and Array counts slots (empty or not)
    pub fn length(&self) -> usize {
        match &self.payload {
            Payload::Integer(_) | Payload::Float(_) => 1,
            Payload::String(s) => s.char_len(),
            Payload::Vector3(_) => 3,
            Payload::Array(array) => array.len(),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.payload {
            Payload::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<[ObjectRef; 3]> {
        match self.payload {
            Payload::Vector3(xyz) => Some(xyz),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HeapArray> {
        match &self.payload {
            Payload::Array(array) => Some(array),
            _ => None,
        }
    }

    pub(crate) fn as_array_mut(&mut self) -> Option<&mut HeapArray> {
        match &mut self.payload {
            Payload::Array(array) => Some(array),
            _ => None,
        }
    }
}

/// Shallow rendering: edges are shown as handles
impl fmt::Display for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Integer(i) => write!(f, "{i}"),
            Payload::Float(x) => write!(f, "{x:?}"),
            Payload::String(s) => write!(f, "{s:?}"),
            Payload::Vector3([x, y, z]) => write!(f, "<{x}, {y}, {z}>"),
            Payload::Array(array) => {
                write!(f, "[")?;
                for (i, slot) in array.slots().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match slot {
                        Some(r) => write!(f, "{r}")?,
                        None => write!(f, "_")?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_lengths() {
        assert_eq!(HeapObject::new(Payload::Integer(4)).length(), 1);
        assert_eq!(HeapObject::new(Payload::Float(4.5)).length(), 1);
        let s = HeapString::from_str("abc").unwrap();
        assert_eq!(HeapObject::new(Payload::String(s)).length(), 3);
        let arr = HeapArray::with_size(5).unwrap();
        assert_eq!(HeapObject::new(Payload::Array(arr)).length(), 5);
    }

    #[test]
    pub fn test_edges() {
        let heap = HeapId::fresh();
        let r = |i| ObjectRef::new(heap, i, 0);
        let v = HeapObject::new(Payload::Vector3([r(1), r(2), r(3)]));
        assert_eq!(v.edges().collect::<Vec<_>>(), vec![r(1), r(2), r(3)]);
        assert_eq!(HeapObject::new(Payload::Integer(1)).edges().count(), 0);
    }

    #[test]
    pub fn test_display() {
        let heap = HeapId::fresh();
        let mut arr = HeapArray::with_size(2).unwrap();
        arr.set(1, ObjectRef::new(heap, 3, 1));
        let obj = HeapObject::new(Payload::Array(arr));
        assert_eq!(obj.to_string(), "[_, #3.1]");
        assert_eq!(HeapObject::new(Payload::Float(3.5)).to_string(), "3.5");
        assert_eq!(ObjectKind::Vector3.to_string(), "vector3");
    }
}
