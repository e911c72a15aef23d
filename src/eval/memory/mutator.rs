//! Support mutator access to the heap
//!
//! Constructors, array access and value operations are provided
//! methods on [`Mutator`] so that they behave identically whether
//! used directly against a [`Heap`] or through a VM, which layers
//! metrics and emergency collection over allocation.

use crate::eval::{arith, error::VmError};

use super::{
    array::HeapArray,
    heap::Heap,
    object::{HeapObject, ObjectRef, Payload},
    string::HeapString,
};

/// Access to the heap as a mutator
pub trait Mutator {
    /// Allocate and register an object
    ///
    /// On failure nothing is registered.
    fn alloc(&mut self, payload: Payload) -> Result<ObjectRef, VmError>;

    fn resolve(&self, obj: ObjectRef) -> Option<&HeapObject>;

    fn resolve_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject>;

    /// Keep `obj` alive across subsequent allocations until released
    /// with [`Mutator::release_held`]
    fn hold(&mut self, _obj: ObjectRef) {}

    /// Drop the `count` most recently held objects
    fn release_held(&mut self, _count: usize) {}

    /// Resolve a required argument
    fn require(&self, obj: ObjectRef, role: &str) -> Result<&HeapObject, VmError> {
        self.resolve(obj).ok_or_else(|| {
            VmError::InvalidArgument(format!("{role} {obj} is not a live object in this vm"))
        })
    }

    fn new_integer(&mut self, value: i64) -> Result<ObjectRef, VmError> {
        self.alloc(Payload::Integer(value))
    }

    fn new_float(&mut self, value: f64) -> Result<ObjectRef, VmError> {
        self.alloc(Payload::Float(value))
    }

    /// Copy `value` into a new string object
    fn new_string<S: AsRef<str>>(&mut self, value: S) -> Result<ObjectRef, VmError>
    where
        Self: Sized,
    {
        let data = HeapString::from_str(value.as_ref())?;
        self.alloc(Payload::String(data))
    }

    /// A vector with edges to three existing objects
    fn new_vector3(
        &mut self,
        x: ObjectRef,
        y: ObjectRef,
        z: ObjectRef,
    ) -> Result<ObjectRef, VmError> {
        self.require(x, "vector3 x")?;
        self.require(y, "vector3 y")?;
        self.require(z, "vector3 z")?;
        self.alloc(Payload::Vector3([x, y, z]))
    }

    /// An array of `size` empty slots
    fn new_array(&mut self, size: usize) -> Result<ObjectRef, VmError> {
        let data = HeapArray::with_size(size)?;
        self.alloc(Payload::Array(data))
    }

    /// Edge at `index` of an array (`None` for an empty slot)
    fn array_get(&self, array: ObjectRef, index: usize) -> Result<Option<ObjectRef>, VmError> {
        let object = self.require(array, "array")?;
        let data = object
            .as_array()
            .ok_or_else(|| VmError::NotAnArray(object.kind()))?;
        data.get(index).ok_or(VmError::OutOfBounds {
            index,
            length: data.len(),
        })
    }

    /// Overwrite the edge at `index` of an array with `value`
    ///
    /// A rejected call leaves the array unchanged.
    fn array_set(
        &mut self,
        array: ObjectRef,
        index: usize,
        value: ObjectRef,
    ) -> Result<(), VmError> {
        self.require(value, "array element")?;
        let object = self.require(array, "array")?;
        let kind = object.kind();
        let data = self
            .resolve_mut(array)
            .and_then(HeapObject::as_array_mut)
            .ok_or(VmError::NotAnArray(kind))?;
        let length = data.len();
        if data.set(index, value) {
            Ok(())
        } else {
            Err(VmError::OutOfBounds { index, length })
        }
    }

    /// Integer and Float are 1, String is its character count, Vector3
    /// is 3 and Array is its slot count
    fn length(&self, obj: ObjectRef) -> Result<usize, VmError> {
        Ok(self.require(obj, "object")?.length())
    }

    /// Add two objects, allocating the result
    fn add(&mut self, a: ObjectRef, b: ObjectRef) -> Result<ObjectRef, VmError>
    where
        Self: Sized,
    {
        arith::add(self, a, b)
    }
}

/// Direct heap access without a VM: no metrics, no emergency
/// collection
impl Mutator for Heap {
    fn alloc(&mut self, payload: Payload) -> Result<ObjectRef, VmError> {
        self.allocate(payload).map_err(Into::into)
    }

    fn resolve(&self, obj: ObjectRef) -> Option<&HeapObject> {
        Heap::resolve(self, obj)
    }

    fn resolve_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject> {
        Heap::resolve_mut(self, obj)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_constructors_register() {
        let mut heap = Heap::new();
        let i = heap.new_integer(1).unwrap();
        let f = heap.new_float(2.5).unwrap();
        let s = heap.new_string("three").unwrap();
        let v = heap.new_vector3(i, f, s).unwrap();
        let a = heap.new_array(4).unwrap();
        assert_eq!(
            heap.registry().iter().collect::<Vec<_>>(),
            vec![i, f, s, v, a]
        );
        assert_eq!(heap.length(s).unwrap(), 5);
        assert_eq!(heap.length(v).unwrap(), 3);
        assert_eq!(heap.length(a).unwrap(), 4);
        assert_eq!(heap.length(i).unwrap(), 1);
    }

    #[test]
    pub fn test_vector3_rejects_dead_child() {
        let mut heap = Heap::new();
        let x = heap.new_integer(1).unwrap();
        let y = heap.new_integer(2).unwrap();
        let mut other = Heap::new();
        let foreign = other.new_integer(3).unwrap();
        let err = heap.new_vector3(x, y, foreign).unwrap_err();
        assert!(matches!(err, VmError::InvalidArgument(_)));
        assert_eq!(heap.live(), 2);
    }

    #[test]
    pub fn test_array_access() {
        let mut heap = Heap::new();
        let arr = heap.new_array(2).unwrap();
        let one = heap.new_integer(1).unwrap();
        assert_eq!(heap.array_get(arr, 0).unwrap(), None);
        heap.array_set(arr, 0, one).unwrap();
        assert_eq!(heap.array_get(arr, 0).unwrap(), Some(one));

        // overwrite replaces the edge
        let two = heap.new_integer(2).unwrap();
        heap.array_set(arr, 0, two).unwrap();
        assert_eq!(heap.array_get(arr, 0).unwrap(), Some(two));
    }

    #[test]
    pub fn test_array_access_failures() {
        let mut heap = Heap::new();
        let arr = heap.new_array(2).unwrap();
        let one = heap.new_integer(1).unwrap();
        heap.array_set(arr, 1, one).unwrap();

        assert!(matches!(
            heap.array_get(arr, 2),
            Err(VmError::OutOfBounds { index: 2, length: 2 })
        ));
        assert!(matches!(
            heap.array_set(arr, 5, one),
            Err(VmError::OutOfBounds { index: 5, length: 2 })
        ));
        assert!(matches!(
            heap.array_get(one, 0),
            Err(VmError::NotAnArray(_))
        ));
        assert!(matches!(
            heap.array_set(one, 0, one),
            Err(VmError::NotAnArray(_))
        ));

        let mut other = Heap::new();
        let foreign = other.new_integer(9).unwrap();
        assert!(matches!(
            heap.array_set(arr, 1, foreign),
            Err(VmError::InvalidArgument(_))
        ));

        // nothing changed
        assert_eq!(heap.array_get(arr, 0).unwrap(), None);
        assert_eq!(heap.array_get(arr, 1).unwrap(), Some(one));
    }

    #[test]
    pub fn test_array_set_self() {
        let mut heap = Heap::new();
        let arr = heap.new_array(1).unwrap();
        heap.array_set(arr, 0, arr).unwrap();
        assert_eq!(heap.array_get(arr, 0).unwrap(), Some(arr));
    }
}
