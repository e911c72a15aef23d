//! Addition over heap objects
//!
//! Integers add with wrapping, any float operand promotes the result
//! to float, strings and arrays concatenate, and vectors add
//! component-wise. Every result is a freshly allocated object.

use super::{
    error::VmError,
    memory::{
        array::HeapArray,
        mutator::Mutator,
        object::{ObjectRef, Payload},
        string::HeapString,
    },
};

/// What to build once the operands have been inspected
enum Sum {
    Ready(Payload),
    Componentwise([ObjectRef; 3], [ObjectRef; 3]),
}

pub fn add<M: Mutator + ?Sized>(
    mutator: &mut M,
    a: ObjectRef,
    b: ObjectRef,
) -> Result<ObjectRef, VmError> {
    let sum = {
        let left = mutator.require(a, "left operand")?.payload();
        let right = mutator.require(b, "right operand")?.payload();

        match (left, right) {
            (Payload::Integer(x), Payload::Integer(y)) => {
                Sum::Ready(Payload::Integer(x.wrapping_add(*y)))
            }
            (Payload::Integer(x), Payload::Float(y)) => Sum::Ready(Payload::Float(*x as f64 + *y)),
            (Payload::Float(x), Payload::Integer(y)) => Sum::Ready(Payload::Float(*x + *y as f64)),
            (Payload::Float(x), Payload::Float(y)) => Sum::Ready(Payload::Float(*x + *y)),
            (Payload::String(x), Payload::String(y)) => {
                Sum::Ready(Payload::String(HeapString::concat(x, y)?))
            }
            (Payload::Array(x), Payload::Array(y)) => {
                Sum::Ready(Payload::Array(HeapArray::concat(x, y)?))
            }
            (Payload::Vector3(x), Payload::Vector3(y)) => Sum::Componentwise(*x, *y),
            (x, y) => return Err(VmError::TypeMismatch(x.kind(), y.kind())),
        }
    };

    match sum {
        Sum::Ready(payload) => mutator.alloc(payload),
        Sum::Componentwise(x, y) => add_vector3(mutator, x, y),
    }
}

/// Add components pairwise, holding the operand components and each
/// intermediate result so an allocation-triggered collection cannot
/// reclaim them before the new vector refers to its components
fn add_vector3<M: Mutator + ?Sized>(
    mutator: &mut M,
    x: [ObjectRef; 3],
    y: [ObjectRef; 3],
) -> Result<ObjectRef, VmError> {
    for operand in x.iter().chain(y.iter()) {
        mutator.hold(*operand);
    }
    let mut held = x.len() + y.len();

    let mut components = [x[0]; 3];
    let mut failure = None;

    for i in 0..3 {
        match add(&mut *mutator, x[i], y[i]) {
            Ok(component) => {
                components[i] = component;
                mutator.hold(component);
                held += 1;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let result = match failure {
        Some(e) => Err(e),
        None => mutator.alloc(Payload::Vector3(components)),
    };

    mutator.release_held(held);
    result
}
