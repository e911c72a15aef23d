//! Object representation, allocation and garbage collection
pub mod array;
pub mod collect;
pub mod frame;
pub mod header;
pub mod heap;
pub mod mutator;
pub mod object;
pub mod registry;
pub mod string;
