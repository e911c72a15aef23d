//! Scenarios and stress workloads run by the driver

use std::{fmt, io::Write};

use itertools::Itertools;
use log::debug;

use crate::eval::{
    error::VmError,
    machine::vm::Vm,
    memory::{
        mutator::Mutator,
        object::{ObjectRef, Payload},
    },
};

use super::{
    error::DriverError,
    options::{Scenario, StressArgs},
};

/// Deep rendering of an object graph, stopping at back edges
pub struct Rendered<'vm> {
    vm: &'vm Vm,
    obj: ObjectRef,
}

pub fn render(vm: &Vm, obj: ObjectRef) -> Rendered<'_> {
    Rendered { vm, obj }
}

impl<'vm> Rendered<'vm> {
    fn write(
        &self,
        f: &mut fmt::Formatter<'_>,
        obj: ObjectRef,
        path: &mut Vec<ObjectRef>,
    ) -> fmt::Result {
        if path.contains(&obj) {
            return write!(f, "<cycle {}>", obj);
        }

        let object = match self.vm.get(obj) {
            Some(object) => object,
            None => return write!(f, "<freed {}>", obj),
        };

        match object.payload() {
            Payload::Integer(i) => write!(f, "{}", i),
            Payload::Float(x) => write!(f, "{:?}", x),
            Payload::String(s) => write!(f, "{:?}", s.as_str()),
            Payload::Vector3(components) => {
                path.push(obj);
                write!(f, "(")?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.write(f, *c, path)?;
                }
                path.pop();
                write!(f, ")")
            }
            Payload::Array(data) => {
                path.push(obj);
                write!(f, "[")?;
                for (i, slot) in data.slots().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match slot {
                        Some(item) => self.write(f, *item, path)?,
                        None => write!(f, "_")?,
                    }
                }
                path.pop();
                write!(f, "]")
            }
        }
    }
}

impl<'vm> fmt::Display for Rendered<'vm> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, self.obj, &mut vec![])
    }
}

fn expect(
    scenario: Scenario,
    expected: impl fmt::Display,
    observed: impl fmt::Display,
) -> Result<(), DriverError> {
    let expected = expected.to_string();
    let observed = observed.to_string();
    if expected == observed {
        Ok(())
    } else {
        Err(DriverError::UnexpectedOutcome {
            scenario: scenario.to_string(),
            expected,
            observed,
        })
    }
}

/// Run a named scenario, writing what was observed to `out`
pub fn run_scenario(
    vm: &mut Vm,
    scenario: Scenario,
    out: &mut dyn Write,
) -> Result<(), DriverError> {
    debug!("running scenario {}", scenario);
    match scenario {
        Scenario::RootedArray => rooted_array(vm, out),
        Scenario::Unrooted => unrooted(vm, out),
        Scenario::Addition => addition(vm, out),
        Scenario::Cycle => cycle(vm, out),
    }
}

fn rooted_array(vm: &mut Vm, out: &mut dyn Write) -> Result<(), DriverError> {
    let scenario = Scenario::RootedArray;
    vm.with_frame(|vm, frame| -> Result<(), DriverError> {
        let array = vm.new_array(2)?;
        vm.add_root(frame, array)?;
        let one = vm.new_integer(1)?;
        vm.array_set(array, 0, one)?;
        let two = vm.new_integer(2)?;
        vm.array_set(array, 1, two)?;

        let report = vm.collect_garbage();
        writeln!(out, "collected: {}", report)?;
        writeln!(out, "array {} = {}", array, render(vm, array))?;
        expect(scenario, "[1, 2]", render(vm, array))?;
        let values = [one, two].map(|i| vm.get(i).and_then(|o| o.as_integer()));
        expect(scenario, "[Some(1), Some(2)]", format!("{:?}", values))
    })
}

fn unrooted(vm: &mut Vm, out: &mut dyn Write) -> Result<(), DriverError> {
    let three = vm.new_integer(3)?;
    writeln!(out, "allocated {} = {}", three, render(vm, three))?;

    let report = vm.collect_garbage();
    writeln!(out, "collected: {}", report)?;
    writeln!(out, "integer {} live: {}", three, vm.is_live(three))?;
    expect(Scenario::Unrooted, false, vm.is_live(three))
}

fn addition(vm: &mut Vm, out: &mut dyn Write) -> Result<(), DriverError> {
    let scenario = Scenario::Addition;
    vm.with_frame(|vm, frame| -> Result<(), DriverError> {
        let ab = vm.new_string("ab")?;
        vm.add_root(frame, ab)?;
        let cd = vm.new_string("cd")?;
        vm.add_root(frame, cd)?;
        let abcd = vm.add(ab, cd)?;
        vm.add_root(frame, abcd)?;
        writeln!(out, "\"ab\" + \"cd\" = {}", render(vm, abcd))?;
        expect(scenario, "\"abcd\"", render(vm, abcd))?;

        let two = vm.new_integer(2)?;
        vm.add_root(frame, two)?;
        let half = vm.new_float(1.5)?;
        vm.add_root(frame, half)?;
        let sum = vm.add(two, half)?;
        vm.add_root(frame, sum)?;
        writeln!(out, "2 + 1.5 = {}", render(vm, sum))?;
        expect(scenario, "3.5", render(vm, sum))?;

        let left = vm.new_array(1)?;
        vm.add_root(frame, left)?;
        let one = vm.new_integer(1)?;
        vm.array_set(left, 0, one)?;
        let right = vm.new_array(1)?;
        vm.add_root(frame, right)?;
        vm.array_set(right, 0, two)?;
        let joined = vm.add(left, right)?;
        vm.add_root(frame, joined)?;
        writeln!(out, "[1] + [2] = {}", render(vm, joined))?;
        expect(scenario, "[1, 2]", render(vm, joined))?;

        let x = vm.new_string("x")?;
        vm.add_root(frame, x)?;
        match vm.add(one, x) {
            Err(e @ VmError::TypeMismatch(..)) => {
                writeln!(out, "1 + \"x\" failed: {}", e)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
            Ok(r) => expect(scenario, "type mismatch", render(vm, r)),
        }
    })
}

fn cycle(vm: &mut Vm, out: &mut dyn Write) -> Result<(), DriverError> {
    let scenario = Scenario::Cycle;
    let (own, left, right) = vm.with_frame(|vm, frame| -> Result<_, DriverError> {
        let own = vm.new_array(1)?;
        vm.add_root(frame, own)?;
        vm.array_set(own, 0, own)?;

        let left = vm.new_array(1)?;
        vm.add_root(frame, left)?;
        let right = vm.new_array(1)?;
        vm.array_set(left, 0, right)?;
        vm.array_set(right, 0, left)?;

        let report = vm.collect_garbage();
        writeln!(out, "rooted: {}", report)?;
        writeln!(out, "self-referential {} = {}", own, render(vm, own))?;
        writeln!(out, "mutual {} = {}", left, render(vm, left))?;
        expect(scenario, 3, report.survived)?;
        Ok((own, left, right))
    })?;

    let report = vm.collect_garbage();
    writeln!(out, "unrooted: {}", report)?;
    let live = [own, left, right].iter().map(|o| vm.is_live(*o)).join(" ");
    expect(scenario, "false false false", live)
}

/// Build a binary tree of arrays `depth` levels deep over vector
/// leaves, rooting every partial structure in a scoped frame while
/// it is built
pub fn build_tree(vm: &mut Vm, depth: usize, seed: i64) -> Result<ObjectRef, VmError> {
    vm.with_frame(|vm, frame| -> Result<ObjectRef, VmError> {
        if depth == 0 {
            let x = vm.new_integer(seed)?;
            vm.add_root(frame, x)?;
            let y = vm.new_float(seed as f64 / 2.0)?;
            vm.add_root(frame, y)?;
            let z = vm.new_string(format!("leaf-{}", seed))?;
            vm.add_root(frame, z)?;
            vm.new_vector3(x, y, z)
        } else {
            let node = vm.new_array(2)?;
            vm.add_root(frame, node)?;
            for i in 0..2 {
                let child = build_tree(vm, depth - 1, seed * 2 + i as i64)?;
                vm.array_set(node, i, child)?;
            }
            Ok(node)
        }
    })
}

/// Build and discard structures round by round, collecting as each
/// round's scope exits
pub fn run_stress(
    vm: &mut Vm,
    args: &StressArgs,
    out: &mut dyn Write,
) -> Result<(), DriverError> {
    for round in 0..args.rounds {
        vm.with_frame(|vm, frame| -> Result<(), DriverError> {
            let mut trees = Vec::with_capacity(args.objects);
            for i in 0..args.objects {
                let tree = build_tree(vm, args.depth, i as i64)?;
                vm.add_root(frame, tree)?;
                trees.push(tree);
            }

            if let &[first, second, ..] = trees.as_slice() {
                let joined = vm.add(first, second)?;
                vm.add_root(frame, joined)?;
            }

            for i in 0..args.garbage {
                vm.new_integer(i as i64)?;
            }

            let report = vm.collect_garbage();
            writeln!(out, "round {}: {}", round, report)?;

            if let Some(lost) = trees.iter().find(|t| !vm.is_live(**t)) {
                return Err(DriverError::UnexpectedOutcome {
                    scenario: format!("stress round {}", round),
                    expected: "rooted trees survive".to_string(),
                    observed: format!("{} was freed", lost),
                });
            }
            Ok(())
        })?;
    }

    let report = vm.collect_garbage();
    writeln!(out, "final: {}", report)?;
    expect_empty(vm)
}

fn expect_empty(vm: &Vm) -> Result<(), DriverError> {
    match vm.heap_stats().live {
        0 => Ok(()),
        live => Err(DriverError::UnexpectedOutcome {
            scenario: "stress".to_string(),
            expected: "empty heap".to_string(),
            observed: format!("{} live objects", live),
        }),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_render_cycle() {
        let mut vm = Vm::new();
        let a = vm.new_array(2).unwrap();
        let one = vm.new_integer(1).unwrap();
        vm.array_set(a, 0, a).unwrap();
        vm.array_set(a, 1, one).unwrap();
        assert_eq!(render(&vm, a).to_string(), format!("[<cycle {}>, 1]", a));
    }

    #[test]
    pub fn test_render_shared_is_not_cycle() {
        let mut vm = Vm::new();
        let one = vm.new_integer(1).unwrap();
        let half = vm.new_float(0.5).unwrap();
        let v = vm.new_vector3(one, half, one).unwrap();
        let a = vm.new_array(3).unwrap();
        vm.array_set(a, 0, v).unwrap();
        vm.array_set(a, 1, v).unwrap();
        assert_eq!(render(&vm, a).to_string(), "[(1, 0.5, 1), (1, 0.5, 1), _]");
    }

    /// Objects in a tree built by [`build_tree`]
    fn tree_size(depth: usize) -> usize {
        let leaves = 1usize << depth;
        leaves * 4 + (leaves - 1)
    }

    #[test]
    pub fn test_tree_size() {
        let mut vm = Vm::new();
        let frame = vm.new_frame();
        let tree = build_tree(&mut vm, 3, 0).unwrap();
        vm.add_root(frame, tree).unwrap();
        assert_eq!(vm.heap_stats().live, tree_size(3));
        assert_eq!(vm.collect_garbage().survived, tree_size(3));
        assert_eq!(vm.metrics().max_frames(), 5);
    }

    #[test]
    pub fn test_scenarios() {
        for scenario in [
            Scenario::RootedArray,
            Scenario::Unrooted,
            Scenario::Addition,
            Scenario::Cycle,
        ] {
            let mut vm = Vm::new();
            let mut out = vec![];
            run_scenario(&mut vm, scenario, &mut out).unwrap();
            assert!(!out.is_empty());
        }
    }

    #[test]
    pub fn test_stress_under_emergency_collection() {
        use crate::eval::machine::vm::VmSettings;

        let args = StressArgs {
            objects: 3,
            depth: 2,
            garbage: 50,
            rounds: 2,
        };
        let settings = VmSettings::default()
            .with_heap_limit(80)
            .with_emergency_collection();
        let mut vm = Vm::with_settings(settings);
        let mut out = vec![];
        run_stress(&mut vm, &args, &mut out).unwrap();
        assert!(vm.gc_stats().emergency_collections > 0);
        assert_eq!(vm.heap_stats().live, 0);
    }
}
