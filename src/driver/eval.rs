//! Run a command against a fresh VM
//!
//! Output goes to stdout unless overridden, which lets tests capture
//! what a run prints.
use std::{io::Write, time::Instant};

use log::debug;

use crate::{
    driver::{
        error::DriverError,
        options::{Command, TvmOptions},
        workload,
    },
    eval::machine::vm::Vm,
};

use super::statistics::Statistics;

/// Run the selected command and report statistics
pub fn run(opt: &TvmOptions) -> Result<Statistics, DriverError> {
    let mut executor = Executor::default();
    executor.execute(opt)
}

#[derive(Default)]
pub struct Executor<'a> {
    /// Overriden output stream
    out: Option<Box<dyn Write + 'a>>,
}

impl<'a> Executor<'a> {
    /// Provide an override stream to capture the output to stdout
    pub fn capture_output(&mut self, out: Box<dyn Write + 'a>) {
        self.out = Some(out);
    }

    /// Run the command in a new VM which is torn down before returning
    pub fn execute(&mut self, opt: &TvmOptions) -> Result<Statistics, DriverError> {
        let mut output: Box<dyn Write + '_> = match &mut self.out {
            Some(out) => Box::new(out),
            None => Box::new(std::io::stdout()),
        };

        let mut vm = Vm::with_settings(opt.vm_settings.clone());

        let t = Instant::now();
        let result = match &opt.command {
            Command::Scenario { name } => workload::run_scenario(&mut vm, *name, output.as_mut()),
            Command::Stress(args) => workload::run_stress(&mut vm, args, output.as_mut()),
        };
        let elapsed = t.elapsed();
        output.flush()?;

        vm.stop_clock();
        let mut stats = Statistics::from_vm(&vm);
        stats.timings_mut().record("run", elapsed);

        let teardown = vm.free();
        debug!(
            "released {} frames and {} objects at exit",
            teardown.frames, teardown.objects
        );

        result.map(|_| stats)
    }
}
