//! Command line argument handling

use std::{fmt, str::FromStr};

use structopt::StructOpt;

use crate::eval::machine::vm::VmSettings;

use super::error::DriverError;

/// Built-in scenarios exercising allocation and collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Rooted array of two integers survives collection
    RootedArray,
    /// Unrooted integer is freed
    Unrooted,
    /// Addition across kinds
    Addition,
    /// Self-referential and mutually referential arrays
    Cycle,
}

impl Scenario {
    pub const NAMES: &'static [&'static str] = &["a", "b", "c", "cycle"];
}

impl FromStr for Scenario {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" => Ok(Scenario::RootedArray),
            "b" => Ok(Scenario::Unrooted),
            "c" => Ok(Scenario::Addition),
            "cycle" => Ok(Scenario::Cycle),
            _ => Err(DriverError::UnknownScenario(format!(
                "'{}' (expected one of {})",
                s,
                Scenario::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::RootedArray => "a",
            Scenario::Unrooted => "b",
            Scenario::Addition => "c",
            Scenario::Cycle => "cycle",
        };
        f.write_str(name)
    }
}

#[derive(StructOpt, Debug, Clone, PartialEq, Eq)]
pub struct StressArgs {
    /// Trees built and rooted per round
    #[structopt(long = "objects", default_value = "4")]
    pub objects: usize,
    /// Levels of binary arrays above the vector leaves
    #[structopt(long = "depth", default_value = "3")]
    pub depth: usize,
    /// Unrooted integers allocated per round
    #[structopt(long = "garbage", default_value = "1000")]
    pub garbage: usize,
    /// Number of build-and-collect rounds
    #[structopt(long = "rounds", default_value = "8")]
    pub rounds: usize,
}

impl Default for StressArgs {
    fn default() -> Self {
        StressArgs {
            objects: 4,
            depth: 3,
            garbage: 1000,
            rounds: 8,
        }
    }
}

#[derive(StructOpt, Debug, Clone)]
pub enum Command {
    /// Run a named scenario and print what was observed
    Scenario {
        /// One of a, b, c, cycle
        name: Scenario,
    },
    /// Build nested structures across scoped frames, collecting between
    /// rounds
    Stress(StressArgs),
}

/// tvm - drive the tracing VM
#[derive(StructOpt, Debug, Clone)]
#[structopt(name = "tvm")]
pub struct TvmOptions {
    /// Print metrics to stderr before exiting
    #[structopt(short = "S", long = "statistics")]
    pub statistics: bool,

    #[structopt(flatten)]
    pub vm_settings: VmSettings,

    #[structopt(subcommand)]
    pub command: Command,
}

impl TvmOptions {
    pub fn new(command: Command) -> Self {
        TvmOptions {
            statistics: false,
            vm_settings: VmSettings::default(),
            command,
        }
    }

    pub fn scenario(scenario: Scenario) -> Self {
        TvmOptions::new(Command::Scenario { name: scenario })
    }

    pub fn stress(args: StressArgs) -> Self {
        TvmOptions::new(Command::Stress(args))
    }

    pub fn with_vm_settings(self, vm_settings: VmSettings) -> Self {
        TvmOptions {
            vm_settings,
            ..self
        }
    }

    pub fn with_statistics(self) -> Self {
        TvmOptions {
            statistics: true,
            ..self
        }
    }

    pub fn statistics(&self) -> bool {
        self.statistics
    }
}
