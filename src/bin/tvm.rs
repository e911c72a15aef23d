extern crate tracevm;

use std::process;

use structopt::{clap, StructOpt};

use tracevm::driver::options::TvmOptions;
use tracevm::driver::{eval, statistics::Statistics};

pub fn main() {
    env_logger::init();

    let opt = match TvmOptions::from_iter_safe(std::env::args_os()) {
        Ok(opt) => opt,
        Err(e) => match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => {
                println!("{}", e.message);
                process::exit(0)
            }
            _ => {
                eprintln!("{}", e.message);
                process::exit(2)
            }
        },
    };

    log::info!("tvm v{} running {:?}", env!("CARGO_PKG_VERSION"), opt.command);

    match eval::run(&opt) {
        Ok(statistics) => exit(&opt, 0, &statistics),
        Err(e) => {
            eprintln!("{e}");
            exit(&opt, 1, &Statistics::default())
        }
    }
}

/// Optionally dump stats to stderr then exit
pub fn exit(opts: &TvmOptions, code: i32, stats: &Statistics) {
    if opts.statistics() {
        eprintln!();
        eprintln!("~~~~~~~~~~");
        eprintln!("STATISTICS");
        eprintln!("~~~~~~~~~~");
        eprintln!();
        eprintln!("{stats}");
    }
    process::exit(code)
}
