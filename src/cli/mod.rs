pub mod args;

use clap::Parser;

pub use args::{Arguments, Sequencer};

pub fn parse() -> Arguments {
    Arguments::parse()
}
