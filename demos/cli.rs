//! Prints the codes read from a file, or from stdin when no path is given.
//!
//! `RUST_LOG=duet_gcode=debug cargo run --example cli -- job.gcode`

use std::fs::File;
use std::io::{self, Read};

use duet_gcode::{CodeParserBuffer, CodeStream, Error};
use futures::io::AllowStdIo;
use tracing_subscriber::prelude::*;

fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (input, is_file): (Box<dyn Read>, bool) = match std::env::args().nth(1) {
        Some(path) => (Box::new(File::open(path)?), true),
        None => (Box::new(io::stdin()), false),
    };

    let mut codes = CodeStream::new(AllowStdIo::new(input), CodeParserBuffer::new(8192, is_file));
    futures_executor::block_on(async {
        while let Some(code) = codes.next_code().await {
            match code {
                Ok(code) => println!("{code}"),
                Err(Error::Parse(e)) => eprintln!("{e}: {}", e.raw),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
}
