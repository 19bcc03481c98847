// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::error::Error;
use std::fs;
use std::io;

use clap::{arg, Arg, ArgMatches, Command};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
//
use evmtaint::analysis::Engine;
use evmtaint::report::Report;
use evmtaint::util::FromHexString;

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("evmtaint")
        .about("EVM bytecode taint analyzer")
        .version("0.2.1")
        .arg(arg!(--verbose "Show verbose output"))
        .arg(Arg::new("file").required(true).help("File containing hex-encoded bytecode"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .help("Write the JSON report to a file instead of stdout"),
        )
        .get_matches();
    // Extract top-level flags
    let verbose = matches.is_present("verbose");
    // Initialise logging
    if verbose {
        init_logging(LevelFilter::Info);
    }
    // Run the analysis
    analyze(&matches)?;
    // Done
    Ok(())
}

/// Analyze the bytecode named on the command line and emit the JSON
/// report.
fn analyze(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let filename = args.get_one::<String>("file").unwrap();
    // Read the hex file, tolerating whitespace and an 0x prefix
    let contents = fs::read_to_string(filename)?;
    let mut hex = String::new();
    for line in contents.lines() {
        hex.push_str(line.trim());
    }
    let bytecode = hex.from_hex_string()?;
    // Run both analysis phases
    let mut engine = Engine::new(bytecode);
    let is_reported = engine.run()?;
    let report = Report::new(&engine, is_reported);
    // Emit the report
    match args.get_one::<String>("output") {
        Some(path) => report.write_pretty(fs::File::create(path)?)?,
        None => report.write_pretty(io::stdout().lock())?,
    }
    //
    Ok(())
}

/// Initialise logging using a suitable pattern.
pub fn init_logging(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    //
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(encoder))
        .build();
    //
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    //
    let _handle = log4rs::init_config(config).unwrap();
}
