use clap::{Arg, ArgAction, Command};
use log::debug;
use std::time::Instant;

pub fn build_cli() -> Command {
    debug!("⚙️ Building CLI interface...");
    let start_time = Instant::now();
    let cmd = Command::new("vidcap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Background video capture from RealSense, USB cameras and video files, with on-demand recording.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("capture")
                .about("Runs the capture worker until Ctrl-C, the duration elapses or the source ends")
                .arg(Arg::new("record").long("record").help("Record from the first frame").action(ArgAction::SetTrue))
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("DIR")
                        .help("Output directory for recordings")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(Command::new("probe").about("Opens the configured source, reads one frame and reports what it negotiated"));
    debug!("✅ CLI interface built in {:?}", start_time.elapsed());
    cmd
}
