use std::process::exit;

use structopt::StructOpt;

use phybayes::cli::{run, Opt};

pub fn main() {
    let opt = Opt::from_args();

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    exit(match run(opt) {
        Err(e) => {
            log::error!("{}", e);
            1
        }
        Ok(()) => 0,
    })
}
