use std::{io, process::exit};

use structopt::StructOpt;
use tfgraph_cli::Opt;

fn main() {
    env_logger::init();

    let opt = Opt::from_args();

    #[cfg(feature = "tensorflow")]
    let engine = tfgraph_session_tf::TfEngine::new();
    #[cfg(not(feature = "tensorflow"))]
    let engine = tfgraph_cli::NoEngine;

    let stdin = io::stdin();
    let stdout = io::stdout();
    if let Err(e) = tfgraph_cli::run(opt, &engine, &mut stdin.lock(), &mut stdout.lock()) {
        log::error!("{e}");
        exit(1);
    }
}
