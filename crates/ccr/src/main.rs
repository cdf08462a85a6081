mod manager;
mod optman;

use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;

use cfront::file_dir::FileDir;

fn main() -> ExitCode {
    env_logger::init();
    let opts = optman::Opts::parse();

    // One mapped-file cache for the whole run; translation units otherwise
    // get fresh state.
    let fdir = Rc::new(FileDir::new());

    let mut ok = true;
    for path in &opts.files {
        ok &= manager::process_file(&opts, &fdir, path);
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
