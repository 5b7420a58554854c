use std::{env::args, process::ExitCode, time::Instant};

use react_bench::{driver, opts::Options};

fn main() -> eyre::Result<ExitCode> {
    tracing_subscriber::fmt::init();
    let time = Instant::now();

    let opts = match args().nth(1) {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };

    let report = driver::run(&opts)?;
    println!("{report}");
    println!("react-bench finished in {:?}", time.elapsed());

    Ok(if report.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
