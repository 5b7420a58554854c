//! This module orchestrates a suite run: one base engine per suite, one clone
//! per scenario.

use std::{
    fmt,
    hint::black_box,
    path::Path,
    time::{Duration, Instant},
};

use eyre::{bail, eyre, WrapErr};
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::{
    engine::Engine,
    fixtures,
    js::V8Engine,
    opts::Options,
    suite::{Scenario, Suite},
};

#[derive(Debug, Clone)]
pub struct Benchmarker {
    t0: Instant,
    last: Instant,
    enabled: bool,
}

impl Benchmarker {
    pub fn new(enabled: bool) -> Self {
        Self {
            t0: Instant::now(),
            last: Instant::now(),
            enabled,
        }
    }

    pub fn bm(&mut self, data: &str) {
        if self.enabled {
            println!("{:?}, {:?}: {data}", self.t0.elapsed(), self.last.elapsed());
        }
        self.last = Instant::now();
    }
}

impl Default for Benchmarker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub suite: String,
    pub library_load: Duration,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Passed { iterations: u32, mean: Duration },
    Failed(String),
}

impl Report {
    pub fn failed(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Failed(_)))
            .count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: libraries loaded in {:?}", self.suite, self.library_load)?;
        let lines = self.scenarios.iter().map(|s| match &s.outcome {
            Outcome::Passed { iterations, mean } => {
                format!("  ok    {} ({iterations} runs, {mean:?}/run)", s.name)
            }
            Outcome::Failed(reason) => format!("  FAIL  {}: {reason}", s.name),
        });
        write!(f, "{}", lines.format("\n"))
    }
}

pub fn run(opts: &Options) -> eyre::Result<Report> {
    let suite = match &opts.suite_file_path {
        Some(path) => Suite::from_file(path)?,
        None => Suite::react_013(),
    };
    run_suite(&suite, opts)
}

/// Runs every scenario of `suite`. A library that fails to load aborts the
/// run; a failing scenario is only recorded in the report.
#[instrument(skip_all, fields(suite = %suite.name))]
pub fn run_suite(suite: &Suite, opts: &Options) -> eyre::Result<Report> {
    let mut bm = Benchmarker::new(opts.show_bench);
    let assets = opts.assets_dir();

    let t = Instant::now();
    let mut base = V8Engine::new();
    for library in &suite.libraries {
        let source = fixtures::must_load_source(assets.join(library));
        base.load(&source)
            .wrap_err_with(|| format!("loading library {}", library.display()))?;
    }
    let library_load = t.elapsed();
    info!(?library_load, libraries = suite.libraries.len(), "libraries loaded");
    bm.bm("load libraries");

    let scenarios = suite
        .scenarios
        .iter()
        .map(|scenario| {
            let outcome = match run_scenario(&base, scenario, &assets, opts) {
                Ok(mean) => Outcome::Passed {
                    iterations: opts.iterations,
                    mean,
                },
                Err(err) => {
                    warn!(scenario = %scenario.name, "{err:#}");
                    Outcome::Failed(format!("{err:#}"))
                }
            };
            bm.bm(&scenario.name);
            ScenarioReport {
                name: scenario.name.clone(),
                outcome,
            }
        })
        .collect();

    Ok(Report {
        suite: suite.name.clone(),
        library_load,
        scenarios,
    })
}

/// Renders `scenario` on a clone of `base` and returns the mean render time.
#[instrument(skip_all, fields(scenario = %scenario.name))]
fn run_scenario(
    base: &V8Engine,
    scenario: &Scenario,
    assets: &Path,
    opts: &Options,
) -> eyre::Result<Duration> {
    let mut engine = base.try_clone()?;
    for path in &scenario.load {
        let source = fixtures::must_load_source(assets.join(path));
        engine
            .load(&source)
            .wrap_err_with(|| format!("loading {}", path.display()))?;
    }

    let rendered = engine.run_react(&scenario.script)?;
    scenario.expect.check(&rendered)?;

    let start = Instant::now();
    for _ in 0..opts.iterations {
        black_box(engine.run_react(black_box(&scenario.script))?);
    }
    let mean = start.elapsed() / opts.iterations.max(1);
    info!(?mean, iterations = opts.iterations, "rendered");

    let threads = opts.threads();
    if threads > 1 {
        let outputs = render_in_parallel(&engine, &scenario.script, threads)?;
        if let Some(other) = outputs.iter().find(|output| **output != rendered) {
            bail!("a parallel clone rendered {other} instead of {rendered}");
        }
    }
    Ok(mean)
}

/// Renders `script` once on each of `threads` clones of `engine`, each clone
/// owned by its own thread.
fn render_in_parallel(engine: &V8Engine, script: &str, threads: usize) -> eyre::Result<Vec<String>> {
    crossbeam::thread::scope(|s| {
        let handles = (0..threads)
            .map(|_| {
                let mut clone = engine.try_clone()?;
                Ok(s.spawn(move |_| clone.run_react(script)))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        handles
            .into_iter()
            .map(|handle| -> eyre::Result<String> {
                let rendered = handle.join().map_err(|_| eyre!("render thread panicked"))??;
                Ok(rendered)
            })
            .collect::<eyre::Result<Vec<_>>>()
    })
    .map_err(|_| eyre!("render thread panicked"))?
}
