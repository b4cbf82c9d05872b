//! Run command: drive the scheduler to completion.

use super::select_scenarios;
use crate::cli::RunArgs;
use crate::config::{ScenarioDocument, Settings};
use crate::error::Result;
use crate::metrics::Summary;
use crate::runner::{
    JsonLinesSink, MemorySink, ProtocolRegistry, ReplaySource, ResultSink, ScenarioRunner,
    TestExecutor,
};
use crate::scheduler::{Scheduler, SchedulerOptions, SchedulerStatus, StopHandle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct RunOutput<'a> {
    status: &'a SchedulerStatus,
    evaluations: &'a BTreeMap<String, Summary>,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if a selected scenario is unknown, the measurements or
/// results file cannot be opened, or signal handlers cannot be installed.
pub fn execute(
    args: &RunArgs,
    document: &ScenarioDocument,
    settings: &Settings,
    json: bool,
) -> Result<()> {
    let scenarios = select_scenarios(document, &args.scenarios)?;

    let source = match &args.measurements {
        Some(path) => ReplaySource::from_path(path)?,
        None => ReplaySource::default(),
    };
    let sink: Box<dyn ResultSink> = match &args.results {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            info!(path = %path.display(), "Appending results");
            Box::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => Box::new(MemorySink::new()),
    };

    let runner = Arc::new(ScenarioRunner::new(Box::new(source), sink));
    let registry = ProtocolRegistry::with_builtin(Arc::clone(&runner) as Arc<dyn TestExecutor>);
    let mut scheduler = Scheduler::new(registry, SchedulerOptions::from(settings));

    #[cfg(unix)]
    let _signals = signals::SignalGuard::install(scheduler.stop_handle())?;

    scheduler.load(&scenarios);
    let status = scheduler.run();
    let evaluations = runner.summaries();

    if json {
        let output = RunOutput {
            status: &status,
            evaluations: &evaluations,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", status.render_table());
        for (scenario_id, summary) in &evaluations {
            println!(
                "{scenario_id}: {}/{} passed, {} errors ({:.1}%)",
                summary.passed_evaluations,
                summary.total_evaluations,
                summary.error_evaluations,
                summary.success_rate
            );
        }
    }
    Ok(())
}

/// Raise a stop handle on SIGINT or SIGTERM.
pub fn stop_on_signal(stop: &StopHandle) {
    tracing::warn!("Termination signal received, stopping after the current firing");
    stop.stop();
}

#[cfg(unix)]
mod signals {
    use super::stop_on_signal;
    use crate::scheduler::StopHandle;
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::{Handle, Signals};
    use std::io;
    use std::thread::JoinHandle;

    /// Forwards termination signals to a [`StopHandle`] until dropped.
    pub struct SignalGuard {
        handle: Handle,
        thread: Option<JoinHandle<()>>,
    }

    impl SignalGuard {
        pub fn install(stop: StopHandle) -> io::Result<Self> {
            let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(io::Error::other)?;
            let handle = signals.handle();
            let thread = std::thread::spawn(move || {
                for _ in signals.forever() {
                    stop_on_signal(&stop);
                }
            });
            Ok(Self {
                handle,
                thread: Some(thread),
            })
        }
    }

    impl Drop for SignalGuard {
        fn drop(&mut self) {
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
