//! Named build steps and their series/parallel composition.
//!
//! A [`Task`] is either a single named step or a composition of tasks:
//!
//! - [`Task::series`] runs children strictly in order and stops at the first
//!   failure, returning that error unchanged.
//! - [`Task::parallel`] runs every child concurrently on scoped threads. A
//!   failing branch does not cancel its siblings; once all branches have
//!   finished, the first failure (in declaration order) is returned.
//!
//! Tasks are generic over a context `C` that every step receives, so the same
//! graph can be driven by the real project or by a test double.

use std::thread;
use std::time::Instant;

use crate::types::ReleaseError;

type StepFn<C> = Box<dyn Fn(&C) -> Result<(), ReleaseError> + Send + Sync>;

/// A node in the task graph.
pub enum Task<C> {
    Step { name: String, run: StepFn<C> },
    Series { name: String, tasks: Vec<Task<C>> },
    Parallel { name: String, tasks: Vec<Task<C>> },
}

impl<C: Sync> Task<C> {
    /// A single named step.
    pub fn step<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&C) -> Result<(), ReleaseError> + Send + Sync + 'static,
    {
        Task::Step {
            name: name.into(),
            run: Box::new(run),
        }
    }

    /// Runs `tasks` one after another.
    pub fn series(name: impl Into<String>, tasks: Vec<Task<C>>) -> Self {
        Task::Series {
            name: name.into(),
            tasks,
        }
    }

    /// Runs `tasks` concurrently.
    pub fn parallel(name: impl Into<String>, tasks: Vec<Task<C>>) -> Self {
        Task::Parallel {
            name: name.into(),
            tasks,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Step { name, .. } | Task::Series { name, .. } | Task::Parallel { name, .. } => {
                name
            }
        }
    }

    /// Runs the task against `ctx`.
    pub fn run(&self, ctx: &C) -> Result<(), ReleaseError> {
        let started = Instant::now();
        log::info!("Starting '{}'...", self.name());

        let result = match self {
            Task::Step { run, .. } => run(ctx),
            Task::Series { tasks, .. } => tasks.iter().try_for_each(|task| task.run(ctx)),
            Task::Parallel { tasks, .. } => run_parallel(tasks, ctx),
        };

        match &result {
            Ok(()) => log::info!("Finished '{}' after {:.1?}", self.name(), started.elapsed()),
            Err(e) => log::error!(
                "'{}' errored after {:.1?}: {e}",
                self.name(),
                started.elapsed()
            ),
        }
        result
    }
}

fn run_parallel<C: Sync>(tasks: &[Task<C>], ctx: &C) -> Result<(), ReleaseError> {
    let results: Vec<Result<(), ReleaseError>> = thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .iter()
            .map(|task| (task.name(), scope.spawn(move || task.run(ctx))))
            .collect();
        handles
            .into_iter()
            .map(|(name, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(ReleaseError::TaskPanicked(name.to_string())))
            })
            .collect()
    });
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: &str) {
            self.events.lock().unwrap().push(event.to_string());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    fn ok_step(name: &'static str) -> Task<Recorder> {
        Task::step(name, move |rec: &Recorder| {
            rec.push(name);
            Ok(())
        })
    }

    fn failing_step(name: &'static str) -> Task<Recorder> {
        Task::step(name, move |rec: &Recorder| {
            rec.push(name);
            Err(ReleaseError::missing("STEP", name))
        })
    }

    #[test]
    fn test_series_runs_in_order() {
        let rec = Recorder::default();
        let task = Task::series("build", vec![ok_step("docs"), ok_step("ui"), ok_step("server")]);
        task.run(&rec).unwrap();
        assert_eq!(rec.events(), vec!["docs", "ui", "server"]);
    }

    #[test]
    fn test_series_stops_at_failure_and_propagates_error() {
        let rec = Recorder::default();
        let task = Task::series(
            "build",
            vec![ok_step("docs"), failing_step("ui"), ok_step("server")],
        );
        let err = task.run(&rec).unwrap_err();

        assert_eq!(rec.events(), vec!["docs", "ui"]);
        match err {
            ReleaseError::ConfigurationMissing { name, hint } => {
                assert_eq!(name, "STEP");
                assert_eq!(hint, "ui");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parallel_failure_does_not_cancel_sibling() {
        let rec = Recorder::default();
        let slow = Task::step("slow", |rec: &Recorder| {
            thread::sleep(Duration::from_millis(100));
            rec.push("slow-done");
            Ok(())
        });
        let task = Task::parallel("dev", vec![failing_step("fast"), slow]);

        let err = task.run(&rec).unwrap_err();
        assert!(matches!(err, ReleaseError::ConfigurationMissing { .. }));
        let events = rec.events();
        assert!(events.contains(&"fast".to_string()));
        assert!(events.contains(&"slow-done".to_string()));
    }

    #[test]
    fn test_parallel_runs_branches_concurrently() {
        let rec = Recorder::default();
        let branch = |name: &'static str| {
            Task::step(name, move |rec: &Recorder| {
                rec.push(&format!("{name}-start"));
                thread::sleep(Duration::from_millis(100));
                rec.push(&format!("{name}-end"));
                Ok(())
            })
        };
        Task::parallel("both", vec![branch("a"), branch("b")])
            .run(&rec)
            .unwrap();

        let events = rec.events();
        let first_end = events.iter().position(|e| e.ends_with("-end")).unwrap();
        let starts_before_end = events[..first_end]
            .iter()
            .filter(|e| e.ends_with("-start"))
            .count();
        assert_eq!(starts_before_end, 2);
    }

    #[test]
    fn test_nested_dev_graph_orders_docs_before_server() {
        let rec = Recorder::default();
        let dev = Task::parallel(
            "dev",
            vec![
                Task::series("dev:server", vec![ok_step("docs"), ok_step("server")]),
                ok_step("ui"),
            ],
        );
        dev.run(&rec).unwrap();

        let events = rec.events();
        let docs = events.iter().position(|e| e == "docs").unwrap();
        let server = events.iter().position(|e| e == "server").unwrap();
        assert!(docs < server);
        assert!(events.contains(&"ui".to_string()));
    }

    #[test]
    fn test_parallel_panic_is_reported() {
        let rec = Recorder::default();
        let task = Task::parallel(
            "p",
            vec![Task::step("boom", |_: &Recorder| panic!("boom")), ok_step("fine")],
        );
        let err = task.run(&rec).unwrap_err();
        assert!(matches!(err, ReleaseError::TaskPanicked(ref name) if name == "boom"));
        assert_eq!(rec.events(), vec!["fine"]);
    }
}
