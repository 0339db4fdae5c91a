//! Worker pool draining the task queue.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::queue::TaskQueue;
use super::report::PushReport;
use super::{Credentials, FailureRecord, PushOptions, PushResult, RunMode, Task};
use crate::device::DeviceFactory;
use crate::error::{PushError, UsageError};

/// Pushes a batch of tasks through a bounded pool of workers.
pub struct Pusher {
    factory: DeviceFactory,
    credentials: Arc<Credentials>,
    options: Arc<PushOptions>,
}

impl Pusher {
    /// Create a pusher.
    ///
    /// Fails with [`UsageError::NoWorkers`] for a pool of size zero.
    pub fn new(
        factory: DeviceFactory,
        credentials: Credentials,
        options: PushOptions,
    ) -> Result<Self, UsageError> {
        if options.workers == 0 {
            return Err(UsageError::NoWorkers);
        }

        Ok(Self {
            factory,
            credentials: Arc::new(credentials),
            options: Arc::new(options),
        })
    }

    /// Get the batch options.
    pub fn options(&self) -> &PushOptions {
        &self.options
    }

    /// Queue `tasks` and start the workers.
    ///
    /// Must be called within a tokio runtime. The pool never exceeds the
    /// number of tasks.
    pub fn start(&self, tasks: impl IntoIterator<Item = Task>) -> PushRun {
        self.start_queue(Arc::new(tasks.into_iter().collect()))
    }

    /// Start the workers on an already populated queue.
    ///
    /// The task set is closed once workers start: tasks pushed afterwards
    /// may be missed by workers that already found the queue empty.
    pub fn start_queue(&self, queue: Arc<TaskQueue>) -> PushRun {
        let total = queue.len();
        let workers = self.options.workers.min(total);

        info!(
            "Pushing to {} targets with {} workers ({:?}{})",
            total,
            workers,
            self.options.mode,
            if self.options.canary { ", canary" } else { "" }
        );

        let (results_tx, results) = mpsc::unbounded_channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();

        let handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    factory: self.factory.clone(),
                    credentials: self.credentials.clone(),
                    options: self.options.clone(),
                    results: results_tx.clone(),
                    failures: failures_tx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        PushRun {
            total,
            queue,
            handles,
            results,
            failures,
        }
    }

    /// Run `tasks` to completion.
    pub async fn run(&self, tasks: impl IntoIterator<Item = Task>) -> PushReport {
        self.start(tasks).finish().await
    }
}

/// Handle to a running batch.
pub struct PushRun {
    total: usize,
    queue: Arc<TaskQueue>,
    handles: Vec<JoinHandle<()>>,
    results: UnboundedReceiver<PushResult>,
    failures: UnboundedReceiver<FailureRecord>,
}

impl PushRun {
    /// Number of tasks in the batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of tasks no worker has taken yet.
    ///
    /// Zero does not mean done: the last tasks may still be in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of workers started.
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit and collect the outcomes.
    pub async fn finish(self) -> PushReport {
        let PushRun {
            handles,
            mut results,
            mut failures,
            ..
        } = self;

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Push worker did not complete: {}", e);
            }
        }

        let mut report = PushReport::default();
        while let Ok(result) = results.try_recv() {
            report.results.push(result);
        }
        while let Ok(failure) = failures.try_recv() {
            report.failures.push(failure);
        }

        info!(
            "Push finished: {} succeeded, {} failed",
            report.results.len(),
            report.failures.len()
        );
        report
    }
}

struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    factory: DeviceFactory,
    credentials: Arc<Credentials>,
    options: Arc<PushOptions>,
    results: UnboundedSender<PushResult>,
    failures: UnboundedSender<FailureRecord>,
}

impl Worker {
    async fn run(self) {
        while let Some(task) = self.queue.pop() {
            let target = task.target.clone();

            match self.process(task).await {
                Ok(output) => {
                    debug!("worker {}: {} done", self.id, target);
                    self.record_result(PushResult { target, output });
                }
                Err(error) => {
                    if let PushError::Panicked(message) = &error {
                        error!("{}: device session panicked: {}", target, message);
                    } else {
                        warn!("{}: {}", target, error);
                    }
                    self.record_failure(FailureRecord { target, error });
                }
            }
        }

        debug!("worker {}: queue empty, exiting", self.id);
    }

    /// Connect, run or apply, disconnect.
    ///
    /// Once connected, disconnect runs whatever the run or apply outcome,
    /// including a panic.
    async fn process(&self, task: Task) -> Result<String, PushError> {
        let mut device = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (self.factory)(&task.target)
        }))
        .map_err(|panic| PushError::Panicked(panic_message(&*panic)))?;

        guarded(device.connect(&self.credentials.username, &self.credentials.password)).await?;

        let outcome = match self.options.mode {
            RunMode::Command => guarded(device.run_command(&task.payload)).await,
            RunMode::Configuration => guarded(device.apply_config(
                &self.options.destination,
                &task.payload,
                self.options.canary,
            ))
            .await
            .map(|response| response.transcript),
        };

        if let Err(e) = guarded(device.disconnect()).await {
            debug!("{}: disconnect failed: {}", task.target, e);
        }

        outcome
    }

    fn record_result(&self, result: PushResult) {
        if self.results.send(result).is_err() {
            warn!("Result dropped: push run handle is gone");
        }
    }

    fn record_failure(&self, failure: FailureRecord) {
        if self.failures.send(failure).is_err() {
            warn!("Failure dropped: push run handle is gone");
        }
    }
}

/// Await a device call, turning a panic into [`PushError::Panicked`].
async fn guarded<T, E>(call: impl Future<Output = Result<T, E>>) -> Result<T, PushError>
where
    PushError: From<E>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result.map_err(PushError::from),
        Err(panic) => Err(PushError::Panicked(panic_message(&*panic))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::device::{ConfigResponse, Device};
    use crate::error::{ApplyConfigError, CommandError, ConnectError};

    /// What the fake devices do, per target.
    #[derive(Default)]
    struct Behavior {
        refuse: HashSet<String>,
        reject: HashSet<String>,
        fail_command: HashSet<String>,
        panic: HashSet<String>,
        fail_disconnect: HashSet<String>,
        delay: Duration,
        log: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Behavior {
        fn log(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    struct FakeDevice {
        host: String,
        behavior: Arc<Behavior>,
    }

    impl FakeDevice {
        async fn work(&self) {
            let now = self.behavior.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.behavior.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.behavior.delay).await;
            self.behavior.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn host(&self) -> &str {
            &self.host
        }

        async fn connect(
            &mut self,
            username: &str,
            _password: &SecretString,
        ) -> Result<(), ConnectError> {
            self.behavior.log(format!("connect {} as {}", self.host, username));
            if self.behavior.refuse.contains(&self.host) {
                return Err(ConnectError::Refused {
                    host: self.host.clone(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(())
        }

        async fn run_command(&mut self, command: &str) -> Result<String, CommandError> {
            self.work().await;
            if self.behavior.panic.contains(&self.host) {
                panic!("device {} exploded", self.host);
            }
            if self.behavior.fail_command.contains(&self.host) {
                return Err(CommandError::Failed {
                    command: command.to_string(),
                    message: "% Invalid input".to_string(),
                });
            }
            Ok(format!("{}: {}", self.host, command))
        }

        async fn apply_config(
            &mut self,
            destination: &str,
            data: &str,
            canary: bool,
        ) -> Result<ConfigResponse, ApplyConfigError> {
            self.work().await;
            self.behavior
                .log(format!("apply {} {} canary={}", self.host, destination, canary));
            if self.behavior.reject.contains(&self.host) {
                return Err(ApplyConfigError::Rejected {
                    line: data.to_string(),
                    message: "syntax error".to_string(),
                    transcript: String::new(),
                });
            }
            Ok(ConfigResponse::new(format!("{} <- {}", self.host, data), !canary))
        }

        async fn disconnect(&mut self) -> Result<(), ConnectError> {
            self.behavior.log(format!("disconnect {}", self.host));
            if self.behavior.fail_disconnect.contains(&self.host) {
                return Err(ConnectError::Refused {
                    host: self.host.clone(),
                    message: "connection reset".to_string(),
                });
            }
            Ok(())
        }
    }

    fn set(hosts: &[&str]) -> HashSet<String> {
        hosts.iter().map(|h| h.to_string()).collect()
    }

    fn pusher(behavior: &Arc<Behavior>, options: PushOptions) -> Pusher {
        let behavior = behavior.clone();
        let factory: DeviceFactory = Arc::new(move |host: &str| {
            Box::new(FakeDevice {
                host: host.to_string(),
                behavior: behavior.clone(),
            }) as Box<dyn crate::device::Device>
        });
        let credentials = Credentials::new("admin", SecretString::from("secret".to_string()));
        Pusher::new(factory, credentials, options).unwrap()
    }

    fn command_mode(workers: usize) -> PushOptions {
        PushOptions {
            workers,
            mode: RunMode::Command,
            ..Default::default()
        }
    }

    fn tasks(hosts: &[&str], payload: &str) -> Vec<Task> {
        hosts.iter().map(|h| Task::new(*h, payload)).collect()
    }

    fn hosts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("r{i}")).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_connect_failure_is_isolated() {
        let behavior = Arc::new(Behavior {
            refuse: set(&["B"]),
            ..Default::default()
        });

        let report = pusher(&behavior, command_mode(2))
            .run(tasks(&["A", "B", "C"], "show version"))
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.result_for("A").unwrap().output, "A: show version");
        assert_eq!(report.result_for("C").unwrap().output, "C: show version");

        let failure = report.failure_for("B").unwrap();
        assert_eq!(failure.error.kind(), "ConnectError");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_outcome_per_task() {
        for (n, workers) in [(0, 1), (1, 1), (10, 1), (10, 3), (10, 20), (25, 4)] {
            let behavior = Arc::new(Behavior {
                refuse: set(&["r1", "r7"]),
                fail_command: set(&["r2"]),
                ..Default::default()
            });
            let hosts = hosts(n);
            let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();

            let report = pusher(&behavior, command_mode(workers))
                .run(tasks(&hosts, "show clock"))
                .await;

            assert_eq!(report.len(), n, "n={n} workers={workers}");
            let mut seen: Vec<&str> = report
                .results
                .iter()
                .map(|r| r.target.as_str())
                .chain(report.failures.iter().map(|f| f.target.as_str()))
                .collect();
            seen.sort_unstable();
            let mut expected = hosts.clone();
            expected.sort_unstable();
            assert_eq!(seen, expected, "n={n} workers={workers}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_command_failure_is_recorded() {
        let behavior = Arc::new(Behavior {
            fail_command: set(&["A"]),
            ..Default::default()
        });

        let report = pusher(&behavior, command_mode(2))
            .run(tasks(&["A", "B"], "show bogus"))
            .await;

        let failure = report.failure_for("A").unwrap();
        assert!(matches!(
            failure.error,
            PushError::Command(CommandError::Failed { .. })
        ));
        assert!(report.result_for("B").is_some());
        // The session is still torn down after a failed command
        assert!(behavior.entries().contains(&"disconnect A".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_is_recorded_and_worker_continues() {
        let behavior = Arc::new(Behavior {
            panic: set(&["A"]),
            ..Default::default()
        });

        let report = pusher(&behavior, command_mode(1))
            .run(tasks(&["A", "B"], "show version"))
            .await;

        let failure = report.failure_for("A").unwrap();
        assert!(matches!(
            &failure.error,
            PushError::Panicked(message) if message == "device A exploded"
        ));
        assert_eq!(report.result_for("B").unwrap().output, "B: show version");

        // The panicked session is still torn down
        assert_eq!(
            behavior.entries(),
            [
                "connect A as admin",
                "disconnect A",
                "connect B as admin",
                "disconnect B"
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_failure_is_not_surfaced() {
        let behavior = Arc::new(Behavior {
            fail_disconnect: set(&["A", "B"]),
            fail_command: set(&["B"]),
            ..Default::default()
        });

        let report = pusher(&behavior, command_mode(2))
            .run(tasks(&["A", "B", "C"], "show version"))
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.result_for("A").unwrap().output, "A: show version");
        assert!(report.failure_for("A").is_none());
        assert!(matches!(
            report.failure_for("B").unwrap().error,
            PushError::Command(CommandError::Failed { .. })
        ));
        assert!(report.result_for("C").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_configuration_mode_passes_canary_through() {
        let behavior = Arc::new(Behavior {
            reject: set(&["B"]),
            ..Default::default()
        });
        let options = PushOptions {
            workers: 2,
            mode: RunMode::Configuration,
            canary: true,
            destination: "running-config".to_string(),
        };

        let report = pusher(&behavior, options)
            .run(tasks(&["A", "B"], "hostname x"))
            .await;

        assert_eq!(report.result_for("A").unwrap().output, "A <- hostname x");
        assert!(report.result_for("B").is_none());
        assert!(matches!(
            report.failure_for("B").unwrap().error,
            PushError::ApplyConfig(ApplyConfigError::Rejected { .. })
        ));

        let entries = behavior.entries();
        assert!(entries.contains(&"apply A running-config canary=true".to_string()));
        assert!(entries.contains(&"apply B running-config canary=true".to_string()));
        assert!(entries.contains(&"disconnect A".to_string()));
        assert!(entries.contains(&"disconnect B".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_only_after_successful_connect() {
        let behavior = Arc::new(Behavior {
            refuse: set(&["B"]),
            ..Default::default()
        });

        pusher(&behavior, command_mode(3))
            .run(tasks(&["A", "B", "C"], "show version"))
            .await;

        let entries = behavior.entries();
        assert!(entries.contains(&"connect A as admin".to_string()));
        assert!(entries.contains(&"connect B as admin".to_string()));
        assert!(entries.contains(&"disconnect A".to_string()));
        assert!(entries.contains(&"disconnect C".to_string()));
        assert!(!entries.contains(&"disconnect B".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let behavior = Arc::new(Behavior {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let hosts = hosts(12);
        let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();

        let report = pusher(&behavior, command_mode(3))
            .run(tasks(&hosts, "show version"))
            .await;

        assert_eq!(report.results.len(), 12);
        let max = behavior.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=3).contains(&max), "max in flight was {max}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_handle_progress() {
        let behavior = Arc::new(Behavior {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let hosts = hosts(6);
        let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();

        let run = pusher(&behavior, command_mode(2)).start(tasks(&hosts, "show version"));
        assert_eq!(run.total(), 6);
        assert_eq!(run.workers(), 2);
        assert!(run.pending() <= 6);

        let report = run.finish().await;
        assert_eq!(report.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_on_populated_queue() {
        let behavior = Arc::new(Behavior::default());
        let queue = Arc::new(TaskQueue::new());
        queue.push(Task::new("A", "show version"));
        queue.push(Task::new("B", "show version"));
        assert!(!queue.is_empty());

        let run = pusher(&behavior, command_mode(4)).start_queue(queue.clone());
        assert_eq!(run.total(), 2);
        assert_eq!(run.workers(), 2);

        let report = run.finish().await;
        assert_eq!(report.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pool_capped_at_task_count() {
        let behavior = Arc::new(Behavior::default());
        let run = pusher(&behavior, command_mode(20)).start(tasks(&["A", "B"], "show version"));
        assert_eq!(run.workers(), 2);
        assert_eq!(run.finish().await.len(), 2);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let factory: DeviceFactory = Arc::new(|host: &str| {
            Box::new(FakeDevice {
                host: host.to_string(),
                behavior: Arc::new(Behavior::default()),
            }) as Box<dyn crate::device::Device>
        });
        let credentials = Credentials::new("admin", SecretString::from("secret".to_string()));
        let result = Pusher::new(factory, credentials, command_mode(0));
        assert!(matches!(result, Err(UsageError::NoWorkers)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(&*payload), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
