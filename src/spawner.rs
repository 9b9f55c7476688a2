use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use log::{error, info};

use crate::error::{MacError, Result};

/// How long an idle worker waits for a task before checking its abort signal.
const IDLE_ABORT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// A worker that owns its state and is fed tasks over a channel.
pub trait SingleThreadTaskWorker {
    type Task;

    fn process(&mut self, task: Self::Task);

    /// Periodic work of a polling worker, run after each batch of tasks.
    fn maintainance(&mut self);

    /// Runs the worker on its own thread until `abort` is raised or every
    /// sender is dropped. Each task is processed as soon as it arrives. An
    /// idle worker checks `abort` every 10 ms.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    fn spawn(
        mut self,
        rx: TaskRx<Self::Task>,
        name: &str,
        abort: AbortSignal,
    ) -> std::io::Result<JoinHandle<()>>
    where
        Self: Sized + Send + 'static,
        Self::Task: Send + 'static,
    {
        let name = name.to_owned();
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!("worker {name} running");
                loop {
                    if abort.should_abort() {
                        break;
                    }
                    match rx.recv_timeout(IDLE_ABORT_CHECK_INTERVAL) {
                        Ok(task) => self.process(task),
                        Err(flume::RecvTimeoutError::Timeout) => {}
                        Err(flume::RecvTimeoutError::Disconnected) => {
                            info!("task channel of {name} closed");
                            break;
                        }
                    }
                }
                info!("worker {name} exited");
            })
    }

    /// Like [`spawn`](Self::spawn), but wakes up every `interval`, drains
    /// the channel and then runs [`maintainance`](Self::maintainance).
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    fn spawn_polling(
        mut self,
        rx: TaskRx<Self::Task>,
        name: &str,
        abort: AbortSignal,
        interval: Duration,
    ) -> std::io::Result<JoinHandle<()>>
    where
        Self: Sized + Send + 'static,
        Self::Task: Send + 'static,
    {
        let name = name.to_owned();
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!("worker {name} running");
                loop {
                    spin_sleep::sleep(interval);
                    if abort.should_abort() {
                        break;
                    }
                    for task in rx.try_iter() {
                        self.process(task);
                    }
                    self.maintainance();
                }
                info!("worker {name} exited");
            })
    }
}

pub struct TaskTx<T> {
    inner: flume::Sender<T>,
}

impl<T> TaskTx<T> {
    /// Queues a task for the worker.
    ///
    /// # Errors
    ///
    /// Returns [`MacError::WorkerStopped`] if the receiving side is gone.
    pub fn send(&self, task: T) -> Result<()> {
        self.inner.send(task).map_err(|_err| {
            error!("failed to send task to channel");
            MacError::WorkerStopped
        })
    }
}

impl<T> Clone for TaskTx<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct TaskRx<T> {
    inner: flume::Receiver<T>,
}

impl<T> TaskRx<T> {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<T, flume::RecvTimeoutError> {
        self.inner.recv_timeout(timeout)
    }

    fn try_iter(&self) -> flume::TryIter<'_, T> {
        self.inner.try_iter()
    }
}

pub fn task_channel<T>() -> (TaskTx<T>, TaskRx<T>) {
    let (tx, rx) = flume::unbounded();
    (TaskTx { inner: tx }, TaskRx { inner: rx })
}

/// Shared stop flag of one or more workers.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_abort(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    pub fn abort(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }
}
