//! Connection workers for the reference server.
//!
//! The server is connection-per-worker: a job is a whole client connection,
//! and the worker that picks it up stays with that client until it hangs up.
//! With every worker busy, newly accepted connections sit in the queue and
//! their clients see no hello reply until a worker frees up, which usually
//! ends in a request timeout on the client side. Size the pool for the number
//! of clients expected to stay connected at once.
use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use log::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<mpsc::Receiver<Job>>,
    busy: AtomicUsize,
}

pub struct WorkerPool {
    workers: Vec<thread::JoinHandle<()>>,
    queue: Option<mpsc::Sender<Job>>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Spawns `size` named worker threads; zero is raised to one.
    pub fn new(size: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(receiver),
            busy: AtomicUsize::new(0),
        });

        let workers = (0..size.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("eventdbx-worker-{id}"))
                    .spawn(move || work(id, &shared))
            })
            .collect::<io::Result<_>>()?;

        Ok(Self {
            workers,
            queue: Some(sender),
            shared,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Workers currently holding a connection.
    pub fn busy(&self) -> usize {
        self.shared.busy.load(Ordering::SeqCst)
    }

    pub fn is_saturated(&self) -> bool {
        self.busy() >= self.size()
    }

    /// Hands a connection to the next free worker. Returns `false` once every
    /// worker has exited.
    pub fn execute<F>(&self, connection: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .as_ref()
            .is_some_and(|queue| queue.send(Box::new(connection)).is_ok())
    }
}

fn work(id: usize, shared: &Shared) {
    loop {
        let next = match shared.queue.lock() {
            Ok(queue) => queue.recv(),
            Err(_) => return,
        };
        let Ok(connection) = next else {
            debug!("worker {id} stopping");
            return;
        };

        shared.busy.fetch_add(1, Ordering::SeqCst);
        connection();
        shared.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for WorkerPool {
    /// Closes the queue and waits for open connections to finish.
    fn drop(&mut self) {
        drop(self.queue.take());

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!("{name} panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Barrier, mpsc::RecvTimeoutError},
        time::Duration,
    };

    use super::*;

    #[test]
    fn every_queued_connection_is_served_before_shutdown() {
        let served = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.size(), 3);

        for _ in 0..10 {
            let served = Arc::clone(&served);
            assert!(pool.execute(move || {
                served.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(pool);

        assert_eq!(served.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn zero_size_still_has_a_worker() {
        assert_eq!(WorkerPool::new(0).unwrap().size(), 1);
    }

    #[test]
    fn extra_connection_waits_for_a_free_worker() {
        let pool = WorkerPool::new(2).unwrap();
        let held = Arc::new(Barrier::new(3));
        let release = Arc::new(Barrier::new(3));
        for _ in 0..2 {
            let (held, release) = (Arc::clone(&held), Arc::clone(&release));
            pool.execute(move || {
                held.wait();
                release.wait();
            });
        }
        held.wait();
        assert_eq!(pool.busy(), 2);
        assert!(pool.is_saturated());

        let (done, finished) = mpsc::channel();
        pool.execute(move || done.send(()).unwrap());
        assert_eq!(
            finished.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Timeout)
        );

        release.wait();
        finished.recv_timeout(Duration::from_secs(2)).unwrap();
    }
}
