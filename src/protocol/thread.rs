use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};

/// One device session, labelled with the host it talks to.
struct Session {
    host: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

/// Fixed set of worker threads, each running whole device sessions from
/// connect to close. A session that panics is logged and its worker moves on
/// to the next host.
#[derive(Debug)]
pub struct SessionPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Session>>,
}

impl SessionPool {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);

        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .map(|id| Worker::spawn(id, Arc::clone(&receiver)))
            .collect();

        Self {
            workers,
            sender: Some(sender),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a session for `host`.
    pub fn execute<F>(&self, host: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let session = Session {
            host: host.to_string(),
            run: Box::new(f),
        };
        let sent = self.sender.as_ref().map(|sender| sender.send(session));
        if !matches!(sent, Some(Ok(()))) {
            warn!("session pool is shut down; {host} not polled");
        }
    }
}

impl Drop for SessionPool {
    /// Waits for queued sessions to finish.
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("stopping session worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("session worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Session>>>) -> Self {
        let thread = thread::spawn(move || {
            loop {
                let next = match receiver.lock() {
                    Ok(receiver) => receiver.recv(),
                    Err(_) => break,
                };
                let Ok(Session { host, run }) = next else {
                    debug!("session worker {id} idle, queue closed");
                    break;
                };

                debug!("session worker {id} polling {host}");
                if panic::catch_unwind(AssertUnwindSafe(run)).is_err() {
                    warn!("session for {host} panicked on worker {id}");
                }
            }
        });

        Self { id, thread }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_every_session_before_drop_returns() {
        let (tx, rx) = mpsc::channel();
        let pool = SessionPool::new(3);

        for i in 0..10 {
            let tx = tx.clone();
            pool.execute(&format!("10.0.0.{i}"), move || tx.send(i).unwrap());
        }
        drop(pool);
        drop(tx);

        let mut seen = rx.iter().collect::<Vec<_>>();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_session_keeps_worker() {
        let (tx, rx) = mpsc::channel();
        let pool = SessionPool::new(1);

        pool.execute("10.0.0.1", || panic!("device went away"));
        pool.execute("10.0.0.2", move || tx.send("10.0.0.2").unwrap());
        drop(pool);

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec!["10.0.0.2"]);
    }

    #[test]
    #[should_panic]
    fn zero_workers() {
        SessionPool::new(0);
    }
}
