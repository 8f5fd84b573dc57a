//! Command stream
//!
//! An in-order command queue bound to one engine. Work enqueues without
//! blocking and executes on the stream's worker (the modeled device-side
//! command processor) in issued order. Results are only observable after an
//! explicit `synchronize`, which also surfaces any device-side failure
//! recorded since the last synchronization.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::backend::engine::Engine;
use crate::error::{PrimForgeError, PrimResult};

pub(crate) type Job = Box<dyn FnOnce() -> Result<(), String> + Send>;

enum Command {
    Run(Job),
    Sync(mpsc::Sender<()>),
}

/// Ordered device command queue
pub struct Stream {
    engine: Engine,
    tx: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl Stream {
    /// Create a stream on the given engine
    pub fn new(engine: &Engine) -> PrimResult<Self> {
        let (tx, rx) = mpsc::channel::<Command>();
        let fault = Arc::new(Mutex::new(None::<String>));
        let worker_fault = Arc::clone(&fault);

        let worker = std::thread::Builder::new()
            .name("primforge-stream".to_string())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        Command::Run(job) => {
                            if let Err(msg) = job() {
                                tracing::error!(%msg, "device-side command failed");
                                let mut slot = match worker_fault.lock() {
                                    Ok(slot) => slot,
                                    Err(poisoned) => poisoned.into_inner(),
                                };
                                // keep the first failure; later ones are noise
                                slot.get_or_insert(msg);
                            }
                        }
                        Command::Sync(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .map_err(|e| {
                PrimForgeError::RuntimeError(format!("failed to start stream worker: {}", e))
            })?;

        tracing::debug!(device = engine.device().name(), "created stream");
        Ok(Stream {
            engine: engine.clone(),
            tx: Some(tx),
            worker: Some(worker),
            fault,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Enqueue one command; returns as soon as the command is queued.
    pub(crate) fn enqueue(&self, job: Job) -> PrimResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            PrimForgeError::RuntimeError("stream has been shut down".to_string())
        })?;
        tx.send(Command::Run(job)).map_err(|_| {
            PrimForgeError::RuntimeError("stream worker terminated".to_string())
        })
    }

    /// Block until every previously enqueued command has completed.
    ///
    /// Any failure recorded by a command since the last synchronization is
    /// returned here as a runtime error.
    pub fn synchronize(&self) -> PrimResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            PrimForgeError::RuntimeError("stream has been shut down".to_string())
        })?;
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(Command::Sync(ack_tx)).map_err(|_| {
            PrimForgeError::RuntimeError("stream worker terminated".to_string())
        })?;
        ack_rx.recv().map_err(|_| {
            PrimForgeError::RuntimeError("stream worker terminated during synchronize".to_string())
        })?;

        let mut slot = self.fault.lock()?;
        match slot.take() {
            Some(msg) => Err(PrimForgeError::RuntimeError(msg)),
            None => Ok(()),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // closing the channel stops the worker after the queue drains
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.engine.device().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::engine::EngineKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn commands_run_in_issued_order() {
        let engine = Engine::new(EngineKind::Virtual).unwrap();
        let stream = Stream::new(&engine).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let log = Arc::clone(&log);
            stream
                .enqueue(Box::new(move || {
                    log.lock().unwrap().push(i);
                    Ok(())
                }))
                .unwrap();
        }
        stream.synchronize().unwrap();
        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn synchronize_surfaces_device_fault_once() {
        let engine = Engine::new(EngineKind::Virtual).unwrap();
        let stream = Stream::new(&engine).unwrap();
        stream
            .enqueue(Box::new(|| Err("bad launch".to_string())))
            .unwrap();
        let err = stream.synchronize().unwrap_err();
        assert!(matches!(err, PrimForgeError::RuntimeError(_)));
        // the fault is consumed; the stream is usable again
        stream.synchronize().unwrap();
    }

    #[test]
    fn enqueue_does_not_block_on_execution() {
        let engine = Engine::new(EngineKind::Virtual).unwrap();
        let stream = Stream::new(&engine).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            stream
                .enqueue(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }
        stream.synchronize().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
