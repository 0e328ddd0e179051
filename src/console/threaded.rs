//! Worker-thread console reader, for consoles that cannot be polled.
//!
//! A dedicated thread blocks on one line at a time and publishes it into a
//! single shared slot, then signals the slot's event. The main loop waits on
//! that event for at most 1 ms. There is no queue: a line that arrives before
//! the previous one was consumed overwrites it.
use super::line::LineBuffer;
use super::{ConsoleError, ConsoleInput};
use std::io::{self, BufRead, BufReader};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WAIT_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Slot {
    line: LineBuffer,
    /// Event state. Set by the worker, reset by the consumer after reading.
    ready: bool,
    /// The worker hit end of input or a read error and exited.
    closed: bool,
    /// The consumer is gone; the worker exits after its current read.
    stopped: bool,
}

#[derive(Default)]
struct LineEvent {
    slot: Mutex<Slot>,
    signal: Condvar,
}

impl LineEvent {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a completed line. Returns false once the consumer has stopped.
    fn publish(&self, line: &LineBuffer) -> bool {
        let mut slot = self.lock();
        if slot.stopped {
            return false;
        }
        slot.line.clone_from(line);
        slot.ready = true;
        self.signal.notify_all();
        true
    }

    fn close(&self) {
        self.lock().closed = true;
        self.signal.notify_all();
    }
}

/// Console input fed by a background reader thread.
pub struct ThreadedConsole {
    event: Arc<LineEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedConsole {
    /// Start the worker over the process's standard input.
    pub fn stdin() -> Result<Self, ConsoleError> {
        Self::spawn(BufReader::new(io::stdin()))
    }

    /// Start the worker over an arbitrary line source.
    pub fn spawn<R>(reader: R) -> Result<Self, ConsoleError>
    where
        R: BufRead + Send + 'static,
    {
        let event = Arc::new(LineEvent::default());
        let shared = Arc::clone(&event);
        let worker = thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || read_loop(reader, &shared))
            .map_err(|e| ConsoleError::Worker { source: e })?;

        tracing::info!("console input thread started");
        Ok(Self {
            event,
            worker: Some(worker),
        })
    }

    #[cfg(test)]
    fn worker_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }
}

fn read_loop<R: BufRead>(mut reader: R, event: &LineEvent) {
    let mut line = LineBuffer::new();
    loop {
        match line.read_from(&mut reader) {
            Ok(true) => {
                if !event.publish(&line) {
                    return;
                }
            }
            Ok(false) => {
                tracing::info!("console input reached end of stream");
                event.close();
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "console input thread failed to read");
                event.close();
                return;
            }
        }
    }
}

impl ConsoleInput for ThreadedConsole {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn input_waiting(&mut self) -> bool {
        let slot = self.event.lock();
        if slot.ready {
            return true;
        }
        let (slot, _) = self
            .event
            .signal
            .wait_timeout_while(slot, WAIT_TIMEOUT, |s| !s.ready && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        slot.ready
    }

    fn read_line(&mut self, line: &mut LineBuffer) -> Result<bool, ConsoleError> {
        let mut slot = self.event.lock();
        if !slot.ready {
            return Ok(false);
        }
        line.clone_from(&slot.line);
        slot.ready = false;
        Ok(true)
    }

    fn is_closed(&self) -> bool {
        let slot = self.event.lock();
        slot.closed && !slot.ready
    }

    /// The worker may be parked in a blocking read that cannot be
    /// interrupted, so it is detached rather than joined. It exits on its
    /// next completed line or at end of input.
    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.event.lock().stopped = true;
            drop(worker);
            tracing::info!("console input thread shut down");
        }
    }
}

impl Drop for ThreadedConsole {
    fn drop(&mut self) {
        self.shutdown();
    }
}
