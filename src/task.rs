//! Background tasks
//!
//! Fire-and-poll work on a background thread. The render thread polls each
//! pending task once per frame; nothing blocks. On wasm there are no
//! threads, so the work runs inline and the result is ready on first poll.

#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc::{channel, Receiver, TryRecvError};
#[cfg(not(target_arch = "wasm32"))]
use std::thread;

/// Outcome of polling a task
#[derive(Debug)]
pub enum Poll<T> {
    Pending,
    Ready(T),
    /// The worker went away without sending (it panicked)
    Lost,
}

/// A handle to a pending background operation
pub struct AsyncOp<T> {
    #[cfg(not(target_arch = "wasm32"))]
    receiver: Receiver<T>,
    result: Option<T>,
    done: bool,
}

impl<T: Send + 'static> AsyncOp<T> {
    /// Run `work` off the render thread
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = channel();
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _ = sender.send(work());
        });
        if let Err(e) = spawned {
            log::warn!("failed to spawn {} worker: {}", name, e);
        }
        Self {
            receiver,
            result: None,
            done: false,
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn spawn<F>(_name: &str, work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            result: Some(work()),
            done: false,
        }
    }

    /// Check for completion and take the result once it arrives
    pub fn poll(&mut self) -> Poll<T> {
        if self.done {
            return Poll::Lost;
        }
        if let Some(result) = self.result.take() {
            self.done = true;
            return Poll::Ready(result);
        }

        self.try_receive()
    }

    /// Block until the result arrives (tests and shutdown only)
    pub fn wait(mut self) -> Option<T> {
        if let Some(result) = self.result.take() {
            return Some(result);
        }
        if self.done {
            return None;
        }
        self.receive_blocking()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn try_receive(&mut self) -> Poll<T> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.done = true;
                Poll::Ready(result)
            }
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.done = true;
                Poll::Lost
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn try_receive(&mut self) -> Poll<T> {
        self.done = true;
        Poll::Lost
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn receive_blocking(&mut self) -> Option<T> {
        self.receiver.recv().ok()
    }

    #[cfg(target_arch = "wasm32")]
    fn receive_blocking(&mut self) -> Option<T> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_arrives_once() {
        let op = AsyncOp::spawn("test", || 21 * 2);
        assert_eq!(op.wait(), Some(42));
    }

    #[test]
    fn test_poll_until_ready() {
        let mut op = AsyncOp::spawn("test", || "done".to_string());
        let result = loop {
            match op.poll() {
                Poll::Pending => std::thread::yield_now(),
                Poll::Ready(v) => break v,
                Poll::Lost => panic!("worker lost"),
            }
        };
        assert_eq!(result, "done");
        assert!(matches!(op.poll(), Poll::Lost));
    }

    #[test]
    fn test_panicking_worker_is_lost() {
        let mut op: AsyncOp<u32> = AsyncOp::spawn("test", || panic!("boom"));
        loop {
            match op.poll() {
                Poll::Pending => std::thread::yield_now(),
                Poll::Ready(_) => panic!("unexpected result"),
                Poll::Lost => break,
            }
        }
    }
}
