// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic size/time batching.
//!
//! A [`BatchProcessor`] owns one worker running on a dedicated OS thread
//! with its own single-threaded runtime, so the host process never has to
//! provide one. Producers hand items over through a bounded channel with a
//! non-blocking [`send`](BatchProcessor::send); the worker flushes a batch
//! when it is full or when a timer anchored on the batch's first item fires,
//! whichever comes first.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Sizing and pacing of a [`BatchProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Maximum items per batch; also the input channel capacity.
    pub batch_size: usize,
    /// How long a non-empty batch may wait before being sent anyway.
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: 100,
            timeout: Duration::from_secs(5),
        }
    }
}

enum BatchMessage<T> {
    Item(T),
    Flush(std::sync::mpsc::Sender<()>),
    Shutdown(std::sync::mpsc::Sender<()>),
}

/// Size/time batcher with a single background worker.
pub struct BatchProcessor<T: Send + 'static> {
    sender: mpsc::Sender<BatchMessage<T>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl<T: Send + 'static> BatchProcessor<T> {
    /// Start the worker. `send_batch` is invoked on the worker thread with
    /// every non-empty batch.
    #[must_use]
    pub fn start(config: BatchConfig, send_batch: impl Fn(Vec<T>) + Send + 'static) -> Self {
        let capacity = config.batch_size.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = std::thread::Builder::new()
            .name("tracekit-batch".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(worker_loop(config, receiver, send_batch)),
                    Err(err) => {
                        tracing::warn!(%err, "failed to build batch worker runtime");
                    }
                }
            })
            .expect("failed to spawn batch worker thread");
        BatchProcessor {
            sender,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Enqueue an item without blocking. Returns `false` when the channel is
    /// full or the processor was shut down; the caller records the drop.
    #[must_use]
    pub fn send(&self, item: T) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        self.sender.try_send(BatchMessage::Item(item)).is_ok()
    }

    /// Drain the channel, send the pending batch, and wait for the worker's
    /// acknowledgement. Returns `false` when `timeout` elapsed first.
    #[must_use]
    pub fn flush(&self, timeout: Duration) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        let (ack, done) = std::sync::mpsc::channel();
        if !send_control(&self.sender, BatchMessage::Flush(ack), deadline) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        done.recv_timeout(remaining).is_ok()
    }

    /// Stop the worker, flushing any tail. Safe to call more than once.
    pub fn shutdown(&self, timeout: Duration) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let deadline = std::time::Instant::now() + timeout;
        let (ack, done) = std::sync::mpsc::channel();
        let mut acked = false;
        if send_control(&self.sender, BatchMessage::Shutdown(ack), deadline) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            acked = done.recv_timeout(remaining).is_ok();
        }
        let handle = self.worker.lock().expect("batch lock poisoned").take();
        if let Some(handle) = handle {
            if acked {
                let _ = handle.join();
            } else {
                tracing::debug!("batch worker detached after shutdown timeout");
            }
        }
    }
}

/// Push a control message into the bounded channel, retrying until the
/// deadline. Control messages compete with items for capacity, so a full
/// channel needs a brief wait for the worker to drain.
fn send_control<T: Send>(
    sender: &mpsc::Sender<BatchMessage<T>>,
    message: BatchMessage<T>,
    deadline: std::time::Instant,
) -> bool {
    let mut message = message;
    loop {
        match sender.try_send(message) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(returned)) => {
                if std::time::Instant::now() >= deadline {
                    return false;
                }
                message = returned;
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

async fn worker_loop<T: Send + 'static>(
    config: BatchConfig,
    mut receiver: mpsc::Receiver<BatchMessage<T>>,
    send_batch: impl Fn(Vec<T>),
) {
    let batch_size = config.batch_size.max(1);
    let mut batch: Vec<T> = Vec::with_capacity(batch_size);
    // The timer is anchored on the first item of an empty batch, never on
    // idle.
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            message = receiver.recv() => match message {
                Some(BatchMessage::Item(item)) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + config.timeout);
                    }
                    batch.push(item);
                    if batch.len() >= batch_size {
                        send_batch(std::mem::take(&mut batch));
                        deadline = None;
                    }
                }
                Some(BatchMessage::Flush(ack)) => {
                    let shutdown_ack =
                        drain_pending(&mut receiver, &mut batch, batch_size, &send_batch);
                    if !batch.is_empty() {
                        send_batch(std::mem::take(&mut batch));
                    }
                    deadline = None;
                    let _ = ack.send(());
                    if let Some(shutdown_ack) = shutdown_ack {
                        let _ = shutdown_ack.send(());
                        return;
                    }
                }
                Some(BatchMessage::Shutdown(ack)) => {
                    let late_ack =
                        drain_pending(&mut receiver, &mut batch, batch_size, &send_batch);
                    if !batch.is_empty() {
                        send_batch(std::mem::take(&mut batch));
                    }
                    let _ = ack.send(());
                    if let Some(late_ack) = late_ack {
                        let _ = late_ack.send(());
                    }
                    return;
                }
                // All senders gone: send the tail and stop.
                None => {
                    if !batch.is_empty() {
                        send_batch(std::mem::take(&mut batch));
                    }
                    return;
                }
            },
            () = timer => {
                if !batch.is_empty() {
                    send_batch(std::mem::take(&mut batch));
                }
                deadline = None;
            }
        }
    }
}

/// Drain buffered messages without waiting. A raced-in shutdown request is
/// returned to the caller so the worker can exit after acknowledging it.
fn drain_pending<T: Send>(
    receiver: &mut mpsc::Receiver<BatchMessage<T>>,
    batch: &mut Vec<T>,
    batch_size: usize,
    send_batch: &impl Fn(Vec<T>),
) -> Option<std::sync::mpsc::Sender<()>> {
    while let Ok(message) = receiver.try_recv() {
        match message {
            BatchMessage::Item(item) => {
                batch.push(item);
                if batch.len() >= batch_size {
                    send_batch(std::mem::take(batch));
                }
            }
            BatchMessage::Flush(ack) => {
                let _ = ack.send(());
            }
            BatchMessage::Shutdown(ack) => {
                return Some(ack);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    type Batches = Arc<Mutex<Vec<Vec<u32>>>>;

    fn collecting(config: BatchConfig) -> (BatchProcessor<u32>, Batches) {
        let batches: Batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let processor = BatchProcessor::start(config, move |batch| {
            sink.lock().unwrap().push(batch);
        });
        (processor, batches)
    }

    #[test]
    fn full_batch_is_sent_without_waiting_for_timer() {
        let (processor, batches) = collecting(BatchConfig {
            batch_size: 3,
            timeout: Duration::from_secs(60),
        });
        for i in 0..3 {
            assert!(processor.send(i));
        }
        // The worker needs a moment to pick the items up.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while batches.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![0, 1, 2]]);
        processor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn timer_fires_from_first_item() {
        let (processor, batches) = collecting(BatchConfig {
            batch_size: 100,
            timeout: Duration::from_millis(50),
        });
        assert!(processor.send(7));
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![7]]);
        processor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn flush_sends_partial_batch() {
        let (processor, batches) = collecting(BatchConfig {
            batch_size: 100,
            timeout: Duration::from_secs(60),
        });
        assert!(processor.send(1));
        assert!(processor.send(2));
        assert!(processor.flush(Duration::from_secs(2)));
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![1, 2]]);
        processor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn send_after_shutdown_returns_false() {
        let (processor, _batches) = collecting(BatchConfig::default());
        processor.shutdown(Duration::from_secs(1));
        assert!(!processor.send(1));
        // Repeated shutdown is a no-op.
        processor.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn shutdown_flushes_tail() {
        let (processor, batches) = collecting(BatchConfig {
            batch_size: 100,
            timeout: Duration::from_secs(60),
        });
        assert!(processor.send(9));
        processor.shutdown(Duration::from_secs(2));
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![9]]);
    }

    #[test]
    fn overflowing_channel_rejects_nonblockingly() {
        // A send callback that parks until released keeps the worker busy so
        // the channel can fill up.
        let release = Arc::new(AtomicBool::new(false));
        let released = Arc::clone(&release);
        let sent = Arc::new(AtomicUsize::new(0));
        let sent_inner = Arc::clone(&sent);
        let processor = BatchProcessor::start(
            BatchConfig {
                batch_size: 2,
                timeout: Duration::from_secs(60),
            },
            move |batch: Vec<u32>| {
                while !released.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                sent_inner.fetch_add(batch.len(), Ordering::SeqCst);
            },
        );
        // Enough sends to fill the worker's in-flight batch plus the channel.
        let mut accepted = 0;
        for i in 0..50 {
            if processor.send(i) {
                accepted += 1;
            }
        }
        assert!(accepted < 50, "channel never filled up");
        release.store(true, Ordering::SeqCst);
        assert!(processor.flush(Duration::from_secs(5)));
        processor.shutdown(Duration::from_secs(2));
        assert_eq!(sent.load(Ordering::SeqCst), accepted);
    }
}
