use std::{
    sync::mpsc::{Receiver, sync_channel},
    thread::{self, JoinHandle},
};

use log::{debug, warn};

use crate::{Result, batch::Batch};

/// Runs a batch iterator on a background thread, keeping up to `depth` batches ready.
///
/// The order of the items is exactly the one of the wrapped iterator. Dropping the prefetcher
/// disconnects the channel, which stops the worker at its next send, and joins it.
pub struct Prefetcher {
    rx: Option<Receiver<Result<Batch>>>,
    worker: Option<JoinHandle<()>>,
}

impl Prefetcher {
    /// Spawns the worker thread.
    ///
    /// # Arguments
    /// * `batches` - The batch sequence to drive, usually a `BatchProducer`.
    /// * `depth` - The amount of batches buffered ahead of the consumer, at least one.
    ///
    /// # Returns
    /// A new `Prefetcher` instance.
    pub fn spawn<I>(batches: I, depth: usize) -> Self
    where
        I: Iterator<Item = Result<Batch>> + Send + 'static,
    {
        let (tx, rx) = sync_channel(depth.max(1));

        let worker = thread::spawn(move || {
            for item in batches {
                let failed = item.is_err();
                if tx.send(item).is_err() {
                    debug!("prefetch consumer went away");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Self {
            rx: Some(rx),
            worker: Some(worker),
        }
    }

    fn finish(&mut self) {
        self.rx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("prefetch worker panicked");
        }
    }
}

impl Iterator for Prefetcher {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.rx.as_ref()?.recv().ok();
        if item.is_none() {
            self.finish();
        }
        item
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.finish();
    }
}
