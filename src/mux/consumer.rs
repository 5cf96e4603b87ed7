//! Delivery of one session's output to one consumer
//!
//! A consumer that joins mid-stream must see the init segment before any
//! other byte, and its first media chunk must start with a keyframe. After
//! a lag on the broadcast channel the consumer waits for the next keyframe
//! again; the init segment is never repeated.

use std::io::{self, Write};

use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::frame::MuxChunk;
use super::session::Subscription;

/// Where a consumer's bytes go (an HTTP response body, a file, a socket)
pub trait TransportSink {
    fn write(&mut self, data: &Bytes) -> io::Result<()>;

    /// The stream ended
    fn close(&mut self) {}
}

/// Sink over any [`std::io::Write`]
#[derive(Debug)]
pub struct WriteSink<W>(pub W);

impl<W: Write> TransportSink for WriteSink<W> {
    fn write(&mut self, data: &Bytes) -> io::Result<()> {
        self.0.write_all(data)
    }

    fn close(&mut self) {
        let _ = self.0.flush();
    }
}

/// Gates a session's chunks for one sink
#[derive(Debug)]
pub struct MuxConsumer<S> {
    sink: S,
    init: watch::Receiver<Option<Bytes>>,
    chunks: broadcast::Receiver<MuxChunk>,
    init_written: bool,
    synced: bool,
    bytes_written: u64,
}

impl<S: TransportSink> MuxConsumer<S> {
    pub fn new(subscription: Subscription, sink: S) -> Self {
        Self {
            sink,
            init: subscription.init,
            chunks: subscription.chunks,
            init_written: false,
            synced: false,
            bytes_written: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Bytes handed to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether output has started
    pub fn is_started(&self) -> bool {
        self.init_written
    }

    fn write(&mut self, data: &Bytes) -> io::Result<()> {
        self.sink.write(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Offer one chunk. Returns whether it was written.
    pub fn push(&mut self, chunk: &MuxChunk) -> io::Result<bool> {
        if !self.synced {
            if !chunk.keyframe {
                return Ok(false);
            }
            if !self.init_written {
                let Some(init) = self.init.borrow_and_update().clone() else {
                    return Ok(false);
                };
                if !init.is_empty() {
                    self.write(&init)?;
                }
                self.init_written = true;
            }
            self.synced = true;
        }

        self.write(&chunk.data)?;
        Ok(true)
    }

    /// Forward chunks until the session ends or the sink fails
    ///
    /// The sink is closed either way and handed back on success.
    pub async fn run(mut self) -> io::Result<S> {
        loop {
            match self.chunks.recv().await {
                Ok(chunk) => {
                    if let Err(err) = self.push(&chunk) {
                        tracing::debug!(error = %err, "Mux consumer sink failed");
                        self.sink.close();
                        return Err(err);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Mux consumer lagged, waiting for keyframe");
                    self.synced = false;
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::debug!(bytes = self.bytes_written, "Mux consumer finished");
        self.sink.close();
        Ok(self.sink)
    }
}
