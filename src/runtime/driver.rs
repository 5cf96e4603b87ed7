//! Async driver for a runtime
//!
//! The runtime is `!Send`, so the loop runs on the thread that owns it
//! (a current-thread runtime or a `LocalSet`). Native events wake it up;
//! every batch is dispatched and then settled before waiting again.

use std::future::Future;

use super::Runtime;

/// Drives a [`Runtime`] from native events until shut down
pub struct EventLoop {
    runtime: Runtime,
}

impl EventLoop {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Give the runtime back
    pub fn into_runtime(self) -> Runtime {
        self.runtime
    }

    /// Dispatch native events and settle until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::debug!("Event loop started");

        loop {
            let passes = self.runtime.settle();
            if passes > 0 {
                tracing::trace!(passes = passes, "Digest settled");
            }

            let message = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                message = self.runtime.recv_native() => message,
            };

            let Some(message) = message else {
                tracing::warn!("Native event channel closed");
                break;
            };
            self.runtime.dispatch_native(message);
            self.runtime.process_native_events();
        }

        self.runtime.settle();
        tracing::debug!("Event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::media::{AccessUnit, AudioUnit};
    use crate::native::testing::NullBackend;
    use crate::native::NativeEvent;
    use crate::scope::EventKind;

    #[tokio::test]
    async fn test_events_dispatched_until_shutdown() {
        let mut rt = Runtime::new(Rc::new(NullBackend), RuntimeConfig::default());
        let id = rt.create(json!({"type": "thing"}), None).unwrap();
        rt.object_mut(&id).unwrap().sticky = true;
        let scope = rt.object(&id).unwrap().scope();

        // the third frame asks the loop to stop
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let stop_tx = RefCell::new(Some(stop_tx));
        let frames = Rc::new(RefCell::new(0));
        let counter = frames.clone();
        rt.on(scope, EventKind::Frame, move |_, _| {
            *counter.borrow_mut() += 1;
            if *counter.borrow() == 3 {
                if let Some(tx) = stop_tx.borrow_mut().take() {
                    let _ = tx.send(());
                }
            }
        });

        let sender = rt.event_sender(&id);
        let producer = std::thread::spawn(move || {
            for pts in 0..3 {
                let unit = AudioUnit::new(pts, bytes::Bytes::from_static(&[0x21]));
                assert!(sender.send(NativeEvent::Frame(AccessUnit::audio(unit))));
            }
        });

        let mut event_loop = EventLoop::new(rt);
        event_loop
            .run_until(async move {
                let _ = stop_rx.await;
            })
            .await;
        producer.join().unwrap();

        assert_eq!(*frames.borrow(), 3);
        assert!(event_loop.runtime().object(&id).is_some());
    }

    #[tokio::test]
    async fn test_settles_before_waiting() {
        let mut rt = Runtime::new(Rc::new(NullBackend), RuntimeConfig::default());
        let loose = rt.create(json!({"type": "loose"}), None).unwrap();

        let mut event_loop = EventLoop::new(rt);
        event_loop.run_until(async {}).await;

        assert!(event_loop.runtime().object(&loose).is_none());
        assert!(!event_loop.into_runtime().is_pending());
    }
}
