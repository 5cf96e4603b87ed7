//! Runtime side of the native hand-off

use std::rc::Rc;

use tokio::sync::mpsc::error::TryRecvError;

use super::{
    EventSender, Generation, HookId, InstanceId, LogLevel, NativeEvent, NativeHandle, NativeMessage,
    ResourceKind, ResourceRequest, SourceSlot,
};
use crate::runtime::Runtime;
use crate::scope::Event;
use crate::store::ObjectId;

/// Native handle owned by an object
#[derive(Default)]
pub(crate) struct NativeSlot {
    handle: Option<Box<dyn NativeHandle>>,
    generation: Option<Generation>,
}

impl Runtime {
    /// Sending end of the hand-off queue for `owner`
    ///
    /// The sender is not bound to a native start. Its events are only
    /// delivered while `owner` has no native resource running.
    pub fn event_sender(&self, owner: &ObjectId) -> EventSender {
        EventSender::new(owner.clone(), None, self.native_tx.clone())
    }

    /// Dispatch every queued native event. Returns how many were handled.
    pub fn process_native_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.native_rx.try_recv() {
                Ok(message) => {
                    self.dispatch_native(message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Wait for the next native event
    ///
    /// The runtime keeps a sender of its own, so this only returns `None`
    /// if that invariant is broken.
    pub async fn recv_native(&mut self) -> Option<NativeMessage> {
        self.native_rx.recv().await
    }

    pub fn dispatch_native(&mut self, message: NativeMessage) {
        let NativeMessage {
            owner,
            generation,
            event,
        } = message;

        let Some(obj) = self.object(&owner) else {
            tracing::trace!(obj = %owner, "Dropping native event for destroyed object");
            return;
        };

        let current = obj.ext.get::<NativeSlot>().and_then(|slot| slot.generation);
        if generation != current {
            tracing::debug!(
                obj = %owner,
                generation = ?generation,
                current = ?current,
                "Dropping native event from a stale instance"
            );
            return;
        }
        let scope = obj.scope();

        match event {
            NativeEvent::Headers(unit) => {
                self.mark();
                self.emit(scope, &Event::Headers(unit));
            }
            NativeEvent::Frame(unit) => {
                self.emit(scope, &Event::Frame(unit));
            }
            NativeEvent::Failure(reason) => {
                self.fatal(&owner, format!("native resource failed: {reason}"));
            }
            NativeEvent::Stalled(frames) => {
                tracing::warn!(obj = %owner, frames = frames, "Native resource stalled");
            }
            NativeEvent::Log(level, line) => match level {
                LogLevel::Trace => tracing::trace!(obj = %owner, "{}", line),
                LogLevel::Debug => tracing::debug!(obj = %owner, "{}", line),
                LogLevel::Info => tracing::info!(obj = %owner, "{}", line),
                LogLevel::Warn => tracing::warn!(obj = %owner, "{}", line),
                LogLevel::Error => tracing::error!(obj = %owner, "{}", line),
            },
        }
    }

    /// Start the native resource for `owner`
    ///
    /// A refusal is a resource failure: the object gets its error flag set.
    pub fn start_native(
        &mut self,
        owner: &ObjectId,
        kind: ResourceKind,
        clock: Option<InstanceId>,
    ) -> bool {
        let Some(cfg) = self.object(owner).map(|obj| obj.cfg.clone()) else {
            return false;
        };
        self.native_generation += 1;
        let generation = Generation(self.native_generation);
        let events = EventSender::new(owner.clone(), Some(generation), self.native_tx.clone());
        let backend = Rc::clone(&self.backend);

        let request = ResourceRequest {
            owner,
            kind,
            cfg: &cfg,
            clock,
        };
        match backend.start(request, events) {
            Ok(handle) => {
                tracing::debug!(
                    obj = %owner,
                    kind = %kind,
                    instance = handle.instance_id().0,
                    "Native resource started"
                );
                if let Some(obj) = self.object_mut(owner) {
                    obj.ext.insert(NativeSlot {
                        handle: Some(handle),
                        generation: Some(generation),
                    });
                } else {
                    handle.destroy();
                }
                self.mark();
                true
            }
            Err(err) => {
                self.fatal(owner, err);
                false
            }
        }
    }

    /// Destroy the native resource of `owner`, if any
    pub fn stop_native(&mut self, owner: &ObjectId) {
        let handle = self
            .object_mut(owner)
            .and_then(|obj| obj.ext.get_mut::<NativeSlot>())
            .and_then(|slot| {
                slot.generation = None;
                slot.handle.take()
            });

        if let Some(handle) = handle {
            tracing::debug!(obj = %owner, instance = handle.instance_id().0, "Native resource stopped");
            handle.destroy();
            self.mark();
        }
    }

    /// Instance id of the running native resource of `owner`
    pub fn native_instance(&self, owner: &ObjectId) -> Option<InstanceId> {
        self.object(owner)
            .and_then(|obj| obj.ext.get::<NativeSlot>())
            .and_then(|slot| slot.handle.as_ref())
            .map(|handle| handle.instance_id())
    }

    pub(crate) fn native_set_sources(&mut self, owner: &ObjectId, sources: &[SourceSlot]) {
        if let Some(handle) = self.native_handle_mut(owner) {
            handle.set_sources(sources);
        }
    }

    pub(crate) fn native_set_hooks(&mut self, owner: &ObjectId, hooks: &[HookId]) {
        if let Some(handle) = self.native_handle_mut(owner) {
            handle.set_hooks(hooks);
        }
    }

    fn native_handle_mut(&mut self, owner: &ObjectId) -> Option<&mut Box<dyn NativeHandle>> {
        self.object_mut(owner)
            .and_then(|obj| obj.ext.get_mut::<NativeSlot>())
            .and_then(|slot| slot.handle.as_mut())
    }
}
