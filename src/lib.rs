//! # livecast
//!
//! Control core of a live broadcasting server: a reactive object graph that
//! starts and stops native mixing resources on demand, and the muxers that
//! turn a mixer's output into Matroska or MPEG-TS streams.
//!
//! ```text
//!   ConfigTree ──► Runtime (ScopeGraph + ObjectStore)
//!                    │  resolve / activation / gc
//!                    ▼
//!   NativeBackend ◄── sources, clocks, video/audio mixers
//!        │
//!        └──(mpsc)──► EventLoop ──► mixer frame listeners
//!                                        │
//!                                  MuxerService ──► MuxConsumer ──► sink
//! ```
//!
//! The runtime is single-threaded. Native engines run on their own threads
//! and only ever hold an [`EventSender`].
//!
//! ## Example
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use livecast::{model, ConfigTree, EventLoop, NativeBackend, Runtime, RuntimeConfig};
//!
//! # async fn run(backend: Rc<dyn NativeBackend>) -> livecast::Result<()> {
//! let mut tree = ConfigTree::load("livecast.json")?;
//! tree.ensure_defaults();
//!
//! let mut rt = Runtime::new(backend, RuntimeConfig::default());
//! model::install(&mut rt);
//! rt.init_from_config(&tree);
//!
//! let mut event_loop = EventLoop::new(rt);
//! event_loop
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!
//! event_loop.runtime().config_tree().save("livecast.json")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod model;
pub mod mux;
pub mod native;
pub mod projection;
pub mod runtime;
pub mod scope;
pub mod store;

pub use config::{ConfigTree, RuntimeConfig};
pub use error::{ConfigError, Error, MuxError, NativeError, Result};
pub use model::{FrameListener, FrameListenerOptions};
pub use mux::{MuxChunk, MuxConsumer, MuxFormat, MuxerService, TransportSink};
pub use native::{
    EventSender, Generation, HookId, InstanceId, NativeBackend, NativeEvent, NativeHandle, ResourceKind,
    ResourceRequest, SlotLayout, SourceSlot,
};
pub use projection::{FeedMessage, ProjectionFeed};
pub use runtime::{Disposer, EventLoop, ListenerGroup, Runtime};
pub use store::{Activation, ManagedObject, ObjectId};
