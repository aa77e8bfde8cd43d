//! Capability interfaces and event model for conference recording.
//!
//! This crate defines the narrow surfaces a recording session consumes
//! from the underlying media engine:
//!
//! - [`media`] - media types and transport descriptors
//! - [`event`] - the recordable event model and its JSON wire form
//! - [`traits`] - opaque capabilities (receive paths, recorders, the
//!   control-channel manager, secure transports)
//!
//! The actual packet processing, encryption, and file encoding live
//! behind these traits; nothing in this crate performs I/O.
//!
//! With the `test-utils` feature enabled, [`mock`] provides in-memory
//! implementations of every capability for orchestration tests.

pub mod event;
pub mod media;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use event::{AspectRatio, EventKind, RecorderEvent};
pub use media::{MediaFormat, MediaStreamTarget, MediaType, StreamConnector};
pub use traits::{
    ChannelManager, ChannelMessage, DataChannel, MediaError, MediaFactory, ReceivePath, Recorder,
    RecorderEventHandler, SecureTransport, Synchronizer,
};
