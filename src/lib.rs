//! chatterbox-serve: an HTTP voice-cloning speech synthesis service.
//!
//! Wraps the Chatterbox text-to-speech models behind a small REST API:
//! a client uploads text plus a reference voice clip and gets back a WAV.
//!
//! # Architecture
//!
//! - **Provisioning** (`chatterbox-package`): copies cached or downloaded model
//!   snapshots into a flat offline layout
//! - **Startup**: resolves the device and segmenter resources, then loads each
//!   model into the registry
//! - **Validation**: checks each request before any file I/O
//! - **Synthesis**: stages the clip, runs one generation off the async
//!   runtime, writes a 16-bit WAV
//! - **Scratch files**: every per-request file is deleted on every path
//! - **Engine**: the models themselves run in Python worker processes driven
//!   over JSON-RPC

pub mod client;
pub mod config;
pub mod context;
pub mod device;
pub mod engine;
pub mod error;
pub mod model;
pub mod provision;
pub mod scratch;
pub mod server;
pub mod startup;
pub mod synthesis;
pub mod validate;

pub use config::ServiceConfig;
pub use context::ServiceContext;
pub use device::Device;
pub use error::{Result, ServiceError};
pub use model::{ModelHandle, ModelLoader, ModelRegistry, ModelType, SpeechModel};
pub use server::TtsServer;
