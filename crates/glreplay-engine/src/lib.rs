//! # glreplay Engine
//!
//! Replays host-authored WebGL2 command lists against a [`GlContext`].
//!
//! ## Features
//!
//! - **Registry**: host resource handles mapped to native objects and the
//!   info records mirrored back to the host
//! - **Commands**: the JSON command vocabulary, enumerant tokens and typed
//!   binary payloads
//! - **Interpreter**: executes one command list, isolating failures per
//!   command
//! - **Camera**: first-person camera whose matrices feed the `ViewBlock`
//!   uniform block
//! - **Viewer**: persisted command history, batch intake, property changes
//!   and input-driven redraws
//!
//! ## Architecture
//!
//! ```text
//! host ──register──▶ Registry ◀──────────┐
//!      ──batch────▶ GlViewer ──replay──▶ Interpreter ──▶ GlContext
//!      ◀──info──── InfoSink ◀──dirty─────┘
//! ```
//!
//! [`GlContext`]: glreplay_webgl::GlContext

pub mod camera;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod info;
pub mod interpreter;
pub mod math;
pub mod registry;
pub mod sync;
pub mod tokens;
pub mod viewer;

pub use camera::{CameraState, ViewBlock, VIEW_BLOCK_BINDING, VIEW_BLOCK_NAME, VIEW_BLOCK_SIZE};
pub use codec::{CodecError, ElementType, TypedView};
pub use command::{BufferMetadata, Command, CommandBatch, CommandKind};
pub use config::{MatrixMajor, ViewerConfig};
pub use error::CommandError;
pub use info::{ResourceInfo, ResourceKind};
pub use interpreter::{BindingState, CommandFailure, Interpreter, ReplayReport};
pub use math::{Mat4, Vec3};
pub use registry::{Handle, Registry, RegistryError};
pub use sync::{InfoSink, NullSink, RecordingSink};
pub use tokens::BufferTarget;
pub use viewer::GlViewer;
