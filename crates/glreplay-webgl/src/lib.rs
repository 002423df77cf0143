//! # glreplay WebGL
//!
//! The WebGL 2 surface the replay engine drives.
//!
//! ## Features
//!
//! - **GlContext**: trait over the WebGL 2 calls the interpreter issues
//! - **HeadlessContext**: in-memory implementation with call accounting
//! - **Reflection**: GLSL declaration scanner reporting active uniforms,
//!   uniform blocks (std140 offsets) and attributes
//! - **Constants**: WebGL 2 enumerant values
//!
//! ## Architecture
//!
//! The engine is generic over `GlContext`; it never boxes a context.
//! A browser binding implements the trait over a real
//! `WebGL2RenderingContext`; `HeadlessContext` keeps every object in
//! memory so replays can be inspected without a GPU.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use thiserror::Error;

pub mod constants;
mod context;
mod headless;
pub mod reflect;

pub use context::GlContext;
pub use headless::{
    BufferData, DrawCall, DrawState, FramebufferData, GlState, HeadlessContext, LinkedAttribute,
    LinkedBlock, LinkedUniform, ProgramData, ShaderData, TextureAttachment, TextureData,
    UniformValue, VertexArrayData, VertexAttribPointer, VertexAttribValue,
};

// ==================== Errors ====================

/// Errors reported by a WebGL context through `getError`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlError {
    #[error("Invalid enum")]
    InvalidEnum,

    #[error("Invalid value")]
    InvalidValue,

    #[error("Invalid operation")]
    InvalidOperation,

    #[error("Invalid framebuffer operation")]
    InvalidFramebufferOperation,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Context lost")]
    ContextLost,
}

impl GlError {
    /// Map a `getError` code to an error, `None` for `NO_ERROR`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            constants::NO_ERROR => None,
            constants::INVALID_ENUM => Some(GlError::InvalidEnum),
            constants::INVALID_VALUE => Some(GlError::InvalidValue),
            constants::INVALID_OPERATION => Some(GlError::InvalidOperation),
            constants::INVALID_FRAMEBUFFER_OPERATION => Some(GlError::InvalidFramebufferOperation),
            constants::OUT_OF_MEMORY => Some(GlError::OutOfMemory),
            _ => Some(GlError::ContextLost),
        }
    }

    /// The `getError` code for this error.
    pub fn code(&self) -> u32 {
        match self {
            GlError::InvalidEnum => constants::INVALID_ENUM,
            GlError::InvalidValue => constants::INVALID_VALUE,
            GlError::InvalidOperation => constants::INVALID_OPERATION,
            GlError::InvalidFramebufferOperation => constants::INVALID_FRAMEBUFFER_OPERATION,
            GlError::OutOfMemory => constants::OUT_OF_MEMORY,
            // WebGL reports CONTEXT_LOST_WEBGL once through getError.
            GlError::ContextLost => 0x9242,
        }
    }
}

// ==================== Object IDs ====================

/// Opaque handle to an object owned by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlObject(u32);

impl GlObject {
    /// Allocate a fresh, process-unique object id.
    pub fn new() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Default for GlObject {
    fn default() -> Self {
        Self::new()
    }
}

pub type WebGLBuffer = GlObject;
pub type WebGLShader = GlObject;
pub type WebGLProgram = GlObject;
pub type WebGLTexture = GlObject;
pub type WebGLFramebuffer = GlObject;
pub type WebGLVertexArray = GlObject;
pub type WebGLUniformLocation = GlObject;

// ==================== Reflection records ====================

/// Result of `getActiveUniform` / `getActiveAttrib`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveInfo {
    pub name: String,
    pub type_: u32,
    pub size: i32,
}

// ==================== Flags ====================

bitflags! {
    /// Server-side capabilities toggled by `enable` / `disable`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const BLEND = 1 << 0;
        const CULL_FACE = 1 << 1;
        const DEPTH_TEST = 1 << 2;
        const DITHER = 1 << 3;
        const POLYGON_OFFSET_FILL = 1 << 4;
        const SAMPLE_ALPHA_TO_COVERAGE = 1 << 5;
        const SAMPLE_COVERAGE = 1 << 6;
        const SCISSOR_TEST = 1 << 7;
        const STENCIL_TEST = 1 << 8;
        const RASTERIZER_DISCARD = 1 << 9;
    }
}

bitflags! {
    /// Buffers cleared by `clear`, using the WebGL bit values.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ClearMask: u32 {
        const DEPTH = constants::DEPTH_BUFFER_BIT;
        const STENCIL = constants::STENCIL_BUFFER_BIT;
        const COLOR = constants::COLOR_BUFFER_BIT;
    }
}
