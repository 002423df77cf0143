//! Errors raised while interpreting commands.

use glreplay_common::GlReplayError;
use glreplay_webgl::GlError;
use thiserror::Error;

use crate::codec::{CodecError, ElementType};
use crate::registry::RegistryError;
use crate::tokens::BufferTarget;

/// Why a single command could not be executed.
///
/// A failing command is skipped; the rest of the list still runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("unknown {family} token '{token}'")]
    UnknownToken { family: &'static str, token: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("command requires a payload")]
    MissingPayload,

    #[error("payload index {index} out of range for {len} payloads")]
    PayloadIndex { index: usize, len: usize },

    #[error("expected a {expected} payload, got {found}")]
    PayloadType {
        expected: &'static str,
        found: ElementType,
    },

    #[error("unsupported payload shape {0:?}")]
    UnsupportedShape(Vec<usize>),

    #[error("capability mask {0:#x} has unknown bits")]
    InvalidCapabilityMask(u32),

    #[error("attribute '{0}' is not active in the bound program")]
    UnresolvedAttribute(String),

    #[error("uniform block '{0}' not found")]
    UnresolvedBlock(String),

    #[error("member '{member}' not found in uniform block '{block}'")]
    UnresolvedMember { block: String, member: String },

    #[error("texture unit {0} is out of range")]
    TextureUnitOutOfRange(u32),

    #[error("no program is bound")]
    NoBoundProgram,

    #[error("no buffer is bound to {0}")]
    NoBoundBuffer(BufferTarget),

    #[error("context refused to create a {0}")]
    CreateFailed(&'static str),

    #[error("unsupported command")]
    Unsupported,

    #[error("context reported: {0}")]
    Gl(GlError),
}

impl From<CommandError> for GlReplayError {
    fn from(err: CommandError) -> Self {
        GlReplayError::command_with_source("command rejected", err)
    }
}

impl From<RegistryError> for GlReplayError {
    fn from(err: RegistryError) -> Self {
        GlReplayError::registry_with_source("resource registry", err)
    }
}

impl From<CodecError> for GlReplayError {
    fn from(err: CodecError) -> Self {
        GlReplayError::command_with_source("payload rejected", err)
    }
}
