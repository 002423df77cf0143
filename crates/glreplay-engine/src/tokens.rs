//! WebGL enumerant names accepted in commands.
//!
//! Each family is a closed table; lookups ignore ASCII case so `"less"` and
//! `"LESS"` both resolve. Anything outside the table is an error.

use std::fmt;

use glreplay_webgl::constants::*;
use serde::{Serialize, Serializer};

use crate::error::CommandError;

/// A closed family of enumerant names.
#[derive(Debug)]
pub struct TokenTable {
    family: &'static str,
    entries: &'static [(&'static str, u32)],
}

impl TokenTable {
    pub const fn new(family: &'static str, entries: &'static [(&'static str, u32)]) -> Self {
        Self { family, entries }
    }

    /// Resolve `token` to its enumerant value.
    pub fn parse(&self, token: &str) -> Result<u32, CommandError> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, value)| *value)
            .ok_or_else(|| CommandError::UnknownToken {
                family: self.family,
                token: token.to_string(),
            })
    }
}

pub static DRAW_MODE: TokenTable = TokenTable::new(
    "draw mode",
    &[
        ("POINTS", POINTS),
        ("LINES", LINES),
        ("LINE_LOOP", LINE_LOOP),
        ("LINE_STRIP", LINE_STRIP),
        ("TRIANGLES", TRIANGLES),
        ("TRIANGLE_STRIP", TRIANGLE_STRIP),
        ("TRIANGLE_FAN", TRIANGLE_FAN),
    ],
);

pub static INDEX_TYPE: TokenTable = TokenTable::new(
    "index type",
    &[
        ("UNSIGNED_BYTE", UNSIGNED_BYTE),
        ("UNSIGNED_SHORT", UNSIGNED_SHORT),
        ("UNSIGNED_INT", UNSIGNED_INT),
        ("uint8", UNSIGNED_BYTE),
        ("uint16", UNSIGNED_SHORT),
        ("uint32", UNSIGNED_INT),
    ],
);

pub static FRONT_FACE: TokenTable = TokenTable::new("front face", &[("CW", CW), ("CCW", CCW)]);

pub static CULL_FACE_MODE: TokenTable = TokenTable::new(
    "cull face",
    &[
        ("FRONT", FRONT),
        ("BACK", BACK),
        ("FRONT_AND_BACK", FRONT_AND_BACK),
    ],
);

pub static COMPARE_FUNC: TokenTable = TokenTable::new(
    "compare function",
    &[
        ("NEVER", NEVER),
        ("LESS", LESS),
        ("EQUAL", EQUAL),
        ("LEQUAL", LEQUAL),
        ("GREATER", GREATER),
        ("NOTEQUAL", NOTEQUAL),
        ("GEQUAL", GEQUAL),
        ("ALWAYS", ALWAYS),
    ],
);

pub static BLEND_EQUATION: TokenTable = TokenTable::new(
    "blend equation",
    &[
        ("FUNC_ADD", FUNC_ADD),
        ("FUNC_SUBTRACT", FUNC_SUBTRACT),
        ("FUNC_REVERSE_SUBTRACT", FUNC_REVERSE_SUBTRACT),
        ("MIN", MIN),
        ("MAX", MAX),
    ],
);

pub static BLEND_FACTOR: TokenTable = TokenTable::new(
    "blend factor",
    &[
        ("ZERO", ZERO),
        ("ONE", ONE),
        ("SRC_COLOR", SRC_COLOR),
        ("ONE_MINUS_SRC_COLOR", ONE_MINUS_SRC_COLOR),
        ("DST_COLOR", DST_COLOR),
        ("ONE_MINUS_DST_COLOR", ONE_MINUS_DST_COLOR),
        ("SRC_ALPHA", SRC_ALPHA),
        ("ONE_MINUS_SRC_ALPHA", ONE_MINUS_SRC_ALPHA),
        ("DST_ALPHA", DST_ALPHA),
        ("ONE_MINUS_DST_ALPHA", ONE_MINUS_DST_ALPHA),
        ("CONSTANT_COLOR", CONSTANT_COLOR),
        ("ONE_MINUS_CONSTANT_COLOR", ONE_MINUS_CONSTANT_COLOR),
        ("CONSTANT_ALPHA", CONSTANT_ALPHA),
        ("ONE_MINUS_CONSTANT_ALPHA", ONE_MINUS_CONSTANT_ALPHA),
        ("SRC_ALPHA_SATURATE", SRC_ALPHA_SATURATE),
    ],
);

pub static USAGE_HINT: TokenTable = TokenTable::new(
    "buffer usage",
    &[
        ("STATIC_DRAW", STATIC_DRAW),
        ("DYNAMIC_DRAW", DYNAMIC_DRAW),
        ("STREAM_DRAW", STREAM_DRAW),
        ("STATIC_READ", STATIC_READ),
        ("DYNAMIC_READ", DYNAMIC_READ),
        ("STREAM_READ", STREAM_READ),
        ("STATIC_COPY", STATIC_COPY),
        ("DYNAMIC_COPY", DYNAMIC_COPY),
        ("STREAM_COPY", STREAM_COPY),
    ],
);

pub static SHADER_KIND: TokenTable = TokenTable::new(
    "shader type",
    &[
        ("VERTEX_SHADER", VERTEX_SHADER),
        ("FRAGMENT_SHADER", FRAGMENT_SHADER),
    ],
);

pub static VERTEX_TYPE: TokenTable = TokenTable::new(
    "vertex attribute type",
    &[
        ("BYTE", BYTE),
        ("UNSIGNED_BYTE", UNSIGNED_BYTE),
        ("SHORT", SHORT),
        ("UNSIGNED_SHORT", UNSIGNED_SHORT),
        ("INT", INT),
        ("UNSIGNED_INT", UNSIGNED_INT),
        ("FLOAT", FLOAT),
        ("HALF_FLOAT", HALF_FLOAT),
        ("INT_2_10_10_10_REV", INT_2_10_10_10_REV),
        ("UNSIGNED_INT_2_10_10_10_REV", UNSIGNED_INT_2_10_10_10_REV),
    ],
);

pub static TEXTURE_TARGET: TokenTable = TokenTable::new(
    "texture target",
    &[
        ("TEXTURE_2D", TEXTURE_2D),
        ("TEXTURE_3D", TEXTURE_3D),
        ("TEXTURE_2D_ARRAY", TEXTURE_2D_ARRAY),
        ("TEXTURE_CUBE_MAP", TEXTURE_CUBE_MAP),
        ("TEXTURE_CUBE_MAP_POSITIVE_X", TEXTURE_CUBE_MAP_POSITIVE_X),
        ("TEXTURE_CUBE_MAP_NEGATIVE_X", TEXTURE_CUBE_MAP_NEGATIVE_X),
        ("TEXTURE_CUBE_MAP_POSITIVE_Y", TEXTURE_CUBE_MAP_POSITIVE_Y),
        ("TEXTURE_CUBE_MAP_NEGATIVE_Y", TEXTURE_CUBE_MAP_NEGATIVE_Y),
        ("TEXTURE_CUBE_MAP_POSITIVE_Z", TEXTURE_CUBE_MAP_POSITIVE_Z),
        ("TEXTURE_CUBE_MAP_NEGATIVE_Z", TEXTURE_CUBE_MAP_NEGATIVE_Z),
    ],
);

pub static INTERNAL_FORMAT: TokenTable = TokenTable::new(
    "internal format",
    &[
        ("RGBA", RGBA),
        ("RGB", RGB),
        ("ALPHA", ALPHA),
        ("LUMINANCE", LUMINANCE),
        ("LUMINANCE_ALPHA", LUMINANCE_ALPHA),
        ("DEPTH_COMPONENT", DEPTH_COMPONENT),
        ("DEPTH_STENCIL", DEPTH_STENCIL),
        ("R8", R8),
        ("RG8", RG8),
        ("RGB8", RGB8),
        ("RGBA8", RGBA8),
        ("SRGB8", SRGB8),
        ("SRGB8_ALPHA8", SRGB8_ALPHA8),
        ("RGB10_A2", RGB10_A2),
        ("R11F_G11F_B10F", R11F_G11F_B10F),
        ("R16F", R16F),
        ("RG16F", RG16F),
        ("RGB16F", RGB16F),
        ("RGBA16F", RGBA16F),
        ("R32F", R32F),
        ("RG32F", RG32F),
        ("RGB32F", RGB32F),
        ("RGBA32F", RGBA32F),
        ("R8UI", R8UI),
        ("R32I", R32I),
        ("R32UI", R32UI),
        ("RGBA8UI", RGBA8UI),
        ("DEPTH_COMPONENT16", DEPTH_COMPONENT16),
        ("DEPTH_COMPONENT24", DEPTH_COMPONENT24),
        ("DEPTH_COMPONENT32F", DEPTH_COMPONENT32F),
        ("DEPTH24_STENCIL8", DEPTH24_STENCIL8),
        ("DEPTH32F_STENCIL8", DEPTH32F_STENCIL8),
    ],
);

pub static PIXEL_FORMAT: TokenTable = TokenTable::new(
    "pixel format",
    &[
        ("RGBA", RGBA),
        ("RGB", RGB),
        ("ALPHA", ALPHA),
        ("LUMINANCE", LUMINANCE),
        ("LUMINANCE_ALPHA", LUMINANCE_ALPHA),
        ("RED", RED),
        ("RG", RG),
        ("RED_INTEGER", RED_INTEGER),
        ("RG_INTEGER", RG_INTEGER),
        ("RGB_INTEGER", RGB_INTEGER),
        ("RGBA_INTEGER", RGBA_INTEGER),
        ("DEPTH_COMPONENT", DEPTH_COMPONENT),
        ("DEPTH_STENCIL", DEPTH_STENCIL),
    ],
);

pub static PIXEL_TYPE: TokenTable = TokenTable::new(
    "pixel type",
    &[
        ("UNSIGNED_BYTE", UNSIGNED_BYTE),
        ("BYTE", BYTE),
        ("UNSIGNED_SHORT", UNSIGNED_SHORT),
        ("SHORT", SHORT),
        ("UNSIGNED_INT", UNSIGNED_INT),
        ("INT", INT),
        ("HALF_FLOAT", HALF_FLOAT),
        ("FLOAT", FLOAT),
        ("UNSIGNED_SHORT_5_6_5", UNSIGNED_SHORT_5_6_5),
        ("UNSIGNED_SHORT_4_4_4_4", UNSIGNED_SHORT_4_4_4_4),
        ("UNSIGNED_SHORT_5_5_5_1", UNSIGNED_SHORT_5_5_5_1),
        ("UNSIGNED_INT_2_10_10_10_REV", UNSIGNED_INT_2_10_10_10_REV),
        ("UNSIGNED_INT_10F_11F_11F_REV", UNSIGNED_INT_10F_11F_11F_REV),
        ("UNSIGNED_INT_5_9_9_9_REV", UNSIGNED_INT_5_9_9_9_REV),
        ("UNSIGNED_INT_24_8", UNSIGNED_INT_24_8),
        ("FLOAT_32_UNSIGNED_INT_24_8_REV", FLOAT_32_UNSIGNED_INT_24_8_REV),
    ],
);

pub static TEXTURE_PARAMETER: TokenTable = TokenTable::new(
    "texture parameter",
    &[
        ("TEXTURE_MIN_FILTER", TEXTURE_MIN_FILTER),
        ("TEXTURE_MAG_FILTER", TEXTURE_MAG_FILTER),
        ("TEXTURE_WRAP_S", TEXTURE_WRAP_S),
        ("TEXTURE_WRAP_T", TEXTURE_WRAP_T),
        ("TEXTURE_WRAP_R", TEXTURE_WRAP_R),
        ("TEXTURE_BASE_LEVEL", TEXTURE_BASE_LEVEL),
        ("TEXTURE_MAX_LEVEL", TEXTURE_MAX_LEVEL),
        ("TEXTURE_MIN_LOD", TEXTURE_MIN_LOD),
        ("TEXTURE_MAX_LOD", TEXTURE_MAX_LOD),
        ("TEXTURE_COMPARE_MODE", TEXTURE_COMPARE_MODE),
        ("TEXTURE_COMPARE_FUNC", TEXTURE_COMPARE_FUNC),
    ],
);

pub static TEXTURE_PARAMETER_VALUE: TokenTable = TokenTable::new(
    "texture parameter value",
    &[
        ("NEAREST", NEAREST),
        ("LINEAR", LINEAR),
        ("NEAREST_MIPMAP_NEAREST", NEAREST_MIPMAP_NEAREST),
        ("LINEAR_MIPMAP_NEAREST", LINEAR_MIPMAP_NEAREST),
        ("NEAREST_MIPMAP_LINEAR", NEAREST_MIPMAP_LINEAR),
        ("LINEAR_MIPMAP_LINEAR", LINEAR_MIPMAP_LINEAR),
        ("REPEAT", REPEAT),
        ("CLAMP_TO_EDGE", CLAMP_TO_EDGE),
        ("MIRRORED_REPEAT", MIRRORED_REPEAT),
        ("COMPARE_REF_TO_TEXTURE", COMPARE_REF_TO_TEXTURE),
        ("NONE", NONE),
        ("NEVER", NEVER),
        ("LESS", LESS),
        ("EQUAL", EQUAL),
        ("LEQUAL", LEQUAL),
        ("GREATER", GREATER),
        ("NOTEQUAL", NOTEQUAL),
        ("GEQUAL", GEQUAL),
        ("ALWAYS", ALWAYS),
    ],
);

pub static PIXEL_STORE_PARAMETER: TokenTable = TokenTable::new(
    "pixel store parameter",
    &[
        ("PACK_ALIGNMENT", PACK_ALIGNMENT),
        ("UNPACK_ALIGNMENT", UNPACK_ALIGNMENT),
        ("UNPACK_ROW_LENGTH", UNPACK_ROW_LENGTH),
        ("UNPACK_SKIP_ROWS", UNPACK_SKIP_ROWS),
        ("UNPACK_SKIP_PIXELS", UNPACK_SKIP_PIXELS),
        ("UNPACK_SKIP_IMAGES", UNPACK_SKIP_IMAGES),
        ("UNPACK_IMAGE_HEIGHT", UNPACK_IMAGE_HEIGHT),
        ("UNPACK_FLIP_Y_WEBGL", UNPACK_FLIP_Y_WEBGL),
        ("UNPACK_PREMULTIPLY_ALPHA_WEBGL", UNPACK_PREMULTIPLY_ALPHA_WEBGL),
        (
            "UNPACK_COLORSPACE_CONVERSION_WEBGL",
            UNPACK_COLORSPACE_CONVERSION_WEBGL,
        ),
    ],
);

pub static COLORSPACE_CONVERSION: TokenTable = TokenTable::new(
    "colorspace conversion",
    &[("BROWSER_DEFAULT_WEBGL", BROWSER_DEFAULT_WEBGL), ("NONE", NONE)],
);

pub static FRAMEBUFFER_TARGET: TokenTable = TokenTable::new(
    "framebuffer target",
    &[
        ("FRAMEBUFFER", FRAMEBUFFER),
        ("READ_FRAMEBUFFER", READ_FRAMEBUFFER),
        ("DRAW_FRAMEBUFFER", DRAW_FRAMEBUFFER),
    ],
);

pub static ATTACHMENT: TokenTable = TokenTable::new(
    "framebuffer attachment",
    &[
        ("COLOR_ATTACHMENT0", COLOR_ATTACHMENT0),
        ("COLOR_ATTACHMENT1", COLOR_ATTACHMENT1),
        ("COLOR_ATTACHMENT2", COLOR_ATTACHMENT2),
        ("COLOR_ATTACHMENT3", COLOR_ATTACHMENT3),
        ("COLOR_ATTACHMENT4", COLOR_ATTACHMENT4),
        ("COLOR_ATTACHMENT5", COLOR_ATTACHMENT5),
        ("COLOR_ATTACHMENT6", COLOR_ATTACHMENT6),
        ("COLOR_ATTACHMENT7", COLOR_ATTACHMENT7),
        ("DEPTH_ATTACHMENT", DEPTH_ATTACHMENT),
        ("STENCIL_ATTACHMENT", STENCIL_ATTACHMENT),
        ("DEPTH_STENCIL_ATTACHMENT", DEPTH_STENCIL_ATTACHMENT),
    ],
);

pub static DRAW_BUFFER: TokenTable = TokenTable::new(
    "draw buffer",
    &[
        ("NONE", NONE),
        ("BACK", BACK),
        ("COLOR_ATTACHMENT0", COLOR_ATTACHMENT0),
        ("COLOR_ATTACHMENT1", COLOR_ATTACHMENT1),
        ("COLOR_ATTACHMENT2", COLOR_ATTACHMENT2),
        ("COLOR_ATTACHMENT3", COLOR_ATTACHMENT3),
        ("COLOR_ATTACHMENT4", COLOR_ATTACHMENT4),
        ("COLOR_ATTACHMENT5", COLOR_ATTACHMENT5),
        ("COLOR_ATTACHMENT6", COLOR_ATTACHMENT6),
        ("COLOR_ATTACHMENT7", COLOR_ATTACHMENT7),
    ],
);

/// Buffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferTarget {
    Array,
    ElementArray,
    CopyRead,
    CopyWrite,
    TransformFeedback,
    Uniform,
    PixelPack,
    PixelUnpack,
}

impl BufferTarget {
    pub const ALL: [BufferTarget; 8] = [
        BufferTarget::Array,
        BufferTarget::ElementArray,
        BufferTarget::CopyRead,
        BufferTarget::CopyWrite,
        BufferTarget::TransformFeedback,
        BufferTarget::Uniform,
        BufferTarget::PixelPack,
        BufferTarget::PixelUnpack,
    ];

    pub fn parse(token: &str) -> Result<Self, CommandError> {
        Self::ALL
            .into_iter()
            .find(|target| target.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| CommandError::UnknownToken {
                family: "buffer target",
                token: token.to_string(),
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferTarget::Array => "ARRAY_BUFFER",
            BufferTarget::ElementArray => "ELEMENT_ARRAY_BUFFER",
            BufferTarget::CopyRead => "COPY_READ_BUFFER",
            BufferTarget::CopyWrite => "COPY_WRITE_BUFFER",
            BufferTarget::TransformFeedback => "TRANSFORM_FEEDBACK_BUFFER",
            BufferTarget::Uniform => "UNIFORM_BUFFER",
            BufferTarget::PixelPack => "PIXEL_PACK_BUFFER",
            BufferTarget::PixelUnpack => "PIXEL_UNPACK_BUFFER",
        }
    }

    /// The WebGL enumerant.
    pub fn gl(self) -> u32 {
        match self {
            BufferTarget::Array => ARRAY_BUFFER,
            BufferTarget::ElementArray => ELEMENT_ARRAY_BUFFER,
            BufferTarget::CopyRead => COPY_READ_BUFFER,
            BufferTarget::CopyWrite => COPY_WRITE_BUFFER,
            BufferTarget::TransformFeedback => TRANSFORM_FEEDBACK_BUFFER,
            BufferTarget::Uniform => UNIFORM_BUFFER,
            BufferTarget::PixelPack => PIXEL_PACK_BUFFER,
            BufferTarget::PixelUnpack => PIXEL_UNPACK_BUFFER,
        }
    }
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for BufferTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert_eq!(COMPARE_FUNC.parse("less").unwrap(), LESS);
        assert_eq!(COMPARE_FUNC.parse("LESS").unwrap(), LESS);
        assert_eq!(CULL_FACE_MODE.parse("front_and_back").unwrap(), FRONT_AND_BACK);
    }

    #[test]
    fn test_unknown_token_names_family() {
        let err = DRAW_MODE.parse("quads").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown draw mode token 'quads'"
        );
    }

    #[test]
    fn test_index_type_aliases() {
        assert_eq!(INDEX_TYPE.parse("uint16").unwrap(), UNSIGNED_SHORT);
        assert_eq!(INDEX_TYPE.parse("unsigned_int").unwrap(), UNSIGNED_INT);
        assert!(INDEX_TYPE.parse("uint64").is_err());
    }

    #[test]
    fn test_buffer_target() {
        assert_eq!(BufferTarget::parse("array_buffer").unwrap(), BufferTarget::Array);
        assert_eq!(BufferTarget::Uniform.gl(), UNIFORM_BUFFER);
        assert!(BufferTarget::parse("VERTEX_BUFFER").is_err());
        assert_eq!(
            serde_json::to_string(&BufferTarget::ElementArray).unwrap(),
            "\"ELEMENT_ARRAY_BUFFER\""
        );
    }
}
