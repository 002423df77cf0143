//! The command vocabulary as it arrives on the wire.
//!
//! Every command is a JSON object tagged by `cmd`. Enumerant arguments stay
//! as token strings here and are resolved against [`crate::tokens`] when the
//! command runs, so one bad token fails one command rather than the batch.
//! Handle arguments are raw integers; negative values mean "unbind" where the
//! call accepts null.

use serde::Deserialize;

/// One command plus the payload it refers to, if any.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub kind: CommandKind,
    #[serde(default)]
    pub buffer_metadata: Option<BufferMetadata>,
}

/// Where a command's payload sits in the batch and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BufferMetadata {
    pub index: usize,
    pub dtype: String,
    #[serde(default)]
    pub shape: Vec<usize>,
}

/// One message from the host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandBatch {
    /// Drop the persisted commands and payloads first.
    #[serde(default)]
    pub clear: bool,
    /// Execute once without persisting.
    #[serde(default)]
    pub only_once: bool,
    #[serde(default)]
    pub commands: Vec<Command>,
}

fn unbound() -> i64 {
    -1
}

/// Capability switches of `enable` / `disable`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CapabilityFlags {
    pub blend: bool,
    pub cull_face: bool,
    pub depth_test: bool,
    pub dither: bool,
    pub polygon_offset_fill: bool,
    pub sample_alpha_to_coverage: bool,
    pub sample_coverage: bool,
    pub scissor_test: bool,
    pub stencil_test: bool,
    pub rasterizer_discard: bool,
    /// Raw `Capabilities` bits, or-ed with the named flags.
    pub mask: Option<u32>,
}

/// A `pixelStorei` value: a number, a flag, or an enumerant token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PixelStoreParam {
    Flag(bool),
    Int(i32),
    Token(String),
}

/// A vertex attribute index, either a location or an attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AttribIndex {
    Location(u32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum CommandKind {
    // ==================== Fixed function ====================
    Viewport {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Enable(CapabilityFlags),
    Disable(CapabilityFlags),
    ClearColor {
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    },
    Clear {
        #[serde(default)]
        color: bool,
        #[serde(default)]
        depth: bool,
        #[serde(default)]
        stencil: bool,
    },
    FrontFace {
        mode: String,
    },
    CullFace {
        mode: String,
    },
    DepthFunc {
        func: String,
    },
    DepthMask {
        flag: bool,
    },
    DepthRange {
        z_near: f32,
        z_far: f32,
    },
    BlendColor {
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    },
    BlendEquation {
        mode: String,
    },
    BlendEquationSeparate {
        mode_rgb: String,
        mode_alpha: String,
    },
    BlendFunc {
        s_factor: String,
        d_factor: String,
    },
    #[serde(alias = "blend_func_separate")]
    BlendFuncSeparate {
        src_rgb: String,
        dst_rgb: String,
        src_alpha: String,
        dst_alpha: String,
    },
    PixelStorei {
        pname: String,
        param: PixelStoreParam,
    },

    // ==================== Creation ====================
    CreateTexture {
        resource: i64,
    },
    CreateShader {
        resource: i64,
        #[serde(rename = "type")]
        shader_type: String,
    },
    CreateProgram {
        resource: i64,
    },
    CreateBuffer {
        resource: i64,
    },
    CreateVertexArray {
        resource: i64,
    },
    CreateFramebuffer {
        resource: i64,
    },

    // ==================== Textures ====================
    BindTexture {
        target: String,
        #[serde(default = "unbound")]
        texture: i64,
    },
    ActiveTexture {
        texture: u32,
    },
    GenerateMipmap {
        target: String,
    },
    #[serde(rename = "texImage2D")]
    TexImage2D {
        target: String,
        #[serde(default)]
        level: i32,
        internal_format: String,
        width: i32,
        height: i32,
        #[serde(default)]
        border: i32,
        format: String,
        data_type: String,
    },
    #[serde(rename = "texImage3D")]
    TexImage3D {
        target: String,
        #[serde(default)]
        level: i32,
        internal_format: String,
        width: i32,
        height: i32,
        depth: i32,
        #[serde(default)]
        border: i32,
        format: String,
        data_type: String,
    },
    #[serde(rename = "texStorage2D")]
    TexStorage2D {
        target: String,
        levels: i32,
        internal_format: String,
        width: i32,
        height: i32,
    },
    #[serde(rename = "texStorage3D")]
    TexStorage3D {
        target: String,
        levels: i32,
        internal_format: String,
        width: i32,
        height: i32,
        depth: i32,
    },
    TexParameteri {
        target: String,
        pname: String,
        param: i32,
    },
    TexParameterf {
        target: String,
        pname: String,
        param: f32,
    },
    #[serde(rename = "texParameter_str")]
    TexParameterStr {
        target: String,
        pname: String,
        param: String,
    },

    // ==================== Shaders and programs ====================
    ShaderSource {
        shader: i64,
        source: String,
    },
    CompileShader {
        shader: i64,
    },
    DeleteShader {
        shader: i64,
    },
    AttachShader {
        program: i64,
        shader: i64,
    },
    BindAttribLocation {
        program: i64,
        index: u32,
        name: String,
    },
    LinkProgram {
        program: i64,
    },
    UseProgram {
        #[serde(default = "unbound")]
        program: i64,
    },

    // ==================== Uniforms ====================
    Uniform {
        name: String,
    },
    UniformMatrix {
        name: String,
    },
    UniformBlockBinding {
        program: i64,
        uniform_block_name: String,
        uniform_block_binding: u32,
    },

    // ==================== Buffers ====================
    BindBuffer {
        target: String,
        #[serde(default = "unbound")]
        buffer: i64,
    },
    BindBufferBase {
        target: String,
        index: u32,
        #[serde(default = "unbound")]
        buffer: i64,
    },
    BufferData {
        target: String,
        usage: String,
        #[serde(default)]
        update_info: bool,
        #[serde(default)]
        size: Option<usize>,
    },
    BufferSubData {
        target: String,
        #[serde(default)]
        dst_byte_offset: usize,
        #[serde(default)]
        src_offset: usize,
        #[serde(default)]
        size: Option<usize>,
    },
    BufferSubDataStr {
        target: String,
        /// Name of the uniform block member whose offset to write at.
        dst_byte_offset: String,
        #[serde(default)]
        src_offset: usize,
    },
    CreateUniformBuffer {
        buffer: i64,
        program: i64,
        block_name: String,
        usage: String,
    },

    // ==================== Vertex arrays ====================
    BindVertexArray {
        #[serde(default = "unbound", alias = "vao")]
        vertex_array: i64,
    },
    VertexAttribPointer {
        index: AttribIndex,
        size: i32,
        #[serde(rename = "type")]
        type_: String,
        #[serde(default)]
        normalized: bool,
        #[serde(default)]
        stride: i32,
        #[serde(default)]
        offset: i32,
    },
    VertexAttribIPointer {
        index: AttribIndex,
        size: i32,
        #[serde(rename = "type")]
        type_: String,
        #[serde(default)]
        stride: i32,
        #[serde(default)]
        offset: i32,
    },
    EnableVertexAttribArray {
        index: AttribIndex,
    },
    DisableVertexAttribArray {
        index: AttribIndex,
    },
    #[serde(rename = "vertexAttrib[1234]fv")]
    VertexAttribFv {
        index: AttribIndex,
    },
    #[serde(rename = "vertexAttribI4[u]iv")]
    VertexAttribI4iv {
        index: AttribIndex,
    },

    // ==================== Framebuffers ====================
    BindFramebuffer {
        target: String,
        #[serde(default = "unbound")]
        framebuffer: i64,
    },
    #[serde(rename = "framebufferTexture2D")]
    FramebufferTexture2D {
        target: String,
        #[serde(alias = "attachment")]
        attachement: String,
        textarget: String,
        #[serde(default = "unbound")]
        texture: i64,
        #[serde(default)]
        level: i32,
    },
    DrawBuffers {
        buffers: Vec<String>,
    },

    // ==================== Draws ====================
    DrawArrays {
        #[serde(alias = "type")]
        mode: String,
        first: i32,
        count: i32,
    },
    DrawArraysInstanced {
        #[serde(alias = "type")]
        mode: String,
        first: i32,
        count: i32,
        instance_count: i32,
    },
    DrawElements {
        mode: String,
        count: i32,
        #[serde(rename = "type")]
        type_: String,
        #[serde(default)]
        offset: i32,
    },
    DrawElementsInstanced {
        mode: String,
        count: i32,
        #[serde(rename = "type")]
        type_: String,
        #[serde(default)]
        offset: i32,
        instance_count: i32,
    },

    /// Any tag this engine does not know.
    #[serde(other)]
    Unknown,
}

impl CommandKind {
    /// The wire tag, for logs and failure reports.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Viewport { .. } => "viewport",
            CommandKind::Enable(_) => "enable",
            CommandKind::Disable(_) => "disable",
            CommandKind::ClearColor { .. } => "clearColor",
            CommandKind::Clear { .. } => "clear",
            CommandKind::FrontFace { .. } => "frontFace",
            CommandKind::CullFace { .. } => "cullFace",
            CommandKind::DepthFunc { .. } => "depthFunc",
            CommandKind::DepthMask { .. } => "depthMask",
            CommandKind::DepthRange { .. } => "depthRange",
            CommandKind::BlendColor { .. } => "blendColor",
            CommandKind::BlendEquation { .. } => "blendEquation",
            CommandKind::BlendEquationSeparate { .. } => "blendEquationSeparate",
            CommandKind::BlendFunc { .. } => "blendFunc",
            CommandKind::BlendFuncSeparate { .. } => "blendFuncSeparate",
            CommandKind::PixelStorei { .. } => "pixelStorei",
            CommandKind::CreateTexture { .. } => "createTexture",
            CommandKind::CreateShader { .. } => "createShader",
            CommandKind::CreateProgram { .. } => "createProgram",
            CommandKind::CreateBuffer { .. } => "createBuffer",
            CommandKind::CreateVertexArray { .. } => "createVertexArray",
            CommandKind::CreateFramebuffer { .. } => "createFramebuffer",
            CommandKind::BindTexture { .. } => "bindTexture",
            CommandKind::ActiveTexture { .. } => "activeTexture",
            CommandKind::GenerateMipmap { .. } => "generateMipmap",
            CommandKind::TexImage2D { .. } => "texImage2D",
            CommandKind::TexImage3D { .. } => "texImage3D",
            CommandKind::TexStorage2D { .. } => "texStorage2D",
            CommandKind::TexStorage3D { .. } => "texStorage3D",
            CommandKind::TexParameteri { .. } => "texParameteri",
            CommandKind::TexParameterf { .. } => "texParameterf",
            CommandKind::TexParameterStr { .. } => "texParameter_str",
            CommandKind::ShaderSource { .. } => "shaderSource",
            CommandKind::CompileShader { .. } => "compileShader",
            CommandKind::DeleteShader { .. } => "deleteShader",
            CommandKind::AttachShader { .. } => "attachShader",
            CommandKind::BindAttribLocation { .. } => "bindAttribLocation",
            CommandKind::LinkProgram { .. } => "linkProgram",
            CommandKind::UseProgram { .. } => "useProgram",
            CommandKind::Uniform { .. } => "uniform",
            CommandKind::UniformMatrix { .. } => "uniformMatrix",
            CommandKind::UniformBlockBinding { .. } => "uniformBlockBinding",
            CommandKind::BindBuffer { .. } => "bindBuffer",
            CommandKind::BindBufferBase { .. } => "bindBufferBase",
            CommandKind::BufferData { .. } => "bufferData",
            CommandKind::BufferSubData { .. } => "bufferSubData",
            CommandKind::BufferSubDataStr { .. } => "bufferSubDataStr",
            CommandKind::CreateUniformBuffer { .. } => "createUniformBuffer",
            CommandKind::BindVertexArray { .. } => "bindVertexArray",
            CommandKind::VertexAttribPointer { .. } => "vertexAttribPointer",
            CommandKind::VertexAttribIPointer { .. } => "vertexAttribIPointer",
            CommandKind::EnableVertexAttribArray { .. } => "enableVertexAttribArray",
            CommandKind::DisableVertexAttribArray { .. } => "disableVertexAttribArray",
            CommandKind::VertexAttribFv { .. } => "vertexAttrib[1234]fv",
            CommandKind::VertexAttribI4iv { .. } => "vertexAttribI4[u]iv",
            CommandKind::BindFramebuffer { .. } => "bindFramebuffer",
            CommandKind::FramebufferTexture2D { .. } => "framebufferTexture2D",
            CommandKind::DrawBuffers { .. } => "drawBuffers",
            CommandKind::DrawArrays { .. } => "drawArrays",
            CommandKind::DrawArraysInstanced { .. } => "drawArraysInstanced",
            CommandKind::DrawElements { .. } => "drawElements",
            CommandKind::DrawElementsInstanced { .. } => "drawElementsInstanced",
            CommandKind::Unknown => "unknown",
        }
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl From<CommandKind> for Command {
    fn from(kind: CommandKind) -> Self {
        Self {
            kind,
            buffer_metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_simple_commands() {
        let cmd = parse(json!({"cmd": "viewport", "x": 0, "y": 0, "width": 640, "height": 480}));
        assert_eq!(
            cmd.kind,
            CommandKind::Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            }
        );
        assert!(cmd.buffer_metadata.is_none());

        let cmd = parse(json!({"cmd": "depthFunc", "func": "LEQUAL"}));
        assert_eq!(cmd.name(), "depthFunc");
    }

    #[test]
    fn test_parse_enable_flags() {
        let cmd = parse(json!({"cmd": "enable", "depth_test": true, "cull_face": true}));
        let CommandKind::Enable(flags) = cmd.kind else {
            panic!("expected enable");
        };
        assert!(flags.depth_test && flags.cull_face);
        assert!(!flags.blend);
        assert_eq!(flags.mask, None);
    }

    #[test]
    fn test_parse_payload_metadata() {
        let cmd = parse(json!({
            "cmd": "bufferData",
            "target": "ARRAY_BUFFER",
            "usage": "STATIC_DRAW",
            "update_info": true,
            "buffer_metadata": {"index": 2, "dtype": "float32", "shape": [3, 3]}
        }));
        assert_eq!(
            cmd.buffer_metadata,
            Some(BufferMetadata {
                index: 2,
                dtype: "float32".into(),
                shape: vec![3, 3]
            })
        );
        assert!(matches!(
            cmd.kind,
            CommandKind::BufferData {
                update_info: true,
                size: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unbind_defaults() {
        let cmd = parse(json!({"cmd": "useProgram"}));
        assert_eq!(cmd.kind, CommandKind::UseProgram { program: -1 });
        let cmd = parse(json!({"cmd": "bindVertexArray", "vao": 3}));
        assert_eq!(cmd.kind, CommandKind::BindVertexArray { vertex_array: 3 });
    }

    #[test]
    fn test_odd_tags() {
        let cmd = parse(json!({"cmd": "vertexAttrib[1234]fv", "index": "in_color"}));
        assert_eq!(
            cmd.kind,
            CommandKind::VertexAttribFv {
                index: AttribIndex::Name("in_color".into())
            }
        );

        let cmd = parse(json!({"cmd": "texParameter_str", "target": "TEXTURE_2D",
            "pname": "TEXTURE_MIN_FILTER", "param": "LINEAR"}));
        assert_eq!(cmd.name(), "texParameter_str");

        let cmd = parse(json!({"cmd": "blend_func_separate", "src_rgb": "ONE",
            "dst_rgb": "ZERO", "src_alpha": "ONE", "dst_alpha": "ZERO"}));
        assert_eq!(cmd.name(), "blendFuncSeparate");

        let cmd = parse(json!({"cmd": "framebufferTexture2D", "target": "FRAMEBUFFER",
            "attachement": "COLOR_ATTACHMENT0", "textarget": "TEXTURE_2D", "texture": 1, "level": 0}));
        assert_eq!(cmd.name(), "framebufferTexture2D");
    }

    #[test]
    fn test_attrib_index_forms() {
        let cmd = parse(json!({"cmd": "enableVertexAttribArray", "index": 2}));
        assert_eq!(
            cmd.kind,
            CommandKind::EnableVertexAttribArray {
                index: AttribIndex::Location(2)
            }
        );
    }

    #[test]
    fn test_pixel_store_params() {
        let cmd = parse(json!({"cmd": "pixelStorei", "pname": "UNPACK_FLIP_Y_WEBGL", "param": true}));
        assert!(matches!(
            cmd.kind,
            CommandKind::PixelStorei {
                param: PixelStoreParam::Flag(true),
                ..
            }
        ));
        let cmd = parse(json!({"cmd": "pixelStorei", "pname": "UNPACK_ALIGNMENT", "param": 1}));
        assert!(matches!(
            cmd.kind,
            CommandKind::PixelStorei {
                param: PixelStoreParam::Int(1),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let cmd = parse(json!({"cmd": "readPixels", "x": 0}));
        assert_eq!(cmd.kind, CommandKind::Unknown);
    }

    #[test]
    fn test_parse_batch() {
        let batch: CommandBatch = serde_json::from_value(json!({
            "clear": true,
            "commands": [
                {"cmd": "clearColor", "r": 0.0, "g": 0.0, "b": 0.0, "a": 1.0},
                {"cmd": "clear", "color": true}
            ]
        }))
        .unwrap();
        assert!(batch.clear);
        assert!(!batch.only_once);
        assert_eq!(batch.commands.len(), 2);
    }
}
