//! Per-resource info records mirrored back to the host.
//!
//! Records serialize to the JSON shape hosts display, tagged by `"type"`.

use glreplay_webgl::WebGLUniformLocation;
use serde::{Serialize, Serializer};

use crate::registry::Handle;
use crate::tokens::BufferTarget;

/// What the engine knows about one registered resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ResourceInfo {
    /// Registered but not created yet.
    #[serde(rename = "not set")]
    Unset,
    Buffer(BufferInfo),
    #[serde(rename = "VERTEX_SHADER")]
    VertexShader(ShaderInfo),
    #[serde(rename = "FRAGMENT_SHADER")]
    FragmentShader(ShaderInfo),
    Program(ProgramInfo),
    #[serde(rename = "Vertex Array Object")]
    VertexArray(VertexArrayInfo),
    #[serde(rename = "texture")]
    Texture,
    Framebuffer,
}

/// Kinds of resources a handle can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Shader,
    Program,
    VertexArray,
    Texture,
    Framebuffer,
}

impl ResourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Shader => "shader",
            ResourceKind::Program => "program",
            ResourceKind::VertexArray => "vertex array",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ResourceInfo {
    /// The kind of resource this record describes, `None` while unset.
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            ResourceInfo::Unset => None,
            ResourceInfo::Buffer(_) => Some(ResourceKind::Buffer),
            ResourceInfo::VertexShader(_) | ResourceInfo::FragmentShader(_) => {
                Some(ResourceKind::Shader)
            }
            ResourceInfo::Program(_) => Some(ResourceKind::Program),
            ResourceInfo::VertexArray(_) => Some(ResourceKind::VertexArray),
            ResourceInfo::Texture => Some(ResourceKind::Texture),
            ResourceInfo::Framebuffer => Some(ResourceKind::Framebuffer),
        }
    }

    pub fn as_program(&self) -> Option<&ProgramInfo> {
        match self {
            ResourceInfo::Program(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferInfo> {
        match self {
            ResourceInfo::Buffer(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_shader_mut(&mut self) -> Option<&mut ShaderInfo> {
        match self {
            ResourceInfo::VertexShader(info) | ResourceInfo::FragmentShader(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_vertex_array_mut(&mut self) -> Option<&mut VertexArrayInfo> {
        match self {
            ResourceInfo::VertexArray(info) => Some(info),
            _ => None,
        }
    }
}

// ==================== Shaders and programs ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShaderInfo {
    /// "compiled" or the compile log, absent before the first compile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgramInfo {
    /// "linked" or the link log, absent before the first link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub uniforms: Vec<UniformInfo>,
    pub uniforms_blocks: Vec<UniformBlockInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ProgramInfo {
    /// Arrays answer to both `name` and `name[0]`, as `getUniformLocation` does.
    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms
            .iter()
            .find(|u| u.name == name || u.name.strip_suffix("[0]") == Some(name))
    }

    pub fn block(&self, name: &str) -> Option<&UniformBlockInfo> {
        self.uniforms_blocks.iter().find(|b| b.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A uniform outside any block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub size: i32,
    #[serde(serialize_with = "serialize_location")]
    pub location: Option<WebGLUniformLocation>,
}

fn serialize_location<S: Serializer>(
    location: &Option<WebGLUniformLocation>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match location {
        Some(loc) => serializer.serialize_some(&loc.id()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformBlockInfo {
    pub index: u32,
    pub name: String,
    /// Data size in bytes.
    pub size: i32,
    pub uniforms: Vec<BlockUniformInfo>,
}

impl UniformBlockInfo {
    pub fn member(&self, name: &str) -> Option<&BlockUniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockUniformInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub size: i32,
    /// Byte offset within the block.
    pub offset: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub size: i32,
    pub location: i32,
}

// ==================== Buffers ====================

/// Size of a buffer's data store as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSize {
    Bytes(i64),
    Undefined,
}

impl Serialize for BufferSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BufferSize::Bytes(n) => serializer.serialize_i64(*n),
            BufferSize::Undefined => serializer.serialize_str("Undefined"),
        }
    }
}

/// Buffer record; size and target stay absent until a data upload reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<BufferSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<BufferTarget>,
    /// Layout of the uniform block this buffer was created for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uniformblock: Option<UniformBlockInfo>,
}

// ==================== Vertex arrays ====================

/// Attribute pointers recorded per source buffer, in call order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VertexArrayInfo {
    pub bindings: Vec<VertexBinding>,
}

impl VertexArrayInfo {
    pub fn record(&mut self, buffer_uid: Handle, pointer: AttributePointerInfo) {
        match self.bindings.iter_mut().find(|b| b.buffer_uid == buffer_uid) {
            Some(binding) => binding.attributes.push(pointer),
            None => self.bindings.push(VertexBinding {
                buffer_uid,
                attributes: vec![pointer],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexBinding {
    pub buffer_uid: Handle,
    pub attributes: Vec<AttributePointerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributePointerInfo {
    /// "vertexAttribPointer" or "vertexAttribIPointer".
    pub pointer: &'static str,
    pub index: u32,
    pub size: i32,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<bool>,
    pub stride: i32,
    pub offset: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_and_simple_tags() {
        assert_eq!(
            serde_json::to_value(&ResourceInfo::Unset).unwrap(),
            json!({"type": "not set"})
        );
        assert_eq!(
            serde_json::to_value(&ResourceInfo::Texture).unwrap(),
            json!({"type": "texture"})
        );
        assert_eq!(
            serde_json::to_value(&ResourceInfo::Framebuffer).unwrap(),
            json!({"type": "Framebuffer"})
        );
    }

    #[test]
    fn test_shader_message() {
        let info = ResourceInfo::FragmentShader(ShaderInfo {
            message: Some("compiled".into()),
        });
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"type": "FRAGMENT_SHADER", "message": "compiled"})
        );
        assert_eq!(info.kind(), Some(ResourceKind::Shader));
    }

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(
            serde_json::to_value(ResourceInfo::Buffer(BufferInfo::default())).unwrap(),
            json!({"type": "Buffer"})
        );

        let info = ResourceInfo::Buffer(BufferInfo {
            size: Some(BufferSize::Undefined),
            target: Some(BufferTarget::Array),
            uniformblock: None,
        });
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"type": "Buffer", "size": "Undefined", "target": "ARRAY_BUFFER"})
        );

        let info = ResourceInfo::Buffer(BufferInfo {
            size: Some(BufferSize::Bytes(256)),
            target: Some(BufferTarget::Uniform),
            uniformblock: Some(UniformBlockInfo {
                index: 0,
                name: "Material".into(),
                size: 16,
                uniforms: vec![BlockUniformInfo {
                    name: "tint".into(),
                    type_: "vec4".into(),
                    size: 1,
                    offset: 0,
                }],
            }),
        });
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["size"], json!(256));
        assert_eq!(value["uniformblock"]["uniforms"][0]["type"], json!("vec4"));
    }

    #[test]
    fn test_vertex_array_groups_by_buffer() {
        let pointer = |index| AttributePointerInfo {
            pointer: "vertexAttribPointer",
            index,
            size: 3,
            type_: "FLOAT".into(),
            normalized: Some(false),
            stride: 0,
            offset: 0,
        };
        let mut vao = VertexArrayInfo::default();
        vao.record(Handle(4), pointer(0));
        vao.record(Handle(5), pointer(1));
        vao.record(Handle(4), pointer(2));
        assert_eq!(vao.bindings.len(), 2);
        assert_eq!(vao.bindings[0].attributes.len(), 2);

        let value = serde_json::to_value(ResourceInfo::VertexArray(vao)).unwrap();
        assert_eq!(value["type"], json!("Vertex Array Object"));
        assert_eq!(value["bindings"][0]["buffer_uid"], json!(4));
        assert_eq!(value["bindings"][1]["attributes"][0]["index"], json!(1));
    }

    #[test]
    fn test_program_lookup() {
        let program = ProgramInfo {
            message: Some("linked".into()),
            uniforms: vec![UniformInfo {
                name: "model".into(),
                type_: "mat4".into(),
                size: 1,
                location: None,
            }],
            uniforms_blocks: vec![],
            attributes: vec![AttributeInfo {
                name: "position".into(),
                type_: "vec3".into(),
                size: 1,
                location: 0,
            }],
        };
        assert!(program.uniform("model").is_some());
        assert!(program.block("ViewBlock").is_none());
        assert_eq!(program.attribute("position").map(|a| a.location), Some(0));

        let value = serde_json::to_value(ResourceInfo::Program(program)).unwrap();
        assert_eq!(value["uniforms"][0]["location"], serde_json::Value::Null);
        assert_eq!(value["uniforms_blocks"], json!([]));
    }

    #[test]
    fn test_array_uniform_answers_to_base_name() {
        let program = ProgramInfo {
            uniforms: vec![UniformInfo {
                name: "u_colors[0]".into(),
                type_: "FLOAT_VEC4".into(),
                size: 3,
                location: None,
            }],
            ..ProgramInfo::default()
        };
        assert_eq!(program.uniform("u_colors").map(|u| u.size), Some(3));
        assert!(program.uniform("u_colors[0]").is_some());
        assert!(program.uniform("u_color").is_none());
        assert!(program.uniform("u_colors[1]").is_none());
    }
}
