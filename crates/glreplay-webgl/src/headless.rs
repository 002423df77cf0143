//! In-memory WebGL 2 context.
//!
//! `HeadlessContext` keeps every object the engine creates in plain maps,
//! records draw calls instead of rasterizing, and counts each trait call by
//! name so callers can assert which primitives a replay reached.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::constants;
use crate::reflect::{self, ShaderInterface};
use crate::{
    ActiveInfo, Capabilities, ClearMask, GlContext, GlObject, WebGLBuffer, WebGLFramebuffer,
    WebGLProgram, WebGLShader, WebGLTexture, WebGLUniformLocation, WebGLVertexArray,
};

const MAX_VERTEX_ATTRIBS: usize = 16;
const MAX_TEXTURE_UNITS: usize = 32;
const MAX_UNIFORM_BUFFER_BINDINGS: u32 = 24;

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "EXT_texture_filter_anisotropic",
    "OES_texture_float_linear",
];

const BUFFER_TARGETS: &[u32] = &[
    constants::ARRAY_BUFFER,
    constants::ELEMENT_ARRAY_BUFFER,
    constants::COPY_READ_BUFFER,
    constants::COPY_WRITE_BUFFER,
    constants::TRANSFORM_FEEDBACK_BUFFER,
    constants::UNIFORM_BUFFER,
    constants::PIXEL_PACK_BUFFER,
    constants::PIXEL_UNPACK_BUFFER,
];

// ==================== Shader ====================

/// Shader data.
#[derive(Debug, Clone)]
pub struct ShaderData {
    pub shader_type: u32,
    pub source: String,
    pub compiled: bool,
    pub info_log: String,
    pub deleted: bool,
    pub interface: ShaderInterface,
}

impl ShaderData {
    pub fn new(shader_type: u32) -> Self {
        Self {
            shader_type,
            source: String::new(),
            compiled: false,
            info_log: String::new(),
            deleted: false,
            interface: ShaderInterface::default(),
        }
    }
}

// ==================== Program ====================

/// An active uniform after linking.
#[derive(Debug, Clone)]
pub struct LinkedUniform {
    pub info: ActiveInfo,
    /// Index of the owning uniform block, -1 for the default block.
    pub block_index: i32,
    /// Byte offset inside the block, -1 for the default block.
    pub offset: i32,
    pub location: Option<WebGLUniformLocation>,
}

/// An active uniform block after linking.
#[derive(Debug, Clone)]
pub struct LinkedBlock {
    pub name: String,
    pub data_size: u32,
    pub binding: u32,
    pub active_uniforms: u32,
}

/// An active attribute after linking.
#[derive(Debug, Clone)]
pub struct LinkedAttribute {
    pub info: ActiveInfo,
    pub location: i32,
}

/// Program data.
#[derive(Debug, Clone, Default)]
pub struct ProgramData {
    pub vertex_shader: Option<WebGLShader>,
    pub fragment_shader: Option<WebGLShader>,
    pub linked: bool,
    pub validated: bool,
    pub info_log: String,
    pub deleted: bool,
    /// Locations requested through `bindAttribLocation`, applied at link.
    pub attrib_bindings: HashMap<String, u32>,
    pub uniforms: Vec<LinkedUniform>,
    pub blocks: Vec<LinkedBlock>,
    pub attributes: Vec<LinkedAttribute>,
}

impl ProgramData {
    pub fn new() -> Self {
        Self::default()
    }

    fn uniform_location(&self, name: &str) -> Option<WebGLUniformLocation> {
        self.uniforms.iter().find_map(|u| {
            let base = u.info.name.strip_suffix("[0]");
            if u.info.name == name || base == Some(name) {
                u.location
            } else {
                None
            }
        })
    }
}

struct LinkOutput {
    uniforms: Vec<LinkedUniform>,
    blocks: Vec<LinkedBlock>,
    attributes: Vec<LinkedAttribute>,
}

// ==================== Buffer ====================

/// Buffer data.
#[derive(Debug, Clone, Default)]
pub struct BufferData {
    /// First target the buffer was bound to.
    pub target: Option<u32>,
    pub usage: u32,
    pub data: Vec<u8>,
    pub deleted: bool,
}

// ==================== Vertex Array ====================

/// Vertex attribute pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexAttribPointer {
    pub enabled: bool,
    pub size: i32,
    pub type_: u32,
    pub normalized: bool,
    /// Set by `vertexAttribIPointer`.
    pub integer: bool,
    pub stride: i32,
    pub offset: i32,
    pub buffer: Option<WebGLBuffer>,
}

/// Vertex array object state.
#[derive(Debug, Clone)]
pub struct VertexArrayData {
    pub attribs: Vec<VertexAttribPointer>,
    pub element_buffer: Option<WebGLBuffer>,
}

impl Default for VertexArrayData {
    fn default() -> Self {
        Self {
            attribs: vec![VertexAttribPointer::default(); MAX_VERTEX_ATTRIBS],
            element_buffer: None,
        }
    }
}

/// Generic (non-array) vertex attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexAttribValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

// ==================== Texture ====================

/// Texture data.
#[derive(Debug, Clone, Default)]
pub struct TextureData {
    pub target: Option<u32>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub levels: u32,
    pub internal_format: u32,
    pub format: u32,
    pub immutable: bool,
    pub mipmapped: bool,
    pub data: Vec<u8>,
    pub int_params: HashMap<u32, i32>,
    pub float_params: HashMap<u32, f32>,
}

// ==================== Framebuffer ====================

/// A texture attached to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureAttachment {
    pub texture: WebGLTexture,
    pub textarget: u32,
    pub level: i32,
}

/// Framebuffer data.
#[derive(Debug, Clone, Default)]
pub struct FramebufferData {
    pub attachments: HashMap<u32, TextureAttachment>,
    pub draw_buffers: Vec<u32>,
}

// ==================== Context State ====================

/// Fixed-function and binding state.
#[derive(Debug, Clone)]
pub struct GlState {
    pub clear_color: [f32; 4],
    pub viewport: [i32; 4],
    pub capabilities: Capabilities,
    pub front_face: u32,
    pub cull_face_mode: u32,
    pub depth_func: u32,
    pub depth_mask: bool,
    pub depth_range: [f32; 2],
    pub blend_color: [f32; 4],
    pub blend_equation: (u32, u32),
    pub blend_func: (u32, u32, u32, u32),
    pub pixel_store: HashMap<u32, i32>,
    pub current_program: Option<WebGLProgram>,
    pub current_vertex_array: Option<WebGLVertexArray>,
    pub current_framebuffer: Option<WebGLFramebuffer>,
    pub bound_buffers: HashMap<u32, WebGLBuffer>,
    pub indexed_buffers: HashMap<(u32, u32), WebGLBuffer>,
    pub active_texture: u32,
    pub texture_units: Vec<HashMap<u32, WebGLTexture>>,
    pub default_draw_buffers: Vec<u32>,
    pub generic_attribs: HashMap<u32, VertexAttribValue>,
    pub extensions: HashSet<String>,
}

impl Default for GlState {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 0.0],
            viewport: [0, 0, 0, 0],
            capabilities: Capabilities::DITHER,
            front_face: constants::CCW,
            cull_face_mode: constants::BACK,
            depth_func: constants::LESS,
            depth_mask: true,
            depth_range: [0.0, 1.0],
            blend_color: [0.0, 0.0, 0.0, 0.0],
            blend_equation: (constants::FUNC_ADD, constants::FUNC_ADD),
            blend_func: (
                constants::ONE,
                constants::ZERO,
                constants::ONE,
                constants::ZERO,
            ),
            pixel_store: HashMap::new(),
            current_program: None,
            current_vertex_array: None,
            current_framebuffer: None,
            bound_buffers: HashMap::new(),
            indexed_buffers: HashMap::new(),
            active_texture: 0,
            texture_units: vec![HashMap::new(); MAX_TEXTURE_UNITS],
            default_draw_buffers: vec![constants::BACK],
            generic_attribs: HashMap::new(),
            extensions: HashSet::new(),
        }
    }
}

// ==================== Draw Call ====================

/// A recorded draw call.
#[derive(Debug, Clone)]
pub enum DrawCall {
    Clear {
        mask: ClearMask,
        color: [f32; 4],
    },
    DrawArrays {
        mode: u32,
        first: i32,
        count: i32,
        instance_count: i32,
        program: WebGLProgram,
        state: Box<DrawState>,
    },
    DrawElements {
        mode: u32,
        count: i32,
        type_: u32,
        offset: i32,
        instance_count: i32,
        program: WebGLProgram,
        state: Box<DrawState>,
    },
}

/// State captured with each draw.
#[derive(Debug, Clone)]
pub struct DrawState {
    pub viewport: [i32; 4],
    pub capabilities: Capabilities,
    pub vertex_array: Option<WebGLVertexArray>,
    pub framebuffer: Option<WebGLFramebuffer>,
    pub uniforms: HashMap<WebGLUniformLocation, UniformValue>,
}

/// Uniform value.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float {
        components: usize,
        data: Vec<f32>,
    },
    Int {
        components: usize,
        data: Vec<i32>,
    },
    Uint {
        components: usize,
        data: Vec<u32>,
    },
    Matrix {
        columns: usize,
        rows: usize,
        transpose: bool,
        data: Vec<f32>,
    },
}

// ==================== Headless Context ====================

/// A WebGL 2 context that keeps all state in memory.
#[derive(Debug)]
pub struct HeadlessContext {
    pub width: u32,
    pub height: u32,
    state: GlState,
    shaders: HashMap<WebGLShader, ShaderData>,
    programs: HashMap<WebGLProgram, ProgramData>,
    buffers: HashMap<WebGLBuffer, BufferData>,
    textures: HashMap<WebGLTexture, TextureData>,
    framebuffers: HashMap<WebGLFramebuffer, FramebufferData>,
    vertex_arrays: HashMap<WebGLVertexArray, VertexArrayData>,
    default_vertex_array: VertexArrayData,
    uniform_values: HashMap<WebGLUniformLocation, UniformValue>,
    draw_calls: Vec<DrawCall>,
    call_counts: RefCell<HashMap<&'static str, usize>>,
    last_error: Cell<u32>,
}

impl HeadlessContext {
    /// Create a new context with a drawing buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let state = GlState {
            viewport: [0, 0, width as i32, height as i32],
            ..Default::default()
        };

        Self {
            width,
            height,
            state,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            default_vertex_array: VertexArrayData::default(),
            uniform_values: HashMap::new(),
            draw_calls: Vec::new(),
            call_counts: RefCell::new(HashMap::new()),
            last_error: Cell::new(constants::NO_ERROR),
        }
    }

    /// Resize the drawing buffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn record(&self, call: &'static str) {
        *self.call_counts.borrow_mut().entry(call).or_insert(0) += 1;
    }

    /// Set the error flag unless one is already pending, as WebGL does.
    fn set_error(&self, code: u32) {
        if self.last_error.get() == constants::NO_ERROR {
            tracing::trace!(code = format_args!("0x{code:04X}"), "gl error");
            self.last_error.set(code);
        }
    }

    fn bound_buffer(&self, target: u32) -> Option<WebGLBuffer> {
        if target == constants::ELEMENT_ARRAY_BUFFER {
            self.current_vertex_array_data().element_buffer
        } else {
            self.state.bound_buffers.get(&target).copied()
        }
    }

    fn bound_buffer_mut(&mut self, target: u32) -> Option<&mut BufferData> {
        if !BUFFER_TARGETS.contains(&target) {
            self.set_error(constants::INVALID_ENUM);
            return None;
        }
        let Some(buffer) = self.bound_buffer(target) else {
            self.set_error(constants::INVALID_OPERATION);
            return None;
        };
        self.buffers.get_mut(&buffer)
    }

    fn vertex_array_mut(&mut self) -> &mut VertexArrayData {
        match self.state.current_vertex_array {
            Some(vao) => self
                .vertex_arrays
                .get_mut(&vao)
                .unwrap_or(&mut self.default_vertex_array),
            None => &mut self.default_vertex_array,
        }
    }

    fn bound_texture(&self, target: u32) -> Option<WebGLTexture> {
        let binding = match target {
            constants::TEXTURE_CUBE_MAP_POSITIVE_X..=constants::TEXTURE_CUBE_MAP_NEGATIVE_Z => {
                constants::TEXTURE_CUBE_MAP
            }
            other => other,
        };
        self.state
            .texture_units
            .get(self.state.active_texture as usize)
            .and_then(|unit| unit.get(&binding))
            .copied()
    }

    fn bound_texture_mut(&mut self, target: u32) -> Option<&mut TextureData> {
        let Some(texture) = self.bound_texture(target) else {
            self.set_error(constants::INVALID_OPERATION);
            return None;
        };
        self.textures.get_mut(&texture)
    }

    fn current_program_data(&self) -> Option<&ProgramData> {
        self.state
            .current_program
            .and_then(|program| self.programs.get(&program))
    }

    fn check_attrib_index(&self, index: u32) -> bool {
        if (index as usize) < MAX_VERTEX_ATTRIBS {
            true
        } else {
            self.set_error(constants::INVALID_VALUE);
            false
        }
    }

    fn set_uniform(&mut self, location: WebGLUniformLocation, len: usize, width: usize, value: UniformValue) {
        let owned = self
            .current_program_data()
            .is_some_and(|p| p.uniforms.iter().any(|u| u.location == Some(location)));
        if !owned {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        if width == 0 || len == 0 || len % width != 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        self.uniform_values.insert(location, value);
    }

    fn draw_state(&self) -> DrawState {
        DrawState {
            viewport: self.state.viewport,
            capabilities: self.state.capabilities,
            vertex_array: self.state.current_vertex_array,
            framebuffer: self.state.current_framebuffer,
            uniforms: self.uniform_values.clone(),
        }
    }

    // ==================== Output ====================

    /// Number of times a trait method was called, by snake-case name.
    pub fn call_count(&self, call: &str) -> usize {
        self.call_counts.borrow().get(call).copied().unwrap_or(0)
    }

    /// Reset every call counter.
    pub fn reset_call_counts(&mut self) {
        self.call_counts.borrow_mut().clear();
    }

    /// Draw calls recorded so far.
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Get draw calls and clear them.
    pub fn take_draw_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draw_calls)
    }

    pub fn state(&self) -> &GlState {
        &self.state
    }

    pub fn get_buffer_data(&self, buffer: WebGLBuffer) -> Option<&BufferData> {
        self.buffers.get(&buffer)
    }

    /// Buffer bound to an indexed binding point (`bindBufferBase`).
    pub fn get_indexed_buffer(&self, target: u32, index: u32) -> Option<WebGLBuffer> {
        self.state.indexed_buffers.get(&(target, index)).copied()
    }

    pub fn get_shader_data(&self, shader: WebGLShader) -> Option<&ShaderData> {
        self.shaders.get(&shader)
    }

    pub fn get_program_data(&self, program: WebGLProgram) -> Option<&ProgramData> {
        self.programs.get(&program)
    }

    pub fn get_texture_data(&self, texture: WebGLTexture) -> Option<&TextureData> {
        self.textures.get(&texture)
    }

    pub fn get_framebuffer_data(&self, framebuffer: WebGLFramebuffer) -> Option<&FramebufferData> {
        self.framebuffers.get(&framebuffer)
    }

    pub fn get_vertex_array_data(&self, vertex_array: WebGLVertexArray) -> Option<&VertexArrayData> {
        self.vertex_arrays.get(&vertex_array)
    }

    /// State of the bound vertex array, or the default one.
    pub fn current_vertex_array_data(&self) -> &VertexArrayData {
        self.state
            .current_vertex_array
            .and_then(|vao| self.vertex_arrays.get(&vao))
            .unwrap_or(&self.default_vertex_array)
    }

    pub fn get_uniform_value(&self, location: WebGLUniformLocation) -> Option<&UniformValue> {
        self.uniform_values.get(&location)
    }

    /// Value set through `vertexAttrib*`.
    pub fn get_vertex_attrib_value(&self, index: u32) -> Option<VertexAttribValue> {
        self.state.generic_attribs.get(&index).copied()
    }
}

// ==================== Linking ====================

fn linked_stage<'a>(
    shaders: &'a HashMap<WebGLShader, ShaderData>,
    shader: Option<WebGLShader>,
    label: &str,
) -> Result<&'a ShaderData, String> {
    let data = shader
        .and_then(|s| shaders.get(&s))
        .ok_or_else(|| format!("ERROR: Linking failed: no {label} shader attached"))?;
    if !data.compiled {
        return Err(format!("ERROR: Linking failed: {label} shader not compiled"));
    }
    Ok(data)
}

fn link(
    program: &ProgramData,
    shaders: &HashMap<WebGLShader, ShaderData>,
) -> Result<LinkOutput, String> {
    let vs = linked_stage(shaders, program.vertex_shader, "vertex")?;
    let fs = linked_stage(shaders, program.fragment_shader, "fragment")?;

    // Blocks, then loose uniforms, deduplicated across stages.
    let mut blocks: Vec<&reflect::UniformBlockDecl> = Vec::new();
    for block in vs.interface.blocks.iter().chain(&fs.interface.blocks) {
        match blocks.iter().find(|b| b.name == block.name) {
            Some(existing) if existing.members != block.members => {
                return Err(format!(
                    "ERROR: Linking failed: uniform block '{}' differs between shaders",
                    block.name
                ));
            }
            Some(_) => {}
            None => blocks.push(block),
        }
    }

    let mut uniforms = Vec::new();
    let mut seen = HashSet::new();
    for decl in vs.interface.uniforms.iter().chain(&fs.interface.uniforms) {
        if seen.insert(decl.name.clone()) {
            uniforms.push(LinkedUniform {
                info: ActiveInfo {
                    name: decl.active_name(),
                    type_: decl.type_,
                    size: decl.size,
                },
                block_index: -1,
                offset: -1,
                location: Some(GlObject::new()),
            });
        }
    }

    let mut linked_blocks = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        for member in &block.members {
            uniforms.push(LinkedUniform {
                info: ActiveInfo {
                    name: block.member_name(member),
                    type_: member.decl.type_,
                    size: member.decl.size,
                },
                block_index: index as i32,
                offset: member.offset as i32,
                location: None,
            });
        }
        linked_blocks.push(LinkedBlock {
            name: block.name.clone(),
            data_size: block.data_size,
            binding: 0,
            active_uniforms: block.members.len() as u32,
        });
    }

    let attributes = assign_attribute_locations(&vs.interface.attributes, &program.attrib_bindings)?;

    Ok(LinkOutput {
        uniforms,
        blocks: linked_blocks,
        attributes,
    })
}

fn assign_attribute_locations(
    decls: &[reflect::AttributeDecl],
    bindings: &HashMap<String, u32>,
) -> Result<Vec<LinkedAttribute>, String> {
    let mut used = [false; MAX_VERTEX_ATTRIBS];
    let mut locations: Vec<Option<u32>> = Vec::with_capacity(decls.len());

    let mut claim = |start: u32, slots: u32, name: &str| -> Result<(), String> {
        let end = (start + slots) as usize;
        if end > MAX_VERTEX_ATTRIBS {
            return Err(format!(
                "ERROR: Linking failed: attribute '{name}' exceeds MAX_VERTEX_ATTRIBS"
            ));
        }
        for slot in &mut used[start as usize..end] {
            *slot = true;
        }
        Ok(())
    };

    // Explicit layout wins over bindAttribLocation.
    for decl in decls {
        let fixed = decl.location.or_else(|| bindings.get(&decl.name).copied());
        if let Some(location) = fixed {
            claim(location, decl.slots(), &decl.name)?;
        }
        locations.push(fixed);
    }

    let mut attributes = Vec::with_capacity(decls.len());
    for (decl, fixed) in decls.iter().zip(locations) {
        let location = match fixed {
            Some(location) => location,
            None => {
                let slots = decl.slots() as usize;
                if slots > MAX_VERTEX_ATTRIBS {
                    return Err(format!(
                        "ERROR: Linking failed: attribute '{}' exceeds MAX_VERTEX_ATTRIBS",
                        decl.name
                    ));
                }
                let start = (0..=MAX_VERTEX_ATTRIBS.saturating_sub(slots))
                    .find(|&start| used[start..start + slots].iter().all(|u| !u))
                    .ok_or_else(|| {
                        format!("ERROR: Linking failed: no room for attribute '{}'", decl.name)
                    })?;
                for slot in &mut used[start..start + slots] {
                    *slot = true;
                }
                start as u32
            }
        };
        attributes.push(LinkedAttribute {
            info: ActiveInfo {
                name: decl.name.clone(),
                type_: decl.type_,
                size: decl.size,
            },
            location: location as i32,
        });
    }
    Ok(attributes)
}

// ==================== GlContext ====================

impl GlContext for HeadlessContext {
    fn get_error(&mut self) -> u32 {
        self.record("get_error");
        self.last_error.replace(constants::NO_ERROR)
    }

    fn get_extension(&mut self, name: &str) -> bool {
        self.record("get_extension");
        let supported = SUPPORTED_EXTENSIONS.contains(&name);
        if supported {
            self.state.extensions.insert(name.to_string());
        }
        supported
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record("viewport");
        if width < 0 || height < 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        self.state.viewport = [x, y, width, height];
    }

    fn enable(&mut self, caps: Capabilities) {
        self.record("enable");
        self.state.capabilities.insert(caps);
    }

    fn disable(&mut self, caps: Capabilities) {
        self.record("disable");
        self.state.capabilities.remove(caps);
    }

    fn is_enabled(&self, cap: Capabilities) -> bool {
        self.state.capabilities.contains(cap)
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record("clear_color");
        self.state.clear_color = [r, g, b, a];
    }

    fn clear(&mut self, mask: ClearMask) {
        self.record("clear");
        self.draw_calls.push(DrawCall::Clear {
            mask,
            color: self.state.clear_color,
        });
    }

    fn front_face(&mut self, mode: u32) {
        self.record("front_face");
        match mode {
            constants::CW | constants::CCW => self.state.front_face = mode,
            _ => self.set_error(constants::INVALID_ENUM),
        }
    }

    fn cull_face(&mut self, mode: u32) {
        self.record("cull_face");
        match mode {
            constants::FRONT | constants::BACK | constants::FRONT_AND_BACK => {
                self.state.cull_face_mode = mode
            }
            _ => self.set_error(constants::INVALID_ENUM),
        }
    }

    fn depth_func(&mut self, func: u32) {
        self.record("depth_func");
        match func {
            constants::NEVER..=constants::ALWAYS => self.state.depth_func = func,
            _ => self.set_error(constants::INVALID_ENUM),
        }
    }

    fn depth_mask(&mut self, flag: bool) {
        self.record("depth_mask");
        self.state.depth_mask = flag;
    }

    fn depth_range(&mut self, z_near: f32, z_far: f32) {
        self.record("depth_range");
        if z_near > z_far {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        self.state.depth_range = [z_near.clamp(0.0, 1.0), z_far.clamp(0.0, 1.0)];
    }

    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record("blend_color");
        self.state.blend_color = [r, g, b, a];
    }

    fn blend_equation(&mut self, mode: u32) {
        self.record("blend_equation");
        self.state.blend_equation = (mode, mode);
    }

    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        self.record("blend_equation_separate");
        self.state.blend_equation = (mode_rgb, mode_alpha);
    }

    fn blend_func(&mut self, s_factor: u32, d_factor: u32) {
        self.record("blend_func");
        self.state.blend_func = (s_factor, d_factor, s_factor, d_factor);
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record("blend_func_separate");
        self.state.blend_func = (src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    fn pixel_storei(&mut self, pname: u32, param: i32) {
        self.record("pixel_storei");
        if matches!(pname, constants::UNPACK_ALIGNMENT | constants::PACK_ALIGNMENT)
            && !matches!(param, 1 | 2 | 4 | 8)
        {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        self.state.pixel_store.insert(pname, param);
    }

    // ==================== Shaders ====================

    fn create_shader(&mut self, shader_type: u32) -> Option<WebGLShader> {
        self.record("create_shader");
        if !matches!(shader_type, constants::VERTEX_SHADER | constants::FRAGMENT_SHADER) {
            self.set_error(constants::INVALID_ENUM);
            return None;
        }
        let shader = GlObject::new();
        self.shaders.insert(shader, ShaderData::new(shader_type));
        Some(shader)
    }

    fn shader_source(&mut self, shader: WebGLShader, source: &str) {
        self.record("shader_source");
        match self.shaders.get_mut(&shader) {
            Some(data) => data.source = source.to_string(),
            None => self.set_error(constants::INVALID_VALUE),
        }
    }

    fn compile_shader(&mut self, shader: WebGLShader) {
        self.record("compile_shader");
        let Some(data) = self.shaders.get_mut(&shader) else {
            self.set_error(constants::INVALID_VALUE);
            return;
        };
        match reflect::reflect(&data.source, data.shader_type) {
            Ok(interface) => {
                data.compiled = true;
                data.info_log.clear();
                data.interface = interface;
            }
            Err(log) => {
                data.compiled = false;
                data.info_log = log;
                data.interface = ShaderInterface::default();
            }
        }
    }

    fn get_shader_parameter(&self, shader: WebGLShader, pname: u32) -> Option<i32> {
        self.record("get_shader_parameter");
        let data = self.shaders.get(&shader)?;
        match pname {
            constants::COMPILE_STATUS => Some(data.compiled as i32),
            constants::DELETE_STATUS => Some(data.deleted as i32),
            constants::SHADER_TYPE => Some(data.shader_type as i32),
            _ => {
                self.set_error(constants::INVALID_ENUM);
                None
            }
        }
    }

    fn get_shader_info_log(&self, shader: WebGLShader) -> String {
        self.record("get_shader_info_log");
        self.shaders
            .get(&shader)
            .map(|d| d.info_log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: WebGLShader) {
        self.record("delete_shader");
        if let Some(data) = self.shaders.get_mut(&shader) {
            data.deleted = true;
        }
    }

    // ==================== Programs ====================

    fn create_program(&mut self) -> Option<WebGLProgram> {
        self.record("create_program");
        let program = GlObject::new();
        self.programs.insert(program, ProgramData::new());
        Some(program)
    }

    fn attach_shader(&mut self, program: WebGLProgram, shader: WebGLShader) {
        self.record("attach_shader");
        let (Some(program_data), Some(shader_data)) =
            (self.programs.get_mut(&program), self.shaders.get(&shader))
        else {
            self.set_error(constants::INVALID_VALUE);
            return;
        };
        match shader_data.shader_type {
            constants::VERTEX_SHADER => program_data.vertex_shader = Some(shader),
            _ => program_data.fragment_shader = Some(shader),
        }
    }

    fn bind_attrib_location(&mut self, program: WebGLProgram, index: u32, name: &str) {
        self.record("bind_attrib_location");
        if !self.check_attrib_index(index) {
            return;
        }
        match self.programs.get_mut(&program) {
            Some(data) => {
                data.attrib_bindings.insert(name.to_string(), index);
            }
            None => self.set_error(constants::INVALID_VALUE),
        }
    }

    fn link_program(&mut self, program: WebGLProgram) {
        self.record("link_program");
        let Some(data) = self.programs.get(&program) else {
            self.set_error(constants::INVALID_VALUE);
            return;
        };
        let result = link(data, &self.shaders);

        let Some(data) = self.programs.get_mut(&program) else {
            return;
        };
        match result {
            Ok(output) => {
                data.linked = true;
                data.info_log.clear();
                data.uniforms = output.uniforms;
                data.blocks = output.blocks;
                data.attributes = output.attributes;
            }
            Err(log) => {
                tracing::debug!(program = program.id(), %log, "link failed");
                data.linked = false;
                data.info_log = log;
                data.uniforms.clear();
                data.blocks.clear();
                data.attributes.clear();
            }
        }
    }

    fn validate_program(&mut self, program: WebGLProgram) {
        self.record("validate_program");
        match self.programs.get_mut(&program) {
            Some(data) => data.validated = data.linked,
            None => self.set_error(constants::INVALID_VALUE),
        }
    }

    fn get_program_parameter(&self, program: WebGLProgram, pname: u32) -> Option<i32> {
        self.record("get_program_parameter");
        let data = self.programs.get(&program)?;
        let attached = data.vertex_shader.is_some() as i32 + data.fragment_shader.is_some() as i32;
        match pname {
            constants::LINK_STATUS => Some(data.linked as i32),
            constants::VALIDATE_STATUS => Some(data.validated as i32),
            constants::DELETE_STATUS => Some(data.deleted as i32),
            constants::ATTACHED_SHADERS => Some(attached),
            constants::ACTIVE_UNIFORMS => Some(data.uniforms.len() as i32),
            constants::ACTIVE_ATTRIBUTES => Some(data.attributes.len() as i32),
            constants::ACTIVE_UNIFORM_BLOCKS => Some(data.blocks.len() as i32),
            _ => {
                self.set_error(constants::INVALID_ENUM);
                None
            }
        }
    }

    fn get_program_info_log(&self, program: WebGLProgram) -> String {
        self.record("get_program_info_log");
        self.programs
            .get(&program)
            .map(|d| d.info_log.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<WebGLProgram>) {
        self.record("use_program");
        if let Some(p) = program {
            if !self.programs.get(&p).is_some_and(|d| d.linked) {
                self.set_error(constants::INVALID_OPERATION);
                return;
            }
        }
        self.state.current_program = program;
    }

    // ==================== Introspection ====================

    fn get_active_uniform(&self, program: WebGLProgram, index: u32) -> Option<ActiveInfo> {
        self.record("get_active_uniform");
        let uniform = self
            .programs
            .get(&program)
            .and_then(|p| p.uniforms.get(index as usize));
        if uniform.is_none() {
            self.set_error(constants::INVALID_VALUE);
        }
        uniform.map(|u| u.info.clone())
    }

    fn get_active_uniforms(&self, program: WebGLProgram, indices: &[u32], pname: u32) -> Vec<i32> {
        self.record("get_active_uniforms");
        let Some(data) = self.programs.get(&program) else {
            self.set_error(constants::INVALID_VALUE);
            return Vec::new();
        };
        let mut values = Vec::with_capacity(indices.len());
        for &index in indices {
            let Some(uniform) = data.uniforms.get(index as usize) else {
                self.set_error(constants::INVALID_VALUE);
                return Vec::new();
            };
            let value = match pname {
                constants::UNIFORM_TYPE => uniform.info.type_ as i32,
                constants::UNIFORM_SIZE => uniform.info.size,
                constants::UNIFORM_BLOCK_INDEX => uniform.block_index,
                constants::UNIFORM_OFFSET => uniform.offset,
                _ => {
                    self.set_error(constants::INVALID_ENUM);
                    return Vec::new();
                }
            };
            values.push(value);
        }
        values
    }

    fn get_uniform_block_index(&self, program: WebGLProgram, name: &str) -> u32 {
        self.record("get_uniform_block_index");
        self.programs
            .get(&program)
            .and_then(|p| p.blocks.iter().position(|b| b.name == name))
            .map(|index| index as u32)
            .unwrap_or(constants::INVALID_INDEX)
    }

    fn get_active_uniform_block_name(&self, program: WebGLProgram, index: u32) -> Option<String> {
        self.record("get_active_uniform_block_name");
        self.programs
            .get(&program)
            .and_then(|p| p.blocks.get(index as usize))
            .map(|b| b.name.clone())
    }

    fn get_active_uniform_block_parameter(
        &self,
        program: WebGLProgram,
        index: u32,
        pname: u32,
    ) -> Option<i32> {
        self.record("get_active_uniform_block_parameter");
        let block = self
            .programs
            .get(&program)
            .and_then(|p| p.blocks.get(index as usize))?;
        match pname {
            constants::UNIFORM_BLOCK_DATA_SIZE => Some(block.data_size as i32),
            constants::UNIFORM_BLOCK_BINDING => Some(block.binding as i32),
            constants::UNIFORM_BLOCK_ACTIVE_UNIFORMS => Some(block.active_uniforms as i32),
            _ => {
                self.set_error(constants::INVALID_ENUM);
                None
            }
        }
    }

    fn uniform_block_binding(&mut self, program: WebGLProgram, index: u32, binding: u32) {
        self.record("uniform_block_binding");
        if binding >= MAX_UNIFORM_BUFFER_BINDINGS {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        match self
            .programs
            .get_mut(&program)
            .and_then(|p| p.blocks.get_mut(index as usize))
        {
            Some(block) => block.binding = binding,
            None => self.set_error(constants::INVALID_VALUE),
        }
    }

    fn get_uniform_location(
        &self,
        program: WebGLProgram,
        name: &str,
    ) -> Option<WebGLUniformLocation> {
        self.record("get_uniform_location");
        self.programs.get(&program)?.uniform_location(name)
    }

    fn get_active_attrib(&self, program: WebGLProgram, index: u32) -> Option<ActiveInfo> {
        self.record("get_active_attrib");
        let attribute = self
            .programs
            .get(&program)
            .and_then(|p| p.attributes.get(index as usize));
        if attribute.is_none() {
            self.set_error(constants::INVALID_VALUE);
        }
        attribute.map(|a| a.info.clone())
    }

    fn get_attrib_location(&self, program: WebGLProgram, name: &str) -> i32 {
        self.record("get_attrib_location");
        self.programs
            .get(&program)
            .and_then(|p| p.attributes.iter().find(|a| a.info.name == name))
            .map(|a| a.location)
            .unwrap_or(-1)
    }

    // ==================== Uniforms ====================

    fn uniform_fv(&mut self, location: WebGLUniformLocation, components: usize, data: &[f32]) {
        self.record("uniform_fv");
        let value = UniformValue::Float {
            components,
            data: data.to_vec(),
        };
        self.set_uniform(location, data.len(), components, value);
    }

    fn uniform_iv(&mut self, location: WebGLUniformLocation, components: usize, data: &[i32]) {
        self.record("uniform_iv");
        let value = UniformValue::Int {
            components,
            data: data.to_vec(),
        };
        self.set_uniform(location, data.len(), components, value);
    }

    fn uniform_uiv(&mut self, location: WebGLUniformLocation, components: usize, data: &[u32]) {
        self.record("uniform_uiv");
        let value = UniformValue::Uint {
            components,
            data: data.to_vec(),
        };
        self.set_uniform(location, data.len(), components, value);
    }

    fn uniform_matrix_fv(
        &mut self,
        location: WebGLUniformLocation,
        columns: usize,
        rows: usize,
        transpose: bool,
        data: &[f32],
    ) {
        self.record("uniform_matrix_fv");
        let value = UniformValue::Matrix {
            columns,
            rows,
            transpose,
            data: data.to_vec(),
        };
        self.set_uniform(location, data.len(), columns * rows, value);
    }

    // ==================== Buffers ====================

    fn create_buffer(&mut self) -> Option<WebGLBuffer> {
        self.record("create_buffer");
        let buffer = GlObject::new();
        self.buffers.insert(buffer, BufferData::default());
        Some(buffer)
    }

    fn bind_buffer(&mut self, target: u32, buffer: Option<WebGLBuffer>) {
        self.record("bind_buffer");
        if !BUFFER_TARGETS.contains(&target) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        if let Some(b) = buffer {
            match self.buffers.get_mut(&b) {
                Some(data) => {
                    data.target.get_or_insert(target);
                }
                None => {
                    self.set_error(constants::INVALID_OPERATION);
                    return;
                }
            }
        }
        if target == constants::ELEMENT_ARRAY_BUFFER {
            self.vertex_array_mut().element_buffer = buffer;
            return;
        }
        match buffer {
            Some(b) => {
                self.state.bound_buffers.insert(target, b);
            }
            None => {
                self.state.bound_buffers.remove(&target);
            }
        }
    }

    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: Option<WebGLBuffer>) {
        self.record("bind_buffer_base");
        if !matches!(
            target,
            constants::UNIFORM_BUFFER | constants::TRANSFORM_FEEDBACK_BUFFER
        ) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        if target == constants::UNIFORM_BUFFER && index >= MAX_UNIFORM_BUFFER_BINDINGS {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        // bindBufferBase also binds the generic target.
        match buffer {
            Some(b) => {
                self.state.indexed_buffers.insert((target, index), b);
                self.state.bound_buffers.insert(target, b);
            }
            None => {
                self.state.indexed_buffers.remove(&(target, index));
                self.state.bound_buffers.remove(&target);
            }
        }
    }

    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32) {
        self.record("buffer_data");
        if let Some(buffer) = self.bound_buffer_mut(target) {
            buffer.usage = usage;
            buffer.data = data.to_vec();
        }
    }

    fn buffer_data_size(&mut self, target: u32, size: usize, usage: u32) {
        self.record("buffer_data_size");
        if let Some(buffer) = self.bound_buffer_mut(target) {
            buffer.usage = usage;
            buffer.data = vec![0; size];
        }
    }

    fn buffer_sub_data(&mut self, target: u32, dst_byte_offset: usize, data: &[u8]) {
        self.record("buffer_sub_data");
        let Some(buffer) = self.bound_buffer_mut(target) else {
            return;
        };
        let end = dst_byte_offset + data.len();
        if end > buffer.data.len() {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        buffer.data[dst_byte_offset..end].copy_from_slice(data);
    }

    fn get_buffer_parameter(&self, target: u32, pname: u32) -> Option<i32> {
        self.record("get_buffer_parameter");
        let buffer = self
            .bound_buffer(target)
            .and_then(|b| self.buffers.get(&b))?;
        match pname {
            constants::BUFFER_SIZE => Some(buffer.data.len() as i32),
            constants::BUFFER_USAGE => Some(buffer.usage as i32),
            _ => {
                self.set_error(constants::INVALID_ENUM);
                None
            }
        }
    }

    // ==================== Vertex Arrays ====================

    fn create_vertex_array(&mut self) -> Option<WebGLVertexArray> {
        self.record("create_vertex_array");
        let vao = GlObject::new();
        self.vertex_arrays.insert(vao, VertexArrayData::default());
        Some(vao)
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<WebGLVertexArray>) {
        self.record("bind_vertex_array");
        if let Some(vao) = vertex_array {
            if !self.vertex_arrays.contains_key(&vao) {
                self.set_error(constants::INVALID_OPERATION);
                return;
            }
        }
        self.state.current_vertex_array = vertex_array;
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        type_: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.record("vertex_attrib_pointer");
        if !self.check_attrib_index(index) {
            return;
        }
        if !(1..=4).contains(&size) || stride < 0 || offset < 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        let buffer = self.state.bound_buffers.get(&constants::ARRAY_BUFFER).copied();
        if buffer.is_none() && offset != 0 {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        let attrib = &mut self.vertex_array_mut().attribs[index as usize];
        *attrib = VertexAttribPointer {
            enabled: attrib.enabled,
            size,
            type_,
            normalized,
            integer: false,
            stride,
            offset,
            buffer,
        };
    }

    fn vertex_attrib_i_pointer(&mut self, index: u32, size: i32, type_: u32, stride: i32, offset: i32) {
        self.record("vertex_attrib_i_pointer");
        if !self.check_attrib_index(index) {
            return;
        }
        if matches!(type_, constants::FLOAT | constants::HALF_FLOAT) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        let buffer = self.state.bound_buffers.get(&constants::ARRAY_BUFFER).copied();
        let attrib = &mut self.vertex_array_mut().attribs[index as usize];
        *attrib = VertexAttribPointer {
            enabled: attrib.enabled,
            size,
            type_,
            normalized: false,
            integer: true,
            stride,
            offset,
            buffer,
        };
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record("enable_vertex_attrib_array");
        if self.check_attrib_index(index) {
            self.vertex_array_mut().attribs[index as usize].enabled = true;
        }
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.record("disable_vertex_attrib_array");
        if self.check_attrib_index(index) {
            self.vertex_array_mut().attribs[index as usize].enabled = false;
        }
    }

    fn vertex_attrib_fv(&mut self, index: u32, values: &[f32]) {
        self.record("vertex_attrib_fv");
        if !self.check_attrib_index(index) {
            return;
        }
        if values.is_empty() || values.len() > 4 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        // Missing components default to (0, 0, 0, 1).
        let mut value = [0.0, 0.0, 0.0, 1.0];
        value[..values.len()].copy_from_slice(values);
        self.state
            .generic_attribs
            .insert(index, VertexAttribValue::Float(value));
    }

    fn vertex_attrib_i4iv(&mut self, index: u32, values: [i32; 4]) {
        self.record("vertex_attrib_i4iv");
        if self.check_attrib_index(index) {
            self.state
                .generic_attribs
                .insert(index, VertexAttribValue::Int(values));
        }
    }

    fn vertex_attrib_i4uiv(&mut self, index: u32, values: [u32; 4]) {
        self.record("vertex_attrib_i4uiv");
        if self.check_attrib_index(index) {
            self.state
                .generic_attribs
                .insert(index, VertexAttribValue::Uint(values));
        }
    }

    // ==================== Textures ====================

    fn create_texture(&mut self) -> Option<WebGLTexture> {
        self.record("create_texture");
        let texture = GlObject::new();
        self.textures.insert(texture, TextureData::default());
        Some(texture)
    }

    fn bind_texture(&mut self, target: u32, texture: Option<WebGLTexture>) {
        self.record("bind_texture");
        if !matches!(
            target,
            constants::TEXTURE_2D
                | constants::TEXTURE_3D
                | constants::TEXTURE_2D_ARRAY
                | constants::TEXTURE_CUBE_MAP
        ) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        if let Some(t) = texture {
            match self.textures.get_mut(&t) {
                Some(data) => {
                    if data.target.is_some_and(|bound| bound != target) {
                        self.set_error(constants::INVALID_OPERATION);
                        return;
                    }
                    data.target = Some(target);
                }
                None => {
                    self.set_error(constants::INVALID_OPERATION);
                    return;
                }
            }
        }
        let unit = self.state.active_texture as usize;
        if let Some(bindings) = self.state.texture_units.get_mut(unit) {
            match texture {
                Some(t) => {
                    bindings.insert(target, t);
                }
                None => {
                    bindings.remove(&target);
                }
            }
        }
    }

    fn active_texture(&mut self, texture: u32) {
        self.record("active_texture");
        let unit = texture.wrapping_sub(constants::TEXTURE0);
        if unit as usize >= MAX_TEXTURE_UNITS {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        self.state.active_texture = unit;
    }

    fn generate_mipmap(&mut self, target: u32) {
        self.record("generate_mipmap");
        if let Some(texture) = self.bound_texture_mut(target) {
            texture.mipmapped = true;
        }
    }

    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        _type_: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record("tex_image_2d");
        if width < 0 || height < 0 || border != 0 || level < 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        let Some(texture) = self.bound_texture_mut(target) else {
            return;
        };
        if texture.immutable {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        if level == 0 {
            texture.width = width as u32;
            texture.height = height as u32;
            texture.depth = 1;
            texture.internal_format = internal_format as u32;
            texture.format = format;
            texture.data = match pixels {
                Some(d) => d.to_vec(),
                None => vec![0; (width * height * 4) as usize],
            };
        }
        texture.levels = texture.levels.max(level as u32 + 1);
    }

    fn tex_image_3d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        depth: i32,
        border: i32,
        format: u32,
        _type_: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record("tex_image_3d");
        if width < 0 || height < 0 || depth < 0 || border != 0 || level < 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        if !matches!(target, constants::TEXTURE_3D | constants::TEXTURE_2D_ARRAY) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        let Some(texture) = self.bound_texture_mut(target) else {
            return;
        };
        if texture.immutable {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        if level == 0 {
            texture.width = width as u32;
            texture.height = height as u32;
            texture.depth = depth as u32;
            texture.internal_format = internal_format as u32;
            texture.format = format;
            texture.data = match pixels {
                Some(d) => d.to_vec(),
                None => vec![0; (width * height * depth * 4) as usize],
            };
        }
        texture.levels = texture.levels.max(level as u32 + 1);
    }

    fn tex_storage_2d(&mut self, target: u32, levels: i32, internal_format: u32, width: i32, height: i32) {
        self.record("tex_storage_2d");
        self.tex_storage_3d_inner(target, levels, internal_format, width, height, 1);
    }

    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    ) {
        self.record("tex_storage_3d");
        self.tex_storage_3d_inner(target, levels, internal_format, width, height, depth);
    }

    fn tex_parameteri(&mut self, target: u32, pname: u32, param: i32) {
        self.record("tex_parameteri");
        if let Some(texture) = self.bound_texture_mut(target) {
            texture.int_params.insert(pname, param);
        }
    }

    fn tex_parameterf(&mut self, target: u32, pname: u32, param: f32) {
        self.record("tex_parameterf");
        if let Some(texture) = self.bound_texture_mut(target) {
            texture.float_params.insert(pname, param);
        }
    }

    // ==================== Framebuffers ====================

    fn create_framebuffer(&mut self) -> Option<WebGLFramebuffer> {
        self.record("create_framebuffer");
        let fb = GlObject::new();
        self.framebuffers.insert(fb, FramebufferData::default());
        Some(fb)
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<WebGLFramebuffer>) {
        self.record("bind_framebuffer");
        if !matches!(
            target,
            constants::FRAMEBUFFER | constants::READ_FRAMEBUFFER | constants::DRAW_FRAMEBUFFER
        ) {
            self.set_error(constants::INVALID_ENUM);
            return;
        }
        if framebuffer.is_some_and(|fb| !self.framebuffers.contains_key(&fb)) {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        self.state.current_framebuffer = framebuffer;
    }

    fn framebuffer_texture_2d(
        &mut self,
        _target: u32,
        attachment: u32,
        textarget: u32,
        texture: Option<WebGLTexture>,
        level: i32,
    ) {
        self.record("framebuffer_texture_2d");
        let Some(fb) = self
            .state
            .current_framebuffer
            .and_then(|fb| self.framebuffers.get_mut(&fb))
        else {
            self.set_error(constants::INVALID_OPERATION);
            return;
        };
        match texture {
            Some(texture) => {
                fb.attachments.insert(
                    attachment,
                    TextureAttachment {
                        texture,
                        textarget,
                        level,
                    },
                );
            }
            None => {
                fb.attachments.remove(&attachment);
            }
        }
    }

    fn draw_buffers(&mut self, buffers: &[u32]) {
        self.record("draw_buffers");
        match self
            .state
            .current_framebuffer
            .and_then(|fb| self.framebuffers.get_mut(&fb))
        {
            Some(fb) => fb.draw_buffers = buffers.to_vec(),
            None => {
                if !matches!(buffers, [constants::BACK] | [constants::NONE]) {
                    self.set_error(constants::INVALID_OPERATION);
                    return;
                }
                self.state.default_draw_buffers = buffers.to_vec();
            }
        }
    }

    // ==================== Drawing ====================

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.record("draw_arrays");
        self.draw_arrays_inner(mode, first, count, 1);
    }

    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instance_count: i32) {
        self.record("draw_arrays_instanced");
        self.draw_arrays_inner(mode, first, count, instance_count);
    }

    fn draw_elements(&mut self, mode: u32, count: i32, type_: u32, offset: i32) {
        self.record("draw_elements");
        self.draw_elements_inner(mode, count, type_, offset, 1);
    }

    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        type_: u32,
        offset: i32,
        instance_count: i32,
    ) {
        self.record("draw_elements_instanced");
        self.draw_elements_inner(mode, count, type_, offset, instance_count);
    }
}

impl HeadlessContext {
    fn tex_storage_3d_inner(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    ) {
        if levels < 1 || width < 1 || height < 1 || depth < 1 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        let Some(texture) = self.bound_texture_mut(target) else {
            return;
        };
        if texture.immutable {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        texture.immutable = true;
        texture.levels = levels as u32;
        texture.internal_format = internal_format;
        texture.width = width as u32;
        texture.height = height as u32;
        texture.depth = depth as u32;
    }

    fn check_draw(&self, mode: u32, count: i32, instance_count: i32) -> Option<WebGLProgram> {
        if mode > constants::TRIANGLE_FAN {
            self.set_error(constants::INVALID_ENUM);
            return None;
        }
        if count < 0 || instance_count < 0 {
            self.set_error(constants::INVALID_VALUE);
            return None;
        }
        let program = self.state.current_program;
        if program.is_none() {
            self.set_error(constants::INVALID_OPERATION);
        }
        program
    }

    fn draw_arrays_inner(&mut self, mode: u32, first: i32, count: i32, instance_count: i32) {
        let Some(program) = self.check_draw(mode, count, instance_count) else {
            return;
        };
        if first < 0 {
            self.set_error(constants::INVALID_VALUE);
            return;
        }
        let state = Box::new(self.draw_state());
        self.draw_calls.push(DrawCall::DrawArrays {
            mode,
            first,
            count,
            instance_count,
            program,
            state,
        });
    }

    fn draw_elements_inner(
        &mut self,
        mode: u32,
        count: i32,
        type_: u32,
        offset: i32,
        instance_count: i32,
    ) {
        let Some(program) = self.check_draw(mode, count, instance_count) else {
            return;
        };
        let element_size = match type_ {
            constants::UNSIGNED_BYTE => 1,
            constants::UNSIGNED_SHORT => 2,
            constants::UNSIGNED_INT => 4,
            _ => {
                self.set_error(constants::INVALID_ENUM);
                return;
            }
        };
        if offset < 0 || offset % element_size != 0 {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        if self.current_vertex_array_data().element_buffer.is_none() {
            self.set_error(constants::INVALID_OPERATION);
            return;
        }
        let state = Box::new(self.draw_state());
        self.draw_calls.push(DrawCall::DrawElements {
            mode,
            count,
            type_,
            offset,
            instance_count,
            program,
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"#version 300 es
        uniform ViewBlock { mat4 u_cameraMatrix; mat4 u_viewMatrix; mat4 u_projectionMatrix; mat4 u_viewProjectionMatrix; };
        uniform mat4 u_model;
        in vec3 in_vert;
        in vec3 in_color;
        out vec3 v_color;
        void main() { v_color = in_color; gl_Position = u_viewProjectionMatrix * u_model * vec4(in_vert, 1.0); }
    "#;

    const FS: &str = r#"#version 300 es
        precision highp float;
        uniform float u_alpha;
        in vec3 v_color;
        out vec4 f_color;
        void main() { f_color = vec4(v_color, u_alpha); }
    "#;

    fn linked_program(ctx: &mut HeadlessContext) -> WebGLProgram {
        let vs = ctx.create_shader(constants::VERTEX_SHADER).unwrap();
        ctx.shader_source(vs, VS);
        ctx.compile_shader(vs);
        let fs = ctx.create_shader(constants::FRAGMENT_SHADER).unwrap();
        ctx.shader_source(fs, FS);
        ctx.compile_shader(fs);
        let program = ctx.create_program().unwrap();
        ctx.attach_shader(program, vs);
        ctx.attach_shader(program, fs);
        ctx.link_program(program);
        program
    }

    #[test]
    fn test_context_creation() {
        let ctx = HeadlessContext::new(800, 600);
        assert_eq!(ctx.width, 800);
        assert_eq!(ctx.height, 600);
        assert_eq!(ctx.state.viewport, [0, 0, 800, 600]);
    }

    #[test]
    fn test_clear_color() {
        let mut ctx = HeadlessContext::new(100, 100);
        ctx.clear_color(1.0, 0.5, 0.25, 1.0);
        assert_eq!(ctx.state.clear_color, [1.0, 0.5, 0.25, 1.0]);
        ctx.clear(ClearMask::COLOR | ClearMask::DEPTH);
        assert!(matches!(ctx.draw_calls()[0], DrawCall::Clear { .. }));
    }

    #[test]
    fn test_compile_failure_sets_log() {
        let mut ctx = HeadlessContext::new(100, 100);
        let shader = ctx.create_shader(constants::VERTEX_SHADER).unwrap();
        ctx.shader_source(shader, "void main() {");
        ctx.compile_shader(shader);

        assert_eq!(
            ctx.get_shader_parameter(shader, constants::COMPILE_STATUS),
            Some(0)
        );
        assert!(ctx.get_shader_info_log(shader).starts_with("ERROR:"));
    }

    #[test]
    fn test_link_reflects_interface() {
        let mut ctx = HeadlessContext::new(100, 100);
        let program = linked_program(&mut ctx);

        assert_eq!(
            ctx.get_program_parameter(program, constants::LINK_STATUS),
            Some(1)
        );
        assert_eq!(
            ctx.get_program_parameter(program, constants::ACTIVE_UNIFORMS),
            Some(6)
        );
        assert_eq!(
            ctx.get_program_parameter(program, constants::ACTIVE_ATTRIBUTES),
            Some(2)
        );
        assert_eq!(ctx.get_uniform_block_index(program, "ViewBlock"), 0);
        assert_eq!(
            ctx.get_uniform_block_index(program, "Missing"),
            constants::INVALID_INDEX
        );
        assert_eq!(
            ctx.get_active_uniform_block_parameter(program, 0, constants::UNIFORM_BLOCK_DATA_SIZE),
            Some(256)
        );

        let indices: Vec<u32> = (0..6).collect();
        let blocks = ctx.get_active_uniforms(program, &indices, constants::UNIFORM_BLOCK_INDEX);
        assert_eq!(blocks, vec![-1, -1, 0, 0, 0, 0]);
        let offsets = ctx.get_active_uniforms(program, &indices, constants::UNIFORM_OFFSET);
        assert_eq!(offsets, vec![-1, -1, 0, 64, 128, 192]);

        assert!(ctx.get_uniform_location(program, "u_model").is_some());
        assert!(ctx.get_uniform_location(program, "u_viewMatrix").is_none());
        assert_eq!(ctx.get_attrib_location(program, "in_vert"), 0);
        assert_eq!(ctx.get_attrib_location(program, "in_color"), 1);
    }

    #[test]
    fn test_bind_attrib_location_applies_at_link() {
        let mut ctx = HeadlessContext::new(100, 100);
        let vs = ctx.create_shader(constants::VERTEX_SHADER).unwrap();
        ctx.shader_source(vs, VS);
        ctx.compile_shader(vs);
        let fs = ctx.create_shader(constants::FRAGMENT_SHADER).unwrap();
        ctx.shader_source(fs, FS);
        ctx.compile_shader(fs);
        let program = ctx.create_program().unwrap();
        ctx.attach_shader(program, vs);
        ctx.attach_shader(program, fs);
        ctx.bind_attrib_location(program, 0, "in_color");
        ctx.link_program(program);

        assert_eq!(ctx.get_attrib_location(program, "in_color"), 0);
        assert_eq!(ctx.get_attrib_location(program, "in_vert"), 1);
    }

    #[test]
    fn test_link_without_fragment_shader_fails() {
        let mut ctx = HeadlessContext::new(100, 100);
        let vs = ctx.create_shader(constants::VERTEX_SHADER).unwrap();
        ctx.shader_source(vs, VS);
        ctx.compile_shader(vs);
        let program = ctx.create_program().unwrap();
        ctx.attach_shader(program, vs);
        ctx.link_program(program);

        assert_eq!(
            ctx.get_program_parameter(program, constants::LINK_STATUS),
            Some(0)
        );
        assert!(ctx.get_program_info_log(program).contains("fragment"));
    }

    #[test]
    fn test_uniform_upload_requires_current_program() {
        let mut ctx = HeadlessContext::new(100, 100);
        let program = linked_program(&mut ctx);
        let loc = ctx.get_uniform_location(program, "u_alpha").unwrap();

        ctx.uniform_fv(loc, 1, &[0.5]);
        assert_eq!(ctx.get_error(), constants::INVALID_OPERATION);

        ctx.use_program(Some(program));
        ctx.uniform_fv(loc, 1, &[0.5]);
        assert_eq!(ctx.get_error(), constants::NO_ERROR);
        assert_eq!(
            ctx.get_uniform_value(loc),
            Some(&UniformValue::Float {
                components: 1,
                data: vec![0.5]
            })
        );
        assert_eq!(ctx.call_count("uniform_fv"), 2);
    }

    #[test]
    fn test_buffer_data_and_sub_data() {
        let mut ctx = HeadlessContext::new(100, 100);
        let buffer = ctx.create_buffer().unwrap();
        ctx.bind_buffer(constants::ARRAY_BUFFER, Some(buffer));
        ctx.buffer_data_size(constants::ARRAY_BUFFER, 8, constants::STATIC_DRAW);
        ctx.buffer_sub_data(constants::ARRAY_BUFFER, 4, &[1, 2, 3, 4]);

        let data = ctx.get_buffer_data(buffer).unwrap();
        assert_eq!(data.data, vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(
            ctx.get_buffer_parameter(constants::ARRAY_BUFFER, constants::BUFFER_SIZE),
            Some(8)
        );

        ctx.buffer_sub_data(constants::ARRAY_BUFFER, 6, &[9, 9, 9, 9]);
        assert_eq!(ctx.get_error(), constants::INVALID_VALUE);
    }

    #[test]
    fn test_buffer_data_without_binding() {
        let mut ctx = HeadlessContext::new(100, 100);
        ctx.buffer_data(constants::ARRAY_BUFFER, &[0; 4], constants::STATIC_DRAW);
        assert_eq!(ctx.get_error(), constants::INVALID_OPERATION);
    }

    #[test]
    fn test_bind_buffer_base() {
        let mut ctx = HeadlessContext::new(100, 100);
        let buffer = ctx.create_buffer().unwrap();
        ctx.bind_buffer_base(constants::UNIFORM_BUFFER, 0, Some(buffer));
        assert_eq!(
            ctx.get_indexed_buffer(constants::UNIFORM_BUFFER, 0),
            Some(buffer)
        );
    }

    #[test]
    fn test_enable_disable() {
        let mut ctx = HeadlessContext::new(100, 100);

        assert!(!ctx.is_enabled(Capabilities::BLEND));
        ctx.enable(Capabilities::BLEND | Capabilities::DEPTH_TEST);
        assert!(ctx.is_enabled(Capabilities::BLEND));
        assert!(ctx.is_enabled(Capabilities::DEPTH_TEST));
        ctx.disable(Capabilities::BLEND);
        assert!(!ctx.is_enabled(Capabilities::BLEND));
        assert_eq!(ctx.call_count("enable"), 1);
    }

    #[test]
    fn test_vertex_attribs_live_in_vertex_array() {
        let mut ctx = HeadlessContext::new(100, 100);
        let vao = ctx.create_vertex_array().unwrap();
        ctx.bind_vertex_array(Some(vao));
        let buffer = ctx.create_buffer().unwrap();
        ctx.bind_buffer(constants::ARRAY_BUFFER, Some(buffer));

        ctx.vertex_attrib_pointer(0, 3, constants::FLOAT, false, 12, 0);
        ctx.enable_vertex_attrib_array(0);

        let data = ctx.get_vertex_array_data(vao).unwrap();
        assert!(data.attribs[0].enabled);
        assert_eq!(data.attribs[0].size, 3);
        assert_eq!(data.attribs[0].buffer, Some(buffer));

        ctx.bind_vertex_array(None);
        assert!(!ctx.current_vertex_array_data().attribs[0].enabled);
    }

    #[test]
    fn test_generic_vertex_attrib() {
        let mut ctx = HeadlessContext::new(100, 100);
        ctx.vertex_attrib_fv(2, &[0.5, 0.25]);
        assert_eq!(
            ctx.get_vertex_attrib_value(2),
            Some(VertexAttribValue::Float([0.5, 0.25, 0.0, 1.0]))
        );
        ctx.vertex_attrib_fv(99, &[1.0]);
        assert_eq!(ctx.get_error(), constants::INVALID_VALUE);
    }

    #[test]
    fn test_texture() {
        let mut ctx = HeadlessContext::new(100, 100);
        let texture = ctx.create_texture().unwrap();

        ctx.bind_texture(constants::TEXTURE_2D, Some(texture));
        ctx.tex_parameteri(
            constants::TEXTURE_2D,
            constants::TEXTURE_MIN_FILTER,
            constants::LINEAR as i32,
        );
        ctx.tex_image_2d(
            constants::TEXTURE_2D,
            0,
            constants::RGBA as i32,
            2,
            2,
            0,
            constants::RGBA,
            constants::UNSIGNED_BYTE,
            None,
        );

        let tex_data = ctx.get_texture_data(texture).unwrap();
        assert_eq!(
            tex_data.int_params.get(&constants::TEXTURE_MIN_FILTER),
            Some(&(constants::LINEAR as i32))
        );
        assert_eq!(tex_data.data.len(), 16);
    }

    #[test]
    fn test_tex_storage_is_immutable() {
        let mut ctx = HeadlessContext::new(100, 100);
        let texture = ctx.create_texture().unwrap();
        ctx.bind_texture(constants::TEXTURE_2D, Some(texture));
        ctx.tex_storage_2d(constants::TEXTURE_2D, 3, constants::RGBA8, 4, 4);
        ctx.tex_storage_2d(constants::TEXTURE_2D, 1, constants::RGBA8, 4, 4);
        assert_eq!(ctx.get_error(), constants::INVALID_OPERATION);
        assert_eq!(ctx.get_texture_data(texture).unwrap().levels, 3);
    }

    #[test]
    fn test_framebuffer_attachment() {
        let mut ctx = HeadlessContext::new(100, 100);
        let texture = ctx.create_texture().unwrap();
        let fb = ctx.create_framebuffer().unwrap();
        ctx.bind_framebuffer(constants::FRAMEBUFFER, Some(fb));
        ctx.framebuffer_texture_2d(
            constants::FRAMEBUFFER,
            constants::COLOR_ATTACHMENT0,
            constants::TEXTURE_2D,
            Some(texture),
            0,
        );
        ctx.draw_buffers(&[constants::COLOR_ATTACHMENT0]);

        let data = ctx.get_framebuffer_data(fb).unwrap();
        assert_eq!(
            data.attachments[&constants::COLOR_ATTACHMENT0].texture,
            texture
        );
        assert_eq!(data.draw_buffers, vec![constants::COLOR_ATTACHMENT0]);
    }

    #[test]
    fn test_draw_arrays() {
        let mut ctx = HeadlessContext::new(100, 100);
        let program = linked_program(&mut ctx);
        ctx.use_program(Some(program));

        ctx.draw_arrays(constants::TRIANGLES, 0, 3);
        ctx.draw_arrays_instanced(constants::TRIANGLES, 0, 3, 10);

        let calls = ctx.take_draw_calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            calls[1],
            DrawCall::DrawArrays {
                instance_count: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_draw_elements_requires_index_buffer() {
        let mut ctx = HeadlessContext::new(100, 100);
        let program = linked_program(&mut ctx);
        ctx.use_program(Some(program));

        ctx.draw_elements(constants::TRIANGLES, 3, constants::UNSIGNED_SHORT, 0);
        assert_eq!(ctx.get_error(), constants::INVALID_OPERATION);

        let indices = ctx.create_buffer().unwrap();
        ctx.bind_buffer(constants::ELEMENT_ARRAY_BUFFER, Some(indices));
        ctx.draw_elements(constants::TRIANGLES, 3, constants::UNSIGNED_SHORT, 0);
        assert_eq!(ctx.get_error(), constants::NO_ERROR);
        assert_eq!(ctx.draw_calls().len(), 1);
    }

    #[test]
    fn test_extensions() {
        let mut ctx = HeadlessContext::new(100, 100);
        assert!(ctx.get_extension("EXT_color_buffer_float"));
        assert!(!ctx.get_extension("WEBGL_made_up"));
        assert!(ctx.state().extensions.contains("EXT_color_buffer_float"));
    }
}
