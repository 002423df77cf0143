//! Command interpreter.
//!
//! Applies decoded commands to a [`GlContext`] in order, tracking which
//! program, vertex array and buffers are bound and keeping each resource's
//! info record current. A failing command is logged, reported and skipped;
//! the commands after it still run.

use std::collections::BTreeMap;

use glreplay_webgl::constants::{
    self, glsl_type_name, ACTIVE_ATTRIBUTES, ACTIVE_UNIFORMS, BUFFER_SIZE, COMPILE_STATUS,
    INVALID_INDEX, LINK_STATUS, TEXTURE0, UNIFORM_BLOCK_DATA_SIZE, UNIFORM_BLOCK_INDEX,
    UNIFORM_OFFSET, UNPACK_COLORSPACE_CONVERSION_WEBGL,
};
use glreplay_webgl::{Capabilities, ClearMask, GlContext, GlError, GlObject, WebGLProgram};
use tracing::{debug, trace, warn};

use crate::camera::{VIEW_BLOCK_BINDING, VIEW_BLOCK_NAME};
use crate::codec::{self, ElementType, TypedView};
use crate::command::{AttribIndex, CapabilityFlags, Command, CommandKind, PixelStoreParam};
use crate::error::CommandError;
use crate::info::{
    AttributeInfo, AttributePointerInfo, BlockUniformInfo, BufferInfo, BufferSize, ProgramInfo,
    ResourceInfo, ResourceKind, ShaderInfo, UniformBlockInfo, UniformInfo, VertexArrayInfo,
};
use crate::registry::{Handle, Registry};
use crate::tokens::{self, BufferTarget};

/// What the interpreter believes is bound, by handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingState {
    pub program: Option<Handle>,
    pub vertex_array: Option<Handle>,
    pub buffers: BTreeMap<BufferTarget, Handle>,
}

/// A command that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    /// Position in the executed list.
    pub index: usize,
    pub cmd: &'static str,
    pub error: CommandError,
}

/// Outcome of one pass over a command list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub executed: usize,
    pub failures: Vec<CommandFailure>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold a later pass into this report.
    pub fn merge(&mut self, other: ReplayReport) {
        self.executed += other.executed;
        self.failures.extend(other.failures);
    }
}

/// A command's payload, decoded.
struct Payload<'p> {
    view: TypedView<'p>,
    shape: &'p [usize],
}

impl Payload<'_> {
    fn unsupported_shape(&self) -> CommandError {
        CommandError::UnsupportedShape(self.shape.to_vec())
    }
}

fn payload<'p>(
    command: &'p Command,
    payloads: &'p [Vec<u8>],
) -> Result<Option<Payload<'p>>, CommandError> {
    let Some(meta) = &command.buffer_metadata else {
        return Ok(None);
    };
    let bytes = payloads
        .get(meta.index)
        .ok_or(CommandError::PayloadIndex {
            index: meta.index,
            len: payloads.len(),
        })?;
    let element_type = ElementType::parse(&meta.dtype)?;
    Ok(Some(Payload {
        view: codec::decode(element_type, bytes)?,
        shape: &meta.shape,
    }))
}

fn require_payload<'p>(
    command: &'p Command,
    payloads: &'p [Vec<u8>],
) -> Result<Payload<'p>, CommandError> {
    payload(command, payloads)?.ok_or(CommandError::MissingPayload)
}

fn capabilities(flags: &CapabilityFlags) -> Result<Capabilities, CommandError> {
    let mut caps = match flags.mask {
        Some(bits) => {
            Capabilities::from_bits(bits).ok_or(CommandError::InvalidCapabilityMask(bits))?
        }
        None => Capabilities::empty(),
    };
    let named = [
        (flags.blend, Capabilities::BLEND),
        (flags.cull_face, Capabilities::CULL_FACE),
        (flags.depth_test, Capabilities::DEPTH_TEST),
        (flags.dither, Capabilities::DITHER),
        (flags.polygon_offset_fill, Capabilities::POLYGON_OFFSET_FILL),
        (flags.sample_alpha_to_coverage, Capabilities::SAMPLE_ALPHA_TO_COVERAGE),
        (flags.sample_coverage, Capabilities::SAMPLE_COVERAGE),
        (flags.scissor_test, Capabilities::SCISSOR_TEST),
        (flags.stencil_test, Capabilities::STENCIL_TEST),
        (flags.rasterizer_discard, Capabilities::RASTERIZER_DISCARD),
    ];
    for (on, cap) in named {
        if on {
            caps |= cap;
        }
    }
    Ok(caps)
}

/// Interprets command lists against a context and a registry.
#[derive(Debug, Default)]
pub struct Interpreter {
    bindings: BindingState,
    check_errors: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll `getError` after every command and fail commands that raised one.
    pub fn with_error_checks(mut self, check_errors: bool) -> Self {
        self.check_errors = check_errors;
        self
    }

    pub fn bindings(&self) -> &BindingState {
        &self.bindings
    }

    /// Run `commands` in order. Payload indices refer into `payloads`.
    pub fn execute<C: GlContext>(
        &mut self,
        gl: &mut C,
        registry: &mut Registry,
        commands: &[Command],
        payloads: &[Vec<u8>],
    ) -> ReplayReport {
        let mut report = ReplayReport::default();
        if self.check_errors {
            // Drop whatever an earlier caller left in the error flag.
            gl.get_error();
        }

        for (index, command) in commands.iter().enumerate() {
            debug!(index, cmd = command.name(), "Executing command");
            match self.execute_command(gl, registry, command, payloads) {
                Ok(()) => report.executed += 1,
                Err(error) => {
                    warn!(index, cmd = command.name(), %error, "Command skipped");
                    report.failures.push(CommandFailure {
                        index,
                        cmd: command.name(),
                        error,
                    });
                }
            }
        }
        report
    }

    /// Run a single command.
    pub fn execute_command<C: GlContext>(
        &mut self,
        gl: &mut C,
        registry: &mut Registry,
        command: &Command,
        payloads: &[Vec<u8>],
    ) -> Result<(), CommandError> {
        self.apply(gl, registry, command, payloads)?;
        if self.check_errors {
            if let Some(err) = GlError::from_code(gl.get_error()) {
                return Err(CommandError::Gl(err));
            }
        }
        Ok(())
    }

    fn apply<C: GlContext>(
        &mut self,
        gl: &mut C,
        registry: &mut Registry,
        command: &Command,
        payloads: &[Vec<u8>],
    ) -> Result<(), CommandError> {
        match &command.kind {
            // ==================== Fixed function ====================
            CommandKind::Viewport {
                x,
                y,
                width,
                height,
            } => gl.viewport(*x, *y, *width, *height),
            CommandKind::Enable(flags) => gl.enable(capabilities(flags)?),
            CommandKind::Disable(flags) => gl.disable(capabilities(flags)?),
            CommandKind::ClearColor { r, g, b, a } => gl.clear_color(*r, *g, *b, *a),
            CommandKind::Clear {
                color,
                depth,
                stencil,
            } => {
                let mut mask = ClearMask::empty();
                mask.set(ClearMask::COLOR, *color);
                mask.set(ClearMask::DEPTH, *depth);
                mask.set(ClearMask::STENCIL, *stencil);
                gl.clear(mask);
            }
            CommandKind::FrontFace { mode } => gl.front_face(tokens::FRONT_FACE.parse(mode)?),
            CommandKind::CullFace { mode } => gl.cull_face(tokens::CULL_FACE_MODE.parse(mode)?),
            CommandKind::DepthFunc { func } => gl.depth_func(tokens::COMPARE_FUNC.parse(func)?),
            CommandKind::DepthMask { flag } => gl.depth_mask(*flag),
            CommandKind::DepthRange { z_near, z_far } => gl.depth_range(*z_near, *z_far),
            CommandKind::BlendColor { r, g, b, a } => gl.blend_color(*r, *g, *b, *a),
            CommandKind::BlendEquation { mode } => {
                gl.blend_equation(tokens::BLEND_EQUATION.parse(mode)?)
            }
            CommandKind::BlendEquationSeparate {
                mode_rgb,
                mode_alpha,
            } => gl.blend_equation_separate(
                tokens::BLEND_EQUATION.parse(mode_rgb)?,
                tokens::BLEND_EQUATION.parse(mode_alpha)?,
            ),
            CommandKind::BlendFunc { s_factor, d_factor } => gl.blend_func(
                tokens::BLEND_FACTOR.parse(s_factor)?,
                tokens::BLEND_FACTOR.parse(d_factor)?,
            ),
            CommandKind::BlendFuncSeparate {
                src_rgb,
                dst_rgb,
                src_alpha,
                dst_alpha,
            } => gl.blend_func_separate(
                tokens::BLEND_FACTOR.parse(src_rgb)?,
                tokens::BLEND_FACTOR.parse(dst_rgb)?,
                tokens::BLEND_FACTOR.parse(src_alpha)?,
                tokens::BLEND_FACTOR.parse(dst_alpha)?,
            ),
            CommandKind::PixelStorei { pname, param } => {
                let pname = tokens::PIXEL_STORE_PARAMETER.parse(pname)?;
                let value = match param {
                    PixelStoreParam::Flag(flag) => *flag as i32,
                    PixelStoreParam::Int(value) => *value,
                    PixelStoreParam::Token(token) if pname == UNPACK_COLORSPACE_CONVERSION_WEBGL => {
                        tokens::COLORSPACE_CONVERSION.parse(token)? as i32
                    }
                    PixelStoreParam::Token(token) => {
                        return Err(CommandError::UnknownToken {
                            family: "pixel store value",
                            token: token.clone(),
                        })
                    }
                };
                gl.pixel_storei(pname, value);
            }

            // ==================== Creation ====================
            CommandKind::CreateTexture { resource } => {
                let handle = registry.handle(*resource)?;
                let native = gl.create_texture().ok_or(CommandError::CreateFailed("texture"))?;
                registry.create(handle, native, ResourceInfo::Texture)?;
            }
            CommandKind::CreateShader {
                resource,
                shader_type,
            } => {
                let handle = registry.handle(*resource)?;
                let kind = tokens::SHADER_KIND.parse(shader_type)?;
                let native = gl.create_shader(kind).ok_or(CommandError::CreateFailed("shader"))?;
                let info = if kind == constants::VERTEX_SHADER {
                    ResourceInfo::VertexShader(ShaderInfo::default())
                } else {
                    ResourceInfo::FragmentShader(ShaderInfo::default())
                };
                registry.create(handle, native, info)?;
            }
            CommandKind::CreateProgram { resource } => {
                let handle = registry.handle(*resource)?;
                let native = gl.create_program().ok_or(CommandError::CreateFailed("program"))?;
                registry.create(handle, native, ResourceInfo::Program(ProgramInfo::default()))?;
            }
            CommandKind::CreateBuffer { resource } => {
                let handle = registry.handle(*resource)?;
                let native = gl.create_buffer().ok_or(CommandError::CreateFailed("buffer"))?;
                registry.create(handle, native, ResourceInfo::Buffer(BufferInfo::default()))?;
            }
            CommandKind::CreateVertexArray { resource } => {
                let handle = registry.handle(*resource)?;
                let native = gl
                    .create_vertex_array()
                    .ok_or(CommandError::CreateFailed("vertex array"))?;
                registry.create(
                    handle,
                    native,
                    ResourceInfo::VertexArray(VertexArrayInfo::default()),
                )?;
            }
            CommandKind::CreateFramebuffer { resource } => {
                let handle = registry.handle(*resource)?;
                let native = gl
                    .create_framebuffer()
                    .ok_or(CommandError::CreateFailed("framebuffer"))?;
                registry.create(handle, native, ResourceInfo::Framebuffer)?;
            }

            // ==================== Textures ====================
            CommandKind::BindTexture { target, texture } => {
                let target = tokens::TEXTURE_TARGET.parse(target)?;
                let texture = optional_native(registry, *texture, ResourceKind::Texture)?;
                gl.bind_texture(target, texture);
            }
            CommandKind::ActiveTexture { texture } => {
                let unit = TEXTURE0
                    .checked_add(*texture)
                    .ok_or(CommandError::TextureUnitOutOfRange(*texture))?;
                gl.active_texture(unit)
            }
            CommandKind::GenerateMipmap { target } => {
                gl.generate_mipmap(tokens::TEXTURE_TARGET.parse(target)?)
            }
            CommandKind::TexImage2D {
                target,
                level,
                internal_format,
                width,
                height,
                border,
                format,
                data_type,
            } => {
                let pixels = payload(command, payloads)?;
                gl.tex_image_2d(
                    tokens::TEXTURE_TARGET.parse(target)?,
                    *level,
                    tokens::INTERNAL_FORMAT.parse(internal_format)? as i32,
                    *width,
                    *height,
                    *border,
                    tokens::PIXEL_FORMAT.parse(format)?,
                    tokens::PIXEL_TYPE.parse(data_type)?,
                    pixels.as_ref().map(|p| p.view.as_bytes()),
                );
            }
            CommandKind::TexImage3D {
                target,
                level,
                internal_format,
                width,
                height,
                depth,
                border,
                format,
                data_type,
            } => {
                let pixels = payload(command, payloads)?;
                gl.tex_image_3d(
                    tokens::TEXTURE_TARGET.parse(target)?,
                    *level,
                    tokens::INTERNAL_FORMAT.parse(internal_format)? as i32,
                    *width,
                    *height,
                    *depth,
                    *border,
                    tokens::PIXEL_FORMAT.parse(format)?,
                    tokens::PIXEL_TYPE.parse(data_type)?,
                    pixels.as_ref().map(|p| p.view.as_bytes()),
                );
            }
            CommandKind::TexStorage2D {
                target,
                levels,
                internal_format,
                width,
                height,
            } => gl.tex_storage_2d(
                tokens::TEXTURE_TARGET.parse(target)?,
                *levels,
                tokens::INTERNAL_FORMAT.parse(internal_format)?,
                *width,
                *height,
            ),
            CommandKind::TexStorage3D {
                target,
                levels,
                internal_format,
                width,
                height,
                depth,
            } => gl.tex_storage_3d(
                tokens::TEXTURE_TARGET.parse(target)?,
                *levels,
                tokens::INTERNAL_FORMAT.parse(internal_format)?,
                *width,
                *height,
                *depth,
            ),
            CommandKind::TexParameteri {
                target,
                pname,
                param,
            } => gl.tex_parameteri(
                tokens::TEXTURE_TARGET.parse(target)?,
                tokens::TEXTURE_PARAMETER.parse(pname)?,
                *param,
            ),
            CommandKind::TexParameterf {
                target,
                pname,
                param,
            } => gl.tex_parameterf(
                tokens::TEXTURE_TARGET.parse(target)?,
                tokens::TEXTURE_PARAMETER.parse(pname)?,
                *param,
            ),
            CommandKind::TexParameterStr {
                target,
                pname,
                param,
            } => gl.tex_parameteri(
                tokens::TEXTURE_TARGET.parse(target)?,
                tokens::TEXTURE_PARAMETER.parse(pname)?,
                tokens::TEXTURE_PARAMETER_VALUE.parse(param)? as i32,
            ),

            // ==================== Shaders and programs ====================
            CommandKind::ShaderSource { shader, source } => {
                let shader = registry.handle(*shader)?;
                gl.shader_source(registry.native(shader, ResourceKind::Shader)?, source);
            }
            CommandKind::CompileShader { shader } => compile_shader(gl, registry, *shader)?,
            CommandKind::DeleteShader { shader } => {
                let shader = registry.handle(*shader)?;
                gl.delete_shader(registry.native(shader, ResourceKind::Shader)?);
            }
            CommandKind::AttachShader { program, shader } => {
                let program = registry.handle(*program)?;
                let shader = registry.handle(*shader)?;
                gl.attach_shader(
                    registry.native(program, ResourceKind::Program)?,
                    registry.native(shader, ResourceKind::Shader)?,
                );
            }
            CommandKind::BindAttribLocation {
                program,
                index,
                name,
            } => {
                let program = registry.handle(*program)?;
                gl.bind_attrib_location(registry.native(program, ResourceKind::Program)?, *index, name);
            }
            CommandKind::LinkProgram { program } => link_program(gl, registry, *program)?,
            CommandKind::UseProgram { program } => match registry.optional_handle(*program)? {
                Some(handle) => {
                    gl.use_program(Some(registry.native(handle, ResourceKind::Program)?));
                    self.bindings.program = Some(handle);
                }
                None => {
                    gl.use_program(None);
                    self.bindings.program = None;
                }
            },

            // ==================== Uniforms ====================
            CommandKind::Uniform { name } => self.upload_uniform(gl, registry, command, payloads, name, false)?,
            CommandKind::UniformMatrix { name } => {
                self.upload_uniform(gl, registry, command, payloads, name, true)?
            }
            CommandKind::UniformBlockBinding {
                program,
                uniform_block_name,
                uniform_block_binding,
            } => {
                let program = registry.handle(*program)?;
                let native = registry.native(program, ResourceKind::Program)?;
                let block = program_info(registry, program)?
                    .block(uniform_block_name)
                    .ok_or_else(|| CommandError::UnresolvedBlock(uniform_block_name.clone()))?;
                gl.uniform_block_binding(native, block.index, *uniform_block_binding);
            }

            // ==================== Buffers ====================
            CommandKind::BindBuffer { target, buffer } => {
                let target = BufferTarget::parse(target)?;
                match registry.optional_handle(*buffer)? {
                    Some(handle) => {
                        gl.bind_buffer(target.gl(), Some(registry.native(handle, ResourceKind::Buffer)?));
                        self.bindings.buffers.insert(target, handle);
                    }
                    None => {
                        gl.bind_buffer(target.gl(), None);
                        self.bindings.buffers.remove(&target);
                    }
                }
            }
            CommandKind::BindBufferBase {
                target,
                index,
                buffer,
            } => {
                let target = BufferTarget::parse(target)?;
                let buffer = optional_native(registry, *buffer, ResourceKind::Buffer)?;
                gl.bind_buffer_base(target.gl(), *index, buffer);
            }
            CommandKind::BufferData {
                target,
                usage,
                update_info,
                size,
            } => {
                let target = BufferTarget::parse(target)?;
                let usage = tokens::USAGE_HINT.parse(usage)?;
                let reported = match payload(command, payloads)? {
                    Some(data) => {
                        gl.buffer_data(target.gl(), data.view.as_bytes(), usage);
                        gl.get_buffer_parameter(target.gl(), BUFFER_SIZE)
                            .map_or(BufferSize::Undefined, |n| BufferSize::Bytes(n as i64))
                    }
                    None => {
                        gl.buffer_data_size(target.gl(), size.unwrap_or(0), usage);
                        BufferSize::Undefined
                    }
                };
                if *update_info {
                    if let Some(&bound) = self.bindings.buffers.get(&target) {
                        registry.set_info(
                            bound,
                            ResourceInfo::Buffer(BufferInfo {
                                size: Some(reported),
                                target: Some(target),
                                uniformblock: None,
                            }),
                        )?;
                    }
                }
            }
            CommandKind::BufferSubData {
                target,
                dst_byte_offset,
                src_offset,
                size,
            } => {
                let target = BufferTarget::parse(target)?;
                let data = payload(command, payloads)?;
                write_sub_data(gl, target, *dst_byte_offset, *src_offset, *size, data)?;
            }
            CommandKind::BufferSubDataStr {
                target,
                dst_byte_offset,
                src_offset,
            } => {
                let target = BufferTarget::parse(target)?;
                let bound = *self
                    .bindings
                    .buffers
                    .get(&target)
                    .ok_or(CommandError::NoBoundBuffer(target))?;
                let block = registry
                    .get(bound)?
                    .info
                    .as_buffer()
                    .and_then(|info| info.uniformblock.as_ref())
                    .ok_or_else(|| CommandError::UnresolvedBlock(format!("<buffer {bound}>")))?;
                let member = block.member(dst_byte_offset).ok_or_else(|| {
                    CommandError::UnresolvedMember {
                        block: block.name.clone(),
                        member: dst_byte_offset.clone(),
                    }
                })?;
                let offset = usize::try_from(member.offset).map_err(|_| {
                    CommandError::UnresolvedMember {
                        block: block.name.clone(),
                        member: dst_byte_offset.clone(),
                    }
                })?;
                let data = payload(command, payloads)?;
                write_sub_data(gl, target, offset, *src_offset, None, data)?;
            }
            CommandKind::CreateUniformBuffer {
                buffer,
                program,
                block_name,
                usage,
            } => self.create_uniform_buffer(gl, registry, *buffer, *program, block_name, usage)?,

            // ==================== Vertex arrays ====================
            CommandKind::BindVertexArray { vertex_array } => {
                match registry.optional_handle(*vertex_array)? {
                    Some(handle) => {
                        gl.bind_vertex_array(Some(
                            registry.native(handle, ResourceKind::VertexArray)?,
                        ));
                        self.bindings.vertex_array = Some(handle);
                    }
                    None => {
                        gl.bind_vertex_array(None);
                        self.bindings.vertex_array = None;
                    }
                }
            }
            CommandKind::VertexAttribPointer {
                index,
                size,
                type_,
                normalized,
                stride,
                offset,
            } => {
                let location = self.attrib_location(registry, index)?;
                gl.vertex_attrib_pointer(
                    location,
                    *size,
                    tokens::VERTEX_TYPE.parse(type_)?,
                    *normalized,
                    *stride,
                    *offset,
                );
                self.record_pointer(
                    registry,
                    AttributePointerInfo {
                        pointer: "vertexAttribPointer",
                        index: location,
                        size: *size,
                        type_: type_.clone(),
                        normalized: Some(*normalized),
                        stride: *stride,
                        offset: *offset,
                    },
                )?;
            }
            CommandKind::VertexAttribIPointer {
                index,
                size,
                type_,
                stride,
                offset,
            } => {
                let location = self.attrib_location(registry, index)?;
                gl.vertex_attrib_i_pointer(
                    location,
                    *size,
                    tokens::VERTEX_TYPE.parse(type_)?,
                    *stride,
                    *offset,
                );
                self.record_pointer(
                    registry,
                    AttributePointerInfo {
                        pointer: "vertexAttribIPointer",
                        index: location,
                        size: *size,
                        type_: type_.clone(),
                        normalized: None,
                        stride: *stride,
                        offset: *offset,
                    },
                )?;
            }
            CommandKind::EnableVertexAttribArray { index } => {
                gl.enable_vertex_attrib_array(self.attrib_location(registry, index)?)
            }
            CommandKind::DisableVertexAttribArray { index } => {
                gl.disable_vertex_attrib_array(self.attrib_location(registry, index)?)
            }
            CommandKind::VertexAttribFv { index } => {
                let location = self.attrib_location(registry, index)?;
                let data = require_payload(command, payloads)?;
                let values = data.view.as_f32().ok_or(CommandError::PayloadType {
                    expected: "float32",
                    found: data.view.element_type(),
                })?;
                let count = data
                    .shape
                    .first()
                    .copied()
                    .filter(|n| (1..=4).contains(n))
                    .ok_or_else(|| data.unsupported_shape())?;
                let values = values.get(..count).ok_or_else(|| data.unsupported_shape())?;
                gl.vertex_attrib_fv(location, values);
            }
            CommandKind::VertexAttribI4iv { index } => {
                let location = self.attrib_location(registry, index)?;
                let data = require_payload(command, payloads)?;
                match &data.view {
                    TypedView::Int32(values) => {
                        let values: [i32; 4] = values
                            .get(..4)
                            .and_then(|v| v.try_into().ok())
                            .ok_or_else(|| data.unsupported_shape())?;
                        gl.vertex_attrib_i4iv(location, values);
                    }
                    TypedView::Uint32(values) => {
                        let values: [u32; 4] = values
                            .get(..4)
                            .and_then(|v| v.try_into().ok())
                            .ok_or_else(|| data.unsupported_shape())?;
                        gl.vertex_attrib_i4uiv(location, values);
                    }
                    other => {
                        return Err(CommandError::PayloadType {
                            expected: "int32 or uint32",
                            found: other.element_type(),
                        })
                    }
                }
            }

            // ==================== Framebuffers ====================
            CommandKind::BindFramebuffer {
                target,
                framebuffer,
            } => {
                let target = tokens::FRAMEBUFFER_TARGET.parse(target)?;
                let framebuffer = optional_native(registry, *framebuffer, ResourceKind::Framebuffer)?;
                gl.bind_framebuffer(target, framebuffer);
            }
            CommandKind::FramebufferTexture2D {
                target,
                attachement,
                textarget,
                texture,
                level,
            } => {
                let texture = optional_native(registry, *texture, ResourceKind::Texture)?;
                gl.framebuffer_texture_2d(
                    tokens::FRAMEBUFFER_TARGET.parse(target)?,
                    tokens::ATTACHMENT.parse(attachement)?,
                    tokens::TEXTURE_TARGET.parse(textarget)?,
                    texture,
                    *level,
                );
            }
            CommandKind::DrawBuffers { buffers } => {
                let buffers = buffers
                    .iter()
                    .map(|b| tokens::DRAW_BUFFER.parse(b))
                    .collect::<Result<Vec<_>, _>>()?;
                gl.draw_buffers(&buffers);
            }

            // ==================== Draws ====================
            CommandKind::DrawArrays { mode, first, count } => {
                gl.draw_arrays(tokens::DRAW_MODE.parse(mode)?, *first, *count)
            }
            CommandKind::DrawArraysInstanced {
                mode,
                first,
                count,
                instance_count,
            } => gl.draw_arrays_instanced(
                tokens::DRAW_MODE.parse(mode)?,
                *first,
                *count,
                *instance_count,
            ),
            CommandKind::DrawElements {
                mode,
                count,
                type_,
                offset,
            } => gl.draw_elements(
                tokens::DRAW_MODE.parse(mode)?,
                *count,
                tokens::INDEX_TYPE.parse(type_)?,
                *offset,
            ),
            CommandKind::DrawElementsInstanced {
                mode,
                count,
                type_,
                offset,
                instance_count,
            } => gl.draw_elements_instanced(
                tokens::DRAW_MODE.parse(mode)?,
                *count,
                tokens::INDEX_TYPE.parse(type_)?,
                *offset,
                *instance_count,
            ),

            CommandKind::Unknown => return Err(CommandError::Unsupported),
        }
        Ok(())
    }

    fn upload_uniform<C: GlContext>(
        &self,
        gl: &mut C,
        registry: &Registry,
        command: &Command,
        payloads: &[Vec<u8>],
        name: &str,
        matrix: bool,
    ) -> Result<(), CommandError> {
        let Some(program) = self.bindings.program else {
            trace!(name, "No program bound, uniform skipped");
            return Ok(());
        };
        let location = program_info(registry, program)?
            .uniform(name)
            .and_then(|u| u.location);
        let Some(location) = location else {
            trace!(name, %program, "Uniform not active, upload skipped");
            return Ok(());
        };

        let data = require_payload(command, payloads)?;
        if matrix {
            let &[.., columns, rows] = data.shape else {
                return Err(data.unsupported_shape());
            };
            if !(2..=4).contains(&columns) || !(2..=4).contains(&rows) {
                return Err(data.unsupported_shape());
            }
            let values = data.view.as_f32().ok_or(CommandError::PayloadType {
                expected: "float32",
                found: data.view.element_type(),
            })?;
            gl.uniform_matrix_fv(location, columns, rows, false, values);
            return Ok(());
        }

        let components = data
            .shape
            .last()
            .copied()
            .filter(|n| (1..=4).contains(n))
            .ok_or_else(|| data.unsupported_shape())?;
        match &data.view {
            TypedView::Float32(values) => gl.uniform_fv(location, components, values),
            TypedView::Int32(values) => gl.uniform_iv(location, components, values),
            TypedView::Uint32(values) => gl.uniform_uiv(location, components, values),
            other => {
                return Err(CommandError::PayloadType {
                    expected: "int32, uint32 or float32",
                    found: other.element_type(),
                })
            }
        }
        Ok(())
    }

    fn create_uniform_buffer<C: GlContext>(
        &mut self,
        gl: &mut C,
        registry: &mut Registry,
        buffer: i64,
        program: i64,
        block_name: &str,
        usage: &str,
    ) -> Result<(), CommandError> {
        let handle = registry.handle(buffer)?;
        let program = registry.handle(program)?;
        registry.native(program, ResourceKind::Program)?;
        let block = program_info(registry, program)?
            .block(block_name)
            .cloned()
            .ok_or_else(|| CommandError::UnresolvedBlock(block_name.to_string()))?;
        let usage = tokens::USAGE_HINT.parse(usage)?;

        let native = gl.create_buffer().ok_or(CommandError::CreateFailed("buffer"))?;
        let target = BufferTarget::Uniform;
        gl.bind_buffer(target.gl(), Some(native));
        gl.buffer_data_size(target.gl(), block.size.max(0) as usize, usage);
        gl.bind_buffer(target.gl(), None);
        self.bindings.buffers.remove(&target);

        registry.create(
            handle,
            native,
            ResourceInfo::Buffer(BufferInfo {
                size: Some(BufferSize::Bytes(block.size as i64)),
                target: Some(target),
                uniformblock: Some(block),
            }),
        )?;
        Ok(())
    }

    fn attrib_location(&self, registry: &Registry, index: &AttribIndex) -> Result<u32, CommandError> {
        match index {
            AttribIndex::Location(location) => Ok(*location),
            AttribIndex::Name(name) => {
                let program = self.bindings.program.ok_or(CommandError::NoBoundProgram)?;
                program_info(registry, program)?
                    .attribute(name)
                    .and_then(|attribute| u32::try_from(attribute.location).ok())
                    .ok_or_else(|| CommandError::UnresolvedAttribute(name.clone()))
            }
        }
    }

    /// Append a pointer record to the bound vertex array, grouped under the
    /// bound ARRAY_BUFFER.
    fn record_pointer(
        &self,
        registry: &mut Registry,
        pointer: AttributePointerInfo,
    ) -> Result<(), CommandError> {
        let (Some(vao), Some(&buffer)) = (
            self.bindings.vertex_array,
            self.bindings.buffers.get(&BufferTarget::Array),
        ) else {
            return Ok(());
        };
        let recorded = match registry.get_mut(vao)?.info.as_vertex_array_mut() {
            Some(info) => {
                info.record(buffer, pointer);
                true
            }
            None => false,
        };
        if recorded {
            registry.mark_dirty(vao);
        }
        Ok(())
    }
}

fn optional_native(
    registry: &Registry,
    raw: i64,
    kind: ResourceKind,
) -> Result<Option<GlObject>, CommandError> {
    registry
        .optional_handle(raw)?
        .map(|handle| registry.native(handle, kind))
        .transpose()
        .map_err(CommandError::from)
}

fn program_info(registry: &Registry, program: Handle) -> Result<&ProgramInfo, CommandError> {
    let resource = registry.get(program)?;
    resource.info.as_program().ok_or_else(|| {
        CommandError::Registry(crate::registry::RegistryError::WrongKind {
            handle: program,
            expected: ResourceKind::Program,
            found: resource.info.kind().unwrap_or(ResourceKind::Program),
        })
    })
}

fn write_sub_data<C: GlContext>(
    gl: &mut C,
    target: BufferTarget,
    dst_byte_offset: usize,
    src_offset: usize,
    size: Option<usize>,
    data: Option<Payload<'_>>,
) -> Result<(), CommandError> {
    match data {
        Some(data) => {
            let bytes = data.view.element_bytes(src_offset, size)?;
            gl.buffer_sub_data(target.gl(), dst_byte_offset, bytes);
        }
        None => gl.buffer_sub_data(target.gl(), dst_byte_offset, &vec![0u8; size.unwrap_or(0)]),
    }
    Ok(())
}

fn compile_shader<C: GlContext>(
    gl: &mut C,
    registry: &mut Registry,
    shader: i64,
) -> Result<(), CommandError> {
    let handle = registry.handle(shader)?;
    let native = registry.native(handle, ResourceKind::Shader)?;
    gl.compile_shader(native);

    let message = if gl.get_shader_parameter(native, COMPILE_STATUS).unwrap_or(0) != 0 {
        "compiled".to_string()
    } else {
        let log = gl.get_shader_info_log(native);
        debug!(%handle, %log, "Shader failed to compile");
        log
    };
    if let Some(info) = registry.get_mut(handle)?.info.as_shader_mut() {
        info.message = Some(message);
    }
    registry.mark_dirty(handle);
    Ok(())
}

fn link_program<C: GlContext>(
    gl: &mut C,
    registry: &mut Registry,
    program: i64,
) -> Result<(), CommandError> {
    let handle = registry.handle(program)?;
    let native = registry.native(handle, ResourceKind::Program)?;
    gl.link_program(native);
    gl.validate_program(native);

    let mut info = program_info(registry, handle)?.clone();
    if gl.get_program_parameter(native, LINK_STATUS).unwrap_or(0) != 0 {
        let view_block = gl.get_uniform_block_index(native, VIEW_BLOCK_NAME);
        if view_block != INVALID_INDEX {
            gl.uniform_block_binding(native, view_block, VIEW_BLOCK_BINDING);
        }
        let (uniforms, blocks) = reflect_uniforms(gl, native);
        info.message = Some("linked".to_string());
        info.uniforms = uniforms;
        info.uniforms_blocks = blocks;
        info.attributes = reflect_attributes(gl, native);
        debug!(
            %handle,
            uniforms = info.uniforms.len(),
            blocks = info.uniforms_blocks.len(),
            attributes = info.attributes.len(),
            "Program linked"
        );
    } else {
        let log = gl.get_program_info_log(native);
        debug!(%handle, %log, "Program failed to link");
        info.message = Some(log);
    }
    registry.set_info(handle, ResourceInfo::Program(info))?;
    Ok(())
}

fn active_count<C: GlContext>(gl: &C, program: WebGLProgram, pname: u32) -> u32 {
    gl.get_program_parameter(program, pname)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn reflect_uniforms<C: GlContext>(
    gl: &C,
    program: WebGLProgram,
) -> (Vec<UniformInfo>, Vec<UniformBlockInfo>) {
    let indices: Vec<u32> = (0..active_count(gl, program, ACTIVE_UNIFORMS)).collect();
    let block_indices = gl.get_active_uniforms(program, &indices, UNIFORM_BLOCK_INDEX);
    let offsets = gl.get_active_uniforms(program, &indices, UNIFORM_OFFSET);

    let mut uniforms = Vec::new();
    let mut blocks: Vec<UniformBlockInfo> = Vec::new();
    for (i, &index) in indices.iter().enumerate() {
        let Some(active) = gl.get_active_uniform(program, index) else {
            continue;
        };
        let type_ = glsl_type_name(active.type_);

        match block_indices.get(i).and_then(|&b| u32::try_from(b).ok()) {
            Some(block_index) => {
                let slot = match blocks.iter().position(|b| b.index == block_index) {
                    Some(slot) => slot,
                    None => {
                        blocks.push(UniformBlockInfo {
                            index: block_index,
                            name: gl
                                .get_active_uniform_block_name(program, block_index)
                                .unwrap_or_default(),
                            size: gl
                                .get_active_uniform_block_parameter(
                                    program,
                                    block_index,
                                    UNIFORM_BLOCK_DATA_SIZE,
                                )
                                .unwrap_or(0),
                            uniforms: Vec::new(),
                        });
                        blocks.len() - 1
                    }
                };
                blocks[slot].uniforms.push(BlockUniformInfo {
                    name: active.name,
                    type_,
                    size: active.size,
                    offset: offsets.get(i).copied().unwrap_or(-1),
                });
            }
            None => {
                let location = gl.get_uniform_location(program, &active.name);
                uniforms.push(UniformInfo {
                    name: active.name,
                    type_,
                    size: active.size,
                    location,
                });
            }
        }
    }
    (uniforms, blocks)
}

fn reflect_attributes<C: GlContext>(gl: &C, program: WebGLProgram) -> Vec<AttributeInfo> {
    (0..active_count(gl, program, ACTIVE_ATTRIBUTES))
        .filter_map(|index| gl.get_active_attrib(program, index))
        .map(|active| AttributeInfo {
            location: gl.get_attrib_location(program, &active.name),
            type_: glsl_type_name(active.type_),
            size: active.size,
            name: active.name,
        })
        .collect()
}
