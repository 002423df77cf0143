//! The WebGL 2 call surface used by the replay engine.

use crate::{
    ActiveInfo, Capabilities, ClearMask, WebGLBuffer, WebGLFramebuffer, WebGLProgram,
    WebGLShader, WebGLTexture, WebGLUniformLocation, WebGLVertexArray,
};

/// A stateful WebGL 2 rendering context.
///
/// Method names follow the WebGL IDL in snake case. Enumerant arguments are
/// raw `u32` values from [`crate::constants`]; validating them is the
/// context's job, reported through [`GlContext::get_error`] as WebGL does.
/// Object arguments are the handles returned by the matching `create_*`.
pub trait GlContext {
    // ==================== State ====================

    /// Get and clear the error flag.
    fn get_error(&mut self) -> u32;

    /// Enable an extension, returning whether it is supported.
    fn get_extension(&mut self, name: &str) -> bool;

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Enable every capability in `caps`.
    fn enable(&mut self, caps: Capabilities);

    /// Disable every capability in `caps`.
    fn disable(&mut self, caps: Capabilities);

    fn is_enabled(&self, cap: Capabilities) -> bool;

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, mask: ClearMask);
    fn front_face(&mut self, mode: u32);
    fn cull_face(&mut self, mode: u32);
    fn depth_func(&mut self, func: u32);
    fn depth_mask(&mut self, flag: bool);
    fn depth_range(&mut self, z_near: f32, z_far: f32);
    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn blend_equation(&mut self, mode: u32);
    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32);
    fn blend_func(&mut self, s_factor: u32, d_factor: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn pixel_storei(&mut self, pname: u32, param: i32);

    // ==================== Shaders ====================

    fn create_shader(&mut self, shader_type: u32) -> Option<WebGLShader>;
    fn shader_source(&mut self, shader: WebGLShader, source: &str);
    fn compile_shader(&mut self, shader: WebGLShader);

    /// `getShaderParameter`; `None` for unknown shaders or parameters.
    fn get_shader_parameter(&self, shader: WebGLShader, pname: u32) -> Option<i32>;
    fn get_shader_info_log(&self, shader: WebGLShader) -> String;
    fn delete_shader(&mut self, shader: WebGLShader);

    // ==================== Programs ====================

    fn create_program(&mut self) -> Option<WebGLProgram>;
    fn attach_shader(&mut self, program: WebGLProgram, shader: WebGLShader);
    fn bind_attrib_location(&mut self, program: WebGLProgram, index: u32, name: &str);
    fn link_program(&mut self, program: WebGLProgram);
    fn validate_program(&mut self, program: WebGLProgram);

    /// `getProgramParameter`; `None` for unknown programs or parameters.
    fn get_program_parameter(&self, program: WebGLProgram, pname: u32) -> Option<i32>;
    fn get_program_info_log(&self, program: WebGLProgram) -> String;
    fn use_program(&mut self, program: Option<WebGLProgram>);

    // ==================== Introspection ====================

    fn get_active_uniform(&self, program: WebGLProgram, index: u32) -> Option<ActiveInfo>;

    /// `getActiveUniforms`: one value of `pname` per uniform index.
    fn get_active_uniforms(&self, program: WebGLProgram, indices: &[u32], pname: u32) -> Vec<i32>;

    /// `getUniformBlockIndex`; `INVALID_INDEX` when absent.
    fn get_uniform_block_index(&self, program: WebGLProgram, name: &str) -> u32;
    fn get_active_uniform_block_name(&self, program: WebGLProgram, index: u32) -> Option<String>;
    fn get_active_uniform_block_parameter(
        &self,
        program: WebGLProgram,
        index: u32,
        pname: u32,
    ) -> Option<i32>;
    fn uniform_block_binding(&mut self, program: WebGLProgram, index: u32, binding: u32);

    fn get_uniform_location(&self, program: WebGLProgram, name: &str)
        -> Option<WebGLUniformLocation>;
    fn get_active_attrib(&self, program: WebGLProgram, index: u32) -> Option<ActiveInfo>;

    /// `getAttribLocation`; -1 when absent.
    fn get_attrib_location(&self, program: WebGLProgram, name: &str) -> i32;

    // ==================== Uniforms ====================

    /// `uniform{N}fv` with `components` = N.
    fn uniform_fv(&mut self, location: WebGLUniformLocation, components: usize, data: &[f32]);

    /// `uniform{N}iv` with `components` = N.
    fn uniform_iv(&mut self, location: WebGLUniformLocation, components: usize, data: &[i32]);

    /// `uniform{N}uiv` with `components` = N.
    fn uniform_uiv(&mut self, location: WebGLUniformLocation, components: usize, data: &[u32]);

    /// `uniformMatrix{C}x{R}fv`.
    fn uniform_matrix_fv(
        &mut self,
        location: WebGLUniformLocation,
        columns: usize,
        rows: usize,
        transpose: bool,
        data: &[f32],
    );

    // ==================== Buffers ====================

    fn create_buffer(&mut self) -> Option<WebGLBuffer>;
    fn bind_buffer(&mut self, target: u32, buffer: Option<WebGLBuffer>);
    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: Option<WebGLBuffer>);

    /// `bufferData(target, srcData, usage)`.
    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32);

    /// `bufferData(target, size, usage)`: allocate a zeroed store.
    fn buffer_data_size(&mut self, target: u32, size: usize, usage: u32);

    /// `bufferSubData(target, dstByteOffset, srcData)`.
    fn buffer_sub_data(&mut self, target: u32, dst_byte_offset: usize, data: &[u8]);
    fn get_buffer_parameter(&self, target: u32, pname: u32) -> Option<i32>;

    // ==================== Vertex Arrays ====================

    fn create_vertex_array(&mut self) -> Option<WebGLVertexArray>;
    fn bind_vertex_array(&mut self, vertex_array: Option<WebGLVertexArray>);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        type_: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_i_pointer(&mut self, index: u32, size: i32, type_: u32, stride: i32, offset: i32);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);

    /// `vertexAttrib{N}fv` with N = `values.len()`.
    fn vertex_attrib_fv(&mut self, index: u32, values: &[f32]);
    fn vertex_attrib_i4iv(&mut self, index: u32, values: [i32; 4]);
    fn vertex_attrib_i4uiv(&mut self, index: u32, values: [u32; 4]);

    // ==================== Textures ====================

    fn create_texture(&mut self) -> Option<WebGLTexture>;
    fn bind_texture(&mut self, target: u32, texture: Option<WebGLTexture>);
    fn active_texture(&mut self, texture: u32);
    fn generate_mipmap(&mut self, target: u32);

    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        type_: u32,
        pixels: Option<&[u8]>,
    );

    #[allow(clippy::too_many_arguments)]
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
        type_: u32,
        pixels: Option<&[u8]>,
    );
    fn tex_storage_2d(&mut self, target: u32, levels: i32, internal_format: u32, width: i32, height: i32);
    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    );
    fn tex_parameteri(&mut self, target: u32, pname: u32, param: i32);
    fn tex_parameterf(&mut self, target: u32, pname: u32, param: f32);

    // ==================== Framebuffers ====================

    fn create_framebuffer(&mut self) -> Option<WebGLFramebuffer>;
    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<WebGLFramebuffer>);
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: Option<WebGLTexture>,
        level: i32,
    );
    fn draw_buffers(&mut self, buffers: &[u32]);

    // ==================== Drawing ====================

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32);
    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instance_count: i32);
    fn draw_elements(&mut self, mode: u32, count: i32, type_: u32, offset: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        type_: u32,
        offset: i32,
        instance_count: i32,
    );
}
