//! Camera state and the shared view block.
//!
//! Programs that declare a `ViewBlock` uniform block get it bound to
//! binding point 0 at link time. Before every replay the four camera
//! matrices are written into one 256-byte buffer behind that binding:
//!
//! | offset | matrix          |
//! |--------|-----------------|
//! | 0      | camera          |
//! | 64     | view            |
//! | 128    | projection      |
//! | 192    | view-projection |

use glreplay_webgl::constants::{DYNAMIC_DRAW, UNIFORM_BUFFER};
use glreplay_webgl::{GlContext, WebGLBuffer};
use tracing::{debug, warn};

use crate::config::{MatrixMajor, ViewerConfig};
use crate::math::{Mat4, Vec3};

pub const VIEW_BLOCK_NAME: &str = "ViewBlock";
pub const VIEW_BLOCK_BINDING: u32 = 0;
pub const VIEW_BLOCK_SIZE: usize = 256;

const FIELD_OF_VIEW: f64 = 50.0;
const NEAR: f64 = 1.0;
const FAR: f64 = 5000.0;

/// Camera position and orientation plus the matrices derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    /// Degrees about Y.
    pub yaw: f64,
    /// Degrees about X.
    pub pitch: f64,
    pub camera: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

impl CameraState {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut camera = Self {
            position: config.camera_pos,
            yaw: config.camera_yaw,
            pitch: config.camera_pitch,
            camera: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
        };
        camera.set_viewport(config.width, config.height);
        camera.update();
        camera
    }

    /// Rebuild the projection for a new viewport size.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let aspect = f64::from(width) / f64::from(height.max(1));
        self.projection = Mat4::projection(FIELD_OF_VIEW, aspect, NEAR, FAR);
    }

    /// Recompute camera, view and view-projection from position and angles.
    pub fn update(&mut self) {
        let [x, y, z] = self.position;
        self.camera = Mat4::translation(x, y, z)
            * Mat4::rotation_y(self.yaw.to_radians())
            * Mat4::rotation_x(self.pitch.to_radians());
        // Rigid transforms always invert.
        self.view = self.camera.inverse().unwrap_or(Mat4::IDENTITY);
        self.view_projection = self.projection * self.view;
    }

    /// The view block contents as float32 bytes.
    pub fn block_bytes(&self, major: MatrixMajor) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(VIEW_BLOCK_SIZE);
        for matrix in [
            &self.camera,
            &self.view,
            &self.projection,
            &self.view_projection,
        ] {
            let matrix = match major {
                MatrixMajor::RowMajor => matrix.transpose(),
                MatrixMajor::ColumnMajor => *matrix,
            };
            bytes.extend_from_slice(bytemuck::cast_slice(&matrix.to_f32()));
        }
        bytes
    }
}

/// The buffer behind the view block binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewBlock {
    buffer: WebGLBuffer,
}

impl ViewBlock {
    /// Allocate the buffer and bind it to the view block binding point.
    pub fn create<C: GlContext>(gl: &mut C) -> Option<Self> {
        let Some(buffer) = gl.create_buffer() else {
            warn!("Context refused to create the view block buffer");
            return None;
        };
        gl.bind_buffer(UNIFORM_BUFFER, Some(buffer));
        gl.buffer_data_size(UNIFORM_BUFFER, VIEW_BLOCK_SIZE, DYNAMIC_DRAW);
        gl.bind_buffer(UNIFORM_BUFFER, None);
        gl.bind_buffer_base(UNIFORM_BUFFER, VIEW_BLOCK_BINDING, Some(buffer));
        if !gl.get_extension("EXT_color_buffer_float") {
            debug!("EXT_color_buffer_float unavailable");
        }
        Some(Self { buffer })
    }

    pub fn buffer(&self) -> WebGLBuffer {
        self.buffer
    }

    /// Write the four camera matrices, then rebind `restore` to
    /// UNIFORM_BUFFER.
    pub fn upload<C: GlContext>(
        &self,
        gl: &mut C,
        camera: &CameraState,
        major: MatrixMajor,
        restore: Option<WebGLBuffer>,
    ) {
        let bytes = camera.block_bytes(major);
        gl.bind_buffer(UNIFORM_BUFFER, Some(self.buffer));
        for (slot, matrix) in bytes.chunks_exact(64).enumerate() {
            gl.buffer_sub_data(UNIFORM_BUFFER, slot * 64, matrix);
        }
        gl.bind_buffer(UNIFORM_BUFFER, restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, ElementType};
    use glreplay_webgl::HeadlessContext;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_default_camera() {
        let camera = CameraState::new(&ViewerConfig::default());
        assert_eq!(camera.camera, Mat4::translation(0.0, 50.0, 200.0));
        assert!(camera
            .view
            .approx_eq(&Mat4::translation(0.0, -50.0, -200.0), EPS));
        let aspect = camera.projection.at(1, 1) / camera.projection.at(0, 0);
        assert!((aspect - 700.0 / 500.0).abs() < 1e-9);
        assert!(camera
            .view_projection
            .approx_eq(&camera.projection.dot(&camera.view), EPS));
    }

    #[test]
    fn test_yaw_turns_forward_axis() {
        let mut camera = CameraState::new(&ViewerConfig::default());
        camera.yaw = 90.0;
        camera.update();
        let k = camera.camera.column_k();
        assert!((k[0] - 1.0).abs() < EPS);
        assert!(k[2].abs() < EPS);
        assert_eq!(camera.camera.get_translation(), [0.0, 50.0, 200.0]);
    }

    #[test]
    fn test_block_bytes_layout() {
        let camera = CameraState::new(&ViewerConfig::default());

        let row = camera.block_bytes(MatrixMajor::RowMajor);
        assert_eq!(row.len(), VIEW_BLOCK_SIZE);
        let view = decode(ElementType::Float32, &row).unwrap();
        let floats = view.as_f32().unwrap();
        // Transposed camera matrix: translation lands in the last row.
        assert_eq!(&floats[12..15], &[0.0, 50.0, 200.0]);

        let column = camera.block_bytes(MatrixMajor::ColumnMajor);
        let view = decode(ElementType::Float32, &column).unwrap();
        let floats = view.as_f32().unwrap();
        assert_eq!(floats[3], 0.0);
        assert_eq!(floats[7], 50.0);
        assert_eq!(floats[11], 200.0);
        assert_eq!(floats[16 + 7], -50.0);
    }

    #[test]
    fn test_view_block_setup_and_upload() {
        let mut gl = HeadlessContext::new(64, 64);
        let block = ViewBlock::create(&mut gl).unwrap();
        assert_eq!(
            gl.get_indexed_buffer(UNIFORM_BUFFER, VIEW_BLOCK_BINDING),
            Some(block.buffer())
        );
        assert_eq!(gl.get_buffer_data(block.buffer()).unwrap().data.len(), 256);

        let camera = CameraState::new(&ViewerConfig::default());
        block.upload(&mut gl, &camera, MatrixMajor::RowMajor, None);
        assert_eq!(gl.call_count("buffer_sub_data"), 4);
        assert_eq!(
            gl.get_buffer_data(block.buffer()).unwrap().data,
            camera.block_bytes(MatrixMajor::RowMajor)
        );
        assert!(gl.state().extensions.contains("EXT_color_buffer_float"));
    }

    #[test]
    fn test_upload_restores_uniform_binding() {
        let mut gl = HeadlessContext::new(64, 64);
        let block = ViewBlock::create(&mut gl).unwrap();
        let other = gl.create_buffer().unwrap();
        gl.bind_buffer(UNIFORM_BUFFER, Some(other));
        gl.buffer_data_size(UNIFORM_BUFFER, 16, DYNAMIC_DRAW);

        let camera = CameraState::new(&ViewerConfig::default());
        block.upload(&mut gl, &camera, MatrixMajor::ColumnMajor, Some(other));

        // Writes after the upload land in the restored buffer.
        gl.buffer_sub_data(UNIFORM_BUFFER, 0, &[7; 4]);
        assert_eq!(&gl.get_buffer_data(other).unwrap().data[..4], &[7; 4]);
        assert_eq!(
            gl.get_buffer_data(block.buffer()).unwrap().data,
            camera.block_bytes(MatrixMajor::ColumnMajor)
        );
    }
}
