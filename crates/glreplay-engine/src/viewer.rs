//! The viewer: owns the context, the persisted command list and the camera.
//!
//! The host talks to a [`GlViewer`] through three channels: resource
//! registration, command batches with their binary payloads, and property
//! updates (size, camera, input settings). Every batch and every camera
//! change replays the full persisted list, so the canvas always reflects
//! the complete history.

use glreplay_common::{GlReplayError, Result};
use glreplay_webgl::GlContext;
use tracing::{debug, error, info, trace};

use crate::camera::{CameraState, ViewBlock};
use crate::codec::{CodecError, ElementType};
use crate::command::{Command, CommandBatch};
use crate::config::{MatrixMajor, ViewerConfig};
use crate::error::CommandError;
use crate::info::ResourceKind;
use crate::interpreter::{BindingState, Interpreter, ReplayReport};
use crate::math::{vec3_add, vec3_scale, Vec3};
use crate::registry::{Handle, Registry};
use crate::sync::InfoSink;
use crate::tokens::BufferTarget;

/// Degrees of rotation per pixel of mouse travel at unit speed.
const MOUSE_DEGREES_PER_PIXEL: f64 = 0.2;

const FORWARD: usize = 0;
const LEFT: usize = 1;
const BACK: usize = 2;
const RIGHT: usize = 3;

/// Mouse drag and held movement keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Navigation {
    dragging: bool,
    moving: [bool; 4],
}

impl Navigation {
    fn is_moving(&self) -> bool {
        self.moving.iter().any(|held| *held)
    }
}

fn viewport_extent(width: u32, height: u32) -> (i32, i32) {
    (
        i32::try_from(width).unwrap_or(i32::MAX),
        i32::try_from(height).unwrap_or(i32::MAX),
    )
}

/// Reject a batch whose payload references cannot all be resolved.
fn validate_payloads(commands: &[Command], payloads: &[Vec<u8>]) -> Result<()> {
    for command in commands {
        let Some(meta) = &command.buffer_metadata else {
            continue;
        };
        let element_type = ElementType::parse(&meta.dtype).map_err(CommandError::from)?;
        let bytes = payloads.get(meta.index).ok_or(CommandError::PayloadIndex {
            index: meta.index,
            len: payloads.len(),
        })?;
        if bytes.len() % element_type.size() != 0 {
            return Err(CommandError::from(CodecError::PayloadLength {
                len: bytes.len(),
                element_size: element_type.size(),
            })
            .into());
        }
    }
    Ok(())
}

/// Replays host command batches against a WebGL2 context.
///
/// Without a context the viewer still accepts registrations and batches
/// but draws nothing. A registry desync disables it for good.
pub struct GlViewer<C: GlContext, S: InfoSink> {
    gl: Option<C>,
    desynced: bool,
    config: ViewerConfig,
    registry: Registry,
    interpreter: Interpreter,
    camera: CameraState,
    view_block: Option<ViewBlock>,
    commands: Vec<Command>,
    payloads: Vec<Vec<u8>>,
    sink: S,
    navigation: Navigation,
    will_redraw: bool,
}

impl<C: GlContext, S: InfoSink> GlViewer<C, S> {
    /// Create a viewer. Pass `None` when no WebGL2 context could be made.
    pub fn new(gl: Option<C>, config: ViewerConfig, sink: S) -> Result<Self> {
        config.validate()?;

        let mut gl = gl;
        let view_block = match gl.as_mut() {
            Some(gl) => {
                let block = ViewBlock::create(gl);
                let (width, height) = viewport_extent(config.width, config.height);
                gl.viewport(0, 0, width, height);
                block
            }
            None => {
                error!("Could not create a WebGL2 context; the viewer will not draw");
                None
            }
        };

        info!(
            width = config.width,
            height = config.height,
            "Viewer created"
        );

        Ok(Self {
            gl,
            desynced: false,
            camera: CameraState::new(&config),
            config,
            registry: Registry::new(),
            interpreter: Interpreter::new(),
            view_block,
            commands: Vec::new(),
            payloads: Vec::new(),
            sink,
            navigation: Navigation::default(),
            will_redraw: false,
        })
    }

    /// Fail commands that leave a GL error behind.
    pub fn with_error_checks(mut self, check_errors: bool) -> Self {
        self.interpreter = Interpreter::new().with_error_checks(check_errors);
        self
    }

    /// No context, or the registry went out of sync.
    pub fn is_degraded(&self) -> bool {
        self.gl.is_none() || self.desynced
    }

    /// Register the host's next resource.
    pub fn register_resource(&mut self, uid: u32) -> Result<Handle> {
        if self.desynced {
            return Err(GlReplayError::registry(
                "registry is out of sync; no further resources are accepted",
            ));
        }
        match self.registry.register(uid) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                let err = GlReplayError::from(e);
                if err.is_fatal() {
                    error!(
                        category = err.category(),
                        error = %err,
                        "Resource registry out of sync; replay disabled"
                    );
                    self.desynced = true;
                }
                Err(err)
            }
        }
    }

    /// Take one host batch. `payloads` are the binary buffers sent with it.
    ///
    /// Payload references are checked before anything runs; a batch with a
    /// bad reference is rejected whole and leaves the persisted list as it
    /// was.
    pub fn receive_batch(
        &mut self,
        batch: CommandBatch,
        payloads: Vec<Vec<u8>>,
    ) -> Result<ReplayReport> {
        if self.is_degraded() {
            debug!(
                commands = batch.commands.len(),
                "Viewer degraded; batch ignored"
            );
            return Ok(ReplayReport::default());
        }
        validate_payloads(&batch.commands, &payloads)?;

        if batch.clear {
            debug!(
                dropped = self.commands.len(),
                "Clearing persisted commands"
            );
            self.commands.clear();
            self.payloads.clear();
        }

        if batch.only_once {
            let mut report = self.execute_transient(&batch.commands, &payloads);
            report.merge(self.run_commands());
            return Ok(report);
        }

        let base = self.payloads.len();
        self.commands
            .extend(batch.commands.into_iter().map(|mut command| {
                if let Some(meta) = &mut command.buffer_metadata {
                    meta.index += base;
                }
                command
            }));
        self.payloads.extend(payloads);
        Ok(self.run_commands())
    }

    /// Recompute the camera and write it to the view block. The
    /// interpreter's UNIFORM_BUFFER binding is bound again afterwards.
    fn upload_camera(&mut self) {
        self.camera.update();
        let (Some(gl), Some(block)) = (self.gl.as_mut(), self.view_block.as_ref()) else {
            return;
        };
        let restore = self
            .interpreter
            .bindings()
            .buffers
            .get(&BufferTarget::Uniform)
            .and_then(|handle| self.registry.native(*handle, ResourceKind::Buffer).ok());
        block.upload(gl, &self.camera, self.config.shader_matrix_major, restore);
    }

    fn execute_transient(&mut self, commands: &[Command], payloads: &[Vec<u8>]) -> ReplayReport {
        self.upload_camera();
        let Some(gl) = self.gl.as_mut() else {
            return ReplayReport::default();
        };
        let report = self
            .interpreter
            .execute(gl, &mut self.registry, commands, payloads);
        self.publish_dirty();
        report
    }

    /// Replay the persisted list with fresh camera matrices.
    pub fn run_commands(&mut self) -> ReplayReport {
        if self.desynced {
            return ReplayReport::default();
        }
        self.upload_camera();
        let Some(gl) = self.gl.as_mut() else {
            return ReplayReport::default();
        };
        let report = self
            .interpreter
            .execute(gl, &mut self.registry, &self.commands, &self.payloads);
        trace!(
            executed = report.executed,
            failed = report.failures.len(),
            "Replay finished"
        );
        self.publish_dirty();
        report
    }

    fn publish_dirty(&mut self) {
        for handle in self.registry.take_dirty() {
            if let Ok(resource) = self.registry.get(handle) {
                self.sink.publish(handle, &resource.info);
            }
        }
    }

    /// Resize the drawing surface and replay.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<ReplayReport> {
        if width == 0 || height == 0 {
            return Err(GlReplayError::config(format!(
                "viewer size must be non-zero, got {width}x{height}"
            )));
        }
        self.config.width = width;
        self.config.height = height;
        self.camera.set_viewport(width, height);
        if let Some(gl) = self.gl.as_mut() {
            let (width, height) = viewport_extent(width, height);
            gl.viewport(0, 0, width, height);
        }
        Ok(self.run_commands())
    }

    pub fn set_camera_pos(&mut self, position: Vec3) -> ReplayReport {
        self.config.camera_pos = position;
        self.camera.position = position;
        self.run_commands()
    }

    pub fn set_camera_yaw(&mut self, yaw: f64) -> ReplayReport {
        self.config.camera_yaw = yaw;
        self.camera.yaw = yaw;
        self.run_commands()
    }

    pub fn set_camera_pitch(&mut self, pitch: f64) -> ReplayReport {
        self.config.camera_pitch = pitch;
        self.camera.pitch = pitch;
        self.run_commands()
    }

    /// Input settings only schedule a frame; they never change what is drawn.
    pub fn set_mouse_speed(&mut self, speed: f64) {
        self.config.mouse_speed = speed;
        self.request_redraw();
    }

    pub fn set_move_speed(&mut self, speed: f64) {
        self.config.move_speed = speed;
        self.request_redraw();
    }

    pub fn set_move_keys(&mut self, keys: &str) -> Result<()> {
        let previous = std::mem::replace(&mut self.config.move_keys, keys.to_string());
        if let Err(e) = self.config.validate() {
            self.config.move_keys = previous;
            return Err(e);
        }
        self.navigation.moving = [false; 4];
        self.request_redraw();
        Ok(())
    }

    pub fn set_shader_matrix_major(&mut self, major: MatrixMajor) -> ReplayReport {
        self.config.shader_matrix_major = major;
        self.run_commands()
    }

    pub fn on_mouse_down(&mut self) {
        self.navigation.dragging = true;
    }

    pub fn on_mouse_up(&mut self) {
        self.navigation.dragging = false;
    }

    /// Pointer left the surface: stop dragging and release every key.
    pub fn on_mouse_out(&mut self) {
        self.navigation = Navigation::default();
    }

    /// Relative pointer motion in pixels. Turns the camera while dragging.
    pub fn on_mouse_move(&mut self, dx: f64, dy: f64) {
        if !self.navigation.dragging {
            return;
        }
        let speed = self.config.mouse_speed;
        self.camera.yaw -= MOUSE_DEGREES_PER_PIXEL * dx * speed;
        self.camera.pitch -= MOUSE_DEGREES_PER_PIXEL * dy * speed;
        self.config.camera_yaw = self.camera.yaw;
        self.config.camera_pitch = self.camera.pitch;
        self.request_redraw();
    }

    fn move_slot(&self, key: &str) -> Option<usize> {
        let mut chars = key.chars();
        let (Some(key), None) = (chars.next(), chars.next()) else {
            return None;
        };
        (0..4).find(|slot| self.config.move_key(*slot) == Some(key))
    }

    /// Auto-repeated presses are ignored.
    pub fn on_key_down(&mut self, key: &str, repeat: bool) {
        if repeat {
            return;
        }
        if let Some(slot) = self.move_slot(key) {
            self.navigation.moving[slot] = true;
            self.request_redraw();
        }
    }

    pub fn on_key_up(&mut self, key: &str) {
        if let Some(slot) = self.move_slot(key) {
            self.navigation.moving[slot] = false;
        }
    }

    /// Schedule a frame. Returns false when one is already pending.
    pub fn request_redraw(&mut self) -> bool {
        if self.will_redraw {
            return false;
        }
        self.will_redraw = true;
        true
    }

    pub fn has_pending_frame(&self) -> bool {
        self.will_redraw
    }

    /// Run a scheduled frame: apply held movement keys, then replay.
    ///
    /// While any key is held another frame is requested.
    pub fn animation_frame(&mut self) -> ReplayReport {
        self.will_redraw = false;
        if self.navigation.is_moving() {
            // Move along the camera axes from the last replay.
            let speed = self.config.move_speed;
            let forward = self.camera.camera.column_k();
            let right = self.camera.camera.column_i();
            let mut position = self.camera.position;
            if self.navigation.moving[FORWARD] {
                position = vec3_add(position, vec3_scale(forward, -speed));
            }
            if self.navigation.moving[BACK] {
                position = vec3_add(position, vec3_scale(forward, speed));
            }
            if self.navigation.moving[LEFT] {
                position = vec3_add(position, vec3_scale(right, -speed));
            }
            if self.navigation.moving[RIGHT] {
                position = vec3_add(position, vec3_scale(right, speed));
            }
            self.camera.position = position;
            self.config.camera_pos = position;
            self.request_redraw();
        }
        self.run_commands()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context(&self) -> Option<&C> {
        self.gl.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.gl.as_mut()
    }

    pub fn view_block(&self) -> Option<&ViewBlock> {
        self.view_block.as_ref()
    }

    pub fn persisted_commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn persisted_payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn bindings(&self) -> &BindingState {
        self.interpreter.bindings()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBatch;
    use crate::sync::NullSink;
    use glreplay_webgl::HeadlessContext;

    fn viewer() -> GlViewer<HeadlessContext, NullSink> {
        GlViewer::new(
            Some(HeadlessContext::new(700, 500)),
            ViewerConfig::default(),
            NullSink,
        )
        .unwrap()
    }

    fn batch(json: &str) -> CommandBatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_new_sets_viewport() {
        let viewer = viewer();
        let gl = viewer.context().unwrap();
        assert_eq!(gl.state().viewport, [0, 0, 700, 500]);
        assert!(viewer.view_block().is_some());
        assert!(!viewer.is_degraded());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ViewerConfig {
            move_keys: "wasdq".to_string(),
            ..ViewerConfig::default()
        };
        let result = GlViewer::<HeadlessContext, _>::new(None, config, NullSink);
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_indices_rebased() {
        let mut viewer = viewer();
        let b = batch(
            r#"{"commands": [{"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1,
                "buffer_metadata": {"index": 0, "dtype": "float32", "shape": [1]}}]}"#,
        );
        viewer.receive_batch(b.clone(), vec![vec![0; 4]]).unwrap();
        viewer.receive_batch(b, vec![vec![0; 4]]).unwrap();

        let indices: Vec<usize> = viewer
            .persisted_commands()
            .iter()
            .filter_map(|c| c.buffer_metadata.as_ref().map(|m| m.index))
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(viewer.persisted_payloads().len(), 2);
    }

    #[test]
    fn test_bad_payload_reference_rejects_batch() {
        let mut viewer = viewer();
        let b = batch(
            r#"{"commands": [
                {"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1},
                {"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1,
                 "buffer_metadata": {"index": 3, "dtype": "float32"}}]}"#,
        );
        let err = viewer.receive_batch(b, vec![vec![0; 4]]).unwrap_err();
        assert_eq!(err.category(), "command");
        assert!(viewer.persisted_commands().is_empty());

        let b = batch(
            r#"{"commands": [{"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1,
                 "buffer_metadata": {"index": 0, "dtype": "float32"}}]}"#,
        );
        assert!(viewer.receive_batch(b, vec![vec![0; 5]]).is_err());

        let b = batch(
            r#"{"commands": [{"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1,
                 "buffer_metadata": {"index": 0, "dtype": "complex64"}}]}"#,
        );
        assert!(viewer.receive_batch(b, vec![vec![0; 8]]).is_err());
    }

    #[test]
    fn test_mouse_drag_turns_camera() {
        let mut viewer = viewer();
        viewer.on_mouse_move(10.0, 10.0);
        assert_eq!(viewer.camera().yaw, 0.0);
        assert!(!viewer.has_pending_frame());

        viewer.on_mouse_down();
        viewer.on_mouse_move(10.0, -5.0);
        assert!((viewer.camera().yaw + 2.0).abs() < 1e-12);
        assert!((viewer.camera().pitch - 1.0).abs() < 1e-12);
        assert_eq!(viewer.config().camera_yaw, viewer.camera().yaw);
        assert!(viewer.has_pending_frame());

        viewer.on_mouse_up();
        viewer.on_mouse_move(10.0, 0.0);
        assert!((viewer.camera().yaw + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_key_matching() {
        let mut viewer = viewer();
        viewer.on_key_down("w", true);
        assert!(!viewer.has_pending_frame());
        viewer.on_key_down("ArrowUp", false);
        assert!(!viewer.has_pending_frame());
        viewer.on_key_down("d", false);
        assert!(viewer.has_pending_frame());
        assert!(viewer.navigation.moving[RIGHT]);

        viewer.on_mouse_out();
        assert!(!viewer.navigation.is_moving());
    }

    #[test]
    fn test_set_move_keys_validates() {
        let mut viewer = viewer();
        assert!(viewer.set_move_keys("zqsd").is_ok());
        assert_eq!(viewer.config().move_key(1), Some('q'));
        assert!(viewer.set_move_keys("zq").is_err());
        assert_eq!(viewer.config().move_keys, "zqsd");
    }

    #[test]
    fn test_set_size_updates_viewport_and_projection() {
        let mut viewer = viewer();
        viewer.set_size(200, 100).unwrap();
        let gl = viewer.context().unwrap();
        assert_eq!(gl.state().viewport, [0, 0, 200, 100]);
        let projection = &viewer.camera().projection;
        assert!((projection.at(1, 1) / projection.at(0, 0) - 2.0).abs() < 1e-9);
        assert!(viewer.set_size(0, 100).is_err());
    }
}
