//! End-to-end viewer behaviour against the headless context.

use glreplay_engine::{
    CommandBatch, GlViewer, Handle, MatrixMajor, RecordingSink, ViewerConfig,
};
use glreplay_webgl::{DrawCall, HeadlessContext};
use serde_json::{json, Value};

const VS: &str = r#"#version 300 es
    uniform ViewBlock { mat4 u_cameraMatrix; mat4 u_viewMatrix; mat4 u_projectionMatrix; mat4 u_viewProjectionMatrix; };
    uniform mat4 u_model;
    in vec3 in_vert;
    void main() { gl_Position = u_viewProjectionMatrix * u_model * vec4(in_vert, 1.0); }
"#;

const FS: &str = r#"#version 300 es
    precision highp float;
    uniform float u_alpha;
    out vec4 f_color;
    void main() { f_color = vec4(1.0, 1.0, 1.0, u_alpha); }
"#;

type Viewer = GlViewer<HeadlessContext, RecordingSink>;

fn viewer() -> Viewer {
    GlViewer::new(
        Some(HeadlessContext::new(700, 500)),
        ViewerConfig::default(),
        RecordingSink::new(),
    )
    .unwrap()
}

fn batch(value: Value) -> CommandBatch {
    serde_json::from_value(value).unwrap()
}

fn register(viewer: &mut Viewer, count: u32) {
    for uid in 0..count {
        assert_eq!(viewer.register_resource(uid).unwrap(), Handle(uid));
    }
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// Shaders 0/1, program 2, vertex buffer 3.
fn scene() -> CommandBatch {
    batch(json!({
        "commands": [
            {"cmd": "createShader", "resource": 0, "type": "VERTEX_SHADER"},
            {"cmd": "shaderSource", "shader": 0, "source": VS},
            {"cmd": "compileShader", "shader": 0},
            {"cmd": "createShader", "resource": 1, "type": "FRAGMENT_SHADER"},
            {"cmd": "shaderSource", "shader": 1, "source": FS},
            {"cmd": "compileShader", "shader": 1},
            {"cmd": "createProgram", "resource": 2},
            {"cmd": "attachShader", "program": 2, "shader": 0},
            {"cmd": "attachShader", "program": 2, "shader": 1},
            {"cmd": "linkProgram", "program": 2},
            {"cmd": "useProgram", "program": 2},
            {"cmd": "createBuffer", "resource": 3},
            {"cmd": "bindBuffer", "target": "ARRAY_BUFFER", "buffer": 3},
            {"cmd": "bufferData", "target": "ARRAY_BUFFER", "usage": "STATIC_DRAW", "update_info": true,
             "buffer_metadata": {"index": 0, "dtype": "float32", "shape": [3, 3]}},
            {"cmd": "uniform", "name": "u_alpha",
             "buffer_metadata": {"index": 1, "dtype": "float32", "shape": [1]}},
            {"cmd": "drawArrays", "mode": "TRIANGLES", "first": 0, "count": 3}
        ]
    }))
}

fn scene_payloads() -> Vec<Vec<u8>> {
    vec![f32_bytes(&[0.0; 9]), f32_bytes(&[0.5])]
}

fn draw_count(viewer: &Viewer) -> usize {
    viewer
        .context()
        .unwrap()
        .draw_calls()
        .iter()
        .filter(|d| matches!(d, DrawCall::DrawArrays { .. }))
        .count()
}

#[test]
fn test_scene_replays_and_mirrors_info() {
    let mut viewer = viewer();
    register(&mut viewer, 4);

    let report = viewer.receive_batch(scene(), scene_payloads()).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(draw_count(&viewer), 1);

    let sink = viewer.sink();
    assert_eq!(sink.latest(Handle(0)).unwrap()["type"], "VERTEX_SHADER");
    assert_eq!(sink.latest(Handle(1)).unwrap()["type"], "FRAGMENT_SHADER");
    let program = sink.latest(Handle(2)).unwrap();
    assert_eq!(program["type"], "Program");
    assert_eq!(program["uniforms_blocks"][0]["name"], "ViewBlock");
    assert_eq!(program["uniforms_blocks"][0]["size"], 256);
    assert_eq!(program["attributes"][0]["name"], "in_vert");
    let buffer = sink.latest(Handle(3)).unwrap();
    assert_eq!(buffer, &json!({"type": "Buffer", "size": 36, "target": "ARRAY_BUFFER"}));
}

#[test]
fn test_every_batch_replays_history() {
    let mut viewer = viewer();
    register(&mut viewer, 4);
    viewer.receive_batch(scene(), scene_payloads()).unwrap();

    let more = batch(json!({"commands": [
        {"cmd": "drawArrays", "mode": "POINTS", "first": 0, "count": 1}
    ]}));
    let report = viewer.receive_batch(more, Vec::new()).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(viewer.persisted_commands().len(), 17);
    // First replay drew once, the second replayed both draws.
    assert_eq!(draw_count(&viewer), 3);
}

#[test]
fn test_clear_replaces_history() {
    let mut viewer = viewer();
    register(&mut viewer, 4);
    viewer.receive_batch(scene(), scene_payloads()).unwrap();

    let report = viewer
        .receive_batch(batch(json!({"clear": true, "commands": []})), Vec::new())
        .unwrap();
    assert_eq!(report.executed, 0);
    assert!(viewer.persisted_commands().is_empty());
    assert!(viewer.persisted_payloads().is_empty());

    let gl = viewer.context().unwrap();
    let (shaders, draw_calls) = (gl.call_count("create_shader"), gl.call_count("draw_arrays"));
    let report = viewer.set_camera_yaw(10.0);
    assert_eq!(report.executed, 0);
    let gl = viewer.context().unwrap();
    assert_eq!(gl.call_count("create_shader"), shaders);
    assert_eq!(gl.call_count("draw_arrays"), draw_calls);
    assert_eq!(draw_count(&viewer), 1);
}

#[test]
fn test_only_once_is_not_persisted() {
    let mut viewer = viewer();
    register(&mut viewer, 4);
    viewer.receive_batch(scene(), scene_payloads()).unwrap();

    let transient = batch(json!({
        "only_once": true,
        "commands": [{"cmd": "clearColor", "r": 1.0, "g": 0.0, "b": 0.0, "a": 1.0}]
    }));
    let report = viewer.receive_batch(transient, Vec::new()).unwrap();
    // The transient command plus a replay of the persisted scene.
    assert_eq!(report.executed, 17);
    assert_eq!(viewer.persisted_commands().len(), 16);
    assert_eq!(
        viewer.context().unwrap().state().clear_color,
        [1.0, 0.0, 0.0, 1.0]
    );
    assert_eq!(viewer.context().unwrap().call_count("clear_color"), 1);
    assert_eq!(draw_count(&viewer), 2);

    // A camera change replays only the persisted scene.
    let report = viewer.set_camera_yaw(45.0);
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.executed, 16);
    assert_eq!(viewer.context().unwrap().call_count("clear_color"), 1);
    assert_eq!(draw_count(&viewer), 3);
}

#[test]
fn test_only_once_writes_bound_uniform_block() {
    const MATERIAL_FS: &str = r#"#version 300 es
        precision highp float;
        uniform Material { vec4 tint; };
        out vec4 f_color;
        void main() { f_color = tint; }
    "#;

    let mut viewer = viewer();
    register(&mut viewer, 4);
    let setup = batch(json!({
        "commands": [
            {"cmd": "createShader", "resource": 0, "type": "VERTEX_SHADER"},
            {"cmd": "shaderSource", "shader": 0, "source": VS},
            {"cmd": "compileShader", "shader": 0},
            {"cmd": "createShader", "resource": 1, "type": "FRAGMENT_SHADER"},
            {"cmd": "shaderSource", "shader": 1, "source": MATERIAL_FS},
            {"cmd": "compileShader", "shader": 1},
            {"cmd": "createProgram", "resource": 2},
            {"cmd": "attachShader", "program": 2, "shader": 0},
            {"cmd": "attachShader", "program": 2, "shader": 1},
            {"cmd": "linkProgram", "program": 2},
            {"cmd": "useProgram", "program": 2},
            {"cmd": "createUniformBuffer", "buffer": 3, "program": 2,
             "block_name": "Material", "usage": "DYNAMIC_DRAW"},
            {"cmd": "bindBuffer", "target": "UNIFORM_BUFFER", "buffer": 3}
        ]
    }));
    let report = viewer.receive_batch(setup, Vec::new()).unwrap();
    assert!(report.is_clean(), "{report:?}");
    let material = viewer.registry().get(Handle(3)).unwrap().native.unwrap();

    let tint = batch(json!({
        "only_once": true,
        "commands": [
            {"cmd": "bufferSubDataStr", "target": "UNIFORM_BUFFER", "dst_byte_offset": "tint",
             "buffer_metadata": {"index": 0, "dtype": "float32", "shape": [4]}}
        ]
    }));
    let report = viewer
        .receive_batch(tint, vec![f32_bytes(&[1.0, 2.0, 3.0, 4.0])])
        .unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.executed, 14);

    let gl = viewer.context().unwrap();
    let data = &gl.get_buffer_data(material).unwrap().data;
    assert_eq!(&data[..16], f32_bytes(&[1.0, 2.0, 3.0, 4.0]).as_slice());

    let block = *viewer.view_block().unwrap();
    let expected = viewer.camera().block_bytes(MatrixMajor::RowMajor);
    assert_eq!(gl.get_buffer_data(block.buffer()).unwrap().data, expected);
}

#[test]
fn test_desync_degrades_viewer() {
    let mut viewer = viewer();
    viewer.register_resource(0).unwrap();
    let err = viewer.register_resource(5).unwrap_err();
    assert_eq!(err.category(), "registry");
    assert!(viewer.is_degraded());

    assert!(viewer.register_resource(1).is_err());
    let report = viewer.receive_batch(scene(), scene_payloads()).unwrap();
    assert_eq!(report.executed, 0);
    assert!(viewer.persisted_commands().is_empty());
}

#[test]
fn test_without_context_registration_still_works() {
    let mut viewer: Viewer =
        GlViewer::new(None, ViewerConfig::default(), RecordingSink::new()).unwrap();
    assert!(viewer.is_degraded());
    register(&mut viewer, 3);
    assert_eq!(viewer.registry().len(), 3);
    let report = viewer.receive_batch(scene(), scene_payloads()).unwrap();
    assert_eq!(report.executed, 0);
    assert!(viewer.sink().records.is_empty());
}

#[test]
fn test_view_block_receives_camera_matrices() {
    let mut viewer = viewer();
    register(&mut viewer, 4);
    viewer.receive_batch(scene(), scene_payloads()).unwrap();

    let block = *viewer.view_block().unwrap();
    let expected = viewer.camera().block_bytes(MatrixMajor::RowMajor);
    let gl = viewer.context().unwrap();
    assert_eq!(gl.get_buffer_data(block.buffer()).unwrap().data, expected);

    viewer.set_shader_matrix_major(MatrixMajor::ColumnMajor);
    viewer.set_camera_yaw(30.0);
    let expected = viewer.camera().block_bytes(MatrixMajor::ColumnMajor);
    let gl = viewer.context().unwrap();
    assert_eq!(gl.get_buffer_data(block.buffer()).unwrap().data, expected);
}

#[test]
fn test_redraw_requests_coalesce() {
    let mut viewer = viewer();
    assert!(viewer.request_redraw());
    assert!(!viewer.request_redraw());
    assert!(viewer.has_pending_frame());
    viewer.animation_frame();
    assert!(!viewer.has_pending_frame());
}

#[test]
fn test_held_key_moves_camera_each_frame() {
    let mut viewer = viewer();
    viewer.on_key_down("w", false);
    assert!(viewer.has_pending_frame());

    viewer.animation_frame();
    assert_eq!(viewer.camera().position, [0.0, 50.0, 199.0]);
    assert_eq!(viewer.config().camera_pos, [0.0, 50.0, 199.0]);
    // Still held: the frame asked for another.
    assert!(viewer.has_pending_frame());

    viewer.set_move_speed(2.0);
    viewer.on_key_up("w");
    viewer.on_key_down("d", false);
    viewer.animation_frame();
    assert_eq!(viewer.camera().position, [2.0, 50.0, 199.0]);

    viewer.on_key_up("d");
    viewer.animation_frame();
    assert!(!viewer.has_pending_frame());
    assert_eq!(viewer.camera().position, [2.0, 50.0, 199.0]);
}
