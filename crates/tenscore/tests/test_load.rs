//! Tests for a runtime loaded from a shared library.
//!
//! Runs as its own test binary: the loaded runtime becomes the process-wide
//! one. The library is the `tenscore-sys` cdylib that cargo builds next to
//! this test's executable.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;
use tenscore::{Buffer, DType, RuntimeApi, Settings, TensorShape};
use tenscore_sys::host::{ResourceKind, live_handles};

fn runtime_library() -> Option<PathBuf> {
    let name = format!("{DLL_PREFIX}tenscore_sys{DLL_SUFFIX}");
    let exe = std::env::current_exe().ok()?;
    exe.ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join(&name))
        .find(|path| path.is_file())
}

/// Every operation runs through the loaded library, which stays loaded for
/// as long as the process uses it.
#[test]
fn test_loaded_runtime_drives_the_safe_layer() {
    let Some(path) = runtime_library() else {
        eprintln!("no tenscore_sys shared library next to the test binary; skipping");
        return;
    };

    let api = unsafe { RuntimeApi::load(&path) }.unwrap();
    assert!(api.is_loaded_library());
    tenscore::init_with(api).unwrap();
    tenscore::init().unwrap();

    let linked_shapes = live_handles(ResourceKind::Shape);
    let linked_buffers = live_handles(ResourceKind::Buffer);

    let shape = TensorShape::new(DType::Float32, &[2, 3]).unwrap();
    assert_eq!(shape.repr().unwrap(), "float32(2:3, 3:1)");
    assert_eq!(shape.nbytes().unwrap(), 24);

    for device in ["host.0", "staged.0"] {
        let buffer = Buffer::new(device, &shape).unwrap();
        buffer.write(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(buffer.read::<f32>().unwrap(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    Settings::set("TENSCORE_TEST_LOADED", "yes").unwrap();
    assert_eq!(Settings::get("TENSCORE_TEST_LOADED").unwrap(), "yes");
    let err = Buffer::new("missing.0", &shape).unwrap_err();
    assert!(err.to_string().contains("missing.0"));

    // The linked copy of the host runtime saw none of this.
    assert_eq!(live_handles(ResourceKind::Shape), linked_shapes);
    assert_eq!(live_handles(ResourceKind::Buffer), linked_buffers);
}
