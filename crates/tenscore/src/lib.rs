//! tenscore - safe handles over the tenscore runtime's C boundary
//!
//! The runtime hands out raw pointers, reports errors through a status
//! out-parameter and expects every pointer to be freed by hand. This crate
//! turns those into owned Rust values with `Result`-based errors.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Value types
//!     → TensorShape, Buffer, View, Settings
//!
//! Level 2: Ownership (handle module)
//!     → Handle<K> releases its pointer on drop, shared through Rc
//!
//! Level 3: Error translation (ffi module)
//!     → RuntimeApi::call: status slot in, Result out
//!
//! Level 4: Boundary (tenscore-sys)
//!     → host runtime, or a shared library via RuntimeApi::load
//! ```
//!
//! # Example
//!
//! ```
//! use tenscore::{Buffer, DType, TensorShape};
//!
//! tenscore::init().unwrap();
//!
//! let shape = TensorShape::new(DType::Float32, &[2, 3]).unwrap();
//! let buffer = Buffer::new("host.0", &shape).unwrap();
//!
//! buffer.write(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! assert_eq!(buffer.read::<f32>().unwrap()[4], 5.0);
//!
//! let view = buffer.mmap_current().unwrap();
//! assert_eq!(view.size().unwrap(), 24);
//! ```
//!
//! # Threading
//!
//! Nothing here is `Send` or `Sync`. Handles are released on the thread that
//! created them, and the runtime is free to assume calls on one handle are
//! never concurrent.

pub mod buffer;
pub mod dtype;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod settings;
pub mod shape;
pub mod strides;
pub mod telemetry;
pub mod view;

pub use buffer::Buffer;
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use ffi::RuntimeApi;
pub use settings::Settings;
pub use shape::TensorShape;
pub use view::{MapMode, View};

/// Initialise the linked host runtime.
///
/// Must be called before any other operation. Calling it again, or after
/// [`init_with`], has no effect.
pub fn init() -> Result<()> {
    ffi::install(RuntimeApi::host())
}

/// Initialise with a specific runtime, e.g. one from [`RuntimeApi::load`].
///
/// Only the first runtime installed in a process is used.
pub fn init_with(api: RuntimeApi) -> Result<()> {
    ffi::install(api)
}
