//! Tracing setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them can call [`init_tracing`], which installs a formatting
//! subscriber filtered by `RUST_LOG` (default `info`).

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once per process.
///
/// Does nothing if this or another subscriber is already installed.
pub fn init_tracing() {
    INITIALISED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        if fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_err()
        {
            tracing::debug!("a tracing subscriber was already installed");
        }
    });
}

/// Run `f` under a thread-local subscriber and return what it logged.
#[cfg(test)]
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink::default();
    let writer = sink.clone();
    let subscriber = fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = sink.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
