use std::io;
use std::sync::{Arc, Mutex};

/// Captures everything logged through `tracing` while the returned guard is
/// alive, so a test can assert on a specific event (e.g. a Trace pool's
/// "trace: need" line) instead of re-deriving the same fact some other way.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this capture as the default `tracing` subscriber for as long
    /// as the returned guard is held.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || CaptureWriter(sink.buf.clone()))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contains(&self, needle: &str) -> bool {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf).contains(needle)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sees_events_logged_while_installed() {
        let capture = LogCapture::new();
        let guard = capture.install();
        tracing::info!(answer = 42, "hello from the test");
        drop(guard);
        assert!(capture.contains("hello from the test"));
        assert!(capture.contains("answer"));
    }
}
