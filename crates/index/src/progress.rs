//! Throttled, single-line progress reporting for long scans.
//!
//! Lines look like `" 42.0 % - 420 of 1000 blocks"` and are rewritten in place
//! with a carriage return. [`Progress::boundary`] prints a line that is kept
//! (used between cache blocks, so progress interleaves with piped output), and
//! [`Progress::finish`] always ends with a `100.0 %` line.

use std::io::Write;
use std::time::{Duration, Instant};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

pub struct Progress {
    sink: Option<Box<dyn Write + Send>>,
    interval: Duration,
    unit: &'static str,
    total: u64,
    current: u64,
    last: Option<Instant>,
}
impl Progress {
    /// Report to standard error.
    pub fn stderr() -> Self {
        Self::to_writer(std::io::stderr())
    }

    /// Report to any writer.
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(writer)),
            interval: DEFAULT_INTERVAL,
            unit: "",
            total: 0,
            current: 0,
            last: None,
        }
    }

    /// Track progress without printing anything.
    pub fn hidden() -> Self {
        Self { sink: None, ..Self::to_writer(std::io::sink()) }
    }

    /// Minimum time between two in-place updates.
    #[cfg(test)]
    #[must_use]
    fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Begin a new scan of `total` units.
    pub fn start(&mut self, total: u64, unit: &'static str) {
        self.total = total;
        self.unit = unit;
        self.current = 0;
        self.last = None;
        self.emit('\r');
    }

    pub fn set(&mut self, current: u64) {
        self.current = current.min(self.total);
        if self.last.is_none_or(|last| last.elapsed() >= self.interval) {
            self.emit('\r');
        }
    }

    pub fn advance(&mut self, delta: u64) {
        self.set(self.current.saturating_add(delta));
    }

    /// Print the current position on its own line, regardless of throttling.
    pub fn boundary(&mut self, current: u64) {
        self.current = current.min(self.total);
        self.emit('\n');
    }

    pub fn finish(&mut self) {
        self.current = self.total;
        self.emit('\n');
    }

    fn percentage(&self) -> f64 {
        match self.total {
            0 => 100.0,
            total => 100.0 * (self.current as f64 / total as f64),
        }
    }

    fn emit(&mut self, end: char) {
        self.last = Some(Instant::now());
        let line = format!("{:5.1} % - {} of {} {}{}", self.percentage(), self.current, self.total, self.unit, end);
        if let Some(sink) = self.sink.as_mut() {
            // Progress is cosmetic; a closed stderr must not abort a scan.
            let _ = sink.write_all(line.as_bytes()).and_then(|()| sink.flush());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_lines() {
        let buffer = SharedBuffer::default();
        let mut progress = Progress::to_writer(buffer.clone()).with_interval(Duration::ZERO);
        progress.start(1000, "blocks");
        progress.set(420);
        progress.boundary(500);
        progress.finish();
        assert_eq!(
            buffer.contents(),
            "  0.0 % - 0 of 1000 blocks\r 42.0 % - 420 of 1000 blocks\r 50.0 % - 500 of 1000 blocks\n100.0 % - 1000 of 1000 blocks\n"
        );
    }

    #[test]
    fn test_throttled() {
        let buffer = SharedBuffer::default();
        let mut progress = Progress::to_writer(buffer.clone()).with_interval(Duration::from_secs(3600));
        progress.start(10, "bytes");
        for _ in 0..10 {
            progress.advance(1);
        }
        progress.finish();
        assert_eq!(buffer.contents(), "  0.0 % - 0 of 10 bytes\r100.0 % - 10 of 10 bytes\n");
    }

    #[test]
    fn test_empty_total_is_complete() {
        let buffer = SharedBuffer::default();
        let mut progress = Progress::to_writer(buffer.clone());
        progress.start(0, "bytes");
        progress.finish();
        assert!(buffer.contents().ends_with("100.0 % - 0 of 0 bytes\n"));
    }

    #[test]
    fn test_hidden_still_tracks() {
        let mut progress = Progress::hidden();
        progress.start(5, "blocks");
        progress.advance(3);
        progress.advance(10);
        assert_eq!(progress.current, 5);
        assert_eq!(progress.total, 5);
    }
}
