//! `tracing` setup for the page and for native test runs.

use std::io::{self, Write};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber with `directive` (e.g. `"info"` or
/// `"rabbit_path=debug"`). Falls back to `info` on a bad directive. Calling
/// it again is harmless; the first subscriber stays.
pub fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        // wasm32 has no system clock to stamp lines with
        .without_time()
        .with_ansi(false)
        .with_target(true)
        .with_writer(ConsoleWriter::default)
        .try_init();
}

/// Collects one formatted event and hands it to the console on drop.
#[derive(Debug, Default)]
pub struct ConsoleWriter {
    buf: Vec<u8>,
}

impl Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&self.buf);
        emit(line.trim_end());
        self.buf.clear();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(target_arch = "wasm32")]
fn emit(line: &str) {
    web_sys::console::log_1(&wasm_bindgen::JsValue::from_str(line));
}

#[cfg(not(target_arch = "wasm32"))]
fn emit(line: &str) {
    eprintln!("{line}");
}
