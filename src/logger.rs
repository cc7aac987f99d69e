//! Wire-trace side file: a plain append-only file, one line per message,
//! guarded by a mutex rather than routed through the `log` crate. Kept as
//! a distinct channel from ambient diagnostics - stdout is reserved for
//! the protocol stream, and this tracer never writes there either - so a
//! `--debug` session can be replayed without cross-talk from `log::debug!`
//! output.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;

#[derive(Clone)]
pub struct WireTracer {
    file: Arc<Mutex<std::fs::File>>,
}

impl WireTracer {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open trace file {}", path.display()))?;
        Ok(WireTracer {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn inbound(&self, raw: &str) {
        self.write_prefixed("=>", raw);
    }

    pub fn outbound(&self, raw: &str) {
        self.write_prefixed("<=", raw);
    }

    fn write_prefixed(&self, prefix: &str, raw: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{prefix} {raw}");
        }
    }
}
