use std::io::{self, Write};
use std::path::Path;

use kilo_protocol::BridgeInput;
use tempfile::NamedTempFile;

/// Transient input file owned by exactly one bridge invocation.
///
/// Every file gets a unique name and is removed when dropped.
#[derive(Debug)]
pub struct BridgeFile {
    file: NamedTempFile,
}

impl BridgeFile {
    /// Write `input` to a new file in `dir`, or the system temp dir.
    pub fn create(dir: Option<&Path>, input: &BridgeInput) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("kilo-bridge-").suffix(".json");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        serde_json::to_writer(&mut file, input)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
