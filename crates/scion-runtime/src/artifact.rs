use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use wasmtime::{Engine, Module};

use crate::error::RuntimeError;

const WASM_MAGIC: &[u8] = b"\0asm";

/// Encoding of a unit's fetched source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// WebAssembly text format.
    Text,
    /// Binary `.wasm` module.
    Binary,
}

impl SourceKind {
    pub fn detect(source: &[u8]) -> Self {
        if source.starts_with(WASM_MAGIC) {
            SourceKind::Binary
        } else {
            SourceKind::Text
        }
    }

    fn extension(self) -> &'static str {
        match self {
            SourceKind::Text => ".wat",
            SourceKind::Binary => ".wasm",
        }
    }
}

/// Fetched source materialized as a temporary module file.
///
/// The file is removed when the artifact is dropped, on every exit path of
/// the loader.
#[derive(Debug)]
pub struct ModuleArtifact {
    file: NamedTempFile,
    kind: SourceKind,
    digest: String,
}

impl ModuleArtifact {
    pub fn materialize(unit_id: &str, source: &[u8]) -> Result<Self, RuntimeError> {
        let kind = SourceKind::detect(source);
        let mut file = tempfile::Builder::new()
            .prefix(&format!("scion-{unit_id}-"))
            .suffix(kind.extension())
            .tempfile()?;
        file.write_all(source)?;
        file.flush()?;

        tracing::debug!(
            unit_id,
            path = %file.path().display(),
            bytes = source.len(),
            ?kind,
            "Module artifact materialized"
        );

        Ok(Self {
            file,
            kind,
            digest: source_digest(source),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// SHA-256 hex of the source bytes. Diagnostic only; never verified.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn compile(&self, engine: &Engine) -> Result<Module, RuntimeError> {
        Module::from_file(engine, self.path())
            .map_err(|e| RuntimeError::Load(format!("compilation failed: {e:#}")))
    }
}

pub fn source_digest(source: &[u8]) -> String {
    hex::encode(Sha256::digest(source))
}
