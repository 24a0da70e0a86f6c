use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

/// Path conventions of the active backend. The late-template engine and the
/// per-module emitters agree on paths through this seam; a second backend
/// would provide its own rendering.
pub trait Backend: Sync {
    fn source_dir(&self) -> String;
    fn build_dir(&self) -> String;
    fn scripts_dir(&self) -> String;
    fn escape_flag(&self, s: &str) -> String;

    fn source_path(&self, rel: &str) -> String {
        crate::utils::join_path(&self.source_dir(), rel)
    }
}

#[derive(Debug, Clone)]
pub enum EmitEvent {
    ModuleEmitted { name: String, path: PathBuf },
    Log { line: String },
    Finished { ok: bool, error: Option<String> },
}

pub trait EmitSink: Send + Sync {
    fn emit(&self, ev: EmitEvent);
}

#[derive(Default)]
pub struct StdoutSink;

impl EmitSink for StdoutSink {
    fn emit(&self, ev: EmitEvent) {
        match ev {
            EmitEvent::ModuleEmitted { name, path } => {
                println!("EMIT: {name} => {}", path.display());
            }
            EmitEvent::Log { line } => println!("{line}"),
            EmitEvent::Finished { ok, error } => {
                if ok {
                    println!("DONE: ok");
                } else {
                    println!("DONE: failed {}", error.unwrap_or_default());
                }
            }
        }
    }
}

/// Swallows events; used by tests and by library callers that only care
/// about the returned manifest.
#[derive(Default)]
pub struct NullSink;

impl EmitSink for NullSink {
    fn emit(&self, _ev: EmitEvent) {}
}

#[derive(Clone)]
pub struct EmitCtx {
    pub sink: Arc<dyn EmitSink>,
}

impl EmitCtx {
    pub fn new(sink: Arc<dyn EmitSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, msg: &str) {
        self.sink.emit(EmitEvent::Log {
            line: msg.to_string(),
        });
    }

    pub fn module_emitted(&self, name: &str, path: PathBuf) {
        self.sink.emit(EmitEvent::ModuleEmitted {
            name: name.to_string(),
            path,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentRecord {
    pub module: String,
    pub path: PathBuf,
}

/// The build-graph target registered for the aggregate include file. It is
/// optional so that it never executes when the driver runs without an
/// explicit target; it exists purely so the host tracks package-context
/// dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct BuildGraphTarget {
    pub rule: &'static str,
    pub outputs: Vec<PathBuf>,
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmissionManifest {
    pub fragments: Vec<FragmentRecord>,
    pub androidmk: PathBuf,
    pub target: BuildGraphTarget,
}
