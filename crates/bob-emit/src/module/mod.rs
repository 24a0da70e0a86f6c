pub mod graph;

use serde::{Deserialize, Serialize};

use bob_emit_macros::TemplateProps;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TgtType {
    #[default]
    Target,
    Host,
}

/// Tags on dependency edges, interpreted during dep walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DepTag {
    Static,
    Shared,
    WholeStatic,
    Header,
    Install,
    KernelModule,
    GeneratedSource,
    GeneratedHeader,
    Alias,
}

impl DepTag {
    /// Tags whose targets end up on the link line.
    pub fn is_link(self) -> bool {
        matches!(self, DepTag::Static | DepTag::Shared | DepTag::WholeStatic)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct InstallProps {
    /// Destination base (a make variable path). Absent means not installed.
    pub install_base: Option<String>,
    pub relative_install_path: Option<String>,
}

impl InstallProps {
    pub fn install_path(&self) -> Option<(String, String)> {
        let base = self.install_base.as_deref()?;
        Some((
            base.to_string(),
            self.relative_install_path.clone().unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct LibraryProps {
    pub enabled: Option<bool>,
    pub target: TgtType,
    /// Overrides the backend-exposed name.
    pub out: Option<String>,
    pub srcs: Vec<String>,
    pub local_include_dirs: Vec<String>,
    pub export_local_include_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub export_include_dirs: Vec<String>,
    pub cflags: Vec<String>,
    pub export_cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub conlyflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub ldlibs: Vec<String>,
    pub shared_libs: Vec<String>,
    pub static_libs: Vec<String>,
    pub whole_static_libs: Vec<String>,
    pub header_libs: Vec<String>,
    pub export_header_libs: Vec<String>,
    pub reexport_libs: Vec<String>,
    pub generated_sources: Vec<String>,
    pub generated_headers: Vec<String>,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub proprietary: bool,
    pub strip: bool,
    /// Shared libraries only: the library exists to re-export its
    /// dependencies, so dependents must keep transitive DT_NEEDED entries.
    pub forwarding: bool,
    pub version_script: Option<String>,
    pub build_wrapper: Option<String>,
    pub post_install_cmd: Option<String>,
    pub post_install_tool: Option<String>,
    pub post_install_args: Vec<String>,
    pub install_deps: Vec<String>,
    #[serde(flatten)]
    #[template(nested)]
    pub install: InstallProps,
}

/// One invocation of a generator's command.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct Inout {
    pub srcs: Vec<String>,
    pub outs: Vec<String>,
    pub implicit_srcs: Vec<String>,
    pub implicit_outs: Vec<String>,
    pub depfile: Option<String>,
    pub rspfile: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct GenerateProps {
    pub enabled: Option<bool>,
    pub target: TgtType,
    pub out: Option<String>,
    pub srcs: Vec<String>,
    /// Command template. `${args}` expands to the argument list; other
    /// `${key}` references resolve from the computed argument map via
    /// target-scoped Make variables.
    pub cmd: Option<String>,
    pub args: Vec<String>,
    pub tool: Option<String>,
    pub export_gen_include_dirs: Vec<String>,
    pub rsp_content: Option<String>,
    /// Generator modules whose outputs this command references.
    pub generated_deps: Vec<String>,
    pub inouts: Vec<Inout>,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub proprietary: bool,
    pub install_deps: Vec<String>,
    #[serde(flatten)]
    #[template(nested)]
    pub install: InstallProps,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct KernelModuleProps {
    pub enabled: Option<bool>,
    pub out: Option<String>,
    pub srcs: Vec<String>,
    /// Directory of the module within the project; the kernel module builder
    /// replicates the source tree structure under the output dir.
    pub module_dir: Option<String>,
    pub cflags: Vec<String>,
    pub local_include_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    /// Kernel config options to emulate, passed to Kbuild on the make
    /// command line.
    pub kbuild_options: Vec<String>,
    /// Kernel modules whose Module.symvers this module needs.
    pub extra_symbols: Vec<String>,
    pub make_args: Vec<String>,
    pub kernel_dir: Option<String>,
    pub kernel_cross_compile: Option<String>,
    pub kernel_cc: Option<String>,
    pub kernel_hostcc: Option<String>,
    pub kernel_ld: Option<String>,
    pub kernel_clang_triple: Option<String>,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub proprietary: bool,
    pub install_deps: Vec<String>,
    #[serde(flatten)]
    #[template(nested)]
    pub install: InstallProps,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct ResourceProps {
    pub enabled: Option<bool>,
    pub srcs: Vec<String>,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub proprietary: bool,
    pub install_deps: Vec<String>,
    #[serde(flatten)]
    #[template(nested)]
    pub install: InstallProps,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct AliasProps {
    pub enabled: Option<bool>,
    pub srcs: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, TemplateProps)]
#[serde(default)]
pub struct ExternalLibProps {
    pub enabled: Option<bool>,
    pub target: TgtType,
    pub out: Option<String>,
    pub export_cflags: Vec<String>,
    pub ldlibs: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsProps {}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum KindProps {
    StaticLib(LibraryProps),
    SharedLib(LibraryProps),
    Binary(LibraryProps),
    KernelModule(KernelModuleProps),
    GenerateSource(GenerateProps),
    TransformSource(GenerateProps),
    GenerateStaticLib(GenerateProps),
    GenerateSharedLib(GenerateProps),
    GenerateBinary(GenerateProps),
    Resource(ResourceProps),
    Alias(AliasProps),
    ExternalLib(ExternalLibProps),
    Defaults(DefaultsProps),
}

/// Binary flavor shared by the library/binary emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinType {
    Static,
    Shared,
    Executable,
}

impl BinType {
    pub fn class(self) -> &'static str {
        match self {
            BinType::Static => "STATIC_LIBRARIES",
            BinType::Shared => "SHARED_LIBRARIES",
            BinType::Executable => "EXECUTABLES",
        }
    }

    pub fn rule_suffix(self) -> &'static str {
        match self {
            BinType::Static => "STATIC_LIBRARY",
            BinType::Shared => "SHARED_LIBRARY",
            BinType::Executable => "EXECUTABLE",
        }
    }

    pub fn output_file_name(self, alt: &str) -> String {
        match self {
            BinType::Static => format!("{alt}.a"),
            BinType::Shared => format!("{alt}.so"),
            BinType::Executable => alt.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Module {
    pub name: String,
    #[serde(flatten)]
    pub kind: KindProps,
    /// Derived by the finalize pass before emission.
    #[serde(skip)]
    pub output_dir: String,
    #[serde(skip)]
    pub outs: Vec<String>,
    /// Exported generated include dirs, rooted in the output dir
    /// (generator kinds only).
    #[serde(skip)]
    pub gen_include_dirs: Vec<String>,
}

impl Module {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            KindProps::StaticLib(_) => "static-lib",
            KindProps::SharedLib(_) => "shared-lib",
            KindProps::Binary(_) => "binary",
            KindProps::KernelModule(_) => "kernel-module",
            KindProps::GenerateSource(_) => "generate-source",
            KindProps::TransformSource(_) => "transform-source",
            KindProps::GenerateStaticLib(_) => "generate-static-lib",
            KindProps::GenerateSharedLib(_) => "generate-shared-lib",
            KindProps::GenerateBinary(_) => "generate-binary",
            KindProps::Resource(_) => "resource",
            KindProps::Alias(_) => "alias",
            KindProps::ExternalLib(_) => "external-lib",
            KindProps::Defaults(_) => "defaults",
        }
    }

    pub fn enabled(&self) -> bool {
        let flag = match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => p.enabled,
            KindProps::KernelModule(p) => p.enabled,
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => p.enabled,
            KindProps::Resource(p) => p.enabled,
            KindProps::Alias(p) => p.enabled,
            KindProps::ExternalLib(p) => p.enabled,
            KindProps::Defaults(_) => Some(false),
        };
        flag.unwrap_or(true)
    }

    pub fn is_defaults(&self) -> bool {
        matches!(self.kind, KindProps::Defaults(_))
    }

    /// Whether the Android backend renders a `.inc` fragment for this
    /// module. Defaults and external libraries never do.
    pub fn emits_inc(&self) -> bool {
        !matches!(self.kind, KindProps::Defaults(_) | KindProps::ExternalLib(_))
    }

    pub fn target(&self) -> TgtType {
        match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => p.target,
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => p.target,
            KindProps::ExternalLib(p) => p.target,
            _ => TgtType::Target,
        }
    }

    pub fn alt_name(&self) -> &str {
        let out = match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
                p.out.as_deref()
            }
            KindProps::KernelModule(p) => p.out.as_deref(),
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => p.out.as_deref(),
            KindProps::ExternalLib(p) => p.out.as_deref(),
            _ => None,
        };
        out.unwrap_or(&self.name)
    }

    /// Brief name used as the fragment file stem.
    pub fn alt_short_name(&self) -> &str {
        self.alt_name()
    }

    pub fn bin_type(&self) -> Option<BinType> {
        match &self.kind {
            KindProps::StaticLib(_) => Some(BinType::Static),
            KindProps::SharedLib(_) => Some(BinType::Shared),
            KindProps::Binary(_) => Some(BinType::Executable),
            _ => None,
        }
    }

    pub fn library(&self) -> Option<&LibraryProps> {
        match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => Some(p),
            _ => None,
        }
    }

    pub fn library_mut(&mut self) -> Option<&mut LibraryProps> {
        match &mut self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => Some(p),
            _ => None,
        }
    }

    pub fn generate(&self) -> Option<&GenerateProps> {
        match &self.kind {
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => Some(p),
            _ => None,
        }
    }

    pub fn generate_mut(&mut self) -> Option<&mut GenerateProps> {
        match &mut self.kind {
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => Some(p),
            _ => None,
        }
    }

    pub fn kernel(&self) -> Option<&KernelModuleProps> {
        match &self.kind {
            KindProps::KernelModule(p) => Some(p),
            _ => None,
        }
    }

    /// Source list consulted by `match_srcs`.
    pub fn sources(&self) -> &[String] {
        if let Some(lib) = self.library() {
            &lib.srcs
        } else if let Some(generate) = self.generate() {
            &generate.srcs
        } else if let Some(kernel) = self.kernel() {
            &kernel.srcs
        } else {
            &[]
        }
    }

    pub fn install_props(&self) -> Option<&InstallProps> {
        match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
                Some(&p.install)
            }
            KindProps::KernelModule(p) => Some(&p.install),
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => Some(&p.install),
            KindProps::Resource(p) => Some(&p.install),
            _ => None,
        }
    }

    pub fn proprietary_owner(&self) -> Option<&str> {
        let (proprietary, owner) = match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
                (p.proprietary, p.owner.as_deref())
            }
            KindProps::KernelModule(p) => (p.proprietary, p.owner.as_deref()),
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => (p.proprietary, p.owner.as_deref()),
            KindProps::Resource(p) => (p.proprietary, p.owner.as_deref()),
            _ => (false, None),
        };
        if proprietary {
            Some(owner.unwrap_or_default())
        } else {
            None
        }
    }

    /// Walks every string-typed property leaf of this module.
    pub fn walk_props(
        &mut self,
        visitor: &mut dyn crate::template::TemplateVisitor,
    ) -> Result<()> {
        use crate::template::TemplateProps;
        match &mut self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
                p.walk_template_strings(visitor)
            }
            KindProps::KernelModule(p) => p.walk_template_strings(visitor),
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => p.walk_template_strings(visitor),
            KindProps::Resource(p) => p.walk_template_strings(visitor),
            KindProps::Alias(p) => p.walk_template_strings(visitor),
            KindProps::ExternalLib(p) => p.walk_template_strings(visitor),
            KindProps::Defaults(_) => Ok(()),
        }
    }

    pub fn tags(&self) -> &[String] {
        match &self.kind {
            KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => &p.tags,
            KindProps::KernelModule(p) => &p.tags,
            KindProps::GenerateSource(p)
            | KindProps::TransformSource(p)
            | KindProps::GenerateStaticLib(p)
            | KindProps::GenerateSharedLib(p)
            | KindProps::GenerateBinary(p) => &p.tags,
            KindProps::Resource(p) => &p.tags,
            _ => &[],
        }
    }
}

/// The resolved build description handed over by the host: a config table
/// plus module records with properties already defaulted and
/// feature-resolved.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildDescription {
    #[serde(default = "default_config_value")]
    pub config: toml::Value,
    #[serde(default)]
    pub modules: Vec<Module>,
}

fn default_config_value() -> toml::Value {
    toml::Value::Table(Default::default())
}

impl BuildDescription {
    pub fn from_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::msg(format!("invalid build description: {e}")))
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        Self::from_str(&text)
    }
}
