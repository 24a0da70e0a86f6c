pub mod generated;
pub mod kernel;
pub mod orderer;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use crate::ccflags;
use crate::config::BobConfig;
use crate::emit::{Backend, EmissionManifest, EmitCtx, FragmentRecord};
use crate::error::{Error, Result};
use crate::escape;
use crate::fileutils;
use crate::late_template;
use crate::module::graph::ModuleGraph;
use crate::module::{BinType, BuildDescription, DepTag, KindProps, Module, TgtType};
use crate::namemap::{self, NameMap};
use crate::template;
use crate::toolchain::{Toolchain, ToolchainSet};
use crate::utils;

const PREBUILT_MAKE: &str = "prebuilts/build-tools/linux-x86/bin/make";

pub struct EmitOptions {
    /// Directory the `.inc` fragments and `Android.inc` are written to.
    pub build_dir: PathBuf,
    /// Location of the helper scripts, relative to the source dir.
    pub scripts_rel: String,
}

pub struct AndroidMkGenerator {
    pub config: BobConfig,
    pub toolchains: ToolchainSet,
    build_dir: PathBuf,
    scripts_rel: String,
    make_command_args: Vec<String>,
}

impl Backend for AndroidMkGenerator {
    fn source_dir(&self) -> String {
        "$(LOCAL_PATH)".to_string()
    }

    fn build_dir(&self) -> String {
        "$(BOB_ANDROIDMK_DIR)".to_string()
    }

    fn scripts_dir(&self) -> String {
        utils::join_path(&self.source_dir(), &self.scripts_rel)
    }

    fn escape_flag(&self, s: &str) -> String {
        escape::makefile_and_shell_escape(s)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn make_command_args() -> Vec<String> {
    if is_executable(Path::new(PREBUILT_MAKE)) {
        vec!["--make-command".to_string(), PREBUILT_MAKE.to_string()]
    } else {
        Vec::new()
    }
}

pub fn write_list_assignment(sb: &mut String, varname: &str, entries: &[String]) {
    if !entries.is_empty() {
        sb.push_str(varname);
        sb.push_str(" := ");
        sb.push_str(&entries.join(" "));
        sb.push('\n');
    }
}

fn specify_compiler_standard(varname: &str, lists: &[&[String]]) -> String {
    match ccflags::compiler_standard(lists) {
        Some(std) => format!("{varname}:={std}\n"),
        None => String::new(),
    }
}

fn specify_arm_mode(lists: &[&[String]]) -> Result<String> {
    Ok(match ccflags::arm_mode(lists)? {
        Some(mode) => format!("LOCAL_ARM_MODE:={mode}\n"),
        None => String::new(),
    })
}

/// Whether the module links (directly or transitively) a generated library.
/// Generated libraries only support a single architecture, so such modules
/// cannot be multilib.
pub fn links_to_generated_library(graph: &ModuleGraph, name: &str) -> bool {
    let mut seen = false;
    graph.walk_deps(name, |dep, edge| {
        // Only consider dependencies that get linked.
        if !edge.tag.is_link() {
            return false;
        }
        if matches!(
            dep.kind,
            KindProps::GenerateStaticLib(_) | KindProps::GenerateSharedLib(_)
        ) {
            seen = true;
            return false;
        }
        true
    });
    seen
}

pub fn path_to_module_name(path: &str) -> String {
    path.replace('/', "__")
        .replace(['.', '(', ')', '$'], "_")
}

fn file_stem_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn declare_alias(sb: &mut String, name: &str, srcs: &[String]) {
    sb.push_str("\ninclude $(CLEAR_VARS)\n\n");
    sb.push_str(&format!("LOCAL_MODULE := {name}\n"));
    sb.push_str(&format!(
        "LOCAL_REQUIRED_MODULES :={}",
        utils::newline_separated_list(srcs)
    ));
    sb.push_str(&format!("\n.PHONY: {name}\n"));
    sb.push_str(&format!("{name}: $(LOCAL_REQUIRED_MODULES)\n\n"));
    sb.push_str("include $(base_rules.mk)\n");
}

impl AndroidMkGenerator {
    pub fn new(config: BobConfig, toolchains: ToolchainSet, opts: EmitOptions) -> Self {
        Self {
            config,
            toolchains,
            build_dir: opts.build_dir,
            scripts_rel: opts.scripts_rel,
            make_command_args: make_command_args(),
        }
    }

    pub fn fragment_path(&self, module: &Module) -> PathBuf {
        self.build_dir
            .join(format!("{}.inc", module.alt_short_name()))
    }

    pub fn androidmk_path(&self) -> PathBuf {
        self.build_dir.join("Android.inc")
    }

    pub fn make_command_args(&self) -> &[String] {
        &self.make_command_args
    }

    fn module_output_dir(&self, alt_name: &str) -> String {
        format!("$(dir $(ALL_MODULES.{alt_name}.BUILT))")
    }

    fn source_output_dir(&self, module: &Module) -> String {
        let root = if module.target() == TgtType::Host {
            "$(HOST_OUT_GEN)"
        } else {
            "$(TARGET_OUT_GEN)"
        };
        format!("{root}/STATIC_LIBRARIES/{}", module.name)
    }

    /// Computes every module's output directory, primary outputs, and
    /// generated include dirs, and roots the generator inouts in their
    /// output dirs. Runs once before emission so parallel emitters never
    /// read a sibling's mutable state.
    pub fn finalize_outputs(&self, graph: &mut ModuleGraph) {
        let source_dir = self.source_dir();
        let prefix = |value: &mut String, dir: &str| {
            if !value.starts_with('$') && !value.starts_with('/') {
                *value = utils::join_path(dir, value);
            }
        };

        let modules: Vec<String> = graph.modules().map(|m| m.name.clone()).collect();
        for name in modules {
            let source_output_dir = graph
                .get(&name)
                .map(|m| self.source_output_dir(m))
                .unwrap_or_default();
            let module = match graph.modules_mut().find(|m| m.name == name) {
                Some(m) => m,
                None => continue,
            };
            let alt = module.alt_name().to_string();
            let bin_type = module.bin_type();
            match &mut module.kind {
                KindProps::StaticLib(_) | KindProps::SharedLib(_) => {
                    let bt = bin_type.expect("library kind");
                    module.output_dir = self.module_output_dir(&alt);
                    module.outs =
                        vec![utils::join_path(&module.output_dir, &bt.output_file_name(&alt))];
                }
                KindProps::Binary(_) => {
                    module.output_dir = "$(HOST_OUT_EXECUTABLES)".to_string();
                    module.outs = vec![utils::join_path(&module.output_dir, &alt)];
                }
                KindProps::KernelModule(_) => {
                    module.output_dir = self.module_output_dir(&alt);
                    module.outs = vec![utils::join_path(&module.output_dir, &format!("{alt}.ko"))];
                }
                KindProps::GenerateSource(p)
                | KindProps::TransformSource(p)
                | KindProps::GenerateStaticLib(p)
                | KindProps::GenerateSharedLib(p)
                | KindProps::GenerateBinary(p) => {
                    let output_dir = source_output_dir;
                    let mut outs = Vec::new();
                    for inout in &mut p.inouts {
                        for src in &mut inout.srcs {
                            prefix(src, &source_dir);
                        }
                        for src in &mut inout.implicit_srcs {
                            prefix(src, &source_dir);
                        }
                        for out in &mut inout.outs {
                            prefix(out, &output_dir);
                        }
                        for out in &mut inout.implicit_outs {
                            prefix(out, &output_dir);
                        }
                        if let Some(depfile) = &mut inout.depfile {
                            prefix(depfile, &output_dir);
                        }
                        if let Some(rspfile) = &mut inout.rspfile {
                            prefix(rspfile, &output_dir);
                        }
                        outs.extend(inout.outs.iter().cloned());
                    }
                    module.gen_include_dirs =
                        utils::prefix_dirs(&p.export_gen_include_dirs, &output_dir);
                    module.output_dir = output_dir;
                    module.outs = outs;
                }
                KindProps::Resource(_)
                | KindProps::Alias(_)
                | KindProps::ExternalLib(_)
                | KindProps::Defaults(_) => {}
            }
        }
    }

    fn library_build_action(
        &self,
        graph: &ModuleGraph,
        namemap: &NameMap,
        module: &Module,
    ) -> Result<String> {
        let bt = module.bin_type().expect("library kinds only");
        let lib = module.library().expect("library kinds only");
        let alt = module.alt_name();

        if lib.build_wrapper.is_some() {
            return Err(Error::module(
                module.name.as_str(),
                "build_wrapper not supported on Android",
            ));
        }

        let mut sb = String::new();
        sb.push_str("##########################\ninclude $(CLEAR_VARS)\n\n");
        sb.push_str(&format!("LOCAL_MODULE:={alt}\n"));
        sb.push_str(&format!("LOCAL_MODULE_CLASS:={}\n\n", bt.class()));

        // The order is local_include_dirs, export_local_include_dirs,
        // include_dirs, export_include_dirs; include and export_include
        // hold system headers.
        let mut includes = utils::prefix_dirs(&lib.local_include_dirs, "$(LOCAL_PATH)");
        includes.extend(utils::prefix_dirs(
            &lib.export_local_include_dirs,
            "$(LOCAL_PATH)",
        ));
        includes.extend(lib.include_dirs.iter().cloned());
        includes.extend(lib.export_include_dirs.iter().cloned());

        let mut export_include_dirs = lib.export_include_dirs.clone();
        export_include_dirs.extend(utils::prefix_dirs(
            &lib.export_local_include_dirs,
            "$(LOCAL_PATH)",
        ));

        let (header_dirs, header_outputs) = graph.generated_headers(&module.name);
        includes.extend(header_dirs);
        let mut additional_deps = header_outputs;

        // Generated sources land in another module's intermediates, and
        // Android make refuses LOCAL_SRC_FILES outside the source tree, so
        // copy them into this module's generated-sources dir with a static
        // pattern rule and let LOCAL_GENERATED_SOURCES pick them up.
        for dep in graph.generated_source_modules(&module.name) {
            let dep_name = &dep.name;
            let sources = format!("$({dep_name}_OUTPUTS)");
            let sources_dir = format!("$({dep_name}_GEN_DIR)");
            let local_sources = format!("$({alt}_{dep_name}_SRCS)");

            sb.push_str(&format!(
                "{alt}_{dep_name}_SRCS:=$(subst {sources_dir}, $(local-generated-sources-dir), {sources})\n"
            ));
            sb.push_str(&format!("LOCAL_GENERATED_SOURCES+={local_sources}\n"));

            // Static pattern rule so the copy runs once per file.
            sb.push_str(&format!(
                "{local_sources}: $(local-generated-sources-dir)/%: {sources_dir}/%\n"
            ));
            sb.push_str("\tcp $< $@\n\n");
        }

        if self.config.get_bool("target_toolchain_clang") {
            sb.push_str("LOCAL_CLANG := true\n");
        } else {
            sb.push_str("LOCAL_CLANG := false\n");
        }

        let srcs: Vec<String> = lib
            .srcs
            .iter()
            .filter(|s| utils::is_compilable_source(s))
            .cloned()
            .collect();
        let non_compiled: Vec<String> = lib
            .srcs
            .iter()
            .filter(|s| utils::is_not_compilable_source(s))
            .cloned()
            .collect();
        write_list_assignment(&mut sb, "LOCAL_SRC_FILES", &srcs);

        let version_script = lib.version_script.as_ref().map(|p| self.source_path(p));
        if matches!(bt, BinType::Shared | BinType::Executable)
            && let Some(vs) = &version_script
        {
            additional_deps.push(vs.clone());
        }
        additional_deps.extend(utils::prefix_dirs(&non_compiled, "$(LOCAL_PATH)"));
        write_list_assignment(&mut sb, "LOCAL_ADDITIONAL_DEPENDENCIES", &additional_deps);
        write_list_assignment(&mut sb, "LOCAL_C_INCLUDES", &includes);

        let mut cflags_list = lib.cflags.clone();
        cflags_list.extend(lib.export_cflags.iter().cloned());
        cflags_list.extend(graph.exported_cflags(&module.name));
        write_list_assignment(
            &mut sb,
            "LOCAL_CFLAGS",
            &ccflags::filter_compile_flags(&cflags_list),
        );
        write_list_assignment(
            &mut sb,
            "LOCAL_CPPFLAGS",
            &ccflags::filter_compile_flags(&lib.cxxflags),
        );
        write_list_assignment(
            &mut sb,
            "LOCAL_CONLYFLAGS",
            &ccflags::filter_compile_flags(&lib.conlyflags),
        );

        // Only effective on Android O and later.
        sb.push_str(&specify_compiler_standard(
            "LOCAL_C_STD",
            &[&cflags_list, &lib.conlyflags],
        ));
        sb.push_str(&specify_compiler_standard(
            "LOCAL_CPP_STD",
            &[&cflags_list, &lib.cxxflags],
        ));

        sb.push_str(&specify_arm_mode(&[
            &cflags_list,
            &lib.conlyflags,
            &lib.cxxflags,
        ])?);

        // Dependencies carry declared names; the backend wants the mapped
        // ones.
        let shared_libs = namemap.lookup_all(&lib.shared_libs)?;
        let static_libs = namemap.lookup_all(&lib.static_libs)?;
        let whole_static_libs = namemap.lookup_all(&lib.whole_static_libs)?;
        let export_header_libs = namemap.lookup_all(&lib.export_header_libs)?;
        let mut header_libs = namemap.lookup_all(&lib.header_libs)?;
        header_libs.extend(export_header_libs.iter().cloned());

        write_list_assignment(&mut sb, "LOCAL_SHARED_LIBRARIES", &shared_libs);
        write_list_assignment(&mut sb, "LOCAL_STATIC_LIBRARIES", &static_libs);
        write_list_assignment(&mut sb, "LOCAL_WHOLE_STATIC_LIBRARIES", &whole_static_libs);
        write_list_assignment(&mut sb, "LOCAL_HEADER_LIBRARIES", &header_libs);

        let mut reexport_shared = Vec::new();
        let mut reexport_static = Vec::new();
        let mut reexport_headers = export_header_libs.clone();
        for lib_name in namemap.lookup_all(&lib.reexport_libs)? {
            if shared_libs.contains(&lib_name) {
                reexport_shared.push(lib_name);
            } else if static_libs.contains(&lib_name) {
                reexport_static.push(lib_name);
            } else if header_libs.contains(&lib_name) {
                reexport_headers.push(lib_name);
            }
        }
        write_list_assignment(
            &mut sb,
            "LOCAL_EXPORT_SHARED_LIBRARY_HEADERS",
            &reexport_shared,
        );
        write_list_assignment(
            &mut sb,
            "LOCAL_EXPORT_STATIC_LIBRARY_HEADERS",
            &reexport_static,
        );
        write_list_assignment(
            &mut sb,
            "LOCAL_EXPORT_HEADER_LIBRARY_HEADERS",
            &reexport_headers,
        );

        write_list_assignment(&mut sb, "LOCAL_MODULE_TAGS", &lib.tags);
        write_list_assignment(&mut sb, "LOCAL_EXPORT_C_INCLUDE_DIRS", &export_include_dirs);

        if let Some(owner) = module.proprietary_owner() {
            sb.push_str(&format!("LOCAL_MODULE_OWNER := {owner}\n"));
            sb.push_str("LOCAL_PROPRIETARY_MODULE := true\n");
        }
        if bt != BinType::Static && lib.strip {
            sb.push_str("LOCAL_STRIP_MODULE := true\n");
        }

        let tgt = lib.target;
        let tc = self.toolchains.for_target(tgt);

        // There is no way to wrap a single library in -Wl on Android, so
        // when any direct shared dep is a forwarding library, keep shared
        // library transitivity across the whole link.
        let mut has_forwarding_lib = false;
        graph.visit_direct_deps_if(
            &module.name,
            |edge| edge.tag == DepTag::Shared,
            |dep, _| {
                match &dep.kind {
                    KindProps::SharedLib(p) => {
                        if p.forwarding {
                            has_forwarding_lib = true;
                        }
                    }
                    // Generated forwarding libs are not supported.
                    KindProps::GenerateSharedLib(_) => {}
                    // External libraries are never forwarding libraries.
                    KindProps::ExternalLib(_) => {}
                    _ => {
                        return Err(Error::msg(format!(
                            "{} is not a shared library",
                            dep.name
                        )));
                    }
                }
                Ok(())
            },
        )?;

        let install = lib.install.install_path();

        // Only target modules are multilib. Libraries always, binaries when
        // installable so tests can exist in both widths.
        let mut is_multilib = tgt == TgtType::Target
            && (matches!(bt, BinType::Shared | BinType::Static) || install.is_some());
        if is_multilib && links_to_generated_library(graph, &module.name) {
            is_multilib = false;
        }

        if let Some((install_base, install_rel)) = &install {
            if let Some(cmd) = &lib.post_install_cmd {
                // Target-specific variables don't survive into
                // LOCAL_POST_INSTALL_CMD, so expand everything here.
                let mut cmd = cmd.replace("${args}", &lib.post_install_args.join(" "));
                if let Some(tool) = &lib.post_install_tool {
                    cmd = cmd.replace("${tool}", tool);
                }
                cmd = cmd.replace("${out}", "$(LOCAL_INSTALLED_MODULE)");
                // Recursively expanded on purpose: LOCAL_INSTALLED_MODULE
                // is only known once base_rules.mk has run.
                sb.push_str(&format!("LOCAL_POST_INSTALL_CMD={cmd}\n"));
            }

            if bt == BinType::Executable {
                if is_multilib {
                    // 32 and 64-bit executables install side by side. There
                    // are no width-specific relative-path variables, so the
                    // relative path is baked into LOCAL_MODULE_PATH_32/_64,
                    // with the 64-bit dir suffixed.
                    let full = utils::join_path(install_base, install_rel);
                    sb.push_str(&format!("LOCAL_MODULE_PATH_32:={full}\n"));
                    sb.push_str(&format!("LOCAL_MODULE_PATH_64:={full}64\n"));
                } else {
                    sb.push_str(&format!("LOCAL_MODULE_PATH:={install_base}\n"));
                    sb.push_str(&format!("LOCAL_MODULE_RELATIVE_PATH:={install_rel}\n"));
                    if tgt == TgtType::Target {
                        // Unstripped executables are only generated for the
                        // target, and LOCAL_MODULE_PATH requires
                        // LOCAL_UNSTRIPPED_PATH alongside it.
                        sb.push_str(
                            "LOCAL_UNSTRIPPED_PATH:=$(TARGET_OUT_EXECUTABLES_UNSTRIPPED)\n",
                        );
                    }
                }
            } else {
                // Libraries cannot take an explicit install dir; only the
                // relative path is honored.
                sb.push_str(&format!("LOCAL_MODULE_RELATIVE_PATH:={install_rel}\n"));
            }

            let required = namemap.lookup_all(&graph.install_dep_names(&module.name))?;
            if !required.is_empty() {
                sb.push_str(&format!(
                    "LOCAL_REQUIRED_MODULES:={}",
                    utils::newline_separated_list(&required)
                ));
            }
        } else if tgt == TgtType::Target && bt != BinType::Shared {
            // Host modules stay installable so the build can run them.
            // Target shared libraries must stay installable too, or the
            // multilib install paths collide.
            sb.push_str("LOCAL_UNINSTALLABLE_MODULE:=true\n");
        }

        let mut ldflags = ccflags::filter_link_flags(&lib.ldflags);
        if has_forwarding_lib {
            ldflags.push(format!(
                "-fuse-ld=bfd {}",
                tc.linker().keep_shared_library_transitivity()
            ));
        }
        if matches!(bt, BinType::Shared | BinType::Executable)
            && let Some(vs) = &version_script
        {
            ldflags.push(tc.linker().set_version_script(vs));
        }

        if is_multilib {
            sb.push_str("LOCAL_MULTILIB:=both\n");
            write_list_assignment(&mut sb, "LOCAL_LDFLAGS_32", &ldflags);
            write_list_assignment(&mut sb, "LOCAL_LDFLAGS_64", &ldflags);
        } else {
            write_list_assignment(&mut sb, "LOCAL_LDFLAGS", &ldflags);
        }

        if tgt == TgtType::Target {
            write_list_assignment(&mut sb, "LOCAL_LDLIBS", &lib.ldlibs);
        } else {
            write_list_assignment(&mut sb, "LOCAL_LDLIBS_$(HOST_OS)", &lib.ldlibs);
        }

        let rule_prefix = match tgt {
            TgtType::Target => "BUILD_",
            TgtType::Host => "BUILD_HOST_",
        };
        sb.push_str(&format!(
            "\ninclude $({rule_prefix}{})\n",
            bt.rule_suffix()
        ));
        Ok(sb)
    }

    fn alias_actions(&self, namemap: &NameMap, module: &Module) -> Result<String> {
        let KindProps::Alias(props) = &module.kind else {
            return Err(Error::module(module.name.as_str(), "is not an alias"));
        };
        let srcs = namemap.lookup_all(&props.srcs)?;
        let mut sb = String::new();
        declare_alias(&mut sb, &module.name, &srcs);
        Ok(sb)
    }

    fn resource_actions(
        &self,
        graph: &ModuleGraph,
        namemap: &NameMap,
        module: &Module,
    ) -> Result<String> {
        let KindProps::Resource(props) = &module.kind else {
            return Err(Error::module(module.name.as_str(), "is not a resource"));
        };
        let mut sb = String::new();
        let Some((install_base, install_rel)) = props.install.install_path() else {
            return Ok(sb);
        };

        let mut required = namemap.lookup_all(&graph.install_dep_names(&module.name))?;
        for file in &props.srcs {
            let module_name = path_to_module_name(file);
            required.push(module_name.clone());

            sb.push_str("\ninclude $(CLEAR_VARS)\n\n");
            sb.push_str(&format!("LOCAL_MODULE := {module_name}\n"));
            sb.push_str(&format!(
                "LOCAL_INSTALLED_MODULE_STEM := {}\n",
                file_stem_of(file)
            ));
            sb.push_str("LOCAL_MODULE_CLASS := ETC\n");
            sb.push_str(&format!("LOCAL_MODULE_PATH := {install_base}\n"));
            sb.push_str(&format!("LOCAL_MODULE_RELATIVE_PATH := {install_rel}\n"));
            write_list_assignment(&mut sb, "LOCAL_MODULE_TAGS", &props.tags);
            sb.push_str(&format!("LOCAL_SRC_FILES := {file}\n"));
            if let Some(owner) = module.proprietary_owner() {
                sb.push_str(&format!("LOCAL_MODULE_OWNER := {owner}\n"));
                sb.push_str("LOCAL_PROPRIETARY_MODULE := true\n");
            }
            sb.push_str("\ninclude $(BUILD_PREBUILT)\n");
        }

        declare_alias(&mut sb, &module.name, &required);
        Ok(sb)
    }

    pub fn emit_module(
        &self,
        graph: &ModuleGraph,
        namemap: &NameMap,
        module: &Module,
        ctx: &EmitCtx,
    ) -> Result<FragmentRecord> {
        let buffer = match &module.kind {
            KindProps::StaticLib(_) | KindProps::SharedLib(_) | KindProps::Binary(_) => {
                self.library_build_action(graph, namemap, module)?
            }
            KindProps::KernelModule(_) => {
                kernel::kernel_module_actions(self, graph, namemap, module)?
            }
            KindProps::GenerateSource(_) | KindProps::TransformSource(_) => {
                generated::generate_source_actions(self, module)?
            }
            KindProps::GenerateStaticLib(_) => generated::gen_static_actions(self, module)?,
            KindProps::GenerateSharedLib(_) => generated::gen_shared_actions(self, module)?,
            KindProps::GenerateBinary(_) => generated::gen_binary_actions(self, module)?,
            KindProps::Resource(_) => self.resource_actions(graph, namemap, module)?,
            KindProps::Alias(_) => self.alias_actions(namemap, module)?,
            KindProps::ExternalLib(_) | KindProps::Defaults(_) => {
                return Err(Error::module(
                    module.name.as_str(),
                    format!("{} modules do not emit a fragment", module.kind_name()),
                ));
            }
        };

        let path = self.fragment_path(module);
        fileutils::write_if_changed(&path, &buffer)?;
        ctx.module_emitted(&module.name, path.clone());
        Ok(FragmentRecord {
            module: module.name.clone(),
            path,
        })
    }

    /// Emits every enabled fragment-producing module. The host drives
    /// per-module callbacks in parallel; each emitter buffers locally and
    /// writes a distinct file, so a thread per module is safe. The first
    /// error wins.
    pub fn emit_all(
        &self,
        graph: &ModuleGraph,
        namemap: &NameMap,
        ctx: &EmitCtx,
    ) -> Result<Vec<FragmentRecord>> {
        let modules: Vec<&Module> = graph
            .modules()
            .filter(|m| m.enabled() && m.emits_inc())
            .collect();

        let (tx, rx) = mpsc::channel::<Result<FragmentRecord>>();
        thread::scope(|scope| {
            for &module in &modules {
                let tx = tx.clone();
                let ctx = ctx.clone();
                scope.spawn(move || {
                    let _ = tx.send(self.emit_module(graph, namemap, module, &ctx));
                });
            }
            drop(tx);
        });

        let mut fragments = Vec::new();
        let mut first_err: Option<Error> = None;
        for res in rx {
            match res {
                Ok(record) => fragments.push(record),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        fragments.sort_by(|a, b| a.module.cmp(&b.module));
        Ok(fragments)
    }
}

/// Full emission pipeline: template passes, name mapping, output
/// finalization, per-module emission, and the aggregate include file.
pub fn emit_description(
    desc: BuildDescription,
    opts: EmitOptions,
    ctx: &EmitCtx,
) -> Result<EmissionManifest> {
    let config = BobConfig::from_value(desc.config);
    let toolchains = ToolchainSet::parse_config(&config)?;
    let generator = AndroidMkGenerator::new(config, toolchains, opts);

    let mut graph = ModuleGraph::new(desc.modules)?;
    template::apply_config_templates(&mut graph, &generator.config)?;
    late_template::apply_late_templates(&mut graph, &generator.toolchains, &generator)?;

    let namemap = NameMap::new();
    namemap::populate(&graph, &namemap)?;
    generator.finalize_outputs(&mut graph);

    let fragments = generator.emit_all(&graph, &namemap, ctx)?;
    let (androidmk, target) = orderer::write_android_inc(&generator, &graph)?;

    Ok(EmissionManifest {
        fragments,
        androidmk,
        target,
    })
}
