use std::collections::BTreeMap;

use crate::emit::Backend;
use crate::error::{Error, Result};
use crate::module::graph::ModuleGraph;
use crate::module::{DepTag, KernelModuleProps, KindProps, Module};
use crate::namemap::NameMap;
use crate::utils;

use super::{AndroidMkGenerator, generated, write_list_assignment};

struct KbuildArgs {
    kmod_build: String,
    extra_includes: String,
    extra_cflags: String,
    kernel_dir: String,
    kernel_cross_compile: String,
    kbuild_options: String,
    make_args: String,
    output_module_dir: String,
    cc_flag: String,
    hostcc_flag: String,
    clang_triple_flag: String,
    ld_flag: String,
}

impl KbuildArgs {
    fn to_dict(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("kmod_build".to_string(), self.kmod_build.clone()),
            ("extra_includes".to_string(), self.extra_includes.clone()),
            ("extra_cflags".to_string(), self.extra_cflags.clone()),
            ("kernel_dir".to_string(), self.kernel_dir.clone()),
            (
                "kernel_cross_compile".to_string(),
                self.kernel_cross_compile.clone(),
            ),
            ("kbuild_options".to_string(), self.kbuild_options.clone()),
            ("make_args".to_string(), self.make_args.clone()),
            (
                "output_module_dir".to_string(),
                self.output_module_dir.clone(),
            ),
            ("cc_flag".to_string(), self.cc_flag.clone()),
            ("hostcc_flag".to_string(), self.hostcc_flag.clone()),
            (
                "clang_triple_flag".to_string(),
                self.clang_triple_flag.clone(),
            ),
            ("ld_flag".to_string(), self.ld_flag.clone()),
        ])
    }
}

fn prefixed_option(prefix: &str, value: &Option<String>) -> String {
    match value.as_deref() {
        Some(v) if !v.is_empty() => format!("{prefix} {v}"),
        _ => String::new(),
    }
}

/// Kernel modules this one pulls symbols from, by way of the
/// kernel-module dependency tag. Anything else under that tag is a
/// description error.
fn extra_symbols_files(
    graph: &ModuleGraph,
    module: &Module,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    graph.visit_direct_deps_if(
        &module.name,
        |edge| edge.tag == DepTag::KernelModule,
        |dep, _| {
            if matches!(dep.kind, KindProps::KernelModule(_)) {
                files.push(utils::join_path(&dep.output_dir, "Module.symvers"));
                Ok(())
            } else {
                Err(Error::msg(format!(
                    "invalid extra_symbols, {} not a kernel module",
                    dep.name
                )))
            }
        },
    )?;
    Ok(files)
}

fn generate_kbuild_args(
    g: &AndroidMkGenerator,
    module: &Module,
    props: &KernelModuleProps,
) -> KbuildArgs {
    let mut extra_include_paths = Vec::new();
    for dir in &props.local_include_dirs {
        extra_include_paths.push(format!("-I{}", g.source_path(dir)));
    }
    for dir in &props.include_dirs {
        extra_include_paths.push(format!("-I{dir}"));
    }

    let kmod_build = utils::join_path(&g.scripts_dir(), "kmod_build.py");
    let kernel_dir = match props.kernel_dir.as_deref() {
        Some(dir) if !dir.starts_with('/') => g.source_path(dir),
        Some(dir) => dir.to_string(),
        None => String::new(),
    };

    let kbuild_options = if props.kbuild_options.is_empty() {
        String::new()
    } else {
        format!("--kbuild-options {}", props.kbuild_options.join(" "))
    };

    KbuildArgs {
        kmod_build,
        extra_includes: extra_include_paths.join(" "),
        extra_cflags: props.cflags.join(" "),
        kernel_dir,
        kernel_cross_compile: props.kernel_cross_compile.clone().unwrap_or_default(),
        kbuild_options,
        make_args: props.make_args.join(" "),
        // The kernel module builder replicates the out-of-tree module's
        // source tree structure; the module lands at its equivalent
        // position in the output tree.
        output_module_dir: utils::join_path(
            &module.output_dir,
            props.module_dir.as_deref().unwrap_or(""),
        ),
        cc_flag: prefixed_option("--cc", &props.kernel_cc),
        hostcc_flag: prefixed_option("--hostcc", &props.kernel_hostcc),
        clang_triple_flag: prefixed_option("--clang-triple", &props.kernel_clang_triple),
        ld_flag: prefixed_option("--ld", &props.kernel_ld),
    }
}

pub fn kernel_module_actions(
    g: &AndroidMkGenerator,
    graph: &ModuleGraph,
    _namemap: &NameMap,
    module: &Module,
) -> Result<String> {
    let props = module.kernel().expect("kernel modules only");

    let mut sb = String::new();
    sb.push_str("##########################\ninclude $(CLEAR_VARS)\n\n");
    sb.push_str(&format!("LOCAL_MODULE := {}\n", module.alt_short_name()));
    sb.push_str("LOCAL_MODULE_CLASS := KERNEL_MODULES\n");
    sb.push_str("LOCAL_CLANG := false\n");
    write_list_assignment(&mut sb, "LOCAL_MODULE_TAGS", &props.tags);
    sb.push('\n');

    sb.push_str(&format!(
        "LOCAL_SRC_FILES :={}",
        utils::newline_separated_list(&props.srcs)
    ));

    // The build rules themselves, standing in for the 'include
    // $(BUILD_KERNEL_MODULE)' that Android does not provide.
    sb.push_str("TARGET_OUT_$(LOCAL_MODULE_CLASS) := $(TARGET_OUT)/lib/modules\n");
    if let Some((install_base, install_rel)) = props.install.install_path() {
        sb.push_str(&format!("LOCAL_MODULE_PATH := {install_base}\n"));
        sb.push_str(&format!("LOCAL_MODULE_RELATIVE_PATH := {install_rel}\n"));
    } else {
        sb.push_str("LOCAL_UNINSTALLABLE_MODULE := true\n");
    }
    sb.push_str("LOCAL_MODULE_SUFFIX := .ko\n");
    if let Some(owner) = module.proprietary_owner() {
        sb.push_str(&format!("LOCAL_MODULE_OWNER := {owner}\n"));
        sb.push_str("LOCAL_PROPRIETARY_MODULE := true\n");
    }
    sb.push_str("include $(BUILD_SYSTEM)/base_rules.mk\n\n");

    let mut args = generate_kbuild_args(g, module, props).to_dict();
    let mut sources = vec!["$(addprefix $(LOCAL_PATH)/,$(LOCAL_SRC_FILES))".to_string()];
    sources.extend(extra_symbols_files(graph, module)?);
    args.insert("sources".to_string(), sources.join(" "));
    args.insert("local_path".to_string(), "$(LOCAL_PATH)".to_string());
    args.insert(
        "make_command_args".to_string(),
        g.make_command_args().join(" "),
    );

    // One target-specific variable per parameter, in sorted order so the
    // fragment is byte-stable.
    for (key, value) in &args {
        sb.push_str(&format!("$(LOCAL_BUILT_MODULE): {key} := {value}\n"));
    }

    sb.push_str(&format!(
        "\n$(LOCAL_BUILT_MODULE): $(LOCAL_MODULE_MAKEFILE_DEP) {} {}\n",
        args["sources"], args["kmod_build"]
    ));
    sb.push_str("\tmkdir -p \"$(@D)\"\n");
    let cmd = "python $(kmod_build) --output $@ --depfile $@.d $(make_command_args) \
               --common-root $(local_path) \
               --module-dir \"$(output_module_dir)\" $(extra_includes) \
               --sources $(sources) \
               --kernel \"$(kernel_dir)\" --cross-compile \"$(kernel_cross_compile)\" \
               $(cc_flag) $(hostcc_flag) $(clang_triple_flag) $(ld_flag) \
               $(kbuild_options) --extra-cflags=\"$(extra_cflags)\" $(make_args)";

    sb.push_str(&format!("\techo {cmd}\n"));
    sb.push_str(&format!("\t{cmd}\n"));
    sb.push_str(&generated::transform_dep_file("$@.d"));
    sb.push('\n');

    sb.push_str(&generated::include_dep_file(
        "$(LOCAL_BUILT_MODULE)",
        "$(LOCAL_BUILT_MODULE).d",
    ));

    // Module.symvers is produced by the same Kbuild run; make has no
    // multi-output rules, so hang it off the built module.
    sb.push_str("\n$(dir $(LOCAL_BUILT_MODULE))/Module.symvers: $(LOCAL_BUILT_MODULE)\n");

    Ok(sb)
}
