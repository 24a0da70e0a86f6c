use std::fs;
use std::sync::Arc;

use bob_emit::androidmk::{EmitOptions, emit_description};
use bob_emit::emit::{EmitCtx, NullSink};
use bob_emit::module::BuildDescription;

const KERNEL_MODULES: &str = r#"
[[modules]]
name = "mod_core"
kind = "kernel-module"
srcs = ["core.c", "Kbuild"]
kernel_dir = "kernel"
kernel_cross_compile = "aarch64-linux-gnu-"
kbuild_options = ["CONFIG_EXAMPLE=y"]
make_args = ["V=1"]
install_base = "$(TARGET_OUT)/lib/modules"

[[modules]]
name = "mod_ext"
kind = "kernel-module"
srcs = ["ext.c"]
kernel_dir = "/abs/kernel"
kernel_cc = "clang"
kernel_clang_triple = "aarch64-linux-gnu"
extra_symbols = ["mod_core"]
"#;

fn emit(desc: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(desc).expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    )
    .expect("emit");
    tmp
}

fn fragment(tmp: &tempfile::TempDir, name: &str) -> String {
    fs::read_to_string(tmp.path().join("androidmk").join(name)).expect("read fragment")
}

#[test]
fn kernel_module_fragment_shape() {
    let tmp = emit(KERNEL_MODULES);
    let inc = fragment(&tmp, "mod_core.inc");

    assert!(inc.contains("LOCAL_MODULE := mod_core\n"));
    assert!(inc.contains("LOCAL_MODULE_CLASS := KERNEL_MODULES\n"));
    assert!(inc.contains("LOCAL_CLANG := false\n"));
    assert!(inc.contains("LOCAL_MODULE_SUFFIX := .ko\n"));
    assert!(inc.contains("LOCAL_MODULE_PATH := $(TARGET_OUT)/lib/modules\n"));
    assert!(inc.contains("TARGET_OUT_$(LOCAL_MODULE_CLASS) := $(TARGET_OUT)/lib/modules\n"));
    assert!(inc.contains("include $(BUILD_SYSTEM)/base_rules.mk\n"));

    // Sources are a newline-separated list.
    assert!(inc.contains("LOCAL_SRC_FILES := \\\n    core.c \\\n    Kbuild\n"));

    // Kbuild parameters become sorted target-scoped variables.
    assert!(inc.contains(
        "$(LOCAL_BUILT_MODULE): kbuild_options := --kbuild-options CONFIG_EXAMPLE=y\n"
    ));
    assert!(inc.contains("$(LOCAL_BUILT_MODULE): kernel_dir := $(LOCAL_PATH)/kernel\n"));
    assert!(inc.contains(
        "$(LOCAL_BUILT_MODULE): kernel_cross_compile := aarch64-linux-gnu-\n"
    ));
    assert!(inc.contains("$(LOCAL_BUILT_MODULE): make_args := V=1\n"));
    assert!(inc.contains(
        "$(LOCAL_BUILT_MODULE): kmod_build := $(LOCAL_PATH)/scripts/kmod_build.py\n"
    ));

    // The recipe invokes the helper and post-processes the depfile.
    assert!(inc.contains("\tmkdir -p \"$(@D)\"\n"));
    assert!(inc.contains("python $(kmod_build) --output $@ --depfile $@.d"));
    assert!(inc.contains("$(call transform-d-to-p-args,$@.d,$@.d.P)"));
    assert!(inc.contains("$(call include-depfile,$(LOCAL_BUILT_MODULE).d,$(LOCAL_BUILT_MODULE))"));

    // Module.symvers hangs off the built module (single-output rules only).
    assert!(inc.contains(
        "$(dir $(LOCAL_BUILT_MODULE))/Module.symvers: $(LOCAL_BUILT_MODULE)\n"
    ));
}

#[test]
fn uninstallable_kernel_module_and_toolchain_selectors() {
    let tmp = emit(KERNEL_MODULES);
    let inc = fragment(&tmp, "mod_ext.inc");

    assert!(inc.contains("LOCAL_UNINSTALLABLE_MODULE := true\n"));
    assert!(inc.contains("$(LOCAL_BUILT_MODULE): cc_flag := --cc clang\n"));
    assert!(inc.contains(
        "$(LOCAL_BUILT_MODULE): clang_triple_flag := --clang-triple aarch64-linux-gnu\n"
    ));
    // Absolute kernel dirs pass through untouched.
    assert!(inc.contains("$(LOCAL_BUILT_MODULE): kernel_dir := /abs/kernel\n"));
}

#[test]
fn extra_symbols_pull_in_the_producer_symvers() {
    let tmp = emit(KERNEL_MODULES);
    let inc = fragment(&tmp, "mod_ext.inc");

    assert!(inc.contains(
        "$(dir $(ALL_MODULES.mod_core.BUILT))/Module.symvers"
    ));

    // And the orderer puts the producer first.
    let android_inc = fragment(&tmp, "Android.inc");
    let core = android_inc.find("mod_core.inc").expect("core included");
    let ext = android_inc.find("mod_ext.inc").expect("ext included");
    assert!(core < ext);
}

#[test]
fn extra_symbols_must_reference_kernel_modules() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(
        r#"
[[modules]]
name = "libplain"
kind = "static-lib"
srcs = ["a.c"]

[[modules]]
name = "mod_bad"
kind = "kernel-module"
srcs = ["m.c"]
extra_symbols = ["libplain"]
"#,
    )
    .expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    let err = emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    )
    .expect_err("must fail");
    assert!(err.to_string().contains("invalid extra_symbols"));
    assert!(err.to_string().contains("libplain"));
}
