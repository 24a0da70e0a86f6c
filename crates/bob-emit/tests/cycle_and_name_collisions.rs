use std::sync::Arc;

use bob_emit::Error;
use bob_emit::androidmk::{EmitOptions, emit_description};
use bob_emit::emit::{EmitCtx, NullSink};
use bob_emit::module::BuildDescription;

fn emit_err(desc: &str) -> Error {
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
    .expect_err("emission must fail")
}

#[test]
fn dependency_cycle_names_every_stuck_module() {
    let err = emit_err(
        r#"
[[modules]]
name = "m1"
kind = "static-lib"
srcs = ["a.c"]
static_libs = ["m2"]

[[modules]]
name = "m2"
kind = "static-lib"
srcs = ["b.c"]
static_libs = ["m1"]
"#,
    );
    let text = err.to_string();
    assert!(text.contains("unmet or circular dependency"));
    assert!(text.contains("m1 depends on"));
    assert!(text.contains("m2 depends on"));
}

#[test]
fn backend_name_collision_is_fatal() {
    let err = emit_err(
        r#"
[[modules]]
name = "libfoo"
kind = "static-lib"
srcs = ["a.c"]
out = "libsame"

[[modules]]
name = "libbar"
kind = "static-lib"
srcs = ["b.c"]
out = "libsame"
"#,
    );
    let text = err.to_string();
    assert!(text.contains("libsame"));
    assert!(text.contains("libfoo"));
    assert!(text.contains("libbar"));
}

#[test]
fn build_wrapper_is_unsupported() {
    let err = emit_err(
        r#"
[[modules]]
name = "libwrapped"
kind = "static-lib"
srcs = ["a.c"]
build_wrapper = "ccache"
"#,
    );
    assert!(err.to_string().contains("build_wrapper not supported on Android"));
    assert!(err.to_string().contains("libwrapped"));
}

#[test]
fn empty_match_srcs_aborts_emission() {
    let err = emit_err(
        r#"
[[modules]]
name = "libfoo"
kind = "shared-lib"
srcs = ["a.c"]
ldflags = ["{{match_srcs \"version.ld\"}}"]
"#,
    );
    let text = err.to_string();
    assert!(text.contains("match"));
    assert!(text.contains("version.ld"));
    assert!(text.contains("libfoo"));
}

#[test]
fn disabled_modules_do_not_collide_or_emit() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(
        r#"
[[modules]]
name = "libon"
kind = "static-lib"
srcs = ["a.c"]
out = "libsame"

[[modules]]
name = "liboff"
kind = "static-lib"
enabled = false
srcs = ["b.c"]
out = "libsame"
"#,
    )
    .expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    )
    .expect("disabled modules stay out of the name map");
    assert!(tmp.path().join("androidmk/libsame.inc").is_file());
    let android_inc =
        std::fs::read_to_string(tmp.path().join("androidmk/Android.inc")).expect("read");
    assert_eq!(android_inc, "include $(BOB_ANDROIDMK_DIR)/libsame.inc\n");
}
