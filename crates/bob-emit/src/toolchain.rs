use std::collections::BTreeSet;

use serde::Deserialize;

use crate::config::BobConfig;
use crate::error::Result;
use crate::module::TgtType;

/// Rendering of linker options the emitters need. Only the GNU dialect is
/// spoken here; the backend decides where the rendered flags land.
pub trait Linker {
    fn set_version_script(&self, path: &str) -> String;
    fn keep_shared_library_transitivity(&self) -> String;
}

pub trait Toolchain {
    /// True when the compiler accepts `flag` when building `lang`
    /// ("c" or "c++") sources.
    fn check_flag_is_supported(&self, lang: &str, flag: &str) -> bool;
    fn linker(&self) -> &dyn Linker;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GnuLinker;

impl Linker for GnuLinker {
    fn set_version_script(&self, path: &str) -> String {
        format!("-Wl,--version-script,{path}")
    }

    fn keep_shared_library_transitivity(&self) -> String {
        "-Wl,--copy-dt-needed-entries".to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ToolchainTable {
    supported_cflags: Vec<String>,
    supported_cxxflags: Vec<String>,
    supported_conlyflags: Vec<String>,
}

/// Flag support answered from config tables. The host probes the compilers
/// once and records the outcome; the core only looks the answers up.
#[derive(Debug, Clone, Default)]
pub struct ConfigToolchain {
    c_flags: BTreeSet<String>,
    cxx_flags: BTreeSet<String>,
    linker: GnuLinker,
}

impl ConfigToolchain {
    pub fn with_supported_flags(c_flags: &[&str], cxx_flags: &[&str]) -> Self {
        Self {
            c_flags: c_flags.iter().map(|s| s.to_string()).collect(),
            cxx_flags: cxx_flags.iter().map(|s| s.to_string()).collect(),
            linker: GnuLinker,
        }
    }

    fn from_table(table: ToolchainTable) -> Self {
        let mut c_flags: BTreeSet<String> = table.supported_cflags.iter().cloned().collect();
        let mut cxx_flags: BTreeSet<String> = table.supported_cflags.into_iter().collect();
        c_flags.extend(table.supported_conlyflags);
        cxx_flags.extend(table.supported_cxxflags);
        Self {
            c_flags,
            cxx_flags,
            linker: GnuLinker,
        }
    }
}

impl Toolchain for ConfigToolchain {
    fn check_flag_is_supported(&self, lang: &str, flag: &str) -> bool {
        match lang {
            "c" => self.c_flags.contains(flag),
            "c++" => self.cxx_flags.contains(flag),
            _ => false,
        }
    }

    fn linker(&self) -> &dyn Linker {
        &self.linker
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolchainSet {
    pub target: ConfigToolchain,
    pub host: ConfigToolchain,
}

impl ToolchainSet {
    pub fn parse_config(config: &BobConfig) -> Result<Self> {
        let target: ToolchainTable = config
            .deserialize_path("toolchain.target")?
            .unwrap_or_default();
        let host: ToolchainTable = config
            .deserialize_path("toolchain.host")?
            .unwrap_or_default();
        Ok(Self {
            target: ConfigToolchain::from_table(target),
            host: ConfigToolchain::from_table(host),
        })
    }

    pub fn for_target(&self, tgt: TgtType) -> &ConfigToolchain {
        match tgt {
            TgtType::Target => &self.target,
            TgtType::Host => &self.host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_flags_split_by_language() {
        let tc = ConfigToolchain::with_supported_flags(
            &["-fcommon"],
            &["-fno-rtti"],
        );
        assert!(tc.check_flag_is_supported("c", "-fcommon"));
        assert!(!tc.check_flag_is_supported("c", "-fno-rtti"));
        assert!(tc.check_flag_is_supported("c++", "-fno-rtti"));
        assert!(!tc.check_flag_is_supported("rust", "-fcommon"));
    }

    #[test]
    fn shared_cflags_apply_to_both_languages() {
        let cfg = BobConfig::from_value(
            toml::from_str(
                r#"
[toolchain.target]
supported_cflags = ["-fno-strict-aliasing"]
supported_conlyflags = ["-std=gnu99"]
"#,
            )
            .expect("valid toml"),
        );
        let set = ToolchainSet::parse_config(&cfg).expect("parse");
        assert!(set.target.check_flag_is_supported("c", "-fno-strict-aliasing"));
        assert!(set.target.check_flag_is_supported("c++", "-fno-strict-aliasing"));
        assert!(set.target.check_flag_is_supported("c", "-std=gnu99"));
        assert!(!set.target.check_flag_is_supported("c++", "-std=gnu99"));
    }

    #[test]
    fn gnu_linker_rendering() {
        let l = GnuLinker;
        assert_eq!(
            l.set_version_script("$(LOCAL_PATH)/abi.map"),
            "-Wl,--version-script,$(LOCAL_PATH)/abi.map"
        );
        assert_eq!(
            l.keep_shared_library_transitivity(),
            "-Wl,--copy-dt-needed-entries"
        );
    }
}
