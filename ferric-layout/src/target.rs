//! Target descriptors.
//!
//! A target is selected once, before expansion begins, either by a
//! built-in triple name or by a declarative TOML description file. The
//! descriptor never changes afterwards; every stage reads it by
//! reference.

use serde::Deserialize;
use std::fmt;
use std::path::Path as FsPath;
use thiserror::Error;

/// Alignment of each primitive on the target, in bytes.
/// u8/i8/bool are always byte-aligned and are not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchAlignments {
    pub u16: u64,
    pub u32: u64,
    pub u64: u64,
    pub u128: u64,
    pub f32: u64,
    pub f64: u64,
    pub ptr: u64,
}

/// Which atomic widths the target supports natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchAtomics {
    pub u8: bool,
    pub u16: bool,
    pub u32: bool,
    pub u64: bool,
    pub ptr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetArch {
    pub name: String,
    pub pointer_bits: u32,
    pub big_endian: bool,
    pub atomics: ArchAtomics,
    pub alignments: ArchAlignments,
}

impl TargetArch {
    pub fn pointer_bytes(&self) -> u64 {
        u64::from(self.pointer_bits) / 8
    }
}

pub fn arch_x86_64() -> TargetArch {
    TargetArch {
        name: "x86_64".to_string(),
        pointer_bits: 64,
        big_endian: false,
        atomics: ArchAtomics {
            u8: true,
            u16: false,
            u32: true,
            u64: true,
            ptr: true,
        },
        alignments: ArchAlignments {
            u16: 2,
            u32: 4,
            u64: 8,
            u128: 16,
            f32: 4,
            f64: 8,
            ptr: 8,
        },
    }
}

pub fn arch_x86() -> TargetArch {
    TargetArch {
        name: "x86".to_string(),
        pointer_bits: 32,
        big_endian: false,
        atomics: ArchAtomics {
            u8: true,
            u16: false,
            u32: true,
            u64: false,
            ptr: true,
        },
        // u128 shares u64's alignment, which is u32's. f64 is 4-aligned.
        alignments: ArchAlignments {
            u16: 2,
            u32: 4,
            u64: 4,
            u128: 4,
            f32: 4,
            f64: 4,
            ptr: 4,
        },
    }
}

pub fn arch_aarch64() -> TargetArch {
    TargetArch {
        name: "aarch64".to_string(),
        pointer_bits: 64,
        big_endian: false,
        atomics: ArchAtomics {
            u8: true,
            u16: true,
            u32: true,
            u64: true,
            ptr: true,
        },
        alignments: ArchAlignments {
            u16: 2,
            u32: 4,
            u64: 8,
            u128: 16,
            f32: 4,
            f64: 8,
            ptr: 8,
        },
    }
}

pub fn arch_arm() -> TargetArch {
    TargetArch {
        name: "arm".to_string(),
        pointer_bits: 32,
        big_endian: false,
        atomics: ArchAtomics {
            u8: true,
            u16: false,
            u32: true,
            u64: false,
            ptr: true,
        },
        // Natively aligned throughout; i128 is emulated
        alignments: ArchAlignments {
            u16: 2,
            u32: 4,
            u64: 8,
            u128: 16,
            f32: 4,
            f64: 8,
            ptr: 4,
        },
    }
}

pub fn arch_m68k() -> TargetArch {
    TargetArch {
        name: "m68k".to_string(),
        pointer_bits: 32,
        big_endian: true,
        atomics: ArchAtomics {
            u8: true,
            u16: false,
            u32: true,
            u64: false,
            ptr: true,
        },
        alignments: ArchAlignments {
            u16: 2,
            u32: 2,
            u64: 2,
            u128: 2,
            f32: 2,
            f64: 2,
            ptr: 2,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodegenMode {
    #[default]
    Gnu,
    Msvc,
}

/// Options for the C backend collaborator; `emulated_i128` also feeds
/// back into i128 alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptsC {
    pub codegen_mode: CodegenMode,
    pub c_compiler: String,
    pub emulated_i128: bool,
    pub compiler_opts: Vec<String>,
    pub linker_opts: Vec<String>,
}

impl Default for BackendOptsC {
    fn default() -> Self {
        BackendOptsC {
            codegen_mode: CodegenMode::Gnu,
            c_compiler: String::new(),
            emulated_i128: false,
            compiler_opts: Vec::new(),
            linker_opts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub family: String,
    pub os_name: String,
    pub env_name: String,
    pub arch: TargetArch,
    pub backend_c: BackendOptsC,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.arch.name, self.os_name, self.env_name)
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unknown target name `{0}`")]
    UnknownTarget(String),
    #[error("cannot read target file `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse target file `{path}`: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid target file `{path}`: {reason}")]
    Invalid { path: String, reason: String },
}

// Deserialisation shape of a target description file. Every key the file
// format recognises appears here; validation of required keys happens
// after parse.
#[derive(Debug, Deserialize)]
struct TargetFile {
    target: TargetSection,
    #[serde(rename = "backend")]
    backend: Option<BackendSection>,
    arch: Option<ArchSection>,
}

#[derive(Debug, Deserialize)]
struct TargetSection {
    family: String,
    #[serde(rename = "os-name")]
    os_name: String,
    #[serde(rename = "env-name")]
    env_name: String,
    arch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendSection {
    c: Option<BackendCSection>,
}

#[derive(Debug, Deserialize)]
struct BackendCSection {
    variant: Option<String>,
    target: Option<String>,
    #[serde(rename = "emulate-i128")]
    emulate_i128: Option<bool>,
    #[serde(rename = "compiler-opts")]
    compiler_opts: Option<Vec<String>>,
    #[serde(rename = "linker-opts")]
    linker_opts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ArchSection {
    name: Option<String>,
    #[serde(rename = "pointer-bits")]
    pointer_bits: Option<u32>,
    #[serde(rename = "is-big-endian")]
    is_big_endian: Option<bool>,
    #[serde(rename = "has-atomic-u8")]
    has_atomic_u8: Option<bool>,
    #[serde(rename = "has-atomic-u16")]
    has_atomic_u16: Option<bool>,
    #[serde(rename = "has-atomic-u32")]
    has_atomic_u32: Option<bool>,
    #[serde(rename = "has-atomic-u64")]
    has_atomic_u64: Option<bool>,
    #[serde(rename = "has-atomic-ptr")]
    has_atomic_ptr: Option<bool>,
    alignments: Option<AlignmentsSection>,
}

#[derive(Debug, Deserialize)]
struct AlignmentsSection {
    u16: Option<u64>,
    u32: Option<u64>,
    u64: Option<u64>,
    u128: Option<u64>,
    f32: Option<u64>,
    f64: Option<u64>,
    ptr: Option<u64>,
}

fn arch_preset(name: &str) -> Option<TargetArch> {
    match name {
        "x86" => Some(arch_x86()),
        "x86_64" => Some(arch_x86_64()),
        "arm" => Some(arch_arm()),
        "aarch64" => Some(arch_aarch64()),
        "m68k" => Some(arch_m68k()),
        _ => None,
    }
}

impl TargetSpec {
    /// Resolve a `--target` selector: a path (contains a separator) loads
    /// a description file, anything else must be a built-in triple.
    pub fn from_selector(selector: &str) -> Result<TargetSpec, TargetError> {
        if selector.contains('/') || selector.contains('\\') {
            TargetSpec::from_file(selector)
        } else {
            TargetSpec::builtin(selector)
                .ok_or_else(|| TargetError::UnknownTarget(selector.to_string()))
        }
    }

    /// Built-in triple names
    pub fn builtin(name: &str) -> Option<TargetSpec> {
        let (arch, family, os, env) = match name {
            "x86_64-linux-gnu" => (arch_x86_64(), "unix", "linux", "gnu"),
            "i586-linux-gnu" => (arch_x86(), "unix", "linux", "gnu"),
            "aarch64-linux-gnu" => (arch_aarch64(), "unix", "linux", "gnu"),
            "arm-linux-gnu" => (arch_arm(), "unix", "linux", "gnu"),
            "m68k-linux-gnu" => (arch_m68k(), "unix", "linux", "gnu"),
            "x86_64-windows-gnu" => (arch_x86_64(), "windows", "windows", "gnu"),
            "x86_64-windows-msvc" => (arch_x86_64(), "windows", "windows", "msvc"),
            "x86_64-macos" => (arch_x86_64(), "unix", "macos", ""),
            "aarch64-macos" => (arch_aarch64(), "unix", "macos", ""),
            _ => return None,
        };
        let mut spec = TargetSpec {
            family: family.to_string(),
            os_name: os.to_string(),
            env_name: env.to_string(),
            arch,
            backend_c: BackendOptsC::default(),
        };
        if name == "x86_64-windows-msvc" {
            spec.backend_c.codegen_mode = CodegenMode::Msvc;
        }
        spec.backend_c.c_compiler = name.to_string();
        Some(spec)
    }

    /// Load a declarative target description file
    pub fn from_file(path: &str) -> Result<TargetSpec, TargetError> {
        let text = std::fs::read_to_string(FsPath::new(path)).map_err(|source| TargetError::Io {
            path: path.to_string(),
            source,
        })?;
        let file: TargetFile = toml::from_str(&text).map_err(|source| TargetError::Parse {
            path: path.to_string(),
            source,
        })?;

        let invalid = |reason: String| TargetError::Invalid {
            path: path.to_string(),
            reason,
        };

        // Start from the named arch preset, if any
        let mut arch = match &file.target.arch {
            Some(name) => Some(
                arch_preset(name)
                    .ok_or_else(|| invalid(format!("unknown architecture `{name}`")))?,
            ),
            None => None,
        };

        if let Some(arch_sec) = &file.arch {
            let arch = arch.get_or_insert_with(|| TargetArch {
                name: String::new(),
                pointer_bits: 0,
                big_endian: false,
                atomics: ArchAtomics {
                    u8: false,
                    u16: false,
                    u32: false,
                    u64: false,
                    ptr: false,
                },
                alignments: ArchAlignments {
                    u16: 0,
                    u32: 0,
                    u64: 0,
                    u128: 0,
                    f32: 0,
                    f64: 0,
                    ptr: 0,
                },
            });
            if let Some(name) = &arch_sec.name {
                arch.name = name.clone();
            }
            if let Some(bits) = arch_sec.pointer_bits {
                if !matches!(bits, 16 | 32 | 64) {
                    return Err(invalid(format!("invalid pointer-bits {bits}")));
                }
                arch.pointer_bits = bits;
            }
            if let Some(be) = arch_sec.is_big_endian {
                arch.big_endian = be;
            }
            if let Some(v) = arch_sec.has_atomic_u8 {
                arch.atomics.u8 = v;
            }
            if let Some(v) = arch_sec.has_atomic_u16 {
                arch.atomics.u16 = v;
            }
            if let Some(v) = arch_sec.has_atomic_u32 {
                arch.atomics.u32 = v;
            }
            if let Some(v) = arch_sec.has_atomic_u64 {
                arch.atomics.u64 = v;
            }
            if let Some(v) = arch_sec.has_atomic_ptr {
                arch.atomics.ptr = v;
            }
            if let Some(al) = &arch_sec.alignments {
                let dst = &mut arch.alignments;
                if let Some(v) = al.u16 {
                    dst.u16 = v;
                }
                if let Some(v) = al.u32 {
                    dst.u32 = v;
                }
                if let Some(v) = al.u64 {
                    dst.u64 = v;
                }
                if let Some(v) = al.u128 {
                    dst.u128 = v;
                }
                if let Some(v) = al.f32 {
                    dst.f32 = v;
                }
                if let Some(v) = al.f64 {
                    dst.f64 = v;
                }
                if let Some(v) = al.ptr {
                    dst.ptr = v;
                }
            }
        }

        let arch = arch.ok_or_else(|| {
            invalid("no architecture: set target.arch or an [arch] section".to_string())
        })?;
        if arch.pointer_bits == 0 {
            return Err(invalid("architecture has no pointer-bits".to_string()));
        }
        if arch.alignments.ptr == 0 {
            return Err(invalid("architecture has no pointer alignment".to_string()));
        }

        let mut backend_c = BackendOptsC::default();
        if let Some(c) = file.backend.and_then(|b| b.c) {
            if let Some(variant) = &c.variant {
                backend_c.codegen_mode = match variant.as_str() {
                    "gnu" => CodegenMode::Gnu,
                    "msvc" => CodegenMode::Msvc,
                    other => {
                        return Err(invalid(format!("unknown C variant name `{other}`")));
                    }
                };
            }
            if let Some(t) = c.target {
                backend_c.c_compiler = t;
            }
            if let Some(v) = c.emulate_i128 {
                backend_c.emulated_i128 = v;
            }
            if let Some(v) = c.compiler_opts {
                backend_c.compiler_opts = v;
            }
            if let Some(v) = c.linker_opts {
                backend_c.linker_opts = v;
            }
        }

        Ok(TargetSpec {
            family: file.target.family,
            os_name: file.target.os_name,
            env_name: file.target.env_name,
            arch,
            backend_c,
        })
    }
}

/// One cfg atom derived from the target, handed to the expansion engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgEntry {
    Flag(String),
    Value(String, String),
    /// Set-valued key (`target_has_atomic`, `target_feature`)
    Multi(String, Vec<String>),
}

/// The built-in cfg set for a target
pub fn builtin_cfg(spec: &TargetSpec) -> Vec<CfgEntry> {
    let mut entries = vec![
        CfgEntry::Flag(spec.family.clone()),
        CfgEntry::Value("target_family".to_string(), spec.family.clone()),
        CfgEntry::Value("target_os".to_string(), spec.os_name.clone()),
        CfgEntry::Value("target_env".to_string(), spec.env_name.clone()),
        CfgEntry::Value("target_arch".to_string(), spec.arch.name.clone()),
        CfgEntry::Value(
            "target_pointer_width".to_string(),
            spec.arch.pointer_bits.to_string(),
        ),
        CfgEntry::Value(
            "target_endian".to_string(),
            if spec.arch.big_endian { "big" } else { "little" }.to_string(),
        ),
        CfgEntry::Value("target_vendor".to_string(), String::new()),
    ];
    let mut atomics = Vec::new();
    if spec.arch.atomics.u8 {
        atomics.push("8".to_string());
    }
    if spec.arch.atomics.u16 {
        atomics.push("16".to_string());
    }
    if spec.arch.atomics.u32 {
        atomics.push("32".to_string());
    }
    if spec.arch.atomics.u64 {
        atomics.push("64".to_string());
    }
    if spec.arch.atomics.ptr {
        atomics.push("ptr".to_string());
        atomics.push("cas".to_string());
    }
    entries.push(CfgEntry::Multi("target_has_atomic".to_string(), atomics));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_triples() {
        let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
        assert_eq!(spec.arch.pointer_bits, 64);
        assert_eq!(spec.arch.alignments.u64, 8);
        assert_eq!(spec.family, "unix");
        assert!(TargetSpec::builtin("riscv128-plan9").is_none());
    }

    #[test]
    fn test_selector_rejects_unknown_name() {
        let err = TargetSpec::from_selector("not-a-target").unwrap_err();
        assert!(matches!(err, TargetError::UnknownTarget(_)));
    }

    #[test]
    fn test_m68k_is_big_endian_2_aligned() {
        let arch = arch_m68k();
        assert!(arch.big_endian);
        assert_eq!(arch.alignments.u64, 2);
        assert_eq!(arch.alignments.ptr, 2);
    }

    #[test]
    fn test_load_spec_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[target]
family = "unix"
os-name = "linux"
env-name = "musl"
arch = "x86_64"

[backend.c]
variant = "gnu"
emulate-i128 = true

[arch]
pointer-bits = 32
alignments = {{ u64 = 4 }}
"#
        )
        .unwrap();
        let path = file.path().display().to_string();
        let spec = TargetSpec::from_file(&path).unwrap();
        assert_eq!(spec.os_name, "linux");
        assert_eq!(spec.env_name, "musl");
        // Preset overridden by the [arch] section
        assert_eq!(spec.arch.pointer_bits, 32);
        assert_eq!(spec.arch.alignments.u64, 4);
        // Untouched preset values survive
        assert_eq!(spec.arch.alignments.u128, 16);
        assert!(spec.backend_c.emulated_i128);
    }

    #[test]
    fn test_builtin_cfg_entries() {
        let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
        let cfg = builtin_cfg(&spec);
        assert!(cfg.contains(&CfgEntry::Flag("unix".to_string())));
        assert!(cfg.contains(&CfgEntry::Value(
            "target_pointer_width".to_string(),
            "64".to_string()
        )));
        let atomics = cfg.iter().find_map(|e| match e {
            CfgEntry::Multi(k, v) if k == "target_has_atomic" => Some(v.clone()),
            _ => None,
        });
        let atomics = atomics.unwrap();
        assert!(atomics.contains(&"64".to_string()));
        assert!(atomics.contains(&"cas".to_string()));
    }
}
