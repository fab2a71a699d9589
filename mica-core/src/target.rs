//! Build-target description.
//!
//! A `Target` is a pure value naming the architecture, operating system, and
//! ABI of either the host or a caller-requested build target. It is
//! constructed once and read-only afterwards; every derived query lives
//! here. Unrecognized inputs never fail, they degrade to `Unknown` and
//! propagate defaults.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Arm,
    Riscv64,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    FreeBsd,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    None,
    Gnu,
    Msvc,
    MinGw,
    Musl,
    Unknown,
}

/// Calling conventions a target can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    C,
    Win64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub arch: Arch,
    pub os: Os,
    pub abi: Abi,
}

impl Target {
    /// Parses a canonical `<arch>-<vendor>-<os>[-<env>]` triple. A two-part
    /// `<arch>-<os>` form is tolerated. Anything unrecognized becomes
    /// `Unknown`.
    pub fn from_triple(triple: &str) -> Target {
        let parts: Vec<&str> = triple.split('-').collect();

        let arch = match parts.first().copied().unwrap_or("") {
            "x86_64" => Arch::X86_64,
            "aarch64" | "arm64" => Arch::Aarch64,
            "arm" | "armv7" | "thumb" => Arch::Arm,
            "riscv64" => Arch::Riscv64,
            _ => Arch::Unknown,
        };

        let (os_part, env_part) = match parts.len() {
            0 | 1 => ("", None),
            2 => (parts[1], None),
            3 => (parts[2], None),
            _ => (parts[2], Some(parts[3])),
        };

        let os = match os_part {
            "linux" => Os::Linux,
            "darwin" | "macos" | "macosx" => Os::MacOs,
            "windows" | "win32" => Os::Windows,
            "freebsd" => Os::FreeBsd,
            _ => Os::Unknown,
        };

        let abi = match env_part {
            Some("gnu") | Some("gnueabi") | Some("gnueabihf") => Abi::Gnu,
            Some("msvc") => Abi::Msvc,
            Some("musl") | Some("musleabi") | Some("musleabihf") => Abi::Musl,
            _ => {
                // Bare windows triples default to the MinGW toolchain; macOS
                // has no environment component at all.
                if os == Os::Windows && env_part.is_none() {
                    Abi::MinGw
                } else if os == Os::MacOs {
                    Abi::None
                } else {
                    Abi::Unknown
                }
            }
        };

        Target { arch, os, abi }
    }

    /// Describes the environment this compiler was built for.
    pub fn host() -> Target {
        let arch = if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else if cfg!(target_arch = "arm") {
            Arch::Arm
        } else if cfg!(target_arch = "riscv64") {
            Arch::Riscv64
        } else {
            Arch::Unknown
        };

        let os = if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "freebsd") {
            Os::FreeBsd
        } else {
            Os::Unknown
        };

        let abi = if cfg!(target_env = "gnu") {
            if os == Os::Windows {
                Abi::MinGw
            } else {
                Abi::Gnu
            }
        } else if cfg!(target_env = "msvc") {
            Abi::Msvc
        } else if cfg!(target_env = "musl") {
            Abi::Musl
        } else if os == Os::MacOs {
            Abi::None
        } else {
            Abi::Unknown
        };

        Target { arch, os, abi }
    }

    pub fn pointer_size(&self) -> u32 {
        match self.arch {
            Arch::X86_64 | Arch::Aarch64 | Arch::Riscv64 => 8,
            Arch::Arm => 4,
            Arch::Unknown => 8,
        }
    }

    pub fn pointer_alignment(&self) -> u32 {
        self.pointer_size()
    }

    pub fn requires_pic(&self) -> bool {
        self.os == Os::Windows || self.abi == Abi::Gnu
    }

    pub fn requires_pie(&self) -> bool {
        self.os == Os::MacOs
    }

    /// Darwin always links libSystem; FreeBSD needs libc for the stable
    /// syscall surface.
    pub fn requires_libc(&self) -> bool {
        self.os == Os::MacOs || self.os == Os::FreeBsd
    }

    pub fn can_dynamic_link(&self) -> bool {
        true
    }

    pub fn uses_c_abi(&self) -> bool {
        true
    }

    pub fn libc_name(&self) -> &'static str {
        match self.os {
            Os::Windows => return "mingw",
            Os::MacOs => return "darwin",
            _ => {}
        }
        match self.abi {
            Abi::Gnu | Abi::MinGw => "glibc",
            Abi::Musl => "musl",
            Abi::Msvc => "msvcrt",
            _ => "unknown",
        }
    }

    pub fn default_callconv(&self) -> CallConv {
        CallConv::C
    }

    fn arch_str(&self) -> &'static str {
        match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "arm",
            Arch::Riscv64 => "riscv64",
            Arch::Unknown => "unknown",
        }
    }

    /// Canonical triple, with the macOS spelling and env-suffix conventions
    /// a backend expects (`darwin`, no suffix).
    pub fn to_triple_string(&self) -> String {
        let os = match self.os {
            Os::Linux => "linux",
            Os::MacOs => "darwin",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
            Os::Unknown => "unknown",
        };
        let env = match self.abi {
            Abi::Gnu | Abi::MinGw => "-gnu",
            Abi::Msvc => "-msvc",
            Abi::Musl => "-musl",
            Abi::None | Abi::Unknown => "",
        };
        format!("{}-unknown-{}{}", self.arch_str(), os, env)
    }

    /// Human-readable `<arch>-<os>[-<abi>]` name.
    pub fn name(&self) -> String {
        let os = match self.os {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
            Os::Unknown => "unknown",
        };
        let abi = match self.abi {
            Abi::Gnu => "-gnu",
            Abi::Msvc => "-msvc",
            Abi::MinGw => "-mingw",
            Abi::Musl => "-musl",
            Abi::None | Abi::Unknown => "",
        };
        format!("{}-{}{}", self.arch_str(), os, abi)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
