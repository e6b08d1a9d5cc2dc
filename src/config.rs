//! Binding configuration
//!
//! Explicit configuration objects passed to builders and resolvers;
//! nothing here is process-global. Usually loaded from an
//! `ffidecl.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::signature::CallingConvention;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    #[serde(default)]
    pub convention: ConventionConfig,

    #[serde(default)]
    pub libraries: LibraryConfig,

    #[serde(default)]
    pub capsules: CapsuleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConventionConfig {
    /// Convention applied when a signature declares none
    #[serde(default)]
    pub default: CallingConvention,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directories probed before the system linker paths
    #[serde(default)]
    pub search_paths: Vec<String>,

    /// Fall back to the system search paths
    #[serde(default = "default_true")]
    pub system_paths: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleConfig {
    /// Defer an absent capsule module to call time instead of failing
    /// binding construction
    #[serde(default = "default_false")]
    pub defer_unavailable: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            convention: ConventionConfig::default(),
            libraries: LibraryConfig::default(),
            capsules: CapsuleConfig::default(),
        }
    }
}

impl Default for ConventionConfig {
    fn default() -> Self {
        Self {
            default: CallingConvention::C,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            system_paths: true,
        }
    }
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            defer_unavailable: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }

impl BindingConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BindingConfig::default();
        assert_eq!(config.convention.default, CallingConvention::C);
        assert!(config.libraries.system_paths);
        assert!(config.libraries.search_paths.is_empty());
        assert!(!config.capsules.defer_unavailable);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[convention]
default = "stdcall"

[libraries]
search_paths = ["/opt/native/lib"]
system_paths = false

[capsules]
defer_unavailable = true
"#;

        let config = BindingConfig::parse(toml).unwrap();
        assert_eq!(config.convention.default, CallingConvention::Win32Stdcall);
        assert_eq!(config.libraries.search_paths, vec!["/opt/native/lib".to_string()]);
        assert!(!config.libraries.system_paths);
        assert!(config.capsules.defer_unavailable);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = BindingConfig::parse("[capsules]\ndefer_unavailable = true\n").unwrap();
        assert_eq!(config.convention.default, CallingConvention::C);
        assert!(config.libraries.system_paths);
        assert!(config.capsules.defer_unavailable);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffidecl.toml");

        let mut config = BindingConfig::default();
        config.convention.default = CallingConvention::Win32Stdcall;
        config.libraries.search_paths.push("/opt/native".into());
        config.save(&path).unwrap();

        let loaded = BindingConfig::load(&path).unwrap();
        assert_eq!(loaded.convention.default, CallingConvention::Win32Stdcall);
        assert_eq!(loaded.libraries.search_paths, vec!["/opt/native".to_string()]);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = BindingConfig::load(Path::new("/nonexistent/ffidecl.toml")).unwrap_err();
        assert!(err.contains("Failed to read config"));
    }

    #[test]
    fn test_generate_default_parses_back() {
        let content = BindingConfig::generate_default();
        let config = BindingConfig::parse(&content).unwrap();
        assert_eq!(config.convention.default, CallingConvention::C);
    }
}
