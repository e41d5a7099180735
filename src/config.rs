//! Loading and saving a [`GenPolicy`] to/from disk.
//!
//! The load/save shape here is the teacher's `NeurlangConfig::load`/`save`
//! (existence check, read-to-string, parse, wrap I/O errors) re-themed from
//! a project manifest onto a generation policy; the error enum moved to
//! [`crate::error::GenError`] since it is the crate's one fallible boundary.

use crate::error::{GenError, GenResult};
use crate::policy::GenPolicy;
use std::path::Path;

impl GenPolicy {
    /// Load a policy from a TOML file, erroring if the path does not exist.
    pub fn load_toml(path: &Path) -> GenResult<Self> {
        if !path.exists() {
            return Err(GenError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load a policy from a JSON file, erroring if the path does not exist.
    pub fn load_json(path: &Path) -> GenResult<Self> {
        if !path.exists() {
            return Err(GenError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Render this policy as a pretty TOML document.
    pub fn to_toml_string(&self) -> GenResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save this policy to a TOML file.
    pub fn save_toml(&self, path: &Path) -> GenResult<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_toml_missing_file_is_not_found() {
        let err = GenPolicy::load_toml(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, GenError::NotFound(_)));
    }

    #[test]
    fn save_then_load_toml_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        let policy = GenPolicy::default();
        policy.save_toml(&path).unwrap();
        let loaded = GenPolicy::load_toml(&path).unwrap();
        assert_eq!(loaded.max_arith_depth, policy.max_arith_depth);
        assert_eq!(loaded.language_mode, policy.language_mode);
    }

    #[test]
    fn load_json_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let policy = GenPolicy::default();
        std::fs::write(&path, serde_json::to_string(&policy).unwrap()).unwrap();
        let loaded = GenPolicy::load_json(&path).unwrap();
        assert_eq!(loaded.max_loop_depth, policy.max_loop_depth);
    }
}
