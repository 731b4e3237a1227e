use crate::support::yes_no;
use gradesync_core::{DEFAULT_CONFIG_FILE, EngineConfig};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub created_root: bool,
    pub wrote_config: bool,
}

pub fn init_layout(path: impl AsRef<Path>, force: bool) -> Result<InitOutcome, String> {
    let root = path.as_ref().to_path_buf();

    let mut created_root = false;
    if !root.exists() {
        fs::create_dir_all(&root)
            .map_err(|e| format!("failed to create init path {}: {e}", root.display()))?;
        created_root = true;
    }
    if !root.is_dir() {
        return Err(format!("init path is not a directory: {}", root.display()));
    }

    let config_path = root.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() && !config_path.is_file() {
        return Err(format!(
            "config path exists but is not a file: {}",
            config_path.display()
        ));
    }

    let mut wrote_config = false;
    if force || !config_path.exists() {
        EngineConfig::default()
            .write(&config_path)
            .map_err(|e| e.to_string())?;
        wrote_config = true;
    }

    Ok(InitOutcome {
        root,
        config_path,
        created_root,
        wrote_config,
    })
}

pub fn run(path: String, force: bool) {
    let outcome = init_layout(&path, force).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    println!("gradesync init {path}");
    println!();
    println!("  root: {}", outcome.root.display());
    println!("  config: {}", outcome.config_path.display());
    println!("  created root: {}", yes_no(outcome.created_root));
    println!("  wrote config: {}", yes_no(outcome.wrote_config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "gradesync-cli-init-{prefix}-{}-{unique}",
            std::process::id()
        ))
    }

    #[test]
    fn init_layout_writes_loadable_default_config() {
        let root = temp_dir("create");
        let outcome = init_layout(&root, false).expect("init should succeed");
        assert!(outcome.created_root);
        assert!(outcome.wrote_config);
        let loaded = EngineConfig::load(&outcome.config_path).expect("config should load");
        assert_eq!(loaded, EngineConfig::default());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn init_layout_keeps_existing_config_unless_forced() {
        let root = temp_dir("keep");
        fs::create_dir_all(&root).expect("root should exist");
        let config_path = root.join(DEFAULT_CONFIG_FILE);
        fs::write(&config_path, "total_marks = \"40\"\n").expect("config should write");

        let outcome = init_layout(&root, false).expect("init should succeed");
        assert!(!outcome.wrote_config);
        assert!(
            fs::read_to_string(&config_path)
                .expect("config should exist")
                .contains("40")
        );

        let outcome = init_layout(&root, true).expect("forced init should succeed");
        assert!(outcome.wrote_config);
        let loaded = EngineConfig::load(&config_path).expect("config should load");
        assert_eq!(loaded.total_marks, None);
        let _ = fs::remove_dir_all(root);
    }
}
