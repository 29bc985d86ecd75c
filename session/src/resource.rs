//! Persistence of the per-install resource string.
//!
//! The resource identifies this client endpoint within the account and must
//! stay stable across restarts: it is stored in `<base>/attach/.resource`, a
//! JSON object mapping `"<appId>_<appAccount>"` to a 10-character random
//! string. An existing entry always wins over a freshly generated one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::Rng;

pub const RESOURCE_LENGTH: usize = 10;

const ATTACH_DIR: &str = "attach";
const RESOURCE_FILE: &str = ".resource";

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A fresh 10-character alphabetic resource string.
pub fn random_resource() -> String {
    let mut rng = rand::rng();
    (0..RESOURCE_LENGTH)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

pub fn resource_key(app_id: i64, app_account: &str) -> String {
    format!("{}_{}", app_id, app_account)
}

fn resource_path(base_dir: &Path) -> PathBuf {
    base_dir.join(ATTACH_DIR).join(RESOURCE_FILE)
}

/// Reconciles `fresh` with the persistence file under `base_dir`: returns
/// the stored value when one exists for the key, otherwise stores and
/// returns `fresh`. Creates the directory and the file as needed.
pub fn synchronize_resource(base_dir: &Path, key: &str, fresh: &str) -> anyhow::Result<String> {
    let path = resource_path(base_dir);
    let dir = path.parent().expect("resource path always has a parent");
    fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

    let mut entries: BTreeMap<String, String> = match fs::read(&path) {
        Ok(raw) if !raw.is_empty() => serde_json::from_slice(&raw).with_context(|| format!("parsing {:?}", path))?,
        _ => BTreeMap::new(),
    };

    if let Some(existing) = entries.get(key) {
        return Ok(existing.clone());
    }

    entries.insert(key.to_string(), fresh.to_string());
    let raw = serde_json::to_vec(&entries)?;
    fs::write(&path, raw).with_context(|| format!("writing {:?}", path))?;
    Ok(fresh.to_string())
}

/// The default base directory: where the executable lives.
pub fn default_base_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("resolving executable path")?;
    Ok(exe.parent().unwrap_or(Path::new(".")).to_path_buf())
}
