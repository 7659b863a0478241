use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize)]
pub struct BundleMeta {
    pub tool: String,
    pub tool_version: String,
    pub created_unix_ms: u128,
    pub command: String,
    pub args: serde_json::Value,
    pub inputs: Vec<BundleInputMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleInputMeta {
    pub name: String,
    pub original_path: String,
    pub bundled_path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
struct Manifest {
    bundle_version: u32,
    files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
struct ManifestFile {
    path: String,
    bytes: u64,
    sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(sha256_hex(&bytes))
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

fn ensure_empty_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            anyhow::bail!("bundle path exists but is not a directory: {}", dir.display());
        }
        if dir.read_dir()?.next().is_some() {
            anyhow::bail!("bundle directory must be empty: {}", dir.display());
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Bundled copy name: `<name>.<original extension>`.
fn bundled_name(name: &str, original: &Path) -> String {
    match original.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{name}.{ext}"),
        None => name.to_string(),
    }
}

/// Write `inputs/`, `outputs/result.json` (plus `extra_outputs`), `meta.json` and `manifest.json`.
pub fn write_bundle(
    bundle_dir: &Path,
    command: &str,
    args: serde_json::Value,
    inputs: &[(&str, &Path)],
    output_value: &serde_json::Value,
    extra_outputs: &[(String, String)],
) -> Result<()> {
    ensure_empty_dir(bundle_dir)?;

    let inputs_dir = bundle_dir.join("inputs");
    let outputs_dir = bundle_dir.join("outputs");
    std::fs::create_dir_all(&inputs_dir)?;
    std::fs::create_dir_all(&outputs_dir)?;

    let mut rel_paths = vec!["meta.json".to_string()];
    let mut input_meta = Vec::with_capacity(inputs.len());
    for (name, path) in inputs {
        let bytes = std::fs::read(path)?;
        let rel = format!("inputs/{}", bundled_name(name, path));
        std::fs::write(bundle_dir.join(&rel), &bytes)?;
        input_meta.push(BundleInputMeta {
            name: name.to_string(),
            original_path: path.display().to_string(),
            bundled_path: rel.clone(),
            sha256: sha256_hex(&bytes),
        });
        rel_paths.push(rel);
    }

    let created_unix_ms = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    let meta = BundleMeta {
        tool: "kappastat".to_string(),
        tool_version: ks_core::VERSION.to_string(),
        created_unix_ms,
        command: command.to_string(),
        args,
        inputs: input_meta,
    };
    std::fs::write(bundle_dir.join("meta.json"), serde_json::to_string_pretty(&meta)?)?;

    std::fs::write(outputs_dir.join("result.json"), serde_json::to_string_pretty(output_value)?)?;
    rel_paths.push("outputs/result.json".to_string());
    for (name, text) in extra_outputs {
        let rel = format!("outputs/{name}");
        std::fs::write(bundle_dir.join(&rel), text)?;
        rel_paths.push(rel);
    }

    let mut files = Vec::with_capacity(rel_paths.len());
    for rel in rel_paths {
        let p = bundle_dir.join(&rel);
        files.push(ManifestFile { bytes: file_size(&p)?, sha256: sha256_file(&p)?, path: rel });
    }
    let manifest = Manifest { bundle_version: 1, files };
    std::fs::write(bundle_dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)?;

    tracing::info!(dir = %bundle_dir.display(), command, "bundle written");
    Ok(())
}
