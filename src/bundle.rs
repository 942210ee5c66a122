//! Writes a finished [`SiteBundle`] to disk.
//!
//! Layout: `<dir>/<project>-<unix seconds>/` holding `index.html`,
//! `styles.css`, `script.js` and each asset at its relative path. The zip
//! form, `<dir>/<project>-<unix seconds>.zip`, holds the same entries.

use anyhow::{bail, Context, Result};
use sitesmith_core::SiteBundle;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory-safe project name for `url`: `https://www.Foo.com/a` -> `foo.com-a`.
pub fn project_name(url: &str) -> String {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let name: String = rest
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if name.is_empty() {
        "site".to_string()
    } else {
        name
    }
}

/// Relative path that stays inside the bundle directory.
fn safe_relative(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => bail!("asset path escapes the bundle directory: {}", path),
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("empty asset path");
    }
    Ok(clean)
}

/// Every asset with its checked relative path.
fn checked_assets(bundle: &SiteBundle) -> Result<Vec<(PathBuf, &Vec<u8>)>> {
    bundle
        .assets
        .iter()
        .map(|(path, bytes)| Ok((safe_relative(path)?, bytes)))
        .collect()
}

/// Write `bundle` into `target`, creating it if needed.
pub fn write_into(target: &Path, bundle: &SiteBundle) -> Result<()> {
    // validate everything before touching the disk
    let assets = checked_assets(bundle)?;

    fs::create_dir_all(target)
        .with_context(|| format!("creating {}", target.display()))?;
    fs::write(target.join("index.html"), &bundle.bundle.html)?;
    fs::write(target.join("styles.css"), &bundle.bundle.css)?;
    fs::write(target.join("script.js"), &bundle.bundle.js)?;

    for (rel, bytes) in assets {
        let path = target.join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Write `bundle` under `dir` in a fresh `<project>-<timestamp>` directory.
pub fn write_bundle(dir: &Path, project: &str, bundle: &SiteBundle) -> Result<PathBuf> {
    let target = dir.join(format!("{}-{}", project, chrono::Utc::now().timestamp()));
    write_into(&target, bundle)?;
    info!(
        path = %target.display(),
        assets = bundle.assets.len(),
        "bundle written"
    );
    Ok(target)
}

/// Write `bundle` as one zip archive at `path`.
pub fn zip_into(path: &Path, bundle: &SiteBundle) -> Result<()> {
    let assets = checked_assets(bundle)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let sources = [
        ("index.html", bundle.bundle.html.as_bytes()),
        ("styles.css", bundle.bundle.css.as_bytes()),
        ("script.js", bundle.bundle.js.as_bytes()),
    ];
    for (name, bytes) in sources {
        zip.start_file(name, options)?;
        zip.write_all(bytes)?;
    }
    for (rel, bytes) in assets {
        // entry names always use `/`
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()
        .with_context(|| format!("finishing {}", path.display()))?;
    Ok(())
}

/// Write `bundle` under `dir` as `<project>-<timestamp>.zip`.
pub fn write_zip(dir: &Path, project: &str, bundle: &SiteBundle) -> Result<PathBuf> {
    let target = dir.join(format!("{}-{}.zip", project, chrono::Utc::now().timestamp()));
    zip_into(&target, bundle)?;
    info!(
        path = %target.display(),
        assets = bundle.assets.len(),
        "zip written"
    );
    Ok(target)
}

/// Directory or zip delivery.
pub fn deliver(dir: &Path, project: &str, bundle: &SiteBundle, zip: bool) -> Result<PathBuf> {
    if zip {
        write_zip(dir, project, bundle)
    } else {
        write_bundle(dir, project, bundle)
    }
}
