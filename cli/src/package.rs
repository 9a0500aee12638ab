use crate::docker::Docker;
use crate::project::{Arch, Project};
use eyre::Context;
use std::io::{Read, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// Directory the vendored dependencies are staged into
const STAGING_DIR: &str = ".red_packages";

/// Python runtime the bundle targets
const RUNTIME_IMAGE: &str = "python:3.12-slim";

/// Bundle the current directory into a deployable zip
///
/// Dependencies from requirements.txt are vendored with pip inside a
/// container matching the target platform, so native wheels resolve for
/// the function's architecture rather than the developer's machine. The
/// sources and the vendored packages end up flat at the archive root,
/// the way the Python runtime expects them.
pub async fn bundle(project: &Project) -> eyre::Result<Vec<u8>> {
    vendor_dependencies(project)?;

    // Zip crate is blocking, keep it off the async runtime
    let bytes = tokio::task::spawn_blocking(|| -> eyre::Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default();

        let staging = Path::new(STAGING_DIR);

        if staging.is_dir() {
            for entry in WalkDir::new(staging).min_depth(1) {
                let entry = entry.wrap_err("Failed to walk the staging directory")?;

                if !entry.file_type().is_file() {
                    continue;
                }

                let name = entry
                    .path()
                    .strip_prefix(staging)
                    .wrap_err("Staged file is outside the staging directory")?;

                append_file(&mut zip, entry.path(), &name.to_string_lossy(), options)?;
            }
        }

        for entry in WalkDir::new(".").min_depth(1) {
            let entry = entry.wrap_err("Failed to walk the project directory")?;

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry
                .path()
                .strip_prefix(".")
                .wrap_err("Project file is outside the project directory")?;

            if !bundled(name) {
                continue;
            }

            append_file(&mut zip, entry.path(), &name.to_string_lossy(), options)?;
        }

        zip.finish().wrap_err("Could not close the zip archive")?;
        Ok(buffer.into_inner())
    })
    .await
    .wrap_err("Failed to spawn the blocking task")??;

    log::info!("Bundled deployment package: {} bytes", bytes.len());
    Ok(bytes)
}

/// Install requirements.txt into the staging directory
fn vendor_dependencies(project: &Project) -> eyre::Result<()> {
    if !Path::new("requirements.txt").is_file() {
        log::info!("No requirements.txt, bundling sources only");
        return Ok(());
    }

    let platform = match project.arch {
        Arch::X86_64 => "linux/amd64",
        Arch::Arm64 => "linux/arm64",
    };

    Docker::run(
        RUNTIME_IMAGE,
        platform,
        &format!("pip install -r requirements.txt -t {STAGING_DIR} --upgrade"),
    )
    .wrap_err("Failed to vendor Python dependencies")
}

/// Whether a project file belongs in the bundle
///
/// Only Python sources go in. The staging directory is appended
/// separately, and local artifacts like the config and the audit log
/// stay out.
fn bundled(name: &Path) -> bool {
    if name.starts_with(STAGING_DIR) {
        return false;
    }

    if name.components().any(|c| c.as_os_str() == "__pycache__") {
        return false;
    }

    name.extension().is_some_and(|ext| ext == "py")
        || name.file_name().is_some_and(|f| f == "requirements.txt")
}

fn append_file<W: Write + std::io::Seek>(
    zip: &mut zip::ZipWriter<W>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> eyre::Result<()> {
    let mut file =
        std::fs::File::open(path).wrap_err_with(|| format!("Could not open \"{name}\""))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .wrap_err_with(|| format!("Could not read \"{name}\""))?;

    zip.start_file(name, options)
        .wrap_err("Could not open a zip entry")?;
    zip.write_all(&contents)
        .wrap_err("Could not write to the zip archive")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_python_sources_are_bundled() {
        assert!(bundled(Path::new("main.py")));
        assert!(bundled(Path::new("lib/helpers.py")));
        assert!(bundled(Path::new("requirements.txt")));

        assert!(!bundled(Path::new(".red")));
        assert!(!bundled(Path::new("red.log")));
        assert!(!bundled(Path::new("Dockerfile")));
        assert!(!bundled(Path::new(".red_packages/requests/__init__.py")));
        assert!(!bundled(Path::new("lib/__pycache__/helpers.cpython-312.pyc")));
    }
}
