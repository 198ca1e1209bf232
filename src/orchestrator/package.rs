//! Packaging: compressed image, flashable archive, digest and run metadata.

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::models::{BuildArtifact, FeatureSelection};

/// `{kernel-name}-{kernel-version}-{variant-label}`
pub fn package_name(kernel_name: &str, kernel_version: &str, selection: &FeatureSelection) -> String {
    format!("{}-{}-{}", kernel_name, kernel_version, selection.variant_label())
}

/// Gzip `image` next to itself as `<name>.gz`.
pub fn compress_image(image: &Path) -> io::Result<PathBuf> {
    let mut target = image.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    let mut input = BufReader::new(File::open(image)?);
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::best());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(target)
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Assemble the archive from the flashable template directory (if any) plus the images.
///
/// Template repository metadata (`.git`, `.github`, README) is left out.
pub fn build_archive(
    archive: &Path,
    template_dir: Option<&Path>,
    files: &[&Path],
) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(archive)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    if let Some(template) = template_dir {
        for entry in fs::read_dir(template)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.starts_with(".git") || name_str == "README.md" {
                continue;
            }
            if entry.file_type()?.is_dir() {
                builder.append_dir_all(&name, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), &name)?;
            }
        }
    }

    for file in files {
        let name = file
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact has no file name"))?;
        builder.append_path_with_name(file, name)?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

/// Package a built image into `dist_dir/<package>.tar.gz` with its digest.
pub fn package(
    image: &Path,
    package: &str,
    dist_dir: &Path,
    template_dir: Option<&Path>,
) -> Result<BuildArtifact, BuildError> {
    let fail = |what: &str, e: io::Error| BuildError::PackagingFailed(format!("{}: {}", what, e));

    fs::create_dir_all(dist_dir).map_err(|e| fail("create dist dir", e))?;
    let compressed = compress_image(image).map_err(|e| fail("compress image", e))?;
    log::info!("[Package] Compressed image: {}", compressed.display());

    let archive = dist_dir.join(format!("{}.tar.gz", package));
    build_archive(&archive, template_dir, &[image, compressed.as_path()]).map_err(|e| fail("build archive", e))?;

    let sha256 = sha256_file(&archive).map_err(|e| fail("hash archive", e))?;
    let mut digest_name = archive.as_os_str().to_owned();
    digest_name.push(".sha256");
    let archive_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    fs::write(PathBuf::from(digest_name), format!("{}  {}\n", sha256, archive_name))
        .map_err(|e| fail("write digest", e))?;

    log::info!("[Package] {} sha256={}", archive.display(), sha256);
    Ok(BuildArtifact {
        image: image.to_path_buf(),
        compressed_image: compressed,
        archive,
        sha256,
    })
}

/// Values persisted for the release publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub kernel_version: String,
    pub toolchain: String,
    pub build_time: String,
    pub package_name: String,
    pub susfs_version: Option<String>,
    pub variant: String,
    pub out_dir: PathBuf,
    pub release_repo: Option<String>,
}

impl RunMetadata {
    pub fn now(
        kernel_version: String,
        toolchain: String,
        package_name: String,
        susfs_version: Option<String>,
        variant: String,
        out_dir: PathBuf,
        release_repo: Option<String>,
    ) -> Self {
        RunMetadata {
            kernel_version,
            toolchain,
            build_time: Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            package_name,
            susfs_version,
            variant,
            out_dir,
            release_repo,
        }
    }

    /// Flat `KEY=value` rendering. Optional keys are omitted when unset.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("KERNEL_VERSION={}", self.kernel_version),
            format!("TOOLCHAIN={}", self.toolchain),
            format!("BUILD_TIME={}", self.build_time),
            format!("PACKAGE_NAME={}", self.package_name),
        ];
        if let Some(version) = &self.susfs_version {
            lines.push(format!("SUSFS_VERSION={}", version));
        }
        lines.push(format!("VARIANT={}", self.variant));
        lines.push(format!("OUT_DIR={}", self.out_dir.display()));
        if let Some(repo) = &self.release_repo {
            lines.push(format!("RELEASE_REPO={}", repo));
        }
        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.render().as_bytes())
    }
}
