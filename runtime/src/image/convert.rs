//! Docker archive conversion.
//!
//! Turns a `docker save` tarball into native image tarballs. A docker
//! archive looks like:
//!
//! ```text
//! busybox.tar
//! ├── manifest.json          [{"Config": "...", "RepoTags": [...], "Layers": [...]}]
//! ├── <config>.json          (image configuration)
//! └── <layer>/layer.tar      (one tar per layer, optionally gzipped)
//! ```
//!
//! A squashed conversion produces one tar per image:
//!
//! ```text
//! <name>-<tag>.image.tar
//! ├── manifest               (JSON: name, tag, source config and layers)
//! └── rootfs/...             (all layers applied in order, whiteouts honoured)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use depot_core::error::{DepotError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, EntryType, Header};

/// Prefix marking a deleted path in a layer.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker hiding every lower-layer entry of its directory.
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Output compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    fn extension(&self) -> &'static str {
        match self {
            Compression::None => "tar",
            Compression::Gzip => "tar.gz",
        }
    }
}

/// Conversion parameters.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Flatten all layers into a single image
    pub squash: bool,
    /// Compression of the produced artifacts
    pub compression: Compression,
    /// Where artifacts are written
    pub output_dir: PathBuf,
    /// Scratch space for intermediate files
    pub tmp_dir: PathBuf,
}

/// Converts a foreign image archive into native image artifacts.
pub trait ArchiveConverter: Send + Sync {
    /// Convert `archive`, returning the produced artifacts in order.
    fn convert(&self, archive: &Path, config: &ConvertConfig) -> Result<Vec<PathBuf>>;
}

/// One entry of a docker archive's `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveManifest {
    config: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    layers: Vec<String>,
}

/// `manifest` entry written at the top of a squashed image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    pub name: String,
    pub tag: String,
    /// Config file name inside the source archive
    pub source_config: String,
    /// Layer paths inside the source archive, bottom to top
    pub source_layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Runtime configuration copied from the docker image config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Converter for `docker save` archives.
#[derive(Debug, Default, Clone)]
pub struct DockerSaveConverter;

impl DockerSaveConverter {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveConverter for DockerSaveConverter {
    fn convert(&self, archive: &Path, config: &ConvertConfig) -> Result<Vec<PathBuf>> {
        let unpacked = tempfile::Builder::new()
            .prefix("archive-")
            .tempdir_in(&config.tmp_dir)
            .map_err(|e| conversion_error(archive, format!("cannot create scratch dir: {e}")))?;

        let file = File::open(archive)
            .map_err(|e| conversion_error(archive, format!("cannot open archive: {e}")))?;
        Archive::new(BufReader::new(file))
            .unpack(unpacked.path())
            .map_err(|e| conversion_error(archive, format!("cannot unpack archive: {e}")))?;

        let manifest_path = unpacked.path().join("manifest.json");
        let data = std::fs::read_to_string(&manifest_path)
            .map_err(|e| conversion_error(archive, format!("missing manifest.json: {e}")))?;
        let manifests: Vec<ArchiveManifest> = serde_json::from_str(&data)
            .map_err(|e| conversion_error(archive, format!("invalid manifest.json: {e}")))?;

        let mut artifacts = Vec::new();
        let mut stems = BTreeSet::new();
        for (idx, manifest) in manifests.iter().enumerate() {
            let mut source = SourceImage::load(archive, unpacked.path(), manifest)?;
            // Repeated name:tag entries must not overwrite each other
            if !stems.insert(source.stem.clone()) {
                source.stem = format!("{}-{idx}", source.stem);
                stems.insert(source.stem.clone());
            }
            if config.squash {
                artifacts.push(source.write_squashed(config)?);
            } else {
                artifacts.extend(source.write_layers(config)?);
            }
        }

        tracing::debug!(
            archive = %archive.display(),
            images = manifests.len(),
            artifacts = artifacts.len(),
            "Converted docker archive"
        );

        Ok(artifacts)
    }
}

/// One image of an unpacked docker archive.
struct SourceImage<'a> {
    archive: &'a Path,
    manifest: &'a ArchiveManifest,
    name: String,
    tag: String,
    /// Artifact file name stem, unique within one conversion
    stem: String,
    layers: Vec<PathBuf>,
    image_config: serde_json::Value,
}

impl<'a> SourceImage<'a> {
    fn load(archive: &'a Path, root: &Path, manifest: &'a ArchiveManifest) -> Result<Self> {
        let (name, tag) = image_name(manifest);

        let layers = manifest
            .layers
            .iter()
            .map(|layer| {
                safe_relative(layer)
                    .map(|rel| root.join(rel))
                    .ok_or_else(|| conversion_error(archive, format!("bad layer path {layer:?}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let config_path = safe_relative(&manifest.config)
            .map(|rel| root.join(rel))
            .ok_or_else(|| {
                conversion_error(archive, format!("bad config path {:?}", manifest.config))
            })?;
        let image_config: serde_json::Value = std::fs::read_to_string(&config_path)
            .map_err(|e| conversion_error(archive, format!("missing image config: {e}")))
            .and_then(|data| {
                serde_json::from_str(&data)
                    .map_err(|e| conversion_error(archive, format!("invalid image config: {e}")))
            })?;

        let stem = format!("{}-{}", sanitize(&name), sanitize(&tag));
        Ok(Self {
            archive,
            manifest,
            name,
            tag,
            stem,
            layers,
            image_config,
        })
    }

    fn output_path(&self, config: &ConvertConfig, suffix: &str) -> PathBuf {
        config.output_dir.join(format!(
            "{}{}.{}",
            self.stem,
            suffix,
            config.compression.extension()
        ))
    }

    /// Flatten all layers into one image tarball.
    fn write_squashed(&self, config: &ConvertConfig) -> Result<PathBuf> {
        let owners = self.resolve_owners()?;
        let output = self.output_path(config, ".image");

        let manifest = ImageManifest {
            name: self.name.clone(),
            tag: self.tag.clone(),
            source_config: self.manifest.config.clone(),
            source_layers: self.manifest.layers.clone(),
            architecture: self.image_config["architecture"].as_str().map(String::from),
            os: self.image_config["os"].as_str().map(String::from),
            config: self.image_config.get("config").cloned(),
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

        let write = || -> std::io::Result<()> {
            let mut builder = Builder::new(open_output(&output, config.compression)?);

            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(manifest_bytes.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, "manifest", manifest_bytes.as_slice())?;

            for (idx, layer) in self.layers.iter().enumerate() {
                let mut archive = Archive::new(open_layer(layer)?);
                for entry in archive.entries()? {
                    let mut entry = entry?;
                    let Some(path) = layer_entry_path(&entry)? else {
                        continue;
                    };
                    if is_whiteout(&path) || owners.get(&path) != Some(&idx) {
                        continue;
                    }
                    append_entry(&mut builder, &mut entry, &Path::new("rootfs").join(&path))?;
                }
            }

            builder.into_inner()?.finish()
        };
        write().map_err(|e| {
            conversion_error(self.archive, format!("cannot write {}: {e}", output.display()))
        })?;

        Ok(output)
    }

    /// Re-emit each layer as its own artifact.
    fn write_layers(&self, config: &ConvertConfig) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::with_capacity(self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate() {
            let output = self.output_path(config, &format!("-{idx}.layer"));
            let copy = || -> std::io::Result<()> {
                let mut out = open_output(&output, config.compression)?;
                std::io::copy(&mut open_layer(layer)?, &mut out)?;
                out.finish()
            };
            copy().map_err(|e| {
                conversion_error(self.archive, format!("cannot write {}: {e}", output.display()))
            })?;
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Decide which layer provides each path of the flattened filesystem.
    ///
    /// Whiteouts in a layer only hide entries of lower layers.
    fn resolve_owners(&self) -> Result<BTreeMap<PathBuf, usize>> {
        let mut owners: BTreeMap<PathBuf, usize> = BTreeMap::new();

        for (idx, layer) in self.layers.iter().enumerate() {
            let mut additions = Vec::new();
            let mut removals = Vec::new();
            let mut opaque_dirs = Vec::new();

            let mut scan = || -> std::io::Result<()> {
                let mut archive = Archive::new(open_layer(layer)?);
                for entry in archive.entries()? {
                    let entry = entry?;
                    let Some(path) = layer_entry_path(&entry)? else {
                        continue;
                    };
                    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    if file_name == OPAQUE_WHITEOUT {
                        opaque_dirs.push(parent);
                    } else if let Some(hidden) = file_name.strip_prefix(WHITEOUT_PREFIX) {
                        removals.push(parent.join(hidden));
                    } else {
                        additions.push(path);
                    }
                }
                Ok(())
            };
            scan().map_err(|e| {
                conversion_error(
                    self.archive,
                    format!("cannot read layer {}: {e}", layer.display()),
                )
            })?;

            for dir in &opaque_dirs {
                owners.retain(|p, _| p == dir || !p.starts_with(dir));
            }
            for removed in &removals {
                owners.retain(|p, _| !p.starts_with(removed));
            }
            for path in additions {
                owners.insert(path, idx);
            }

            tracing::debug!(
                layer = %layer.display(),
                opaque = opaque_dirs.len(),
                whiteouts = removals.len(),
                "Scanned layer"
            );
        }

        Ok(owners)
    }
}

/// Output writer, optionally gzip-compressed.
enum Output {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl Output {
    fn finish(self) -> std::io::Result<()> {
        match self {
            Output::Plain(file) => file.sync_all(),
            Output::Gzip(encoder) => encoder.finish()?.sync_all(),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Output::Plain(file) => file.write(buf),
            Output::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Output::Plain(file) => file.flush(),
            Output::Gzip(encoder) => encoder.flush(),
        }
    }
}

fn open_output(path: &Path, compression: Compression) -> std::io::Result<Output> {
    let file = File::create(path)?;
    Ok(match compression {
        Compression::None => Output::Plain(file),
        Compression::Gzip => Output::Gzip(GzEncoder::new(file, flate2::Compression::default())),
    })
}

/// Open a layer tar, transparently decompressing gzip.
fn open_layer(path: &Path) -> std::io::Result<Box<dyn Read>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let is_gzip = file.read(&mut magic)? == 2 && magic == [0x1f, 0x8b];
    file.seek(SeekFrom::Start(0))?;

    let reader = BufReader::new(file);
    Ok(if is_gzip {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    })
}

/// Normalized path of a layer entry, or `None` for entries to skip.
fn layer_entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> std::io::Result<Option<PathBuf>> {
    match entry.header().entry_type() {
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName
        | EntryType::GNULongLink => return Ok(None),
        _ => {}
    }
    let raw = entry.path()?;
    let path = raw.to_string_lossy();
    let path = safe_relative(&path);
    if path.is_none() {
        tracing::warn!(path = %raw.display(), "Skipping layer entry outside the rootfs");
    }
    Ok(path.filter(|p| !p.as_os_str().is_empty()))
}

fn append_entry<R: Read>(
    builder: &mut Builder<Output>,
    entry: &mut tar::Entry<'_, R>,
    path: &Path,
) -> std::io::Result<()> {
    let mut header = entry.header().clone();
    match header.entry_type() {
        EntryType::Symlink | EntryType::Link => {
            let target = entry
                .link_name()?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            // Hard links point inside the archive, so they move with it
            let target = if header.entry_type() == EntryType::Link {
                safe_relative(&target.to_string_lossy())
                    .map(|t| Path::new("rootfs").join(t))
                    .unwrap_or(target)
            } else {
                target
            };
            builder.append_link(&mut header, path, target)
        }
        _ => builder.append_data(&mut header, path, entry),
    }
}

fn is_whiteout(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(WHITEOUT_PREFIX))
}

/// Strip `./` and leading `/`, rejecting any `..` component.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Name and tag from the first repo tag, e.g. `busybox:latest`.
fn image_name(manifest: &ArchiveManifest) -> (String, String) {
    let repo_tag = manifest
        .repo_tags
        .as_ref()
        .and_then(|tags| tags.first())
        .cloned();

    match repo_tag {
        Some(repo_tag) => {
            // The tag follows the last colon after the last slash
            let slash = repo_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
            match repo_tag[slash..].rfind(':') {
                Some(colon) => (
                    repo_tag[..slash + colon].to_string(),
                    repo_tag[slash + colon + 1..].to_string(),
                ),
                None => (repo_tag, "latest".to_string()),
            }
        }
        None => {
            let stem = Path::new(&manifest.config)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown");
            let short: String = stem.chars().take(12).collect();
            (format!("image-{short}"), "latest".to_string())
        }
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect()
}

fn conversion_error(archive: &Path, message: String) -> DepotError {
    DepotError::Conversion {
        path: archive.display().to_string(),
        message,
    }
}
