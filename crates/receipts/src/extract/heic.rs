//! HEIC/HEIF to PNG conversion with a content-addressed cache.
//!
//! The cache directory is shared by every worker. A converted file only
//! enters it through a hard link (or a no-clobber persist of a copy when
//! linking is not possible), so readers never observe a half-written PNG and
//! an existing entry is never overwritten.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use crate::config::HeicConverter;
use crate::error::ExtractError;

use super::runner::CommandRunner;

/// Location of the conversion cache for one source file.
#[derive(Debug, Clone, Copy)]
pub struct HeicCache<'a> {
    pub dir: &'a Path,
    pub content_hash_hex: &'a str,
}

/// Path of the cached PNG for a content hash.
pub fn cached_png_path(dir: &Path, content_hash_hex: &str) -> PathBuf {
    dir.join(format!("{}.png", content_hash_hex))
}

/// A converted PNG. Temp conversions own their directory and are removed by
/// [`ConvertedImage::cleanup`] or on drop; cached ones are left in place.
#[derive(Debug)]
pub struct ConvertedImage {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl ConvertedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_cached(&self) -> bool {
        self.temp.is_none()
    }

    pub fn cleanup(self) -> io::Result<()> {
        match self.temp {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct HeicConverterTool {
    converter: HeicConverter,
    runner: Arc<dyn CommandRunner>,
}

impl HeicConverterTool {
    pub fn new(converter: HeicConverter, runner: Arc<dyn CommandRunner>) -> Self {
        Self { converter, runner }
    }

    /// Converts `source` to PNG, consulting and filling the cache when given.
    pub async fn convert(
        &self,
        source: &Path,
        cache: Option<HeicCache<'_>>,
    ) -> Result<ConvertedImage, ExtractError> {
        let Some(cache) = cache.filter(|c| !c.content_hash_hex.is_empty()) else {
            return self.convert_to_temp(source).await;
        };

        let cached = cached_png_path(cache.dir, cache.content_hash_hex);
        if is_file(&cached).await {
            debug!(hash = cache.content_hash_hex, "HEIC cache hit");
            return Ok(ConvertedImage {
                path: cached,
                temp: None,
            });
        }

        tokio::fs::create_dir_all(cache.dir)
            .await
            .map_err(|e| ExtractError::io(cache.dir, e))?;

        let staged = self.convert_to_temp(source).await?;
        if is_file(&cached).await {
            debug!(hash = cache.content_hash_hex, "HEIC cache filled concurrently");
            discard(staged);
            return Ok(ConvertedImage {
                path: cached,
                temp: None,
            });
        }

        let (to, dir) = (cached.clone(), cache.dir.to_path_buf());
        tokio::task::spawn_blocking(move || {
            let published = publish(staged.path(), &to, &dir);
            discard(staged);
            published
        })
        .await
        .map_err(|e| ExtractError::io(cache.dir, io::Error::other(e)))??;
        debug!(hash = cache.content_hash_hex, "HEIC conversion cached");

        Ok(ConvertedImage {
            path: cached,
            temp: None,
        })
    }

    async fn convert_to_temp(&self, source: &Path) -> Result<ConvertedImage, ExtractError> {
        let dir = tempfile::Builder::new()
            .prefix("receipts-heic-")
            .tempdir()
            .map_err(|e| ExtractError::io(std::env::temp_dir(), e))?;
        let out = dir.path().join("converted.png");

        let program = self.converter.program();
        self.runner.run(program, &self.args(source, &out)).await?;

        if !is_file(&out).await {
            return Err(ExtractError::MissingOutput {
                tool: program.to_string(),
                detail: format!("expected {}", out.display()),
            });
        }

        Ok(ConvertedImage {
            path: out,
            temp: Some(dir),
        })
    }

    fn args(&self, source: &Path, out: &Path) -> Vec<String> {
        let input = source.to_string_lossy().into_owned();
        let output = out.to_string_lossy().into_owned();
        match self.converter {
            HeicConverter::HeifConvert | HeicConverter::Magick => vec![input, output],
            HeicConverter::Sips => vec![
                "-s".to_string(),
                "format".to_string(),
                "png".to_string(),
                input,
                "--out".to_string(),
                output,
            ],
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Places a staged PNG in the cache without clobbering an existing entry.
///
/// An entry that appears first wins; the staged copy is left for its temp
/// dir to remove.
fn publish(staged: &Path, cached: &Path, cache_dir: &Path) -> Result<(), ExtractError> {
    let link_err = match std::fs::hard_link(staged, cached) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!("HEIC cache filled concurrently");
            return Ok(());
        }
        Err(e) => e,
    };
    debug!(error = %link_err, "linking into HEIC cache failed, copying instead");

    let mut sibling = NamedTempFile::new_in(cache_dir).map_err(|e| ExtractError::io(cache_dir, e))?;
    let mut staged_file = std::fs::File::open(staged).map_err(|e| ExtractError::io(staged, e))?;
    io::copy(&mut staged_file, sibling.as_file_mut()).map_err(|e| ExtractError::io(cached, e))?;

    match sibling.persist_noclobber(cached) {
        Ok(_) => {}
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!("HEIC cache filled concurrently during copy");
        }
        Err(e) => return Err(ExtractError::io(cached, e.error)),
    }
    Ok(())
}

fn discard(staged: ConvertedImage) {
    if let Err(e) = staged.cleanup() {
        warn!(error = %e, "failed to remove temporary HEIC conversion");
    }
}
