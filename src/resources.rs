//! Resource management for Lexis
//!
//! Locates, checks and downloads the NLP model and dictionary. Everything
//! lives under one resource directory so tests and packaged builds can
//! point it elsewhere with `LEXIS_RESOURCE_DIR`.

use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Base URL for HuggingFace model downloads
const HUGGINGFACE_BASE: &str = "https://huggingface.co";

/// GLiNER model repository on HuggingFace
const GLINER_REPO: &str = "onnx-community/gliner_large-v2.1";

const SYMSPELL_DICT_FILE: &str = "frequency_dictionary_en_82_765.txt";

/// SymSpell dictionary URL
const SYMSPELL_DICT_URL: &str =
    "https://raw.githubusercontent.com/wolfgarbe/SymSpell/master/SymSpell/frequency_dictionary_en_82_765.txt";

pub const RESOURCE_DIR_ENV: &str = "LEXIS_RESOURCE_DIR";

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Serialize for ResourceError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Resource download status
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    AlreadyExists,
    Downloading { file: String, progress: u64, total: u64 },
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub gliner_available: bool,
    pub gliner_path: PathBuf,
    pub symspell_available: bool,
    pub symspell_path: PathBuf,
}

impl ResourceStatus {
    pub fn all_available(&self) -> bool {
        self.gliner_available && self.symspell_available
    }
}

/// Where the model and dictionary live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    root: PathBuf,
}

impl ResourcePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$LEXIS_RESOURCE_DIR`, else the platform data directory.
    pub fn from_env() -> Self {
        match std::env::var_os(RESOURCE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("lexis")
                    .join("resources"),
            ),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// GLiNER model directory
    pub fn gliner_dir(&self) -> PathBuf {
        self.root.join("gliner")
    }

    pub fn symspell_dict(&self) -> PathBuf {
        self.root.join("symspell").join(SYMSPELL_DICT_FILE)
    }

    pub fn is_gliner_available(&self) -> bool {
        let dir = self.gliner_dir();
        dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists()
    }

    pub fn is_symspell_available(&self) -> bool {
        self.symspell_dict().exists()
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus {
            gliner_available: self.is_gliner_available(),
            gliner_path: self.gliner_dir(),
            symspell_available: self.is_symspell_available(),
            symspell_path: self.symspell_dict(),
        }
    }

    /// Download whichever GLiNER files are missing. Returns the model directory.
    pub fn ensure_gliner_model<F>(&self, on_progress: F) -> Result<PathBuf, ResourceError>
    where
        F: Fn(DownloadStatus),
    {
        let model_dir = self.gliner_dir();
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if model_path.exists() && tokenizer_path.exists() {
            on_progress(DownloadStatus::AlreadyExists);
            return Ok(model_dir);
        }
        create_dir(&model_dir)?;

        // Tokenizer first, it is small
        if !tokenizer_path.exists() {
            let url = format!("{}/{}/resolve/main/tokenizer.json", HUGGINGFACE_BASE, GLINER_REPO);
            tracing::info!("Downloading GLiNER tokenizer from {}", url);
            download_file(&url, &tokenizer_path, |progress, total| {
                on_progress(DownloadStatus::Downloading {
                    file: "tokenizer.json".to_string(),
                    progress,
                    total,
                })
            })?;
        }

        if !model_path.exists() {
            let url = format!("{}/{}/resolve/main/onnx/model.onnx", HUGGINGFACE_BASE, GLINER_REPO);
            tracing::info!("Downloading GLiNER model from {} (~650MB)", url);
            download_file(&url, &model_path, |progress, total| {
                on_progress(DownloadStatus::Downloading {
                    file: "model.onnx".to_string(),
                    progress,
                    total,
                })
            })?;
        }

        on_progress(DownloadStatus::Completed);
        tracing::info!("GLiNER model ready in {}", model_dir.display());
        Ok(model_dir)
    }

    /// Download the SymSpell dictionary if missing. Returns its path.
    pub fn ensure_symspell_dict<F>(&self, on_progress: F) -> Result<PathBuf, ResourceError>
    where
        F: Fn(DownloadStatus),
    {
        let dict_path = self.symspell_dict();
        if dict_path.exists() {
            on_progress(DownloadStatus::AlreadyExists);
            return Ok(dict_path);
        }
        if let Some(dir) = dict_path.parent() {
            create_dir(dir)?;
        }

        tracing::info!("Downloading SymSpell dictionary from {}", SYMSPELL_DICT_URL);
        download_file(SYMSPELL_DICT_URL, &dict_path, |progress, total| {
            on_progress(DownloadStatus::Downloading {
                file: SYMSPELL_DICT_FILE.to_string(),
                progress,
                total,
            })
        })?;

        on_progress(DownloadStatus::Completed);
        tracing::info!("SymSpell dictionary ready at {}", dict_path.display());
        Ok(dict_path)
    }
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self::from_env()
    }
}

fn create_dir(path: &Path) -> Result<(), ResourceError> {
    fs::create_dir_all(path).map_err(|source| ResourceError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Download a file with progress tracking
fn download_file<F>(url: &str, dest: &Path, on_progress: F) -> Result<(), ResourceError>
where
    F: Fn(u64, u64),
{
    let response = ureq::get(url).call().map_err(|e| ResourceError::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let total_size = response
        .header("content-length")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    save_stream(url, &mut response.into_reader(), total_size, dest, on_progress)
}

/// Stream `reader` into `dest` through a `.download` file that is removed
/// again if the transfer fails, so partial downloads never land at `dest`.
fn save_stream<R, F>(url: &str, reader: &mut R, total: u64, dest: &Path, on_progress: F) -> Result<(), ResourceError>
where
    R: Read + ?Sized,
    F: Fn(u64, u64),
{
    let temp_path = dest.with_extension("download");
    let written = write_partial(url, reader, total, &temp_path, &on_progress);
    if let Err(err) = written {
        if let Err(e) = fs::remove_file(&temp_path) {
            tracing::warn!("Could not remove {}: {}", temp_path.display(), e);
        }
        return Err(err);
    }

    fs::rename(&temp_path, dest).map_err(|source| ResourceError::Write {
        path: dest.to_path_buf(),
        source,
    })
}

fn write_partial<R, F>(url: &str, reader: &mut R, total: u64, temp_path: &Path, on_progress: &F) -> Result<(), ResourceError>
where
    R: Read + ?Sized,
    F: Fn(u64, u64),
{
    let write_err = |source| ResourceError::Write {
        path: temp_path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;
    copy_with_progress(reader, &mut file, total, on_progress).map_err(|e| ResourceError::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    file.flush().map_err(write_err)
}

/// Copy `reader` to `writer`, reporting at most every 100 ms plus once at the end.
fn copy_with_progress<R, W, F>(reader: &mut R, writer: &mut W, total: u64, on_progress: &F) -> std::io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: Fn(u64, u64),
{
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 8192];
    let mut last_update = Instant::now();

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;

        if last_update.elapsed() >= PROGRESS_INTERVAL {
            on_progress(downloaded, total);
            last_update = Instant::now();
        }
    }

    on_progress(downloaded, total);
    Ok(downloaded)
}
