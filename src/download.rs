use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;
use tokio::io::AsyncWriteExt;

use crate::config::AppConfig;

/// Files that must be present in a converted CTranslate2 model directory.
const REQUIRED_FILES: [&str; 4] = [
    "model.bin",
    "config.json",
    "tokenizer.json",
    "preprocessor_config.json",
];

/// Model cache directory, created on first use.
fn get_models_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME").context("Failed to get HOME directory")?;
    let models_dir = PathBuf::from(format!("{}/.cache/nitido/models", home_dir));

    if !models_dir.exists() {
        info!("creating models directory: {:?}", models_dir);
        fs::create_dir_all(&models_dir).context("Failed to create models directory")?;
    }

    Ok(models_dir)
}

/// Checks that a converted model directory has everything the engine needs.
fn is_model_complete(model_dir: &Path) -> bool {
    for file in REQUIRED_FILES.iter() {
        let file_path = model_dir.join(file);
        if !file_path.exists() {
            debug!("model incomplete, missing {:?}", file_path);
            return false;
        }
    }
    true
}

/// Streams a file from `url` to `output_path`, downloading to a temp file
/// first so an interrupted run never leaves a half-written model behind.
pub async fn download_file(url: &str, output_path: &Path) -> Result<()> {
    info!("downloading {url}");

    if let Some(parent) = output_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = output_path.with_extension("downloading");

    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to download file from {url}"))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Failed to download file, status: {}",
            response.status()
        ));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .with_context(|| format!("Failed to create file at {temp_path:?}"))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(item) = stream.next().await {
        let chunk = item.context("Error while downloading file")?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }

    if total_size > 0 {
        info!("download complete: {downloaded}/{total_size} bytes");
    } else {
        info!("download complete: {downloaded} bytes");
    }

    drop(file);
    fs::rename(&temp_path, output_path)
        .with_context(|| format!("Failed to move {temp_path:?} to {output_path:?}"))?;

    Ok(())
}

/// Downloads a pre-converted model archive (.tar.gz) and unpacks it into
/// `model_dir`. The archive may contain the model files at its root or in a
/// single top-level directory.
async fn fetch_model_archive(url: &str, model_dir: &Path) -> Result<()> {
    let archive_path = PathBuf::from(format!("{}.tar.gz", model_dir.display()));
    download_file(url, &archive_path).await?;

    let extract_dir = PathBuf::from(format!("{}.extract", model_dir.display()));
    if extract_dir.exists() {
        fs::remove_dir_all(&extract_dir)?;
    }
    fs::create_dir_all(&extract_dir)?;

    info!("unpacking model archive to {:?}", extract_dir);
    let tar_gz = fs::File::open(&archive_path)?;
    let tar = GzDecoder::new(tar_gz);
    let mut archive = Archive::new(tar);
    archive
        .unpack(&extract_dir)
        .context("Failed to extract model archive")?;

    // locate the directory holding model.bin
    let model_root = if extract_dir.join("model.bin").exists() {
        extract_dir.clone()
    } else {
        let mut subdirs = fs::read_dir(&extract_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir());
        match (subdirs.next(), subdirs.next()) {
            (Some(only), None) if only.join("model.bin").exists() => only,
            _ => {
                let _ = fs::remove_dir_all(&extract_dir);
                return Err(anyhow::anyhow!(
                    "archive does not contain a CTranslate2 model directory"
                ));
            }
        }
    };

    if model_dir.exists() {
        fs::remove_dir_all(model_dir)?;
    }
    fs::rename(&model_root, model_dir)
        .with_context(|| format!("Failed to move extracted model into {model_dir:?}"))?;

    if model_root != extract_dir {
        let _ = fs::remove_dir_all(&extract_dir);
    }
    let _ = fs::remove_file(&archive_path);

    Ok(())
}

/// Converts a HuggingFace Whisper model locally with
/// `ct2-transformers-converter`.
fn convert_model(model_name: &str, output_dir: &Path) -> Result<()> {
    info!("converting model {} to {:?}", model_name, output_dir);

    if !output_dir.exists() {
        fs::create_dir_all(output_dir)?;
    }

    let conversion_script = format!(
        "ct2-transformers-converter --force --model {} --output_dir {} --copy_files preprocessor_config.json tokenizer.json",
        model_name,
        output_dir.display()
    );

    let status = Command::new("sh")
        .arg("-c")
        .arg(&conversion_script)
        .status()
        .context("Failed to run conversion command")?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "Model conversion failed with status: {}",
            status
        ));
    }

    info!("model conversion completed");
    Ok(())
}

/// Makes the configured Whisper model available in CTranslate2 format and
/// returns its directory. Tries, in order: the local cache, the configured
/// pre-converted archive, local conversion.
pub async fn init_model(config: &AppConfig) -> Result<PathBuf> {
    let model = config.model.as_str();
    info!("initializing Whisper model: {model}");

    let models_dir = get_models_dir()?;
    let model_name_simple = model.split('/').next_back().unwrap_or(model);
    let ct2_model_dir = models_dir.join(format!("{}-ct2", model_name_simple));

    if ct2_model_dir.exists() && is_model_complete(&ct2_model_dir) {
        info!("converted model already cached at {:?}", ct2_model_dir);
        return Ok(ct2_model_dir);
    }

    if let Some(url) = &config.model_archive_url {
        match fetch_model_archive(url, &ct2_model_dir).await {
            Ok(()) if is_model_complete(&ct2_model_dir) => {
                info!("model archive installed at {:?}", ct2_model_dir);
                return Ok(ct2_model_dir);
            }
            Ok(()) => warn!("downloaded archive is incomplete, falling back to conversion"),
            Err(e) => warn!("model archive download failed: {e}, falling back to conversion"),
        }
    }

    if let Err(e) = convert_model(model, &ct2_model_dir) {
        warn!("automatic conversion failed: {e}");
        info!("manual conversion instructions:");
        info!("1. Install required packages: pip install -U ctranslate2 huggingface_hub torch transformers");
        info!(
            "2. Run: ct2-transformers-converter --model {} --output_dir {} --copy_files preprocessor_config.json tokenizer.json",
            model,
            ct2_model_dir.display()
        );
        info!("3. Then run this application again");
        return Err(anyhow::anyhow!(
            "Model conversion failed. Please follow the manual instructions."
        ));
    }

    if !is_model_complete(&ct2_model_dir) {
        return Err(anyhow::anyhow!("Model conversion failed or is incomplete"));
    }

    info!("model initialized at {:?}", ct2_model_dir);
    Ok(ct2_model_dir)
}
