//! Scratch files for downloaded results.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::error::Result;

const FALLBACK_FILE_NAME: &str = "result.jsonl.gz";

/// Where a result URL is downloaded to, and where its decompressed copy goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
}

/// Derive scratch paths from the basename of the URL path (query string ignored).
pub fn scratch_paths(url: &str, dir: &Path) -> ScratchPaths {
    let name = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    let decompressed_name = match name.strip_suffix(".gz") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => format!("{}.jsonl", name),
    };

    ScratchPaths {
        compressed: dir.join(&name),
        decompressed: dir.join(decompressed_name),
    }
}

/// Gunzip `src` into `dst`, returning the decompressed size.
pub fn decompress_file(src: &Path, dst: &Path) -> Result<u64> {
    let input = BufReader::new(File::open(src)?);
    let mut decoder = MultiGzDecoder::new(input);
    let mut output = BufWriter::new(File::create(dst)?);

    let written = io::copy(&mut decoder, &mut output)?;
    output.flush()?;

    debug!(path = %dst.display(), bytes = written, "decompressed result");
    Ok(written)
}

/// Open a file with the user's editor, falling back to the platform opener.
///
/// Failures are reported as warnings only.
pub fn open_in_editor(path: &Path) {
    let mut command = match std::env::var("VISUAL").or_else(|_| std::env::var("EDITOR")) {
        Ok(editor) if !editor.trim().is_empty() => Command::new(editor.trim()),
        _ if cfg!(target_os = "macos") => {
            let mut cmd = Command::new("open");
            cmd.arg("-e");
            cmd
        }
        _ => Command::new("xdg-open"),
    };
    command.arg(path);

    match command.status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            warn!(path = %path.display(), %status, "editor exited unsuccessfully");
            eprintln!("Warning: failed to open file in editor: exit status {}", status);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not launch editor");
            eprintln!("Warning: failed to open file in editor: {}", e);
        }
    }
}
