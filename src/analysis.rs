use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::aggregator::{AggregatedResult, KeyFinderAggregator};
use crate::segments::{self, SEGMENT_EXTENSIONS, SegmentError};
use crate::trellis::Modulation;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Segment file error: {0}")]
    Segments(#[from] SegmentError),
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detected keys for one segment file.
#[derive(Debug, Clone, Serialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    /// Segments in the file, rests included.
    pub segments: usize,
    /// Segments that advanced the trellis.
    pub sounding: usize,
    pub result: AggregatedResult,
    pub modulations: Vec<Modulation>,
}

pub struct BatchResult {
    pub analyses: Vec<FileAnalysis>,
    pub failed: u64,
}

/// Expand the given paths into segment files. Directories are walked
/// recursively for known extensions; plain files are taken as-is.
pub fn collect_segment_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, AnalyzeError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.exists() {
            return Err(AnalyzeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if SEGMENT_EXTENSIONS.contains(&ext.as_str()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Run a fresh copy of `template` over every segment of one file.
pub fn analyze_file(
    path: &Path,
    template: &KeyFinderAggregator,
) -> Result<FileAnalysis, AnalyzeError> {
    let segments = segments::load_segments(path)?;
    let mut aggregator = template.clone();
    for durations in &segments {
        aggregator.insert(durations);
    }

    let result = aggregator.results();
    let modulations = aggregator.modulations(&result);
    log::debug!(
        "{}: {} ({}/{} profiles agree)",
        path.display(),
        crate::key::describe(&result.winner),
        result.agreement(),
        result.votes.len()
    );

    Ok(FileAnalysis {
        path: path.to_path_buf(),
        segments: segments.len(),
        sounding: aggregator.segments(),
        result,
        modulations,
    })
}

/// Analyze files in parallel on a pool of `jobs` threads. Files that fail to
/// load are logged and counted, not fatal. Results keep the input order.
pub fn analyze_files(
    paths: &[PathBuf],
    template: &KeyFinderAggregator,
    jobs: usize,
) -> Result<BatchResult, AnalyzeError> {
    if paths.is_empty() {
        log::info!("No segment files to analyze");
        return Ok(BatchResult {
            analyses: Vec::new(),
            failed: 0,
        });
    }

    log::info!("Analyzing {} files with {} workers", paths.len(), jobs);

    let pb = ProgressBar::new(paths.len() as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let results: Vec<_> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let result = analyze_file(path, template);
                pb.inc(1);
                (path, result)
            })
            .collect()
    });

    let mut analyses = Vec::with_capacity(results.len());
    let mut failed: u64 = 0;
    for (path, result) in results {
        match result {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => {
                log::warn!("Analysis failed for {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    pb.finish_with_message(format!("Done: {} analyzed, {} failed", analyses.len(), failed));

    Ok(BatchResult { analyses, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::profiles::ProfileRegistry;
    use crate::trellis::FinderSettings;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keytrellis-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn template() -> KeyFinderAggregator {
        let profiles = ProfileRegistry::builtin().select::<&str>(&[]).unwrap();
        KeyFinderAggregator::new(profiles, FinderSettings::new(0.8, 0.3, true)).unwrap()
    }

    #[test]
    fn test_collect_and_analyze() {
        let dir = scratch_dir("batch");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(
            dir.join("c_major.txt"),
            "1 0 0 0 1 0 0 1 0 0 0 0\n0 0 0 0 0 0 0 0 0 0 0 0\n1 0 0 0 1 0 0 1 0 0 0 0\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("nested").join("a_minor.json"),
            "[[1,0,0,0,1,0,0,0,0,1,0,0],[1,0,0,0,1,0,0,0,0,1,0,0]]",
        )
        .unwrap();
        std::fs::write(dir.join("broken.csv"), "1, 2, 3\n").unwrap();
        std::fs::write(dir.join("notes.md"), "ignored").unwrap();

        let files = collect_segment_files(&[dir.clone()]).unwrap();
        assert_eq!(files.len(), 3);

        let batch = analyze_files(&files, &template(), 2).unwrap();
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.analyses.len(), 2);

        let c_major = batch
            .analyses
            .iter()
            .find(|a| a.path.ends_with("c_major.txt"))
            .unwrap();
        assert_eq!(c_major.segments, 3);
        assert_eq!(c_major.sounding, 2);
        assert_eq!(
            c_major.result.winner.iter().copied().collect::<Vec<_>>(),
            vec![Key::new(0).unwrap()]
        );

        let a_minor = batch
            .analyses
            .iter()
            .find(|a| a.path.ends_with("a_minor.json"))
            .unwrap();
        assert_eq!(
            a_minor.result.winner.iter().copied().collect::<Vec<_>>(),
            vec![Key::new(21).unwrap()]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_path() {
        let missing = std::env::temp_dir().join("keytrellis-definitely-missing");
        assert!(collect_segment_files(&[missing]).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let batch = analyze_files(&[], &template(), 1).unwrap();
        assert!(batch.analyses.is_empty());
        assert_eq!(batch.failed, 0);
    }
}
