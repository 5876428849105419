// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Background waveform analysis.
//!
//! Analysis never runs on the caller's thread. A request either returns the cached result right
//! away or a handle that resolves once a worker has finished. At most one job runs per track.

mod beatgrid;

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use hound::{SampleFormat, WavReader};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, span, Level};

pub use beatgrid::{estimate_beatgrid, Beatgrid};

/// Frames summarized by each peak/RMS point.
pub const DEFAULT_WINDOW_FRAMES: usize = 1024;

const SUMMARY_FILE: &str = "waveform.json";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid track id {0:?}")]
    InvalidTrackId(String),

    #[error("unable to start analysis workers: {0}")]
    Pool(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unable to encode analysis for {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("analysis job ended without a result")]
    Cancelled,
}

/// A coarse picture of a track's loudness over time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WaveformSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_frames: u64,
    pub window_frames: usize,
    /// Absolute peak per window across all channels.
    pub peaks: Vec<f32>,
    /// RMS per window across all channels.
    pub rms: Vec<f32>,
}

impl WaveformSummary {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / f64::from(self.sample_rate)
    }
}

/// The cached artifacts for a track.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisResult {
    pub track_id: String,
    pub source: PathBuf,
    pub summary: WaveformSummary,
    /// None when no steady pulse was found.
    #[serde(default)]
    pub beatgrid: Option<Beatgrid>,
}

pub type AnalysisOutcome = Result<Arc<AnalysisResult>, Arc<AnalysisError>>;

/// The answer to an analysis request.
#[derive(Debug, Clone)]
pub enum AnalysisHandle {
    Ready(Arc<AnalysisResult>),
    Pending(watch::Receiver<Option<AnalysisOutcome>>),
}

impl AnalysisHandle {
    /// The outcome if it's known. Never blocks, so it's safe to call from the audio thread.
    pub fn try_get(&self) -> Option<AnalysisOutcome> {
        match self {
            AnalysisHandle::Ready(result) => Some(Ok(result.clone())),
            AnalysisHandle::Pending(receiver) => receiver.borrow().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.try_get().is_some()
    }

    /// Waits for the outcome. Not for use on the audio thread.
    pub async fn wait(self) -> AnalysisOutcome {
        match self {
            AnalysisHandle::Ready(result) => Ok(result),
            AnalysisHandle::Pending(mut receiver) => {
                match receiver.wait_for(|outcome| outcome.is_some()).await {
                    Ok(outcome) => outcome
                        .clone()
                        .unwrap_or_else(|| Err(Arc::new(AnalysisError::Cancelled))),
                    Err(_) => Err(Arc::new(AnalysisError::Cancelled)),
                }
            }
        }
    }
}

type InFlight = Arc<Mutex<HashMap<String, watch::Receiver<Option<AnalysisOutcome>>>>>;

/// Runs analysis jobs on a dedicated worker pool and caches their results on disk.
pub struct AnalysisJobs {
    cache_dir: PathBuf,
    window_frames: usize,
    pool: rayon::ThreadPool,
    in_flight: InFlight,
}

impl AnalysisJobs {
    pub fn new(cache_dir: &Path, workers: usize) -> Result<AnalysisJobs, AnalysisError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("deckhand-analysis-{i}"))
            .build()
            .map_err(|e| AnalysisError::Pool(e.to_string()))?;

        Ok(AnalysisJobs {
            cache_dir: cache_dir.to_path_buf(),
            window_frames: DEFAULT_WINDOW_FRAMES,
            pool,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_window_frames(mut self, window_frames: usize) -> AnalysisJobs {
        self.window_frames = window_frames.max(1);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The number of jobs that haven't finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Requests analysis of a track. Returns the cached result if there is one, joins the job
    /// already running for the track if there is one, and otherwise starts a new job.
    pub fn request(&self, track_id: &str, audio_path: &Path) -> Result<AnalysisHandle, AnalysisError> {
        validate_track_id(track_id)?;

        if let Some(cached) = load_cached(&self.cache_dir, track_id) {
            debug!(track_id, "Analysis cache hit");
            return Ok(AnalysisHandle::Ready(Arc::new(cached)));
        }

        let mut in_flight = self.in_flight.lock();
        if let Some(receiver) = in_flight.get(track_id) {
            debug!(track_id, "Joining running analysis");
            return Ok(AnalysisHandle::Pending(receiver.clone()));
        }

        let (sender, receiver) = watch::channel(None);
        in_flight.insert(track_id.to_string(), receiver.clone());

        let cache_dir = self.cache_dir.clone();
        let window_frames = self.window_frames;
        let jobs = self.in_flight.clone();
        let track_id = track_id.to_string();
        let audio_path = audio_path.to_path_buf();
        info!(track_id = %track_id, path = %audio_path.display(), "Starting analysis");
        self.pool.spawn(move || {
            let span = span!(Level::INFO, "analysis", track_id = %track_id);
            let _enter = span.enter();

            let outcome = run_analysis(&cache_dir, &track_id, &audio_path, window_frames)
                .map(Arc::new)
                .map_err(|e| {
                    error!(err = %e, "Analysis failed");
                    Arc::new(e)
                });
            jobs.lock().remove(&track_id);
            // Nobody may be listening any more, which is fine.
            let _ = sender.send(Some(outcome));
        });

        Ok(AnalysisHandle::Pending(receiver))
    }
}

impl std::fmt::Debug for AnalysisJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisJobs")
            .field("cache_dir", &self.cache_dir)
            .field("window_frames", &self.window_frames)
            .field("workers", &self.pool.current_num_threads())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Track ids name cache directories, so they must not escape the cache.
fn validate_track_id(track_id: &str) -> Result<(), AnalysisError> {
    let valid = !track_id.is_empty()
        && track_id != "."
        && track_id != ".."
        && !track_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(AnalysisError::InvalidTrackId(track_id.to_string()))
    }
}

fn summary_path(cache_dir: &Path, track_id: &str) -> PathBuf {
    cache_dir.join(track_id).join(SUMMARY_FILE)
}

/// Unreadable or stale cache entries are treated as misses.
fn load_cached(cache_dir: &Path, track_id: &str) -> Option<AnalysisResult> {
    let path = summary_path(cache_dir, track_id);
    let contents = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<AnalysisResult>(&contents) {
        Ok(result) if result.track_id == track_id => Some(result),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %path.display(), err = %e, "Ignoring unreadable analysis cache");
            None
        }
    }
}

fn run_analysis(
    cache_dir: &Path,
    track_id: &str,
    audio_path: &Path,
    window_frames: usize,
) -> Result<AnalysisResult, AnalysisError> {
    let audio = decode(audio_path)?;
    let result = AnalysisResult {
        track_id: track_id.to_string(),
        source: audio_path.to_path_buf(),
        summary: audio.summarize(window_frames),
        beatgrid: estimate_beatgrid(&audio.samples, audio.channels, audio.sample_rate),
    };

    let path = summary_path(cache_dir, track_id);
    let json = serde_json::to_string(&result).map_err(|source| AnalysisError::Json {
        path: path.clone(),
        source,
    })?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| AnalysisError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, json).map_err(|source| AnalysisError::Io {
        path: path.clone(),
        source,
    })?;

    info!(
        frames = result.summary.total_frames,
        windows = result.summary.peaks.len(),
        bpm = result.beatgrid.map(|grid| grid.bpm),
        "Analysis complete"
    );
    Ok(result)
}

/// Interleaved samples decoded from a WAV file, scaled to [-1, 1].
struct DecodedAudio {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl DecodedAudio {
    fn summarize(&self, window_frames: usize) -> WaveformSummary {
        let channels = usize::from(self.channels.max(1));
        let window_samples = window_frames.max(1) * channels;
        let (peaks, rms): (Vec<f32>, Vec<f32>) = self
            .samples
            .chunks(window_samples)
            .map(|window| {
                let peak = window.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
                let sum_squares: f32 = window.iter().map(|s| s * s).sum();
                (peak, (sum_squares / window.len() as f32).sqrt())
            })
            .unzip();

        WaveformSummary {
            sample_rate: self.sample_rate,
            channels: self.channels,
            total_frames: (self.samples.len() / channels) as u64,
            window_frames: window_frames.max(1),
            peaks,
            rms,
        }
    }
}

fn decode(path: &Path) -> Result<DecodedAudio, AnalysisError> {
    let decode_error = |source| AnalysisError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let reader = WavReader::open(path).map_err(decode_error)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_error)?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(decode_error)?
        }
    };

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Reads a WAV file and computes peak and RMS levels per window.
pub fn summarize(path: &Path, window_frames: usize) -> Result<WaveformSummary, AnalysisError> {
    Ok(decode(path)?.summarize(window_frames))
}
