//! Synthesis dispatch: stage the clip, call the model once, write the WAV.

use crate::error::{Result, ServiceError};
use crate::model::ModelHandle;
use crate::scratch::{ScratchFile, ScratchSpace};
use crate::validate::SynthesisRequest;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A finished synthesis, ready to stream.
#[derive(Debug)]
pub struct SynthesisOutput {
    /// The WAV file. Deleted when dropped.
    pub file: ScratchFile,
    /// Sample rate written into the WAV header.
    pub sample_rate: u32,
    /// Number of samples written.
    pub samples: usize,
}

/// Runs generations on the blocking pool.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    scratch: ScratchSpace,
    permits: Option<Arc<Semaphore>>,
}

impl Synthesizer {
    /// `max_concurrent == 0` means no admission limit.
    pub fn new(scratch: ScratchSpace, max_concurrent: usize) -> Self {
        let permits = (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent)));
        Self { scratch, permits }
    }

    /// Generate speech for an already validated request.
    ///
    /// The staged clip and the output file are owned by the blocking task, so
    /// dropping this future (client gone) lets generation finish and still
    /// removes both files.
    ///
    /// # Errors
    ///
    /// [`ServiceError::GenerationFailed`] when the model fails,
    /// [`ServiceError::Io`] when scratch files cannot be written.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        handle: ModelHandle,
    ) -> Result<SynthesisOutput> {
        let permit = self.acquire().await?;
        let scratch = self.scratch.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_blocking(&scratch, &request, &handle)
        })
        .await
        .map_err(|e| ServiceError::GenerationFailed(format!("generation task failed: {e}")))?
    }

    async fn acquire(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match &self.permits {
            Some(permits) => Arc::clone(permits)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| ServiceError::GenerationFailed(e.to_string())),
            None => Ok(None),
        }
    }
}

fn run_blocking(
    scratch: &ScratchSpace,
    request: &SynthesisRequest,
    handle: &ModelHandle,
) -> Result<SynthesisOutput> {
    let input = scratch.stage_input(&request.audio)?;
    let call = request.generation_request(handle.model_type(), input.path().to_path_buf());

    let started = Instant::now();
    let samples = handle
        .generate(&call)
        .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;
    tracing::info!(
        model_type = %handle.model_type(),
        device = %handle.device(),
        samples = samples.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generation finished"
    );

    let output = scratch.reserve_output()?;
    write_wav(output.path(), &samples, handle.sample_rate())
        .map_err(|e| ServiceError::GenerationFailed(format!("failed to write wav: {e}")))?;

    Ok(SynthesisOutput {
        file: output,
        sample_rate: handle.sample_rate(),
        samples: samples.len(),
    })
}

/// Write mono `f32` samples as 16-bit PCM WAV.
///
/// # Errors
///
/// Returns the underlying [`hound::Error`].
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
) -> std::result::Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::device::Device;
    use crate::engine::EngineError;
    use crate::model::{GenerationRequest, ModelType, SpeechModel, VariantParams};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records calls; optionally fails.
    struct Recorder {
        calls: Mutex<Vec<GenerationRequest>>,
        fail: bool,
    }

    impl SpeechModel for Recorder {
        fn sample_rate(&self) -> u32 {
            22_050
        }

        fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<Vec<f32>, EngineError> {
            assert!(request.audio_prompt_path.exists(), "clip must be staged");
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                Err(EngineError::remote("simulated failure"))
            } else {
                Ok(vec![0.25; 2205])
            }
        }
    }

    fn setup(fail: bool) -> (tempfile::TempDir, Synthesizer, Arc<Recorder>) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap();
        let model = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
            fail,
        });
        (dir, Synthesizer::new(scratch, 0), model)
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn writes_wav_at_model_rate_and_removes_input() {
        let (dir, synth, model) = setup(false);
        let handle = ModelHandle::new(ModelType::Turbo, Device::Cpu, model.clone());
        let request = SynthesisRequest::new("Hello world", Bytes::from_static(b"RIFFdata"));

        let output = synth.synthesize(&request, handle).await.unwrap();
        assert_eq!(output.sample_rate, 22_050);
        assert_eq!(output.samples, 2205);
        // Only the output remains while it is alive.
        assert_eq!(file_count(dir.path()), 1);

        let reader = hound::WavReader::open(output.file.path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 2205);

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].variant, VariantParams::Turbo { top_k: 1000 });

        drop(calls);
        drop(output);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn failure_is_generation_failed_and_leaves_nothing() {
        let (dir, synth, model) = setup(true);
        let handle = ModelHandle::new(ModelType::Multilingual, Device::Cpu, model.clone());
        let mut request = SynthesisRequest::new("你好", Bytes::from_static(b"RIFF"));
        request.language = "zh".to_owned();

        let err = synth.synthesize(&request, handle).await.unwrap_err();
        match err {
            ServiceError::GenerationFailed(msg) => assert!(msg.contains("simulated failure")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(model.calls.lock().unwrap().len(), 1);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn admission_limit_serializes_generations() {
        struct Counting {
            active: AtomicUsize,
            peak: AtomicUsize,
        }

        impl SpeechModel for Counting {
            fn sample_rate(&self) -> u32 {
                16_000
            }

            fn generate(
                &self,
                _request: &GenerationRequest,
            ) -> std::result::Result<Vec<f32>, EngineError> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(vec![0.0; 16])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap(), 1);
        let model = Arc::new(Counting {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let handle = ModelHandle::new(ModelType::Turbo, Device::Cpu, model.clone());
        let request = SynthesisRequest::new("hi", Bytes::from_static(b"x"));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let synth = synth.clone();
                let handle = handle.clone();
                let request = request.clone();
                tokio::spawn(async move { synth.synthesize(&request, handle).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_caller_lets_generation_finish_and_cleans_up() {
        struct Slow {
            started: AtomicBool,
            finished: AtomicBool,
        }

        impl SpeechModel for Slow {
            fn sample_rate(&self) -> u32 {
                24_000
            }

            fn generate(
                &self,
                _request: &GenerationRequest,
            ) -> std::result::Result<Vec<f32>, EngineError> {
                self.started.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                self.finished.store(true, Ordering::SeqCst);
                Ok(vec![0.1; 240])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let synth = Synthesizer::new(ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap(), 1);
        let model = Arc::new(Slow {
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        let handle = ModelHandle::new(ModelType::Turbo, Device::Cpu, model.clone());
        let request = SynthesisRequest::new("hang up on me", Bytes::from_static(b"RIFF"));

        let task = {
            let synth = synth.clone();
            tokio::spawn(async move { synth.synthesize(&request, handle).await.map(|_| ()) })
        };
        for _ in 0..100 {
            if model.started.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(model.started.load(Ordering::SeqCst), "generation never started");
        // The staged clip is on disk while the model runs.
        assert_eq!(file_count(dir.path()), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!model.finished.load(Ordering::SeqCst), "aborted after generation ended");

        for _ in 0..100 {
            if model.finished.load(Ordering::SeqCst) && file_count(dir.path()) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(model.finished.load(Ordering::SeqCst), "generation was interrupted");
        assert_eq!(file_count(dir.path()), 0, "scratch files left behind");

        // The permit went back with the abandoned work.
        let handle = ModelHandle::new(ModelType::Turbo, Device::Cpu, model.clone());
        let request = SynthesisRequest::new("again", Bytes::from_static(b"RIFF"));
        let output = synth.synthesize(&request, handle).await.unwrap();
        assert_eq!(output.samples, 240);
    }

    #[test]
    fn write_wav_clamps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav(&path, &[2.0, -2.0, 0.0], 24_000).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX, 0]);
    }
}
