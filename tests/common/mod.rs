//! Shared helpers: a deterministic in-process model and a server on port 0.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chatterbox_serve::config::ServerConfig;
use chatterbox_serve::engine::EngineError;
use chatterbox_serve::model::{GenerationRequest, ModelHandle, ModelType, SpeechModel};
use chatterbox_serve::scratch::ScratchSpace;
use chatterbox_serve::synthesis::Synthesizer;
use chatterbox_serve::{Device, ModelRegistry, ServiceContext, TtsServer};
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Reference clip bytes used by most tests (content is opaque to the service).
pub const CLIP: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt reference-voice";

/// What the fake model saw on one call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub request: GenerationRequest,
    /// Contents of the staged clip at call time.
    pub prompt_bytes: Option<Vec<u8>>,
}

/// A model that emits a short ramp, or fails with a fixed message.
pub struct FakeModel {
    sample_rate: u32,
    samples: usize,
    failure: Option<String>,
    calls: Mutex<Vec<SeenCall>>,
}

impl FakeModel {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            samples: (sample_rate / 10) as usize,
            failure: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            sample_rate: 24_000,
            samples: 0,
            failure: Some(message.to_owned()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SpeechModel for FakeModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Vec<f32>, EngineError> {
        self.calls.lock().unwrap().push(SeenCall {
            request: request.clone(),
            prompt_bytes: std::fs::read(&request.audio_prompt_path).ok(),
        });
        if let Some(message) = &self.failure {
            return Err(EngineError::remote(message.clone()));
        }
        Ok((0..self.samples)
            .map(|i| (i as f32 / self.samples as f32) - 0.5)
            .collect())
    }
}

/// A running server plus everything needed to inspect it.
pub struct TestService {
    pub server: TtsServer,
    pub registry: Arc<ModelRegistry>,
    pub scratch: TempDir,
    pub http: reqwest::Client,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.server.addr())
    }

    /// Install `model` as a ready handle.
    pub fn install(&self, model_type: ModelType, model: Arc<FakeModel>) {
        self.registry
            .install(ModelHandle::new(model_type, Device::Cpu, model));
    }

    /// Entries currently in the scratch directory.
    pub fn scratch_entries(&self) -> Vec<String> {
        scratch_entries(self.scratch.path())
    }

    /// Wait until every scratch file is gone.
    ///
    /// The output file is removed when the server drops the response body,
    /// which can trail the client's last read by a moment.
    pub async fn assert_scratch_drains(&self) {
        for _ in 0..100 {
            if self.scratch_entries().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("scratch files left behind: {:?}", self.scratch_entries());
    }

    pub async fn post_tts(&self, form: Form) -> reqwest::Response {
        self.http
            .post(self.url("/api/v1/tts"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_tts_json(&self, form: Form) -> reqwest::Response {
        self.http
            .post(self.url("/api/v1/tts/json"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

pub fn scratch_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

/// Start a server with the given models already loaded.
pub async fn start_service(models: Vec<(ModelType, Arc<FakeModel>)>) -> TestService {
    let registry = Arc::new(ModelRegistry::new());
    for (model_type, model) in models {
        registry.install(ModelHandle::new(model_type, Device::Cpu, model));
    }

    let scratch = tempfile::tempdir().unwrap();
    let space = ScratchSpace::new(Some(scratch.path().to_path_buf())).unwrap();
    let ctx = Arc::new(ServiceContext::new(
        Arc::clone(&registry),
        Device::Cpu,
        Synthesizer::new(space, 0),
    ));
    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = TtsServer::start(ctx, &config).await.unwrap();

    TestService {
        server,
        registry,
        scratch,
        http: reqwest::Client::new(),
    }
}

/// Form with `text`, `model_type` and the reference clip.
pub fn tts_form(text: &str, model_type: &str) -> Form {
    Form::new()
        .text("text", text.to_owned())
        .text("model_type", model_type.to_owned())
        .part("audio_file", clip_part(CLIP))
}

pub fn clip_part(bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name("ref.wav")
        .mime_str("audio/wav")
        .unwrap()
}

/// `detail` from an error response.
pub async fn detail(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["detail"].as_str().unwrap().to_owned()
}
