//! Client for the remote image generation API.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::params::{GenerationParams, PREPROCESS_RESOLUTION};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// JSON body of a generation request
#[derive(Clone, Debug, Serialize)]
pub struct GenerationRequest {
    /// Scribble as a PNG data URL
    pub image: String,
    pub prompt: String,
    pub additional_prompt: String,
    pub negative_prompt: String,
    pub num_images: u32,
    pub image_resolution: u32,
    pub preprocess_resolution: u32,
    pub num_steps: u32,
    pub guidance_scale: f32,
    pub seed: u32,
}

impl GenerationRequest {
    pub fn new(image: String, params: &GenerationParams) -> Self {
        Self {
            image,
            prompt: params.prompt.clone(),
            additional_prompt: params.additional_prompt.clone(),
            negative_prompt: params.negative_prompt.clone(),
            num_images: params.num_images,
            image_resolution: params.image_resolution,
            preprocess_resolution: PREPROCESS_RESOLUTION,
            num_steps: params.num_steps,
            guidance_scale: params.guidance_scale,
            seed: params.effective_seed(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct GenerationResponse {
    image: Vec<String>,
}

/// Turn a status code and body into image URLs
pub fn parse_response(status: u16, body: &str) -> Result<Vec<String>, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(GenerationError::Status(status));
    }
    let response: GenerationResponse = serde_json::from_str(body)?;
    Ok(response.image)
}

pub trait ImageGenerator: Send {
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerationError>;
}

/// Generator that POSTs to an HTTP endpoint
pub struct HttpGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl ImageGenerator for HttpGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerationError> {
        log::info!(
            "Requesting {} image(s) from {} (seed={})",
            request.num_images,
            self.endpoint,
            request.seed
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        parse_response(status, &body)
    }
}

/// A finished request, tagged with the id it was submitted under
#[derive(Debug)]
pub struct Completion {
    pub id: u64,
    pub result: Result<Vec<String>, GenerationError>,
}

/// Runs generation requests off the UI thread.
///
/// Requests are processed one at a time in submission order; results are
/// picked up with [`GenerationWorker::poll`].
pub struct GenerationWorker {
    jobs: Option<Sender<(u64, GenerationRequest)>>,
    results: Receiver<Completion>,
    thread: Option<JoinHandle<()>>,
}

impl GenerationWorker {
    pub fn spawn<G: ImageGenerator + 'static>(generator: G) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<(u64, GenerationRequest)>();
        let (result_tx, result_rx) = mpsc::channel::<Completion>();

        let thread = thread::spawn(move || {
            log::info!("Generation worker started");
            while let Ok((id, request)) = job_rx.recv() {
                let result = generator.generate(&request);
                if result_tx.send(Completion { id, result }).is_err() {
                    break;
                }
            }
            log::info!("Generation worker stopped");
        });

        Self {
            jobs: Some(job_tx),
            results: result_rx,
            thread: Some(thread),
        }
    }

    pub fn submit(&self, id: u64, request: GenerationRequest) {
        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send((id, request)).is_ok())
            .unwrap_or(false);
        if !sent {
            log::warn!("Generation worker is gone; request {} dropped", id);
        }
    }

    /// Next finished request, if any
    pub fn poll(&self) -> Option<Completion> {
        match self.results.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop. An in-flight request is
        // left to finish on its own rather than blocking the UI on exit.
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    fn request(seed: u32) -> GenerationRequest {
        let params = GenerationParams {
            prompt: "a cat".into(),
            seed,
            ..GenerationParams::default()
        };
        GenerationRequest::new("data:image/png;base64,AAAA".into(), &params)
    }

    #[test]
    fn request_body_has_every_field() {
        let body = serde_json::to_value(request(42)).unwrap();
        assert_eq!(body["image"], "data:image/png;base64,AAAA");
        assert_eq!(body["prompt"], "a cat");
        assert_eq!(body["additional_prompt"], "");
        assert_eq!(body["negative_prompt"], "");
        assert_eq!(body["num_images"], 3);
        assert_eq!(body["image_resolution"], 512);
        assert_eq!(body["preprocess_resolution"], 512);
        assert_eq!(body["num_steps"], 25);
        assert_eq!(body["guidance_scale"], 15.0);
        assert_eq!(body["seed"], 42);
    }

    #[test]
    fn parses_image_urls() {
        let urls = parse_response(200, r#"{"image":["a.png","b.png"]}"#).unwrap();
        assert_eq!(urls, vec!["a.png", "b.png"]);
    }

    #[test]
    fn non_success_status_is_an_error() {
        assert!(matches!(
            parse_response(502, r#"{"image":[]}"#),
            Err(GenerationError::Status(502))
        ));
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(matches!(
            parse_response(200, r#"{"images":"nope"}"#),
            Err(GenerationError::Malformed(_))
        ));
    }

    struct Canned(Vec<String>);

    impl ImageGenerator for Canned {
        fn generate(&self, _request: &GenerationRequest) -> Result<Vec<String>, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn wait_for(worker: &GenerationWorker) -> Completion {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(done) = worker.poll() {
                return done;
            }
            assert!(Instant::now() < deadline, "worker never answered");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn worker_returns_results_with_their_id() {
        let worker = GenerationWorker::spawn(Canned(vec!["x.png".into()]));
        assert!(worker.poll().is_none());

        worker.submit(7, request(42));
        let done = wait_for(&worker);
        assert_eq!(done.id, 7);
        assert_eq!(done.result.unwrap(), vec!["x.png"]);
    }

    /// Serve one HTTP response on a loopback socket and hand back the request body
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/generate", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            )
            .unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (url, handle)
    }

    /// Loopback requests must not be routed through an ambient proxy
    fn loopback_generator(endpoint: String) -> HttpGenerator {
        HttpGenerator {
            client: reqwest::blocking::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            endpoint,
        }
    }

    #[test]
    fn http_generator_posts_json_and_reads_urls() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", r#"{"image":["a.png","b.png"]}"#);
        let generator = loopback_generator(endpoint);

        let urls = generator.generate(&request(42)).unwrap();
        assert_eq!(urls, vec!["a.png", "b.png"]);

        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent["seed"], 42);
        assert_eq!(sent["preprocess_resolution"], 512);
    }

    #[test]
    fn hung_server_times_out_as_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/generate", listener.local_addr().unwrap());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            // Accept, then hold the connection open without answering
            let (_stream, _) = listener.accept().unwrap();
            let _ = release_rx.recv_timeout(Duration::from_secs(10));
        });

        let generator = HttpGenerator {
            client: reqwest::blocking::Client::builder()
                .no_proxy()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
            endpoint,
        };
        let result = generator.generate(&request(42));
        assert!(matches!(result, Err(GenerationError::Transport(_))), "got {:?}", result);

        let mut state = crate::state::SessionState::default();
        state.gallery = vec!["old.png".into()];
        let id = state.begin_generation().unwrap();
        assert!(state.finish_generation(id, result));
        assert_eq!(state.generate_label(), crate::state::GENERATE_IDLE_LABEL);
        assert_eq!(state.gallery, vec!["old.png"]);

        release_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn http_generator_reports_server_errors() {
        let (endpoint, server) = serve_once("HTTP/1.1 500 Internal Server Error", "oops");
        let generator = loopback_generator(endpoint);

        assert!(matches!(
            generator.generate(&request(42)),
            Err(GenerationError::Status(500))
        ));
        server.join().unwrap();
    }
}
