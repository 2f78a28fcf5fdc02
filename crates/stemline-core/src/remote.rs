//! Remote job client
//!
//! Pattern generation, exports, groove analysis, reference loops, review
//! comments, preview rendering and kit mappings all run on remote services.
//! This module only holds the client side:
//!
//! - [`RemoteJobs`]: one method per remote operation
//! - [`HttpJobClient`]: REST/JSON implementation over `ureq`
//! - [`JobService`]: runs requests on a background thread so the tick loop
//!   never waits on the network; outcomes come back as [`JobOutcome`]s
//!
//! Every failure is a [`NetworkError`] handed back to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{NetworkError, NetworkResult};
use crate::types::TimeSignature;

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a generated drum pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub String);

/// Identifier of an export job, used to fetch the rendered file later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub style: String,
    pub bars: u32,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Wav,
    Flac,
    Mp3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    /// Stems to include; empty means the full mix
    pub stems: Vec<String>,
    pub master_gain: f32,
}

/// Groove analysis of a stem or the full mix
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GrooveReport {
    /// Named scores, e.g. `timing`, `swing`, `velocity_variance`
    pub metrics: BTreeMap<String, f64>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceQuery {
    pub text: String,
    pub tempo_bpm: Option<f64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLoop {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tempo_bpm: Option<f64>,
}

/// Loop copied into the project, loadable as a new stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferredLoop {
    pub stem: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    /// Timeline position the comment is pinned to
    #[serde(default)]
    pub at_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub body: String,
    pub at_sec: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Drum pad → sample assignment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KitMapping {
    pub name: String,
    pub pads: BTreeMap<u8, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client trait
// ─────────────────────────────────────────────────────────────────────────────

/// Operations offered by the remote job services
pub trait RemoteJobs: Send + Sync {
    fn create_pattern(&self, spec: &PatternSpec) -> NetworkResult<PatternId>;
    fn request_export(&self, request: &ExportRequest) -> NetworkResult<ExportId>;
    /// Analyze one stem, or the full mix when `stem` is `None`
    fn analyze_groove(&self, stem: Option<&str>) -> NetworkResult<GrooveReport>;
    fn search_reference_loops(&self, query: &ReferenceQuery) -> NetworkResult<Vec<ReferenceLoop>>;
    fn transfer_reference_loop(&self, loop_id: &str, stem: &str) -> NetworkResult<TransferredLoop>;
    fn list_comments(&self) -> NetworkResult<Vec<Comment>>;
    fn add_comment(&self, comment: &NewComment) -> NetworkResult<Comment>;
    /// Returns a playable URL for the rendered range
    fn render_preview(&self, request: &PreviewRequest) -> NetworkResult<String>;
    fn load_kit_mapping(&self, name: &str) -> NetworkResult<KitMapping>;
    fn save_kit_mapping(&self, mapping: &KitMapping) -> NetworkResult<()>;
}

#[derive(Deserialize)]
struct IdReply {
    id: String,
}

#[derive(Deserialize)]
struct UrlReply {
    url: String,
}

/// REST/JSON implementation of [`RemoteJobs`]
///
/// Project-scoped routes live under `{base}/projects/{project}`; reference
/// loops and kit mappings are global.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    agent: ureq::Agent,
    base_url: String,
    project_id: String,
}

impl HttpJobClient {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    pub fn from_config(config: &crate::config::RemoteConfig) -> Self {
        Self::new(&config.api_base_url, &config.project_id, config.timeout())
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project_id, path)
    }

    fn global_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn read_json<T: serde::de::DeserializeOwned>(url: &str, response: ureq::Response) -> NetworkResult<T> {
        response
            .into_json::<T>()
            .map_err(|e| NetworkError::Payload(format!("{}: {}", url, e)))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> NetworkResult<T> {
        let response = self.agent.get(url).call()?;
        Self::read_json(url, response)
    }

    fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(&self, url: &str, body: &B) -> NetworkResult<T> {
        log::debug!("[REMOTE] POST {}", url);
        let response = self.agent.post(url).send_json(body)?;
        Self::read_json(url, response)
    }
}

impl RemoteJobs for HttpJobClient {
    fn create_pattern(&self, spec: &PatternSpec) -> NetworkResult<PatternId> {
        let reply: IdReply = self.post_json(&self.project_url("patterns"), spec)?;
        Ok(PatternId(reply.id))
    }

    fn request_export(&self, request: &ExportRequest) -> NetworkResult<ExportId> {
        let reply: IdReply = self.post_json(&self.project_url("exports"), request)?;
        Ok(ExportId(reply.id))
    }

    fn analyze_groove(&self, stem: Option<&str>) -> NetworkResult<GrooveReport> {
        self.post_json(&self.project_url("groove"), &serde_json::json!({ "stem": stem }))
    }

    fn search_reference_loops(&self, query: &ReferenceQuery) -> NetworkResult<Vec<ReferenceLoop>> {
        let url = self.global_url("reference-loops");
        let mut request = self.agent.get(&url).query("q", &query.text);
        if let Some(bpm) = query.tempo_bpm {
            request = request.query("bpm", &format!("{:.2}", bpm));
        }
        if let Some(limit) = query.limit {
            request = request.query("limit", &limit.to_string());
        }
        let response = request.call()?;
        Self::read_json(&url, response)
    }

    fn transfer_reference_loop(&self, loop_id: &str, stem: &str) -> NetworkResult<TransferredLoop> {
        let url = self.project_url(&format!("reference-loops/{}/transfer", loop_id));
        self.post_json(&url, &serde_json::json!({ "stem": stem }))
    }

    fn list_comments(&self) -> NetworkResult<Vec<Comment>> {
        self.get_json(&self.project_url("comments"))
    }

    fn add_comment(&self, comment: &NewComment) -> NetworkResult<Comment> {
        self.post_json(&self.project_url("comments"), comment)
    }

    fn render_preview(&self, request: &PreviewRequest) -> NetworkResult<String> {
        let reply: UrlReply = self.post_json(&self.project_url("previews"), request)?;
        Ok(reply.url)
    }

    fn load_kit_mapping(&self, name: &str) -> NetworkResult<KitMapping> {
        self.get_json(&self.global_url(&format!("kit-mappings/{}", name)))
    }

    fn save_kit_mapping(&self, mapping: &KitMapping) -> NetworkResult<()> {
        let url = self.global_url(&format!("kit-mappings/{}", mapping.name));
        self.agent.put(&url).send_json(mapping)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job service
// ─────────────────────────────────────────────────────────────────────────────

/// One remote operation with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    CreatePattern(PatternSpec),
    RequestExport(ExportRequest),
    AnalyzeGroove { stem: Option<String> },
    SearchReferenceLoops(ReferenceQuery),
    TransferReferenceLoop { loop_id: String, stem: String },
    ListComments,
    AddComment(NewComment),
    RenderPreview(PreviewRequest),
    LoadKitMapping { name: String },
    SaveKitMapping(KitMapping),
}

impl JobRequest {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreatePattern(_) => "create_pattern",
            Self::RequestExport(_) => "request_export",
            Self::AnalyzeGroove { .. } => "analyze_groove",
            Self::SearchReferenceLoops(_) => "search_reference_loops",
            Self::TransferReferenceLoop { .. } => "transfer_reference_loop",
            Self::ListComments => "list_comments",
            Self::AddComment(_) => "add_comment",
            Self::RenderPreview(_) => "render_preview",
            Self::LoadKitMapping { .. } => "load_kit_mapping",
            Self::SaveKitMapping(_) => "save_kit_mapping",
        }
    }

    /// Run against a client on the current thread
    pub fn execute(&self, jobs: &dyn RemoteJobs) -> NetworkResult<JobResponse> {
        Ok(match self {
            Self::CreatePattern(spec) => JobResponse::Pattern(jobs.create_pattern(spec)?),
            Self::RequestExport(request) => JobResponse::Export(jobs.request_export(request)?),
            Self::AnalyzeGroove { stem } => JobResponse::Groove(jobs.analyze_groove(stem.as_deref())?),
            Self::SearchReferenceLoops(query) => {
                JobResponse::ReferenceLoops(jobs.search_reference_loops(query)?)
            }
            Self::TransferReferenceLoop { loop_id, stem } => {
                JobResponse::Transferred(jobs.transfer_reference_loop(loop_id, stem)?)
            }
            Self::ListComments => JobResponse::Comments(jobs.list_comments()?),
            Self::AddComment(comment) => JobResponse::Comment(jobs.add_comment(comment)?),
            Self::RenderPreview(request) => JobResponse::Preview(jobs.render_preview(request)?),
            Self::LoadKitMapping { name } => JobResponse::KitMapping(jobs.load_kit_mapping(name)?),
            Self::SaveKitMapping(mapping) => {
                jobs.save_kit_mapping(mapping)?;
                JobResponse::Saved
            }
        })
    }
}

/// Successful reply, one variant per [`JobRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum JobResponse {
    Pattern(PatternId),
    Export(ExportId),
    Groove(GrooveReport),
    ReferenceLoops(Vec<ReferenceLoop>),
    Transferred(TransferredLoop),
    Comments(Vec<Comment>),
    Comment(Comment),
    /// Playable preview URL
    Preview(String),
    KitMapping(KitMapping),
    Saved,
}

/// Caller-chosen tag that pairs a [`JobOutcome`] with its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobTicket(pub u64);

/// Finished job, delivered on the outcome channel
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub ticket: JobTicket,
    pub kind: &'static str,
    pub result: NetworkResult<JobResponse>,
}

/// Commands accepted by the job service thread
#[derive(Debug)]
pub enum JobCommand {
    /// Run in the background, outcome goes to the outcome channel
    Submit { ticket: JobTicket, request: JobRequest },
    /// Run and answer on the reply channel
    Call {
        request: JobRequest,
        reply: oneshot::Sender<NetworkResult<JobResponse>>,
    },
    Shutdown,
}

/// Handle for communicating with a background service
pub struct ServiceHandle<Cmd> {
    pub command_tx: Sender<Cmd>,
    pub thread_handle: Option<thread::JoinHandle<()>>,
}

impl<Cmd> ServiceHandle<Cmd> {
    pub fn send(&self, cmd: Cmd) -> Result<(), crossbeam::channel::SendError<Cmd>> {
        self.command_tx.send(cmd)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

/// Runs [`JobRequest`]s one at a time on a dedicated thread
pub struct JobService {
    jobs: Arc<dyn RemoteJobs>,
    command_rx: Receiver<JobCommand>,
    outcome_tx: Sender<JobOutcome>,
}

impl JobService {
    /// Spawn the service thread
    ///
    /// Returns the command handle and the receiver for submitted outcomes.
    pub fn spawn(
        jobs: Arc<dyn RemoteJobs>,
    ) -> Result<(ServiceHandle<JobCommand>, Receiver<JobOutcome>), String> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let (outcome_tx, outcome_rx) = crossbeam::channel::unbounded();

        let service = JobService {
            jobs,
            command_rx,
            outcome_tx,
        };

        let handle = thread::Builder::new()
            .name("job-service".into())
            .spawn(move || service.run())
            .map_err(|e| format!("Failed to spawn job service thread: {}", e))?;

        Ok((
            ServiceHandle {
                command_tx,
                thread_handle: Some(handle),
            },
            outcome_rx,
        ))
    }

    fn run(self) {
        log::info!("JobService started");

        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                JobCommand::Shutdown => {
                    log::info!("JobService shutting down");
                    break;
                }
                JobCommand::Submit { ticket, request } => {
                    let result = self.execute(&request);
                    let outcome = JobOutcome {
                        ticket,
                        kind: request.kind(),
                        result,
                    };
                    if self.outcome_tx.send(outcome).is_err() {
                        log::debug!("JobService: outcome receiver dropped");
                    }
                }
                JobCommand::Call { request, reply } => {
                    let _ = reply.send(self.execute(&request));
                }
            }
        }

        log::info!("JobService stopped");
    }

    fn execute(&self, request: &JobRequest) -> NetworkResult<JobResponse> {
        let result = request.execute(self.jobs.as_ref());
        match &result {
            Ok(_) => log::debug!("[REMOTE] {} ok", request.kind()),
            Err(e) => log::warn!("[REMOTE] {} failed: {}", request.kind(), e),
        }
        result
    }
}

/// Session-side front end of a [`JobService`]
pub struct JobClient {
    handle: ServiceHandle<JobCommand>,
    outcome_rx: Receiver<JobOutcome>,
    next_ticket: u64,
}

impl JobClient {
    pub fn spawn(jobs: Arc<dyn RemoteJobs>) -> Result<Self, String> {
        let (handle, outcome_rx) = JobService::spawn(jobs)?;
        Ok(Self {
            handle,
            outcome_rx,
            next_ticket: 1,
        })
    }

    /// Queue a request; its outcome shows up in [`JobClient::try_recv`]
    pub fn submit(&mut self, request: JobRequest) -> NetworkResult<JobTicket> {
        let ticket = JobTicket(self.next_ticket);
        self.next_ticket += 1;
        log::debug!("[REMOTE] submit {} as {:?}", request.kind(), ticket);
        self.handle
            .send(JobCommand::Submit { ticket, request })
            .map_err(|_| NetworkError::ServiceUnavailable)?;
        Ok(ticket)
    }

    /// Run a request and block until it finishes
    pub fn call(&self, request: JobRequest) -> NetworkResult<JobResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.handle
            .send(JobCommand::Call {
                request,
                reply: reply_tx,
            })
            .map_err(|_| NetworkError::ServiceUnavailable)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| NetworkError::ServiceUnavailable)?
    }

    /// Next finished job, if any. Never blocks.
    pub fn try_recv(&self) -> Option<JobOutcome> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Job service outcome channel disconnected");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }
}

impl Drop for JobClient {
    fn drop(&mut self) {
        let _ = self.handle.send(JobCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::time::Instant;

    /// In-memory service recording every call
    #[derive(Default)]
    struct FakeJobs {
        calls: Mutex<Vec<&'static str>>,
        comments: Mutex<Vec<Comment>>,
    }

    impl FakeJobs {
        fn record(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }
    }

    impl RemoteJobs for FakeJobs {
        fn create_pattern(&self, spec: &PatternSpec) -> NetworkResult<PatternId> {
            self.record("create_pattern");
            Ok(PatternId(format!("{}-{}", spec.style, spec.bars)))
        }
        fn request_export(&self, _request: &ExportRequest) -> NetworkResult<ExportId> {
            self.record("request_export");
            Err(NetworkError::Status {
                url: "http://fake/exports".into(),
                status: 503,
            })
        }
        fn analyze_groove(&self, stem: Option<&str>) -> NetworkResult<GrooveReport> {
            self.record("analyze_groove");
            let mut report = GrooveReport::default();
            report.metrics.insert("timing".into(), 0.8);
            report.suggestions.push(format!("tighten {}", stem.unwrap_or("mix")));
            Ok(report)
        }
        fn search_reference_loops(&self, _query: &ReferenceQuery) -> NetworkResult<Vec<ReferenceLoop>> {
            Ok(Vec::new())
        }
        fn transfer_reference_loop(&self, loop_id: &str, stem: &str) -> NetworkResult<TransferredLoop> {
            Ok(TransferredLoop {
                stem: stem.into(),
                url: format!("http://fake/loops/{}.wav", loop_id),
            })
        }
        fn list_comments(&self) -> NetworkResult<Vec<Comment>> {
            Ok(self.comments.lock().unwrap().clone())
        }
        fn add_comment(&self, comment: &NewComment) -> NetworkResult<Comment> {
            let mut comments = self.comments.lock().unwrap();
            let stored = Comment {
                id: comments.len().to_string(),
                author: "me".into(),
                body: comment.body.clone(),
                at_sec: comment.at_sec,
            };
            comments.push(stored.clone());
            Ok(stored)
        }
        fn render_preview(&self, request: &PreviewRequest) -> NetworkResult<String> {
            Ok(format!("http://fake/preview?from={}", request.start_sec))
        }
        fn load_kit_mapping(&self, name: &str) -> NetworkResult<KitMapping> {
            Ok(KitMapping {
                name: name.into(),
                ..Default::default()
            })
        }
        fn save_kit_mapping(&self, _mapping: &KitMapping) -> NetworkResult<()> {
            self.record("save_kit_mapping");
            Ok(())
        }
    }

    fn wait_outcome(client: &JobClient) -> JobOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = client.try_recv() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "job never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_submit_delivers_outcomes_in_order() {
        let jobs = Arc::new(FakeJobs::default());
        let mut client = JobClient::spawn(jobs.clone()).unwrap();

        let groove = client
            .submit(JobRequest::AnalyzeGroove {
                stem: Some("drums".into()),
            })
            .unwrap();
        let export = client
            .submit(JobRequest::RequestExport(ExportRequest {
                format: ExportFormat::Wav,
                stems: Vec::new(),
                master_gain: 1.0,
            }))
            .unwrap();
        assert!(groove < export);

        let first = wait_outcome(&client);
        assert_eq!(first.ticket, groove);
        match first.result {
            Ok(JobResponse::Groove(report)) => {
                assert_eq!(report.metrics["timing"], 0.8);
                assert_eq!(report.suggestions, vec!["tighten drums".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let second = wait_outcome(&client);
        assert_eq!(second.ticket, export);
        assert_eq!(second.kind, "request_export");
        assert!(matches!(
            second.result,
            Err(NetworkError::Status { status: 503, .. })
        ));
        assert_eq!(*jobs.calls.lock().unwrap(), vec!["analyze_groove", "request_export"]);
    }

    #[test]
    fn test_call_blocks_for_reply() {
        let client = JobClient::spawn(Arc::new(FakeJobs::default())).unwrap();

        let added = client
            .call(JobRequest::AddComment(NewComment {
                body: "kick is late".into(),
                at_sec: Some(12.5),
            }))
            .unwrap();
        assert!(matches!(added, JobResponse::Comment(ref c) if c.at_sec == Some(12.5)));

        match client.call(JobRequest::ListComments).unwrap() {
            JobResponse::Comments(comments) => assert_eq!(comments.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.is_running());
    }

    #[test]
    fn test_shutdown_makes_service_unavailable() {
        let (handle, _outcomes) = JobService::spawn(Arc::new(FakeJobs::default())).unwrap();
        handle.send(JobCommand::Shutdown).unwrap();
        if let Some(h) = handle.thread_handle {
            h.join().unwrap();
        }
        assert!(handle
            .command_tx
            .send(JobCommand::Submit {
                ticket: JobTicket(1),
                request: JobRequest::ListComments,
            })
            .is_err());
    }

    /// Serve one canned HTTP response and hand back the request line
    fn one_shot_server(status: &str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        let status = status.to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut body_in = vec![0u8; content_length];
            reader.read_exact(&mut body_in).unwrap();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            request_line.trim().to_string()
        });
        (base, handle)
    }

    #[test]
    fn test_http_client_posts_to_project_route() {
        let (base, server) = one_shot_server("200 OK", r#"{"id":"pat-42"}"#);
        let client = HttpJobClient::new(base, "demo", Duration::from_secs(5));
        let id = client
            .create_pattern(&PatternSpec {
                style: "house".into(),
                bars: 4,
                tempo_bpm: 124.0,
                time_signature: TimeSignature::default(),
            })
            .unwrap();
        assert_eq!(id, PatternId("pat-42".into()));
        assert_eq!(server.join().unwrap(), "POST /api/projects/demo/patterns HTTP/1.1");
    }

    #[test]
    fn test_http_client_status_and_payload_errors() {
        let (base, server) = one_shot_server("404 Not Found", "{}");
        let client = HttpJobClient::new(base, "demo", Duration::from_secs(5));
        assert!(matches!(
            client.load_kit_mapping("tr808"),
            Err(NetworkError::Status { status: 404, .. })
        ));
        assert_eq!(server.join().unwrap(), "GET /api/kit-mappings/tr808 HTTP/1.1");

        let (base, server) = one_shot_server("200 OK", r#"{"unexpected":true}"#);
        let client = HttpJobClient::new(base, "demo", Duration::from_secs(5));
        assert!(matches!(
            client.render_preview(&PreviewRequest {
                start_sec: 0.0,
                end_sec: 8.0
            }),
            Err(NetworkError::Payload(_))
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_http_client_unreachable() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = HttpJobClient::new(format!("http://127.0.0.1:{}/api", port), "demo", Duration::from_secs(2));
        assert!(matches!(client.list_comments(), Err(NetworkError::Transport { .. })));
    }
}
