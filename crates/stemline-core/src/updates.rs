//! Real-time updates from remote services
//!
//! Remote services report levels, transport state and CPU load either over a
//! push channel or through REST endpoints that have to be polled. Both sit
//! behind [`UpdateSubscription`], so the session never knows which one is
//! active:
//!
//! ```text
//!   push frames (JSON) ──► PushSubscription ─┐
//!                                            ├─► FallbackSubscription ──► Session::tick
//!   GET /levels, /transport, /cpu ──► PollingSubscription (thread)
//! ```
//!
//! [`FallbackSubscription`] starts on the push channel and switches to
//! polling for good the first time the channel fails.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, NetworkError, NetworkResult};

/// Consecutive unparseable frames tolerated before the push channel is
/// considered broken
pub const MAX_MALFORMED_FRAMES: u32 = 3;

/// Remote level reading for one stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLevel {
    pub stem: String,
    pub peak: f32,
    pub rms: f32,
}

/// Event delivered by either update transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEvent {
    LevelUpdate {
        levels: Vec<RemoteLevel>,
    },
    TransportUpdate {
        cursor_sec: f64,
        playing: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tempo_bpm: Option<f64>,
    },
    CpuUpdate {
        /// Load in `[0, 1]`
        load: f32,
    },
}

impl UpdateEvent {
    /// Parse one JSON frame
    pub fn from_json(frame: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(frame).map_err(|e| ChannelError::Malformed(e.to_string()))
    }
}

/// Which transport a subscription is currently using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Push,
    Polling,
}

/// Source of [`UpdateEvent`]s, polled once per session tick
pub trait UpdateSubscription: Send {
    /// Everything that arrived since the last call. Never blocks.
    fn poll(&mut self) -> Result<Vec<UpdateEvent>, ChannelError>;

    fn mode(&self) -> SubscriptionMode;
}

// ─────────────────────────────────────────────────────────────────────────────
// Push
// ─────────────────────────────────────────────────────────────────────────────

/// Feeding end of a push channel, held by whatever receives the frames
/// (socket reader, IPC bridge, test)
#[derive(Debug, Clone)]
pub struct PushSender {
    tx: Sender<String>,
}

impl PushSender {
    /// Forward one raw frame; false once the subscription is gone
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    pub fn send_event(&self, event: &UpdateEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                log::warn!("[UPDATES] cannot encode {:?}: {}", event, e);
                false
            }
        }
    }
}

/// Subscription over a stream of JSON frames
#[derive(Debug)]
pub struct PushSubscription {
    rx: Receiver<String>,
    malformed_run: u32,
    /// Set once the channel is unusable; returned on every later poll
    failure: Option<ChannelError>,
}

impl PushSubscription {
    /// Create a connected sender/subscription pair
    pub fn channel() -> (PushSender, PushSubscription) {
        let (tx, rx) = channel::unbounded();
        (PushSender { tx }, PushSubscription::new(rx))
    }

    pub fn new(rx: Receiver<String>) -> Self {
        Self {
            rx,
            malformed_run: 0,
            failure: None,
        }
    }
}

impl UpdateSubscription for PushSubscription {
    fn poll(&mut self) -> Result<Vec<UpdateEvent>, ChannelError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        // Events parsed before a failure are handed over; the error comes
        // on the next poll
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(frame) => match UpdateEvent::from_json(&frame) {
                    Ok(event) => {
                        self.malformed_run = 0;
                        events.push(event);
                    }
                    Err(e) => {
                        self.malformed_run += 1;
                        log::warn!("[UPDATES] {} ({} in a row)", e, self.malformed_run);
                        if self.malformed_run >= MAX_MALFORMED_FRAMES {
                            self.failure = Some(e.clone());
                            if events.is_empty() {
                                return Err(e);
                            }
                            break;
                        }
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.failure = Some(ChannelError::Disconnected);
                    if events.is_empty() {
                        return Err(ChannelError::Disconnected);
                    }
                    break;
                }
            }
        }
        Ok(events)
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Push
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling
// ─────────────────────────────────────────────────────────────────────────────

/// REST status endpoints equivalent to the push events
pub trait StatusEndpoint: Send + Sync {
    fn fetch(&self) -> NetworkResult<Vec<UpdateEvent>>;
}

#[derive(Debug, Deserialize)]
struct TransportStatus {
    cursor_sec: f64,
    playing: bool,
    #[serde(default)]
    tempo_bpm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CpuStatus {
    load: f32,
}

/// Polls `GET {base}/levels`, `{base}/transport` and `{base}/cpu`
#[derive(Debug, Clone)]
pub struct HttpStatusEndpoint {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpStatusEndpoint {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> NetworkResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        self.agent
            .get(&url)
            .call()?
            .into_json::<T>()
            .map_err(|e| NetworkError::Payload(format!("{}: {}", url, e)))
    }
}

impl StatusEndpoint for HttpStatusEndpoint {
    fn fetch(&self) -> NetworkResult<Vec<UpdateEvent>> {
        let levels = self.get::<Vec<RemoteLevel>>("levels").map(|levels| UpdateEvent::LevelUpdate { levels });
        let transport = self
            .get::<TransportStatus>("transport")
            .map(|t| UpdateEvent::TransportUpdate {
                cursor_sec: t.cursor_sec,
                playing: t.playing,
                tempo_bpm: t.tempo_bpm,
            });
        let cpu = self
            .get::<CpuStatus>("cpu")
            .map(|c| UpdateEvent::CpuUpdate { load: c.load });

        let mut events = Vec::new();
        let mut last_error = None;
        for result in [levels, transport, cpu] {
            match result {
                Ok(event) => events.push(event),
                Err(e) => {
                    log::debug!("[UPDATES] status poll: {}", e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if events.is_empty() => Err(e),
            _ => Ok(events),
        }
    }
}

/// Fixed-interval polling on a background thread
///
/// The thread fetches once immediately, then every `interval`, and exits
/// when the subscription is dropped.
pub struct PollingSubscription {
    rx: Receiver<Vec<UpdateEvent>>,
    _shutdown: Sender<()>,
    _handle: JoinHandle<()>,
}

impl PollingSubscription {
    pub fn spawn(endpoint: Arc<dyn StatusEndpoint>, interval: Duration) -> std::io::Result<Self> {
        let (event_tx, event_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("status-poller".to_string())
            .spawn(move || poll_thread(endpoint, interval, event_tx, shutdown_rx))?;

        log::info!("[UPDATES] polling every {:?}", interval);

        Ok(Self {
            rx: event_rx,
            _shutdown: shutdown_tx,
            _handle: handle,
        })
    }
}

impl UpdateSubscription for PollingSubscription {
    fn poll(&mut self) -> Result<Vec<UpdateEvent>, ChannelError> {
        Ok(self.rx.try_iter().flatten().collect())
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Polling
    }
}

fn poll_thread(
    endpoint: Arc<dyn StatusEndpoint>,
    interval: Duration,
    tx: Sender<Vec<UpdateEvent>>,
    shutdown: Receiver<()>,
) {
    loop {
        match endpoint.fetch() {
            Ok(events) if !events.is_empty() => {
                if tx.send(events).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("[UPDATES] status poll failed: {}", e),
        }

        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("status-poller thread exiting");
}

// ─────────────────────────────────────────────────────────────────────────────
// Fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Push first, polling forever after the first channel failure
pub struct FallbackSubscription {
    primary: Option<Box<dyn UpdateSubscription>>,
    endpoint: Arc<dyn StatusEndpoint>,
    interval: Duration,
    polling: Option<PollingSubscription>,
}

impl FallbackSubscription {
    /// `primary` is the push subscription; `None` starts straight on polling
    pub fn new(
        primary: Option<Box<dyn UpdateSubscription>>,
        endpoint: Arc<dyn StatusEndpoint>,
        interval: Duration,
    ) -> Self {
        Self {
            primary,
            endpoint,
            interval,
            polling: None,
        }
    }

    fn poll_fallback(&mut self) -> Vec<UpdateEvent> {
        if self.polling.is_none() {
            match PollingSubscription::spawn(self.endpoint.clone(), self.interval) {
                Ok(polling) => self.polling = Some(polling),
                Err(e) => {
                    log::error!("[UPDATES] cannot start status poller: {}", e);
                    return Vec::new();
                }
            }
        }
        self.polling
            .as_mut()
            .and_then(|p| p.poll().ok())
            .unwrap_or_default()
    }
}

impl UpdateSubscription for FallbackSubscription {
    fn poll(&mut self) -> Result<Vec<UpdateEvent>, ChannelError> {
        if let Some(primary) = self.primary.as_mut() {
            match primary.poll() {
                Ok(events) => return Ok(events),
                Err(e) => {
                    log::warn!(
                        "[UPDATES] push channel failed ({}); polling every {:?}",
                        e,
                        self.interval
                    );
                    self.primary = None;
                }
            }
        }
        Ok(self.poll_fallback())
    }

    fn mode(&self) -> SubscriptionMode {
        if self.primary.is_some() {
            SubscriptionMode::Push
        } else {
            SubscriptionMode::Polling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct CountingEndpoint {
        calls: AtomicUsize,
    }

    impl StatusEndpoint for CountingEndpoint {
        fn fetch(&self) -> NetworkResult<Vec<UpdateEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![UpdateEvent::CpuUpdate { load: 0.5 }])
        }
    }

    fn endpoint() -> Arc<CountingEndpoint> {
        Arc::new(CountingEndpoint {
            calls: AtomicUsize::new(0),
        })
    }

    fn poll_until(sub: &mut dyn UpdateSubscription) -> Vec<UpdateEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let events = sub.poll().unwrap();
            if !events.is_empty() {
                return events;
            }
            assert!(Instant::now() < deadline, "no events arrived");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_event_json_shape() {
        let frame = r#"{"type":"level_update","levels":[{"stem":"bass","peak":0.5,"rms":0.25}]}"#;
        let event = UpdateEvent::from_json(frame).unwrap();
        assert_eq!(
            event,
            UpdateEvent::LevelUpdate {
                levels: vec![RemoteLevel {
                    stem: "bass".into(),
                    peak: 0.5,
                    rms: 0.25
                }]
            }
        );

        let transport = UpdateEvent::from_json(r#"{"type":"transport_update","cursor_sec":1.5,"playing":true}"#).unwrap();
        assert_eq!(
            transport,
            UpdateEvent::TransportUpdate {
                cursor_sec: 1.5,
                playing: true,
                tempo_bpm: None
            }
        );

        let json = serde_json::to_string(&UpdateEvent::CpuUpdate { load: 0.25 }).unwrap();
        assert_eq!(json, r#"{"type":"cpu_update","load":0.25}"#);

        assert!(matches!(
            UpdateEvent::from_json(r#"{"type":"mystery"}"#),
            Err(ChannelError::Malformed(_))
        ));
    }

    #[test]
    fn test_push_delivers_in_order() {
        let (tx, mut sub) = PushSubscription::channel();
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.1 });
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.2 });

        let events = sub.poll().unwrap();
        assert_eq!(
            events,
            vec![
                UpdateEvent::CpuUpdate { load: 0.1 },
                UpdateEvent::CpuUpdate { load: 0.2 }
            ]
        );
        assert!(sub.poll().unwrap().is_empty());
    }

    #[test]
    fn test_push_disconnect_after_pending_frames() {
        let (tx, mut sub) = PushSubscription::channel();
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.3 });
        drop(tx);

        assert_eq!(sub.poll().unwrap().len(), 1);
        assert_eq!(sub.poll(), Err(ChannelError::Disconnected));
    }

    #[test]
    fn test_push_tolerates_isolated_garbage() {
        let (tx, mut sub) = PushSubscription::channel();
        tx.send_frame("not json");
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.3 });
        assert_eq!(sub.poll().unwrap().len(), 1);

        for _ in 0..MAX_MALFORMED_FRAMES {
            tx.send_frame("{");
        }
        assert!(matches!(sub.poll(), Err(ChannelError::Malformed(_))));
    }

    #[test]
    fn test_push_keeps_events_before_garbage_run() {
        let (tx, mut sub) = PushSubscription::channel();
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.3 });
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.4 });
        for _ in 0..MAX_MALFORMED_FRAMES {
            tx.send_frame("{");
        }
        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.5 });

        assert_eq!(
            sub.poll().unwrap(),
            vec![
                UpdateEvent::CpuUpdate { load: 0.3 },
                UpdateEvent::CpuUpdate { load: 0.4 }
            ]
        );
        assert!(matches!(sub.poll(), Err(ChannelError::Malformed(_))));
        assert!(matches!(sub.poll(), Err(ChannelError::Malformed(_))));
    }

    #[test]
    fn test_polling_subscription() {
        let endpoint = endpoint();
        let mut sub = PollingSubscription::spawn(endpoint.clone(), Duration::from_millis(5)).unwrap();
        let events = poll_until(&mut sub);
        assert_eq!(events[0], UpdateEvent::CpuUpdate { load: 0.5 });
        assert_eq!(sub.mode(), SubscriptionMode::Polling);
        assert!(endpoint.calls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_fallback_switches_on_channel_failure() {
        let endpoint = endpoint();
        let (tx, push) = PushSubscription::channel();
        let mut sub = FallbackSubscription::new(
            Some(Box::new(push)),
            endpoint.clone(),
            Duration::from_millis(5),
        );

        tx.send_event(&UpdateEvent::CpuUpdate { load: 0.9 });
        assert_eq!(sub.poll().unwrap(), vec![UpdateEvent::CpuUpdate { load: 0.9 }]);
        assert_eq!(sub.mode(), SubscriptionMode::Push);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);

        drop(tx);
        sub.poll().unwrap();
        assert_eq!(sub.mode(), SubscriptionMode::Polling);

        let events = poll_until(&mut sub);
        assert_eq!(events[0], UpdateEvent::CpuUpdate { load: 0.5 });
    }

    #[test]
    fn test_fallback_without_push_polls() {
        let mut sub = FallbackSubscription::new(None, endpoint(), Duration::from_millis(5));
        assert_eq!(sub.mode(), SubscriptionMode::Polling);
        assert!(!poll_until(&mut sub).is_empty());
    }
}
