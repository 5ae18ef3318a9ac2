//! Recording doubles for the host platform and its sessions.

#![allow(dead_code)]

use essentials_core::{async_trait, CriticalFault, DependencyProbe, HostError, HostPlatform, Session};
use parking_lot::Mutex;
use std::any::Any;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

pub struct SecurityApi {
    pub level: u8,
}

#[derive(Default)]
pub struct RecordingHost {
    pub active: Vec<&'static str>,
    pub sessions: Mutex<Vec<Arc<RecordingSession>>>,
    pub commands: Mutex<Vec<String>>,
    pub channels: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<(Uuid, String, Vec<u8>)>>,
    pub deactivations: Mutex<Vec<CriticalFault>>,
}

impl RecordingHost {
    pub fn with_active(active: Vec<&'static str>) -> Self {
        Self {
            active,
            ..Self::default()
        }
    }

    pub fn join(&self, name: &str) -> Arc<RecordingSession> {
        let session = Arc::new(RecordingSession::new(name));
        self.sessions.lock().push(session.clone());
        session
    }

    pub fn deactivation_count(&self) -> usize {
        self.deactivations.lock().len()
    }
}

impl DependencyProbe for RecordingHost {
    fn is_system_active(&self, system: &str) -> bool {
        self.active.contains(&system)
    }

    fn load_capability(&self, system: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        match system {
            "SecurityMaster" => Some(Arc::new(SecurityApi { level: 2 })),
            _ => None,
        }
    }
}

#[async_trait]
impl HostPlatform for RecordingHost {
    fn dispatch_console_command(&self, command: &str) -> Result<(), HostError> {
        self.commands.lock().push(command.to_string());
        Ok(())
    }

    fn online_sessions(&self) -> Vec<Arc<dyn Session>> {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.is_online())
            .map(|s| s.clone() as Arc<dyn Session>)
            .collect()
    }

    fn register_outgoing_channel(&self, channel: &str) {
        self.channels.lock().push(channel.to_string());
    }

    async fn send_channel_message(
        &self,
        session: Arc<dyn Session>,
        channel: &str,
        payload: &[u8],
    ) -> Result<(), HostError> {
        self.messages
            .lock()
            .push((session.id(), channel.to_string(), payload.to_vec()));
        Ok(())
    }

    fn deactivate_integration(&self, fault: &CriticalFault) {
        self.deactivations.lock().push(fault.clone());
    }
}

pub struct RecordingSession {
    id: Uuid,
    name: String,
    online: AtomicBool,
    pub kicks: Mutex<Vec<String>>,
    pub received: Mutex<Vec<String>>,
}

impl RecordingSession {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            online: AtomicBool::new(true),
            kicks: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnect(&self) {
        self.online.store(false, Ordering::SeqCst);
    }
}

impl Session for RecordingSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn locale(&self) -> String {
        "en_us".to_string()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn send_message(&self, text: &str) {
        self.received.lock().push(text.to_string());
    }

    fn kick(&self, reason: &str) {
        self.kicks.lock().push(reason.to_string());
        self.disconnect();
    }
}

/// Collects formatted log output so tests can count emitted events.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|line| line.contains(needle)).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
