use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::detector::Detector;
use crate::realtime::realtime_session::RealtimeSession;

/// Inbound messages buffered per session before senders block.
const SESSION_QUEUE_DEPTH: usize = 8;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// The transport's side of a running session.
///
/// Push raw text messages into `inbound`; read serialized responses from
/// `outbound`. Dropping `inbound` (or calling [`SessionHandle::disconnect`])
/// ends the session.
pub struct SessionHandle {
    pub id: u64,
    pub inbound: Sender<String>,
    pub outbound: Receiver<String>,
    worker: JoinHandle<u64>,
}

impl SessionHandle {
    /// Closes the inbound side and waits for the worker. Returns how many
    /// messages the session handled.
    pub fn disconnect(self) -> u64 {
        let SessionHandle {
            inbound, worker, ..
        } = self;
        drop(inbound);
        worker.join().unwrap_or(0)
    }
}

/// Starts a session on its own worker thread. The detector is shared with
/// other sessions; the parameters are copied and private to this one.
pub fn spawn_session(detector: Detector, params: DetectionParams) -> SessionHandle {
    let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let (in_tx, in_rx) = crossbeam_channel::bounded::<String>(SESSION_QUEUE_DEPTH);
    let (out_tx, out_rx) = crossbeam_channel::bounded::<String>(SESSION_QUEUE_DEPTH);

    let worker = std::thread::spawn(move || {
        let mut session = RealtimeSession::new(detector, params);
        log::info!("Session {id} connected");
        for text in in_rx.iter() {
            let Some(response) = session.handle_text(&text) else {
                continue;
            };
            if out_tx.send(response.to_json()).is_err() {
                log::info!("Session {id}: client stopped reading");
                break;
            }
        }
        log::info!(
            "Session {id} disconnected after {} messages",
            session.sequence()
        );
        session.sequence()
    });

    SessionHandle {
        id,
        inbound: in_tx,
        outbound: out_rx,
        worker,
    }
}
