//! Per-call session state.
//!
//! Everything the uplink, downlink and pacer tasks share sits behind one
//! mutex: the barge-in controller, the frame assembler and the playback queue.
//! Suppression and the pacer's per-frame check therefore observe the same
//! state; once an interruption is recorded no further frame of the cancelled
//! item can be emitted. The carrier `clear` is handed out by
//! [`CallSession::next_frame`], so it leaves through the pacer behind any frame
//! already in flight.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, trace};

use super::barge_in::{BargeInController, DeltaVerdict, InterruptSource};
use super::pacer::{FrameAssembler, PlaybackQueue, QueuedFrame};
use crate::core::realtime::ClientEvent;
use crate::core::registry::UNKNOWN_PHONE;
use crate::core::telephony::TelephonyOutbound;
use crate::errors::{BridgeError, BridgeResult};

/// Counters reported when a call ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_played: u64,
    pub frames_overflowed: u64,
    pub frames_flushed: u64,
    pub interruptions: u64,
    pub tool_calls: u64,
}

/// State of one bridged call.
#[derive(Debug)]
pub struct CallSession {
    pub connection_id: String,
    pub stream_sid: Option<String>,
    pub call_identity: Option<String>,
    pub caller_phone: String,
    pub barge_in: BargeInController,
    assembler: FrameAssembler,
    playback: PlaybackQueue,
    /// A carrier `clear` is owed before the next frame
    pending_clear: bool,
    pub stats: SessionStats,
}

/// Upstream commands a caller of [`CallSession::interrupt`] must send, in
/// order: cancel (when a response is live) then truncate.
#[derive(Debug, Clone, PartialEq)]
pub struct Interruption {
    pub commands: Vec<ClientEvent>,
}

impl CallSession {
    pub fn new(connection_id: impl Into<String>, playback_capacity: usize) -> Self {
        Self {
            connection_id: connection_id.into(),
            stream_sid: None,
            call_identity: None,
            caller_phone: UNKNOWN_PHONE.to_string(),
            barge_in: BargeInController::new(),
            assembler: FrameAssembler::new(),
            playback: PlaybackQueue::new(playback_capacity),
            pending_clear: false,
            stats: SessionStats::default(),
        }
    }

    pub fn playback_len(&self) -> usize {
        self.playback.len()
    }

    pub fn has_pending_playback(&self) -> bool {
        !self.playback.is_empty()
    }

    /// Accept decoded assistant audio for `item_id`. Returns the number of
    /// frames queued; zero when the delta was rejected or too short.
    pub fn accept_audio(&mut self, item_id: &str, audio: &[u8]) -> usize {
        if self.barge_in.on_audio_delta(item_id) == DeltaVerdict::Drop {
            trace!(item_id, "Dropping assistant audio");
            return 0;
        }

        let frames = self.assembler.push(item_id, audio);
        let Some(shared_id) = self.assembler.item_id() else {
            return 0;
        };

        let queued = frames.len();
        for audio in frames {
            let overflowed = self.playback.push(QueuedFrame {
                item_id: Arc::clone(&shared_id),
                audio,
            });
            if overflowed {
                self.stats.frames_overflowed += 1;
            }
        }
        queued
    }

    /// Next event for the carrier: an owed `clear` first, then the next
    /// frame the controller still accepts.
    pub fn next_frame(&mut self) -> Option<TelephonyOutbound> {
        let stream_sid = self.stream_sid.clone()?;
        if std::mem::take(&mut self.pending_clear) {
            return Some(TelephonyOutbound::clear(stream_sid));
        }
        while let Some(frame) = self.playback.pop() {
            if !self.barge_in.accepts(&frame.item_id) {
                continue;
            }
            self.barge_in.record_played(frame.audio.len());
            self.stats.frames_played += 1;
            return Some(TelephonyOutbound::media(stream_sid, &frame.audio));
        }
        None
    }

    fn flush_playback(&mut self) {
        let dropped = self.playback.clear();
        self.assembler.reset();
        self.stats.frames_flushed += dropped as u64;
        if dropped > 0 {
            debug!(dropped, "Flushed queued playback");
        }
    }

    /// Interrupt the live response. `None` unless the assistant is responding.
    pub fn interrupt(&mut self, source: InterruptSource) -> Option<Interruption> {
        let plan = self.barge_in.begin_interrupt(source)?;
        self.flush_playback();
        self.barge_in.mark_suppressed();
        self.pending_clear = self.stream_sid.is_some();
        self.stats.interruptions += 1;

        Some(Interruption {
            commands: plan.commands,
        })
    }

    /// Stop trailing playback of a finished response. `None` unless the
    /// controller is idle with audio still queued.
    pub fn interrupt_drain(&mut self) -> Option<Interruption> {
        if !self.has_pending_playback() {
            return None;
        }
        let plan = self.barge_in.interrupt_drain()?;
        self.flush_playback();
        self.pending_clear = self.stream_sid.is_some();
        self.stats.interruptions += 1;

        Some(Interruption {
            commands: plan.commands,
        })
    }
}

/// A call session shared between the bridge tasks.
#[derive(Debug)]
pub struct SharedSession {
    state: Mutex<CallSession>,
    frames_ready: Notify,
}

impl SharedSession {
    pub fn new(session: CallSession) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(session),
            frames_ready: Notify::new(),
        })
    }

    /// Lock the session. Never hold the guard across an await.
    pub fn lock(&self) -> MutexGuard<'_, CallSession> {
        self.state.lock()
    }

    /// Wake the pacer after queueing frames.
    pub fn notify_frames(&self) {
        self.frames_ready.notify_one();
    }

    /// Wait until frames may be available.
    pub async fn frames_ready(&self) {
        self.frames_ready.notified().await;
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats
    }
}

/// Wake the pacer for the owed `clear`, then send the interruption's
/// commands upstream.
pub async fn deliver_interruption(
    interruption: Interruption,
    session: &SharedSession,
    upstream: &mpsc::Sender<ClientEvent>,
) -> BridgeResult<()> {
    session.notify_frames();
    for command in interruption.commands {
        upstream
            .send(command)
            .await
            .map_err(|_| BridgeError::Transport("realtime connection closed".to_string()))?;
    }
    Ok(())
}
