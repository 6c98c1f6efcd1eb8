//! Downlink pacing.
//!
//! Assistant audio arrives in bursts of arbitrary size. The carrier expects
//! 20ms frames (160 μ-law bytes at 8kHz) at real-time rate, so deltas are cut
//! into frames, queued, and released one per tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::session::SharedSession;
use crate::core::telephony::TelephonyRoute;
use crate::errors::{BridgeError, BridgeResult};

/// Bytes in one 20ms frame of 8kHz μ-law.
pub const FRAME_BYTES: usize = 160;

/// Time covered by one frame.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Default bound on queued frames (10 seconds of audio).
pub const DEFAULT_PLAYBACK_QUEUE_FRAMES: usize = 500;

// =============================================================================
// Frame assembly
// =============================================================================

/// Cuts a stream of audio chunks into fixed-size frames.
///
/// Bytes that do not fill a frame are held until the next chunk of the same
/// item arrives. A chunk for a different item discards them.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    item_id: Option<Arc<str>>,
    pending: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append audio for `item_id` and return every complete frame.
    pub fn push(&mut self, item_id: &str, audio: &[u8]) -> Vec<Bytes> {
        if self.item_id.as_deref() != Some(item_id) {
            if !self.pending.is_empty() {
                trace!(
                    discarded = self.pending.len(),
                    "Dropping partial frame from previous item"
                );
            }
            self.pending.clear();
            self.item_id = Some(Arc::from(item_id));
        }

        self.pending.extend_from_slice(audio);

        let complete = self.pending.len() / FRAME_BYTES;
        let mut frames = Vec::with_capacity(complete);
        for _ in 0..complete {
            frames.push(self.pending.split_to(FRAME_BYTES).freeze());
        }
        frames
    }

    /// Shared item id of the frames most recently produced.
    pub fn item_id(&self) -> Option<Arc<str>> {
        self.item_id.clone()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.item_id = None;
        self.pending.clear();
    }
}

// =============================================================================
// Playback queue
// =============================================================================

/// One frame waiting to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedFrame {
    pub item_id: Arc<str>,
    pub audio: Bytes,
}

/// Bounded FIFO of frames. When full, the oldest frame is discarded.
#[derive(Debug)]
pub struct PlaybackQueue {
    frames: VecDeque<QueuedFrame>,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity.min(DEFAULT_PLAYBACK_QUEUE_FRAMES)),
            capacity,
        }
    }

    /// Enqueue a frame. Returns true when an older frame was dropped to make room.
    pub fn push(&mut self, frame: QueuedFrame) -> bool {
        let overflowed = if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            true
        } else {
            false
        };
        self.frames.push_back(frame);
        overflowed
    }

    pub fn pop(&mut self) -> Option<QueuedFrame> {
        self.frames.pop_front()
    }

    /// Discard everything. Returns the number of frames dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Pacer task
// =============================================================================

/// Release queued frames to the telephony side, one per `interval`.
///
/// This is the only path frames and the interruption `clear` take to the
/// carrier, so a frame popped before an interruption is always sent ahead of
/// its `clear`.
///
/// Sleeps while the queue is empty and restarts the cadence on the next
/// frame, so the first frame of a response goes out without delay. Ends with
/// a transport error once the telephony sender is gone.
pub async fn run_pacer(
    session: Arc<SharedSession>,
    outbound: mpsc::Sender<TelephonyRoute>,
    interval: Duration,
) -> BridgeResult<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let next = session.lock().next_frame();
        match next {
            Some(event) => {
                if outbound.send(TelephonyRoute::Outgoing(event)).await.is_err() {
                    debug!("Telephony sender closed, stopping pacer");
                    return Err(BridgeError::Transport(
                        "telephony sender closed".to_string(),
                    ));
                }
            }
            None => {
                session.frames_ready().await;
                ticker.reset_immediately();
            }
        }
    }
}
