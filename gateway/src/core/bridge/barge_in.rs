//! Barge-in controller.
//!
//! Tracks whether the assistant is talking, which output item its audio
//! belongs to, and how much of that item the caller has actually heard. When
//! the caller talks over the assistant the controller produces exactly one
//! `response.cancel`, at most one `conversation.item.truncate`, and suppresses
//! every later chunk of the interrupted item.
//!
//! ```text
//!   Idle ──first delta──▶ Responding ──caller speech──▶ Interrupting
//!    ▲                        │                              │
//!    │◀──── response.done ────┘                      commands issued
//!    │                                                       ▼
//!    └────── response.done / output_item.added ────── Suppressed
//! ```
//!
//! The controller is plain data. It lives inside the session record and is
//! only touched under the session lock, which is also the lock the pacer
//! takes before emitting each frame.

use tracing::{debug, info};

use crate::core::codec::SAMPLE_RATE_HZ;
use crate::core::realtime::ClientEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BargeInState {
    /// Assistant silent
    #[default]
    Idle,
    /// Assistant audio is flowing for the current item
    Responding,
    /// Caller speech detected, commands being issued
    Interrupting,
    /// Waiting for the upstream to acknowledge; all audio is dropped
    Suppressed,
}

impl std::fmt::Display for BargeInState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BargeInState::Idle => write!(f, "idle"),
            BargeInState::Responding => write!(f, "responding"),
            BargeInState::Interrupting => write!(f, "interrupting"),
            BargeInState::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// What noticed the caller talking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    /// Strict-profile energy detection on the uplink
    LocalVad,
    /// The upstream's `input_audio_buffer.speech_started`
    ServerVad,
    /// Normal-profile detection while leftover playback drains after a response
    PlaybackDrain,
}

/// Upstream commands for one interruption, in send order.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptPlan {
    pub commands: Vec<ClientEvent>,
    pub item_id: Option<String>,
    pub audio_end_ms: u64,
}

/// Verdict on an incoming audio delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaVerdict {
    Accept,
    Drop,
}

#[derive(Debug, Default)]
pub struct BargeInController {
    state: BargeInState,
    current_item: Option<String>,
    cancelled_item: Option<String>,
    /// μ-law is one byte per sample
    played_samples: u64,
    ai_speaking: bool,
    suppress: bool,
}

impl BargeInController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BargeInState {
        self.state
    }

    pub fn current_item(&self) -> Option<&str> {
        self.current_item.as_deref()
    }

    pub fn is_responding(&self) -> bool {
        self.state == BargeInState::Responding
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress
    }

    pub fn played_samples(&self) -> u64 {
        self.played_samples
    }

    /// Milliseconds of the current item the caller has heard.
    pub fn audio_end_ms(&self) -> u64 {
        self.played_samples * 1000 / SAMPLE_RATE_HZ as u64
    }

    /// Gate an audio delta for `item_id`, starting a response when idle.
    pub fn on_audio_delta(&mut self, item_id: &str) -> DeltaVerdict {
        if self.cancelled_item.as_deref() == Some(item_id) {
            return DeltaVerdict::Drop;
        }

        match self.state {
            BargeInState::Idle => {
                if self.current_item.as_deref() != Some(item_id) {
                    self.current_item = Some(item_id.to_string());
                    self.played_samples = 0;
                }
                self.state = BargeInState::Responding;
                self.ai_speaking = true;
                self.suppress = false;
                debug!(item_id, "Assistant started responding");
                DeltaVerdict::Accept
            }
            BargeInState::Responding if self.current_item.as_deref() == Some(item_id) => {
                DeltaVerdict::Accept
            }
            _ => DeltaVerdict::Drop,
        }
    }

    /// Whether a frame of `item_id` may still be played.
    pub fn accepts(&self, item_id: &str) -> bool {
        !self.suppress
            && self.current_item.as_deref() == Some(item_id)
            && self.cancelled_item.as_deref() != Some(item_id)
    }

    /// Count samples delivered to the caller for the current item.
    pub fn record_played(&mut self, samples: usize) {
        self.played_samples += samples as u64;
    }

    fn truncate_command(&self) -> Option<ClientEvent> {
        let item_id = self.current_item.clone()?;
        Some(ClientEvent::ConversationItemTruncate {
            item_id,
            content_index: 0,
            audio_end_ms: self.audio_end_ms(),
        })
    }

    /// Start an interruption. Only acts while `Responding`; every other state
    /// returns `None`, so repeated triggers issue nothing.
    pub fn begin_interrupt(&mut self, source: InterruptSource) -> Option<InterruptPlan> {
        if self.state != BargeInState::Responding {
            return None;
        }

        self.suppress = true;
        self.state = BargeInState::Interrupting;

        let mut commands = vec![ClientEvent::ResponseCancel];
        if self.ai_speaking
            && let Some(truncate) = self.truncate_command()
        {
            commands.push(truncate);
        }

        let plan = InterruptPlan {
            commands,
            item_id: self.current_item.clone(),
            audio_end_ms: self.audio_end_ms(),
        };
        self.cancelled_item = self.current_item.clone();

        info!(
            ?source,
            item_id = ?plan.item_id,
            audio_end_ms = plan.audio_end_ms,
            "Caller barged in"
        );
        Some(plan)
    }

    /// Commands for an interruption have been handed to the upstream.
    pub fn mark_suppressed(&mut self) {
        if self.state == BargeInState::Interrupting {
            self.state = BargeInState::Suppressed;
        }
    }

    /// Caller spoke while audio from a finished response was still queued.
    ///
    /// There is no response to cancel; the item is truncated to what was heard
    /// and its remaining audio is dropped.
    pub fn interrupt_drain(&mut self) -> Option<InterruptPlan> {
        if self.state != BargeInState::Idle || self.suppress {
            return None;
        }
        let truncate = self.truncate_command()?;

        let plan = InterruptPlan {
            commands: vec![truncate],
            item_id: self.current_item.clone(),
            audio_end_ms: self.audio_end_ms(),
        };
        info!(
            source = ?InterruptSource::PlaybackDrain,
            item_id = ?plan.item_id,
            audio_end_ms = plan.audio_end_ms,
            "Caller spoke over trailing playback"
        );
        self.cancelled_item = self.current_item.take();
        self.played_samples = 0;
        Some(plan)
    }

    fn reset_to_idle(&mut self) {
        self.state = BargeInState::Idle;
        self.current_item = None;
        self.played_samples = 0;
        self.ai_speaking = false;
        self.suppress = false;
    }

    /// `response.done`, whatever its status.
    pub fn on_response_done(&mut self) {
        match self.state {
            BargeInState::Interrupting | BargeInState::Suppressed => {
                debug!("Interrupted response finished");
                self.reset_to_idle();
            }
            BargeInState::Responding => {
                // Queued frames of the finished item keep playing.
                self.state = BargeInState::Idle;
                self.ai_speaking = false;
            }
            BargeInState::Idle => {}
        }
    }

    /// `response.output_item.added`.
    pub fn on_output_item_added(&mut self) {
        if matches!(
            self.state,
            BargeInState::Interrupting | BargeInState::Suppressed
        ) {
            debug!("New output item after interruption");
            self.reset_to_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responding(item: &str) -> BargeInController {
        let mut controller = BargeInController::new();
        assert_eq!(controller.on_audio_delta(item), DeltaVerdict::Accept);
        controller
    }

    #[test]
    fn test_first_delta_starts_response() {
        let controller = responding("it_1");
        assert_eq!(controller.state(), BargeInState::Responding);
        assert_eq!(controller.current_item(), Some("it_1"));
        assert!(controller.accepts("it_1"));
        assert!(!controller.accepts("it_2"));
    }

    #[test]
    fn test_foreign_item_dropped_while_responding() {
        let mut controller = responding("it_1");
        assert_eq!(controller.on_audio_delta("it_2"), DeltaVerdict::Drop);
        assert_eq!(controller.on_audio_delta("it_1"), DeltaVerdict::Accept);
    }

    #[test]
    fn test_interrupt_issues_cancel_and_truncate_once() {
        let mut controller = responding("it_1");
        controller.record_played(160 * 50); // one second

        let plan = controller.begin_interrupt(InterruptSource::LocalVad).unwrap();
        assert_eq!(
            plan.commands,
            vec![
                ClientEvent::ResponseCancel,
                ClientEvent::ConversationItemTruncate {
                    item_id: "it_1".to_string(),
                    content_index: 0,
                    audio_end_ms: 1000,
                },
            ]
        );
        assert_eq!(controller.state(), BargeInState::Interrupting);

        controller.mark_suppressed();
        assert_eq!(controller.state(), BargeInState::Suppressed);

        assert!(controller.begin_interrupt(InterruptSource::LocalVad).is_none());
        assert!(controller.begin_interrupt(InterruptSource::ServerVad).is_none());
    }

    #[test]
    fn test_interrupt_ignored_when_idle() {
        let mut controller = BargeInController::new();
        assert!(controller.begin_interrupt(InterruptSource::ServerVad).is_none());
        assert_eq!(controller.state(), BargeInState::Idle);
    }

    #[test]
    fn test_suppressed_drops_everything() {
        let mut controller = responding("it_1");
        controller.begin_interrupt(InterruptSource::LocalVad);
        controller.mark_suppressed();

        assert!(controller.is_suppressed());
        assert!(!controller.accepts("it_1"));
        assert_eq!(controller.on_audio_delta("it_1"), DeltaVerdict::Drop);
        assert_eq!(controller.on_audio_delta("it_2"), DeltaVerdict::Drop);
    }

    #[test]
    fn test_response_done_after_interrupt_returns_idle() {
        let mut controller = responding("it_1");
        controller.record_played(800);
        controller.begin_interrupt(InterruptSource::LocalVad);
        controller.mark_suppressed();

        controller.on_response_done();
        assert_eq!(controller.state(), BargeInState::Idle);
        assert_eq!(controller.played_samples(), 0);
        assert!(!controller.is_suppressed());

        // The cancelled item stays dead; the next one plays.
        assert_eq!(controller.on_audio_delta("it_1"), DeltaVerdict::Drop);
        assert_eq!(controller.on_audio_delta("it_2"), DeltaVerdict::Accept);
        assert_eq!(controller.state(), BargeInState::Responding);
    }

    #[test]
    fn test_output_item_added_ends_suppression() {
        let mut controller = responding("it_1");
        controller.begin_interrupt(InterruptSource::ServerVad);
        controller.mark_suppressed();

        controller.on_output_item_added();
        assert_eq!(controller.state(), BargeInState::Idle);
        assert!(controller.current_item().is_none());

        // No effect outside suppression.
        let mut controller = responding("it_3");
        controller.on_output_item_added();
        assert_eq!(controller.state(), BargeInState::Responding);
    }

    #[test]
    fn test_normal_completion_keeps_item_for_playback() {
        let mut controller = responding("it_1");
        controller.record_played(160);
        controller.on_response_done();

        assert_eq!(controller.state(), BargeInState::Idle);
        assert!(controller.accepts("it_1"));
        assert_eq!(controller.played_samples(), 160);
    }

    #[test]
    fn test_new_item_after_completion_resets_counter() {
        let mut controller = responding("it_1");
        controller.record_played(1600);
        controller.on_response_done();

        assert_eq!(controller.on_audio_delta("it_2"), DeltaVerdict::Accept);
        assert_eq!(controller.played_samples(), 0);
        assert!(!controller.accepts("it_1"));
    }

    #[test]
    fn test_interrupt_drain_truncates_without_cancel() {
        let mut controller = responding("it_1");
        controller.record_played(4000);
        controller.on_response_done();

        let plan = controller.interrupt_drain().unwrap();
        assert_eq!(
            plan.commands,
            vec![ClientEvent::ConversationItemTruncate {
                item_id: "it_1".to_string(),
                content_index: 0,
                audio_end_ms: 500,
            }]
        );
        assert!(!controller.accepts("it_1"));
        assert!(controller.interrupt_drain().is_none());
        assert_eq!(controller.on_audio_delta("it_1"), DeltaVerdict::Drop);
    }

    #[test]
    fn test_audio_end_ms() {
        let mut controller = responding("it_1");
        controller.record_played(480);
        assert_eq!(controller.audio_end_ms(), 60);
    }
}
