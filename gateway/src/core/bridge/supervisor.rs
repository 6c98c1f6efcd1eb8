//! Call session lifecycle.
//!
//! One supervisor run per telephony connection:
//!
//! 1. open the upstream connection, bounded by the connect timeout
//! 2. configure the upstream session
//! 3. run uplink, downlink and pacer until the first of them ends
//! 4. stop the others and release per-call resources
//!
//! If the upstream cannot be reached the telephony socket is closed with
//! code 1011 and nothing else is started.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::downlink::DownlinkRelay;
use super::pacer::{DEFAULT_PLAYBACK_QUEUE_FRAMES, FRAME_INTERVAL, run_pacer};
use super::session::{CallSession, SessionStats, SharedSession};
use super::tools::{ToolCallTracker, ToolDispatcher};
use super::uplink::{TelephonyInbound, UplinkPolicy, UplinkRelay};
use crate::core::orders::OrderStore;
use crate::core::realtime::openai::call_session_config;
use crate::core::realtime::{
    ClientEvent, DEFAULT_CONNECT_TIMEOUT_MS, RealtimeConnector, RealtimeLink,
};
use crate::core::registry::CallRegistry;
use crate::core::telephony::TelephonyRoute;
use crate::core::vad::VadProfiles;
use crate::errors::{BridgeError, BridgeResult};

/// Per-call tunables, derived from server configuration.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub voice: String,
    pub instructions: Option<String>,
    pub connect_timeout: Duration,
    pub uplink_policy: UplinkPolicy,
    pub playback_queue_frames: usize,
    pub frame_interval: Duration,
    pub vad: VadProfiles,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            instructions: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            uplink_policy: UplinkPolicy::default(),
            playback_queue_frames: DEFAULT_PLAYBACK_QUEUE_FRAMES,
            frame_interval: FRAME_INTERVAL,
            vad: VadProfiles::default(),
        }
    }
}

/// The bridge task that ended a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeTask {
    Uplink,
    Downlink,
    Pacer,
}

impl fmt::Display for BridgeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeTask::Uplink => write!(f, "uplink"),
            BridgeTask::Downlink => write!(f, "downlink"),
            BridgeTask::Pacer => write!(f, "pacer"),
        }
    }
}

/// What happened on a call that got past the upstream connect.
#[derive(Debug)]
pub struct CallSummary {
    pub connection_id: String,
    pub stream_sid: Option<String>,
    pub caller_phone: String,
    pub ended_by: Option<BridgeTask>,
    /// Set when the call ended on a failure rather than a hang-up
    pub error: Option<BridgeError>,
    pub stats: SessionStats,
}

/// Runs call sessions against shared collaborators.
#[derive(Clone)]
pub struct CallSupervisor {
    settings: BridgeSettings,
    connector: Arc<dyn RealtimeConnector>,
    store: Arc<dyn OrderStore>,
    registry: Arc<CallRegistry>,
}

impl CallSupervisor {
    pub fn new(
        settings: BridgeSettings,
        connector: Arc<dyn RealtimeConnector>,
        store: Arc<dyn OrderStore>,
        registry: Arc<CallRegistry>,
    ) -> Self {
        Self {
            settings,
            connector,
            store,
            registry,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    async fn connect(&self) -> BridgeResult<RealtimeLink> {
        match tokio::time::timeout(self.settings.connect_timeout, self.connector.connect()).await {
            Ok(result) => result.map_err(BridgeError::from),
            Err(_) => Err(BridgeError::UpstreamConnect(format!(
                "no realtime connection within {}ms",
                self.settings.connect_timeout.as_millis()
            ))),
        }
    }

    /// Bridge one call. `inbound` carries decoded telephony events; `outbound`
    /// feeds the telephony socket's sender task.
    ///
    /// Returns `Err(BridgeError::UpstreamConnect)` when the upstream could not
    /// be established; every other ending is reported in the summary.
    pub async fn run(
        &self,
        connection_id: String,
        inbound: mpsc::Receiver<TelephonyInbound>,
        outbound: mpsc::Sender<TelephonyRoute>,
    ) -> BridgeResult<CallSummary> {
        let link = match self.open_session().await {
            Ok(link) => link,
            Err(err) => {
                error!(connection_id = %connection_id, error = %err, "Closing call, realtime upstream unavailable");
                if outbound.send(TelephonyRoute::upstream_unavailable()).await.is_err() {
                    debug!("Telephony sender already closed");
                }
                return Err(err);
            }
        };
        let RealtimeLink { commands, events } = link;

        let session = SharedSession::new(CallSession::new(
            connection_id.clone(),
            self.settings.playback_queue_frames,
        ));

        let uplink = UplinkRelay {
            session: Arc::clone(&session),
            registry: Arc::clone(&self.registry),
            vad: self.settings.vad,
            policy: self.settings.uplink_policy,
            upstream: commands.clone(),
        };
        let downlink = DownlinkRelay {
            session: Arc::clone(&session),
            upstream: commands,
            dispatcher: ToolDispatcher::new(Arc::clone(&self.store)),
            tracker: ToolCallTracker::new(),
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(async move { (BridgeTask::Uplink, uplink.run(inbound).await) });
        tasks.spawn(async move { (BridgeTask::Downlink, downlink.run(events).await) });
        {
            let session = Arc::clone(&session);
            let outbound = outbound.clone();
            let interval = self.settings.frame_interval;
            tasks.spawn(async move {
                (BridgeTask::Pacer, run_pacer(session, outbound, interval).await)
            });
        }

        info!(connection_id = %connection_id, "Call bridge running");

        let (ended_by, result) = match tasks.join_next().await {
            Some(Ok((task, result))) => (Some(task), result),
            Some(Err(e)) => (
                None,
                Err(BridgeError::Transport(format!("bridge task failed: {e}"))),
            ),
            None => (None, Ok(())),
        };
        // Dropping the aborted relays drops the last command sender, which
        // closes the upstream socket.
        tasks.shutdown().await;

        let upstream_lost = ended_by == Some(BridgeTask::Downlink) && result.is_err();
        let close = if upstream_lost {
            TelephonyRoute::upstream_unavailable()
        } else {
            TelephonyRoute::call_ended()
        };
        if outbound.send(close).await.is_err() {
            debug!("Telephony sender already closed");
        }

        let (stream_sid, call_identity, caller_phone, stats) = {
            let session = session.lock();
            (
                session.stream_sid.clone(),
                session.call_identity.clone(),
                session.caller_phone.clone(),
                session.stats,
            )
        };
        if let Some(identity) = call_identity.as_deref()
            && self.registry.remove(identity).is_some()
        {
            debug!(call_identity = identity, "Released call registration");
        }

        let summary = CallSummary {
            connection_id,
            stream_sid,
            caller_phone,
            ended_by,
            error: result.err(),
            stats,
        };

        match &summary.error {
            Some(err) => warn!(
                connection_id = %summary.connection_id,
                ended_by = ?summary.ended_by,
                error = %err,
                "Call ended with error"
            ),
            None => info!(
                connection_id = %summary.connection_id,
                ended_by = ?summary.ended_by,
                frames_played = summary.stats.frames_played,
                interruptions = summary.stats.interruptions,
                tool_calls = summary.stats.tool_calls,
                "Call ended"
            ),
        }
        Ok(summary)
    }

    /// Connect and send the initial `session.update`.
    async fn open_session(&self) -> BridgeResult<RealtimeLink> {
        let link = self.connect().await?;
        let session = call_session_config(&self.settings.voice, self.settings.instructions.as_deref());
        link.commands
            .send(ClientEvent::SessionUpdate { session })
            .await
            .map_err(|_| {
                BridgeError::UpstreamConnect("realtime connection closed during setup".to_string())
            })?;
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::orders::InMemoryOrderStore;
    use crate::core::realtime::{RealtimeError, RealtimeResult, ServerEvent};
    use crate::core::telephony::{TelephonyEvent, TelephonyOutbound};
    use async_trait::async_trait;
    use base64::prelude::*;
    use parking_lot::Mutex;

    /// Hands out one pre-built link.
    struct ScriptedConnector {
        link: Mutex<Option<RealtimeLink>>,
    }

    #[async_trait]
    impl RealtimeConnector for ScriptedConnector {
        async fn connect(&self) -> RealtimeResult<RealtimeLink> {
            self.link.lock().take().ok_or(RealtimeError::NotConnected)
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl RealtimeConnector for RefusingConnector {
        async fn connect(&self) -> RealtimeResult<RealtimeLink> {
            Err(RealtimeError::ConnectionFailed("refused".to_string()))
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl RealtimeConnector for HangingConnector {
        async fn connect(&self) -> RealtimeResult<RealtimeLink> {
            std::future::pending().await
        }
    }

    fn settings() -> BridgeSettings {
        BridgeSettings {
            connect_timeout: Duration::from_millis(100),
            frame_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn supervisor(connector: Arc<dyn RealtimeConnector>) -> (CallSupervisor, Arc<CallRegistry>) {
        let registry = Arc::new(CallRegistry::new());
        let supervisor = CallSupervisor::new(
            settings(),
            connector,
            Arc::new(InMemoryOrderStore::new()),
            Arc::clone(&registry),
        );
        (supervisor, registry)
    }

    fn telephony(json: &str) -> TelephonyInbound {
        Ok(TelephonyEvent::parse(json).unwrap())
    }

    #[tokio::test]
    async fn test_refused_upstream_closes_with_1011() {
        let (supervisor, _) = supervisor(Arc::new(RefusingConnector));
        let (_in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let err = supervisor
            .run("conn-1".to_string(), in_rx, out_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamConnect(_)));
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::upstream_unavailable()));
    }

    #[tokio::test]
    async fn test_connect_timeout_closes_with_1011() {
        let (supervisor, _) = supervisor(Arc::new(HangingConnector));
        let (_in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let err = supervisor
            .run("conn-1".to_string(), in_rx, out_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamConnect(_)));
        assert!(matches!(
            out_rx.recv().await,
            Some(TelephonyRoute::Close { code: 1011, .. })
        ));
    }

    #[tokio::test]
    async fn test_full_call_lifecycle() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let connector = ScriptedConnector {
            link: Mutex::new(Some(RealtimeLink::new(cmd_tx, event_rx))),
        };
        let (supervisor, registry) = supervisor(Arc::new(connector));
        registry.register("CA1", "+15550100");

        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let call = tokio::spawn(async move {
            supervisor.run("conn-1".to_string(), in_rx, out_tx).await
        });

        // Session is configured first.
        match cmd_rx.recv().await {
            Some(ClientEvent::SessionUpdate { session }) => {
                assert_eq!(session.input_audio_format.as_deref(), Some("g711_ulaw"));
                assert_eq!(session.tools.unwrap()[0].name, "create_order");
            }
            other => panic!("Expected SessionUpdate, got {other:?}"),
        }

        in_tx
            .send(telephony(
                r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1"}}"#,
            ))
            .await
            .unwrap();

        let delta: ServerEvent = serde_json::from_value(serde_json::json!({
            "type": "response.audio.delta",
            "item_id": "it_1",
            "delta": BASE64_STANDARD.encode([0xFFu8; 480]),
        }))
        .unwrap();
        event_tx.send(delta).await.unwrap();

        for _ in 0..3 {
            match out_rx.recv().await {
                Some(TelephonyRoute::Outgoing(TelephonyOutbound::Media { stream_sid, media })) => {
                    assert_eq!(stream_sid, "MZ1");
                    assert_eq!(BASE64_STANDARD.decode(media.payload).unwrap().len(), 160);
                }
                other => panic!("Expected media frame, got {other:?}"),
            }
        }

        in_tx
            .send(telephony(r#"{"event":"stop","streamSid":"MZ1"}"#))
            .await
            .unwrap();

        let summary = call.await.unwrap().unwrap();
        assert_eq!(summary.ended_by, Some(BridgeTask::Uplink));
        assert!(summary.error.is_none());
        assert_eq!(summary.stream_sid.as_deref(), Some("MZ1"));
        assert_eq!(summary.caller_phone, "+15550100");
        assert_eq!(summary.stats.frames_played, 3);
        assert!(registry.is_empty());
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::call_ended()));

        // The upstream command channel is released with the session.
        while cmd_rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_upstream_loss_mid_call_closes_with_1011() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let connector = ScriptedConnector {
            link: Mutex::new(Some(RealtimeLink::new(cmd_tx, event_rx))),
        };
        let (supervisor, _) = supervisor(Arc::new(connector));
        let (_in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        drop(event_tx);
        let summary = supervisor
            .run("conn-1".to_string(), in_rx, out_tx)
            .await
            .unwrap();

        assert_eq!(summary.ended_by, Some(BridgeTask::Downlink));
        assert!(matches!(summary.error, Some(BridgeError::Transport(_))));
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::upstream_unavailable()));
    }
}
