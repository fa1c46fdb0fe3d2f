//! Audio player: control surface over the decode worker and the output stream.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cadence_core::{ClipId, Error, PlaybackState, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::buffer::{AudioBuffer, PlaybackProgress};
use crate::clip::AudioClip;
use crate::config::PlayerConfig;
use crate::output::{AudioHost, CpalHost, OutputConfig, OutputStream};
use crate::worker::{ControlCommand, DecodeWorker};

/// Events buffered for the caller before new ones are dropped.
pub const EVENT_CAPACITY: usize = 256;

/// Events emitted by the player.
///
/// Delivery is best effort: callers that never drain the queue lose new events
/// once [`EVENT_CAPACITY`] are pending. Faults are also kept for
/// [`AudioPlayer::take_error`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback state changed.
    StateChanged(PlaybackState),
    /// The worker opened a decode session.
    SessionOpened {
        clip: ClipId,
        sample_rate: u32,
        channels: usize,
    },
    /// The decoder reached end of stream.
    DecodeFinished { decoded_samples: u64 },
    /// A decode session failed and was torn down.
    Error(String),
}

/// Control-side view of the session started by `play()`.
struct ActiveSession {
    clip: Arc<AudioClip>,
    buffer: Arc<AudioBuffer>,
    stream: Box<dyn OutputStream>,
}

/// Streaming player for one clip at a time.
///
/// Owns a long-lived decode worker thread. `play` opens an output stream bound to
/// a fresh [`AudioBuffer`] and hands the decode session to the worker; the output
/// callback drains the buffer on the driver's thread. Control calls only queue
/// commands and never wait on decoding.
pub struct AudioPlayer {
    host: Box<dyn AudioHost>,
    config: PlayerConfig,
    state: PlaybackState,
    session: Option<ActiveSession>,
    command_tx: Sender<ControlCommand>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
    fault_rx: Receiver<Error>,
    worker: Option<JoinHandle<()>>,
}

impl AudioPlayer {
    /// Create a player on the default output device.
    pub fn new() -> Result<Self> {
        Self::with_config(PlayerConfig::default())
    }

    /// Create a player on the default output device with custom tuning.
    pub fn with_config(config: PlayerConfig) -> Result<Self> {
        Self::with_host(CpalHost::new()?, config)
    }

    /// Create a player on an arbitrary host.
    pub fn with_host(host: impl AudioHost + 'static, config: PlayerConfig) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let (fault_tx, fault_rx) = unbounded();

        let worker = DecodeWorker::new(command_rx, event_tx.clone(), fault_tx, config.backoff());
        let worker = std::thread::Builder::new()
            .name("audio-decode".to_string())
            .spawn(move || worker.run())?;

        info!("Audio player ready on device: {}", host.device_name());

        Ok(Self {
            host: Box::new(host),
            config,
            state: PlaybackState::Stopped,
            session: None,
            command_tx,
            event_tx,
            event_rx,
            fault_rx,
            worker: Some(worker),
        })
    }

    /// Start playing `clip` from the beginning.
    pub fn play(&mut self, clip: Arc<AudioClip>) -> Result<()> {
        self.require(&[PlaybackState::Stopped], "play")?;

        // Faults belong to the session that raised them
        while let Ok(stale) = self.fault_rx.try_recv() {
            debug!("Discarding fault from previous session: {stale}");
        }

        let channels = u16::try_from(clip.channels()).map_err(|_| {
            Error::UnsupportedFormat(format!("{} channels", clip.channels()))
        })?;
        let buffer = Arc::new(AudioBuffer::new(
            clip.sample_rate(),
            clip.channels(),
            &self.config,
        )?);

        let render_buffer = Arc::clone(&buffer);
        let mut stream = self.host.open_stream(
            OutputConfig {
                sample_rate: clip.sample_rate(),
                channels,
            },
            Box::new(move |output| render_buffer.render(output)),
        )?;
        stream.start()?;

        self.send(ControlCommand::Play {
            clip: Arc::clone(&clip),
            buffer: Arc::clone(&buffer),
        })?;

        info!(
            "Playing clip {} ({} Hz, {} channels)",
            clip.id(),
            clip.sample_rate(),
            clip.channels()
        );

        self.session = Some(ActiveSession {
            clip,
            buffer,
            stream,
        });
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Pause output; decoding stops but the session is kept.
    pub fn pause(&mut self) -> Result<()> {
        self.require(&[PlaybackState::Playing], "pause")?;

        if let Some(session) = self.session.as_mut() {
            session.stream.stop()?;
            self.command_tx
                .send(ControlCommand::Pause)
                .map_err(|_| Error::WorkerUnavailable)?;
            session.buffer.wake();
        }

        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Resume output and decoding of a paused session.
    pub fn resume(&mut self) -> Result<()> {
        self.require(&[PlaybackState::Paused], "resume")?;

        if let Some(session) = self.session.as_mut() {
            session.stream.start()?;
        }
        self.send(ControlCommand::Resume)?;

        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Close the output stream and release the decode session.
    pub fn stop(&mut self) -> Result<()> {
        self.require(&[PlaybackState::Playing, PlaybackState::Paused], "stop")?;

        let result = self.teardown();
        self.set_state(PlaybackState::Stopped);
        result
    }

    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }

    /// Whether the current session has played every decoded sample and decoding is done.
    pub fn is_finished(&self) -> bool {
        self.progress().is_some_and(|p| p.is_complete())
    }

    /// Whether the host stream is currently pulling audio.
    pub fn is_stream_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.stream.is_active())
    }

    /// Counters of the current session.
    pub fn progress(&self) -> Option<PlaybackProgress> {
        self.session
            .as_ref()
            .map(|session| session.buffer.progress())
    }

    /// Elapsed playback time of the current session in seconds.
    pub fn position(&self) -> Option<f64> {
        let session = self.session.as_ref()?;
        let progress = session.buffer.progress();
        let samples_per_sec = f64::from(session.buffer.sample_rate()) * session.buffer.channels() as f64;
        Some(progress.consumed_samples as f64 / samples_per_sec)
    }

    /// The clip of the current session.
    pub fn clip(&self) -> Option<&Arc<AudioClip>> {
        self.session.as_ref().map(|session| &session.clip)
    }

    pub const fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Take the fatal error of the current session, if one occurred.
    pub fn take_error(&self) -> Option<Error> {
        self.fault_rx.try_recv().ok()
    }

    /// Try to receive an event without blocking.
    pub fn try_recv_event(&self) -> Option<PlayerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn require(&self, allowed: &[PlaybackState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidStateTransition {
                from: self.state,
                action,
            })
        }
    }

    fn send(&self, command: ControlCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::WorkerUnavailable)
    }

    /// Close the stream, then have the worker drop its session.
    fn teardown(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let ActiveSession { clip, buffer, stream } = session;
        drop(stream);

        let result = self.send(ControlCommand::Stop);
        buffer.wake();
        info!("Stopped clip {}", clip.id());
        result
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = std::mem::replace(&mut self.state, new_state);

        if old_state != new_state {
            debug!("State changed: {:?} -> {:?}", old_state, new_state);
            let _ = self.event_tx.try_send(PlayerEvent::StateChanged(new_state));
        }
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Failed to stop session on drop: {e}");
        }

        let _ = self.command_tx.send(ControlCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Decode worker panicked");
            }
        }
    }
}
