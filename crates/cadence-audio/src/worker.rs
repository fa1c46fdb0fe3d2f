//! Decode worker thread.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::Error;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, trace};

use crate::buffer::AudioBuffer;
use crate::clip::AudioClip;
use crate::player::PlayerEvent;
use crate::session::{DecodeSession, DecodeStep};

/// Commands queued from control callers to the worker.
#[derive(Debug)]
pub enum ControlCommand {
    /// Open a session for `clip` and start filling `buffer`.
    Play {
        clip: Arc<AudioClip>,
        buffer: Arc<AudioBuffer>,
    },
    /// Leave the decode loop, keeping the session.
    Pause,
    /// Re-enter the decode loop with the retained session.
    Resume,
    /// Release the session.
    Stop,
    /// Exit the worker thread.
    Shutdown,
}

impl ControlCommand {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
        }
    }
}

/// What the worker does after handling a command.
enum Flow {
    Idle,
    Dispatch(ControlCommand),
    Shutdown,
}

/// Long-lived worker owning the active decode session.
pub(crate) struct DecodeWorker {
    command_rx: Receiver<ControlCommand>,
    event_tx: Sender<PlayerEvent>,
    fault_tx: Sender<Error>,
    backoff: Duration,
    session: Option<DecodeSession>,
}

impl DecodeWorker {
    pub(crate) const fn new(
        command_rx: Receiver<ControlCommand>,
        event_tx: Sender<PlayerEvent>,
        fault_tx: Sender<Error>,
        backoff: Duration,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            fault_tx,
            backoff,
            session: None,
        }
    }

    pub(crate) fn run(mut self) {
        info!("Decode worker started");

        let mut pending = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match self.command_rx.recv() {
                    Ok(command) => command,
                    Err(_) => {
                        debug!("Command channel closed, shutting down");
                        break;
                    }
                },
            };

            match self.handle(command) {
                Flow::Idle => {}
                Flow::Dispatch(command) => pending = Some(command),
                Flow::Shutdown => break,
            }
        }

        self.release_session();
        info!("Decode worker stopped");
    }

    fn handle(&mut self, command: ControlCommand) -> Flow {
        debug!("Worker command: {}", command.name());

        match command {
            ControlCommand::Play { clip, buffer } => {
                self.release_session();
                match DecodeSession::open(&clip, Arc::clone(&buffer)) {
                    Ok(session) => {
                        self.emit(PlayerEvent::SessionOpened {
                            clip: clip.id(),
                            sample_rate: buffer.sample_rate(),
                            channels: buffer.channels(),
                        });
                        self.session = Some(session);
                        self.decode_loop()
                    }
                    Err(e) => {
                        // Nothing was decoded; let the callback report completion
                        buffer.lock().mark_finished();
                        self.fail(e);
                        Flow::Idle
                    }
                }
            }
            ControlCommand::Resume => match self.session.as_ref().map(DecodeSession::is_finished) {
                Some(false) => self.decode_loop(),
                Some(true) => {
                    trace!("Resume after end of stream, nothing to decode");
                    Flow::Idle
                }
                None => {
                    trace!("Resume without a session");
                    Flow::Idle
                }
            },
            ControlCommand::Pause => {
                trace!("Pause while decoding is idle");
                Flow::Idle
            }
            ControlCommand::Stop => {
                self.release_session();
                Flow::Idle
            }
            ControlCommand::Shutdown => Flow::Shutdown,
        }
    }

    /// Decode packets until end of stream, a fault, or a control command.
    fn decode_loop(&mut self) -> Flow {
        let mut throttled = false;

        loop {
            match self.command_rx.try_recv() {
                Ok(ControlCommand::Pause) => {
                    debug!("Decoding paused");
                    return Flow::Idle;
                }
                Ok(ControlCommand::Stop) => {
                    self.release_session();
                    return Flow::Idle;
                }
                Ok(ControlCommand::Resume) => {}
                Ok(command @ (ControlCommand::Play { .. } | ControlCommand::Shutdown)) => {
                    return Flow::Dispatch(command);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Flow::Shutdown,
            }

            let Some(session) = self.session.as_mut() else {
                return Flow::Idle;
            };

            if session.buffer().wait_for_space(self.backoff) {
                if !throttled {
                    debug!("Buffer above threshold, throttling decode");
                    throttled = true;
                }
                continue;
            }
            if throttled {
                debug!("Buffer drained, resuming decode");
                throttled = false;
            }

            match session.decode_next() {
                Ok(DecodeStep::EndOfStream) => {
                    let decoded_samples = session.buffer().progress().decoded_samples;
                    info!("Decoding finished: {decoded_samples} samples");
                    self.emit(PlayerEvent::DecodeFinished { decoded_samples });
                    return Flow::Idle;
                }
                Ok(DecodeStep::Blocked { needed }) => {
                    trace!("Waiting for room for {needed} samples");
                    session.buffer().wait_for_room(needed, self.backoff);
                }
                Ok(DecodeStep::Decoded(_) | DecodeStep::Skipped) => {}
                Err(e) => {
                    self.fail(e);
                    return Flow::Idle;
                }
            }
        }
    }

    /// Terminate the session after a fatal decode error.
    fn fail(&mut self, error: Error) {
        error!("Decode session failed: {error}");

        if let Some(mut session) = self.session.take() {
            session.finish();
        }
        self.emit(PlayerEvent::Error(error.to_string()));
        let _ = self.fault_tx.send(error);
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Releasing decode session for clip {}", session.clip_id());
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.event_tx.try_send(event).is_err() {
            trace!("Event queue full or closed, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]

    use super::*;
    use crate::buffer::CallbackStatus;
    use crate::config::PlayerConfig;
    use crate::testing::sine_clip;
    use crossbeam_channel::unbounded;

    const TIMEOUT: Duration = Duration::from_secs(10);

    struct Harness {
        command_tx: Sender<ControlCommand>,
        event_rx: Receiver<PlayerEvent>,
        fault_rx: Receiver<Error>,
        thread: std::thread::JoinHandle<()>,
    }

    fn spawn_worker() -> Harness {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (fault_tx, fault_rx) = unbounded();
        let worker = DecodeWorker::new(command_rx, event_tx, fault_tx, Duration::from_millis(20));
        let thread = std::thread::spawn(move || worker.run());

        Harness {
            command_tx,
            event_rx,
            fault_rx,
            thread,
        }
    }

    #[test]
    fn test_fatal_decode_error_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let clip = Arc::new(sine_clip(dir.path(), 8000, 1, 800));
        let buffer = Arc::new(AudioBuffer::new(8000, 2, &PlayerConfig::default()).unwrap());
        let harness = spawn_worker();

        harness
            .command_tx
            .send(ControlCommand::Play {
                clip,
                buffer: Arc::clone(&buffer),
            })
            .unwrap();

        let fault = harness.fault_rx.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(fault, Error::UnsupportedFormat(_)));

        let events: Vec<_> = harness.event_rx.try_iter().collect();
        assert!(matches!(
            events.first(),
            Some(PlayerEvent::SessionOpened { channels: 2, .. })
        ));
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Error(_))));

        // The callback sees a finished, fully drained session
        let progress = buffer.progress();
        assert!(progress.finished_decoding);
        assert!(progress.is_complete());
        let mut output = [1.0f32; 8];
        assert_eq!(buffer.render(&mut output), CallbackStatus::Complete);
        assert!(output.iter().all(|&s| s == 0.0));

        // Nothing is left to resume
        harness.command_tx.send(ControlCommand::Resume).unwrap();
        harness.command_tx.send(ControlCommand::Shutdown).unwrap();
        harness.thread.join().unwrap();

        assert!(harness.event_rx.try_recv().is_err());
        assert!(harness.fault_rx.try_recv().is_err());
        assert_eq!(buffer.progress(), progress);
    }

    #[test]
    fn test_clean_session_reports_no_fault() {
        let dir = tempfile::tempdir().unwrap();
        let clip = Arc::new(sine_clip(dir.path(), 8000, 2, 800));
        let buffer = Arc::new(AudioBuffer::new(8000, 2, &PlayerConfig::default()).unwrap());
        let harness = spawn_worker();

        harness
            .command_tx
            .send(ControlCommand::Play {
                clip,
                buffer: Arc::clone(&buffer),
            })
            .unwrap();

        let finished = loop {
            match harness.event_rx.recv_timeout(TIMEOUT).unwrap() {
                PlayerEvent::DecodeFinished { decoded_samples } => break decoded_samples,
                PlayerEvent::Error(message) => panic!("unexpected fault: {message}"),
                _ => {}
            }
        };
        assert_eq!(finished, 1600);

        harness.command_tx.send(ControlCommand::Shutdown).unwrap();
        harness.thread.join().unwrap();
        assert!(harness.fault_rx.try_recv().is_err());
    }

    #[test]
    fn test_session_open_failure_finishes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let clip = sine_clip(dir.path(), 8000, 2, 800).with_data(vec![0x42u8; 512]);
        let buffer = Arc::new(AudioBuffer::new(8000, 2, &PlayerConfig::default()).unwrap());
        let harness = spawn_worker();

        harness
            .command_tx
            .send(ControlCommand::Play {
                clip: Arc::new(clip),
                buffer: Arc::clone(&buffer),
            })
            .unwrap();

        let fault = harness.fault_rx.recv_timeout(TIMEOUT).unwrap();
        assert!(!fault.is_state_error());

        let events: Vec<_> = harness.event_rx.try_iter().collect();
        assert!(!events
            .iter()
            .any(|e| matches!(e, PlayerEvent::SessionOpened { .. })));
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Error(_))));
        assert!(buffer.progress().is_complete());

        harness.command_tx.send(ControlCommand::Shutdown).unwrap();
        harness.thread.join().unwrap();
    }
}
