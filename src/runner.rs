//! Async session driver.
//!
//! Runs a [`RunSession`] on a tokio task fed by two inputs:
//! - a location stream (`futures::Stream` of [`LocationUpdate`])
//! - a periodic timer for elapsed time
//!
//! Both are owned by the task, so cancelling the run is a single operation:
//! [`SessionHandle::stop`] ends the loop, which drops the stream (releasing
//! the location subscription) and the timer together. Dropping the handle
//! without calling `stop` tears down the same way.
//!
//! Pausing does not release either resource. The stream keeps being drained
//! and the timer keeps firing, and the paused session discards both until
//! resumed. The subscription is only closed on stop or teardown.
//!
//! ## Example
//!
//! ```rust,no_run
//! use course_tracker::{spawn_session, GpsPoint, RunSession, TrackerConfig};
//!
//! # async fn run(fixes: futures::channel::mpsc::UnboundedReceiver<course_tracker::LocationUpdate>) {
//! let mut session = RunSession::new(TrackerConfig::default());
//! session
//!     .load_course(vec![GpsPoint::new(33.3339, 126.2561), GpsPoint::new(33.3349, 126.2561)], vec![])
//!     .unwrap();
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let handle = spawn_session(session, fixes, events_tx).unwrap();
//! if let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! let summary = handle.stop().await.unwrap();
//! println!("{:.2} km", summary.metrics.total_distance_km);
//! # }
//! ```

use std::time::Duration;

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{Result, TrackerError};
use crate::session::{LocationUpdate, RunSession, RunSummary, SessionEvent};

enum Command {
    Pause,
    Resume,
    AcknowledgeArrival,
    Stop(oneshot::Sender<Result<RunSummary>>),
}

/// Control handle for a running session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn send(&self, action: &str, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TrackerError::SessionState {
                action: action.to_string(),
                state: "stopped".to_string(),
            })
    }

    pub fn pause(&self) -> Result<()> {
        self.send("pause", Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send("resume", Command::Resume)
    }

    /// Let the next POI arrival fire.
    pub fn acknowledge_arrival(&self) -> Result<()> {
        self.send("acknowledge arrival", Command::AcknowledgeArrival)
    }

    /// True once the driver task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the run, release the location stream and timer, and return the
    /// final summary.
    pub async fn stop(self) -> Result<RunSummary> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send("stop", Command::Stop(reply_tx))?;

        let summary = reply_rx.await.map_err(|_| TrackerError::SessionState {
            action: "stop".to_string(),
            state: "stopped".to_string(),
        })?;

        if let Err(e) = self.task.await {
            warn!("[SessionRunner] Driver task join error: {}", e);
        }
        summary
    }
}

/// Start `session` and drive it from `fixes` and the configured timer on a
/// new tokio task.
///
/// The session must have a course loaded and a valid config. Events are
/// delivered on `events` in the order they are produced. If the receiver is
/// dropped the run is torn down.
pub fn spawn_session<S>(
    mut session: RunSession,
    fixes: S,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<SessionHandle>
where
    S: Stream<Item = LocationUpdate> + Send + Unpin + 'static,
{
    session.config().validate()?;
    session.start()?;
    let period = Duration::from_millis(session.config().tick_interval_ms);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(drive(session, fixes, events, commands_rx, period));
    Ok(SessionHandle {
        commands: commands_tx,
        task,
    })
}

async fn drive<S>(
    mut session: RunSession,
    mut fixes: S,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    period: Duration,
) where
    S: Stream<Item = LocationUpdate> + Unpin,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stream_open = true;

    info!("[SessionRunner] Started, tick every {:?}", period);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Pause) => {
                    if let Err(e) = session.pause() {
                        warn!("[SessionRunner] {}", e);
                    }
                }
                Some(Command::Resume) => {
                    if let Err(e) = session.resume() {
                        warn!("[SessionRunner] {}", e);
                    }
                }
                Some(Command::AcknowledgeArrival) => {
                    session.acknowledge_arrival();
                }
                Some(Command::Stop(reply)) => {
                    let summary = session.stop();
                    if reply.send(summary).is_err() {
                        debug!("[SessionRunner] Stop requester went away");
                    }
                    break;
                }
                None => {
                    info!("[SessionRunner] Handle dropped, stopping");
                    if let Err(e) = session.stop() {
                        debug!("[SessionRunner] {}", e);
                    }
                    break;
                }
            },
            update = fixes.next(), if stream_open => match update {
                Some(update) => {
                    let delivered = session
                        .on_location_update(update)
                        .into_iter()
                        .all(|event| events.send(event).is_ok());
                    if !delivered {
                        info!("[SessionRunner] Event receiver dropped, stopping");
                        break;
                    }
                }
                None => {
                    warn!("[SessionRunner] Location stream ended; timer keeps running");
                    stream_open = false;
                }
            },
            _ = ticker.tick() => {
                if let Some(event) = session.on_tick() {
                    if events.send(event).is_err() {
                        info!("[SessionRunner] Event receiver dropped, stopping");
                        break;
                    }
                }
            }
        }
    }

    session.dispose();
    info!("[SessionRunner] Stopped");
}
