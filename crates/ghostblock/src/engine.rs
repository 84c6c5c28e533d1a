//! The ghost-touch guard as a whole.
//!
//! [`GhostBlock`] owns the settings, the blocked regions and the recording
//! session behind a single mutex, so a touch decision, a timer expiry and a
//! user command can never interleave half-way. Handles are cheap to clone and
//! may be shared across threads.
//!
//! Settings and regions are cached in memory so [`GhostBlock::decide`] never
//! touches the backend. The cache is refreshed from the backend by
//! [`GhostBlock::reload`], and implicitly before a session starts and before
//! its points are promoted. Processes sharing a backend therefore see each
//! other's changes at those points.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::{Decision, TouchFilter};
use crate::lock_unpoisoned;
use crate::regions::BlockedRegionStore;
use crate::session::{
    FinishedSession, RecordingLease, RecordingSession, Scheduler, SessionSummary, StopReason,
};
use crate::settings::Settings;
use crate::storage::{keys, KeyValueStore};
use crate::touch::{BlockedRegion, Point, TouchEvent};

/// Notifications for whoever presents the guard to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardEvent {
    /// A touch was captured by the active session.
    PointCaptured(Point),
    /// A session ended manually or by timing out.
    SessionFinished(SessionSummary),
}

/// Point-in-time view of the guard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Whether filtering is on.
    pub enabled: bool,
    /// Whether a session is recording in this process.
    pub recording: bool,
    /// Seconds left in the active session.
    pub remaining_seconds: Option<u64>,
    /// Points captured so far in the active session.
    pub captured_points: usize,
    /// Process id of another process recording on the same backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_elsewhere: Option<u32>,
    /// Number of blocked regions.
    pub region_count: usize,
    /// Radius given to promoted regions.
    pub block_radius_pixels: u32,
    /// Configured session length.
    pub record_duration_seconds: u32,
}

#[derive(Debug)]
struct EngineState {
    settings: Settings,
    regions: BlockedRegionStore,
    session: RecordingSession,
    lease: Option<RecordingLease>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<EngineState>,
    kv: Arc<dyn KeyValueStore>,
    scheduler: Arc<dyn Scheduler>,
    events: Mutex<Option<mpsc::UnboundedSender<GuardEvent>>>,
    defaults: Settings,
    summary_points: usize,
    recovered_stale_session: bool,
}

/// Handle to a running guard.
#[derive(Debug, Clone)]
pub struct GhostBlock {
    shared: Arc<Shared>,
}

impl GhostBlock {
    /// Load persisted settings and regions and come up idle.
    ///
    /// A recording marker left behind by a process that died mid-session
    /// (expired or unparseable) is cleared; the interrupted session is never
    /// resumed. A live marker held by another process is left alone.
    #[must_use]
    pub fn open(
        kv: Arc<dyn KeyValueStore>,
        scheduler: Arc<dyn Scheduler>,
        config: &Config,
    ) -> Self {
        let defaults = Settings::from(&config.filter);
        let settings = Settings::load(kv.as_ref(), defaults);
        let regions = BlockedRegionStore::load(Arc::clone(&kv));

        let recovered_stale_session = match kv.get(keys::RECORDING) {
            Ok(Some(raw)) => match RecordingLease::live(&raw, Utc::now()) {
                Some(lease) => {
                    debug!(pid = lease.pid, "Another process is recording");
                    false
                }
                None => {
                    warn!("Previous recording session did not shut down cleanly, discarding it");
                    clear_recording_flag(kv.as_ref());
                    true
                }
            },
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Could not read recording flag");
                false
            }
        };

        info!(
            enabled = settings.enabled,
            regions = regions.len(),
            radius = settings.block_radius_pixels,
            "Ghost-touch guard ready"
        );

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    settings,
                    regions,
                    session: RecordingSession::new(),
                    lease: None,
                }),
                kv,
                scheduler,
                events: Mutex::new(None),
                defaults,
                summary_points: config.session.summary_points,
                recovered_stale_session,
            }),
        }
    }

    /// Receive [`GuardEvent`]s. A later call replaces the earlier receiver.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<GuardEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock_unpoisoned(&self.shared.events) = Some(tx);
        rx
    }

    /// True if a stale recording marker was found and cleared at startup.
    #[must_use]
    pub fn recovered_stale_session(&self) -> bool {
        self.shared.recovered_stale_session
    }

    /// Classify one touch. Memory only; never reads the backend.
    pub fn decide(&self, event: &TouchEvent) -> Decision {
        let decision = {
            let mut guard = lock_unpoisoned(&self.shared.state);
            let state = &mut *guard;
            TouchFilter::new(state.settings.enabled, &mut state.session, &state.regions)
                .decide(event)
        };

        if decision == Decision::Capture {
            self.shared.emit(GuardEvent::PointCaptured(event.point));
        }
        decision
    }

    /// Refresh settings and regions from the backend.
    ///
    /// If filtering was disabled elsewhere, an active session is
    /// force-stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the regions could not be read; the cached regions
    /// are kept in that case, settings are refreshed regardless.
    pub fn reload(&self) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        self.shared.reload(&mut state)
    }

    /// Start a session for the persisted duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterDisabled`] while filtering is off, or
    /// [`Error::RecordingElsewhere`] if another process is recording.
    pub fn start_recording(&self) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        self.shared.refresh_before_start(&mut state);
        let duration = state.settings.record_duration();
        self.start_locked(state, duration)
    }

    /// Start a session for an explicit duration.
    ///
    /// A session already in progress in this process is force-stopped and its
    /// points discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterDisabled`] while filtering is off, or
    /// [`Error::RecordingElsewhere`] if another process is recording.
    pub fn start_recording_for(&self, duration: Duration) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        self.shared.refresh_before_start(&mut state);
        self.start_locked(state, duration)
    }

    fn start_locked(
        &self,
        mut state: MutexGuard<'_, EngineState>,
        duration: Duration,
    ) -> Result<()> {
        if !state.settings.enabled {
            return Err(Error::FilterDisabled);
        }
        if let Some(other) = self.shared.foreign_lease(&state) {
            return Err(Error::RecordingElsewhere { pid: other.pid });
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let replaced = state
            .session
            .start(duration, self.shared.scheduler.as_ref(), move |generation| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_timeout(generation);
                }
            });
        if let Some(replaced) = replaced {
            debug!(
                discarded = replaced.points.len(),
                "Replaced an active recording session"
            );
        }

        let lease = RecordingLease::for_current_process(duration);
        match lease.encode() {
            Ok(raw) => {
                if let Err(e) = self.shared.kv.set(keys::RECORDING, &raw) {
                    warn!(error = %e, "Could not persist recording flag");
                }
            }
            Err(e) => warn!(error = %e, "Could not encode recording flag"),
        }
        state.lease = Some(lease);

        info!(
            generation = state.session.generation(),
            seconds = duration.as_secs(),
            "Recording started"
        );
        Ok(())
    }

    /// End the active session by user request.
    ///
    /// Returns `None` if nothing was recording.
    pub fn stop_recording(&self) -> Option<SessionSummary> {
        self.shared.stop(StopReason::Manual)
    }

    /// End any active session without a summary, e.g. on host shutdown.
    pub fn shutdown(&self) {
        self.shared.stop(StopReason::Forced);
    }

    /// True while a session is recording in this process.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        lock_unpoisoned(&self.shared.state).session.is_active()
    }

    /// The live recording marker of another process on the same backend.
    #[must_use]
    pub fn recording_elsewhere(&self) -> Option<RecordingLease> {
        let state = lock_unpoisoned(&self.shared.state);
        self.shared.foreign_lease(&state)
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        lock_unpoisoned(&self.shared.state).settings
    }

    /// Turn filtering on or off.
    ///
    /// Turning it off force-stops an active session; its points are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the flag could not be written. If the
    /// write itself was rejected nothing changes; if only the flush failed
    /// the new value is already in effect.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let result = state.settings.set_enabled(self.shared.kv.as_ref(), enabled);
        if !state.settings.enabled {
            self.shared.force_stop(&mut state);
        }
        result
    }

    /// Change the radius used for future promotions.
    ///
    /// # Errors
    ///
    /// Returns a validation error outside 1–200 or a persistence error.
    pub fn set_block_radius(&self, pixels: u32) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        state
            .settings
            .set_block_radius(self.shared.kv.as_ref(), pixels)
    }

    /// Change the length of future sessions.
    ///
    /// # Errors
    ///
    /// Returns a validation error outside 60–3600 or a persistence error.
    pub fn set_record_duration(&self, seconds: u32) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        state
            .settings
            .set_record_duration(self.shared.kv.as_ref(), seconds)
    }

    /// Copy of the blocked regions.
    #[must_use]
    pub fn regions(&self) -> Vec<BlockedRegion> {
        lock_unpoisoned(&self.shared.state).regions.regions().to_vec()
    }

    /// True if `point` lies in a blocked region.
    #[must_use]
    pub fn is_blocked(&self, point: Point) -> bool {
        lock_unpoisoned(&self.shared.state).regions.is_blocked(point)
    }

    /// Append a blocked region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is invalid or the write fails.
    pub fn add_region(&self, region: BlockedRegion) -> Result<()> {
        lock_unpoisoned(&self.shared.state).regions.add(region)
    }

    /// Remove the blocked region at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range or the write fails.
    pub fn remove_region(&self, index: usize) -> Result<BlockedRegion> {
        lock_unpoisoned(&self.shared.state).regions.remove(index)
    }

    /// Remove every blocked region.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn clear_regions(&self) -> Result<()> {
        lock_unpoisoned(&self.shared.state).regions.clear()
    }

    /// Replace the blocked regions wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if any region is invalid or the write fails.
    pub fn replace_regions(&self, regions: Vec<BlockedRegion>) -> Result<()> {
        lock_unpoisoned(&self.shared.state).regions.replace(regions)
    }

    /// Snapshot of the guard's state.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let state = lock_unpoisoned(&self.shared.state);
        let remaining = state.session.remaining(self.shared.scheduler.now());
        EngineStatus {
            enabled: state.settings.enabled,
            recording: state.session.is_active(),
            remaining_seconds: remaining.map(|left| left.as_secs()),
            captured_points: state.session.points().len(),
            recording_elsewhere: self.shared.foreign_lease(&state).map(|lease| lease.pid),
            region_count: state.regions.len(),
            block_radius_pixels: state.settings.block_radius_pixels,
            record_duration_seconds: state.settings.record_duration_seconds,
        }
    }
}

impl Shared {
    fn on_timeout(&self, generation: u64) {
        let summary = {
            let mut state = lock_unpoisoned(&self.state);
            let finished =
                state
                    .session
                    .stop_generation(generation, StopReason::TimedOut, self.scheduler.as_ref());
            finished.and_then(|finished| self.finish(&mut state, finished))
        };
        if let Some(summary) = summary {
            self.emit(GuardEvent::SessionFinished(summary));
        }
    }

    fn stop(&self, reason: StopReason) -> Option<SessionSummary> {
        let summary = {
            let mut state = lock_unpoisoned(&self.state);
            let finished = state.session.stop(reason, self.scheduler.as_ref())?;
            self.finish(&mut state, finished)
        };
        if let Some(summary) = &summary {
            self.emit(GuardEvent::SessionFinished(summary.clone()));
        }
        summary
    }

    fn force_stop(&self, state: &mut EngineState) {
        if let Some(finished) = state.session.stop(StopReason::Forced, self.scheduler.as_ref()) {
            self.finish(state, finished);
        }
    }

    fn reload(&self, state: &mut EngineState) -> Result<()> {
        let regions = state.regions.reload();
        state.settings = Settings::load(self.kv.as_ref(), self.defaults);
        if !state.settings.enabled {
            self.force_stop(state);
        }
        debug!(
            enabled = state.settings.enabled,
            regions = state.regions.len(),
            "Reloaded settings and regions"
        );
        regions
    }

    fn refresh_before_start(&self, state: &mut EngineState) {
        if let Err(e) = self.reload(state) {
            warn!(error = %e, "Could not refresh blocked regions, using cached set");
        }
    }

    /// A live marker on the backend that is not this engine's own.
    fn foreign_lease(&self, state: &EngineState) -> Option<RecordingLease> {
        let raw = self.kv.get(keys::RECORDING).ok()??;
        RecordingLease::live(&raw, Utc::now()).filter(|lease| state.lease.as_ref() != Some(lease))
    }

    /// Dispose of a session that just ended. Returns the summary if the stop
    /// reason calls for one.
    fn finish(&self, state: &mut EngineState, finished: FinishedSession) -> Option<SessionSummary> {
        if let Some(lease) = state.lease.take() {
            self.release_lease(&lease);
        }

        if !finished.reason.produces_summary() {
            info!(
                discarded = finished.points.len(),
                "Recording cancelled"
            );
            return None;
        }

        if let Err(e) = state.regions.reload() {
            warn!(error = %e, "Could not refresh blocked regions before promotion");
        }

        let mut summary = SessionSummary::new(&finished, self.summary_points);
        match promote(state, &finished.points) {
            Ok(promoted) => summary.promoted = promoted,
            Err(e) => {
                warn!(error = %e, "Could not save recorded regions");
                summary.promotion_error = Some(e.to_string());
            }
        }

        info!(
            reason = %summary.reason,
            points = summary.point_count,
            promoted = summary.promoted,
            "Recording finished"
        );
        Some(summary)
    }

    /// Clear the recording marker, unless another process has taken it over.
    fn release_lease(&self, lease: &RecordingLease) {
        match self.kv.get(keys::RECORDING) {
            Ok(Some(raw)) if RecordingLease::decode(&raw).as_ref() == Some(lease) => {
                clear_recording_flag(self.kv.as_ref());
            }
            Ok(_) => debug!("Recording flag belongs to another session, leaving it"),
            Err(e) => warn!(error = %e, "Could not read recording flag"),
        }
    }

    fn emit(&self, event: GuardEvent) {
        let mut events = lock_unpoisoned(&self.events);
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                debug!("Event receiver dropped, unsubscribing");
                *events = None;
            }
        }
    }
}

/// Turn captured points into regions of the current radius, skipping points
/// an existing or earlier promoted region already covers and points that are
/// not on screen.
fn promote(state: &mut EngineState, points: &[Point]) -> Result<usize> {
    let radius = state.settings.block_radius();
    let mut regions = state.regions.regions().to_vec();
    let before = regions.len();
    let mut skipped = 0_usize;

    for &point in points {
        if !point.is_on_screen() {
            skipped += 1;
            continue;
        }
        if !regions.iter().any(|region| region.contains(point)) {
            regions.push(BlockedRegion::around(point, radius));
        }
    }
    if skipped > 0 {
        warn!(skipped, "Ignored off-screen points from recording");
    }

    let added = regions.len() - before;
    if added > 0 {
        state.regions.replace(regions)?;
    }
    Ok(added)
}

fn clear_recording_flag(kv: &dyn KeyValueStore) {
    if let Err(e) = kv.remove(keys::RECORDING) {
        warn!(error = %e, "Could not clear recording flag");
    }
}
