//! Logical clock
//!
//! [`TimeTrack`] is a pausable millisecond clock decoupled from wall time.
//! The client keeps two of them: the network clock, which follows the
//! controllers' free running clock and is never paused, and the timeline,
//! an application cursor that can be paused, resumed and repositioned.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Monotonic millisecond source used by a [`TimeTrack`]
pub type ClockSource = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Notification emitted by a [`TimeTrack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTrackEvent {
    /// Position or running state changed
    Change { millis: i64, paused: bool },
    /// `pause()` was called, whether or not the clock was already paused
    Pause,
    /// `unpause()` was called, whether or not the clock was already running
    Play,
}

/// Handle returned by [`TimeTrack::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

type Listener = Arc<dyn Fn(&TimeTrackEvent) + Send + Sync>;

/// Notifications held back by [`TimeTrack::batch`]
#[derive(Default)]
#[must_use = "held notifications are lost unless fired"]
pub struct Notifications {
    events: Vec<TimeTrackEvent>,
    listeners: Vec<Listener>,
}

impl Notifications {
    pub fn events(&self) -> &[TimeTrackEvent] {
        &self.events
    }

    /// Deliver the held events to the listeners registered when they were taken
    pub fn fire(self) {
        for event in &self.events {
            for listener in &self.listeners {
                listener(event);
            }
        }
    }
}

/// Pausable logical clock
pub struct TimeTrack {
    /// Frozen position while paused, `now() - position` while running
    memory: i64,
    paused: bool,
    source: ClockSource,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u32,
    /// Events queued while inside [`TimeTrack::batch`]
    held: Option<Vec<TimeTrackEvent>>,
}

impl Default for TimeTrack {
    fn default() -> Self {
        Self::new(0, false)
    }
}

impl fmt::Debug for TimeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeTrack")
            .field("millis", &self.millis())
            .field("paused", &self.paused)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TimeTrack {
    /// Create a clock reading `millis`, driven by wall time
    pub fn new(millis: i64, paused: bool) -> Self {
        Self::with_source(millis, paused, Arc::new(now))
    }

    /// Create a clock driven by a custom millisecond source
    pub fn with_source(millis: i64, paused: bool, source: ClockSource) -> Self {
        let mut track = Self {
            memory: 0,
            paused,
            source,
            listeners: Vec::new(),
            next_listener: 0,
            held: None,
        };
        track.memory = track.memory_for(millis);
        track
    }

    fn wall(&self) -> i64 {
        (self.source)()
    }

    fn memory_for(&self, millis: i64) -> i64 {
        if self.paused {
            millis
        } else {
            self.wall() - millis
        }
    }

    fn emit(&mut self, event: TimeTrackEvent) {
        if let Some(held) = self.held.as_mut() {
            held.push(event);
            return;
        }
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }

    fn emit_change(&mut self) {
        self.emit(TimeTrackEvent::Change {
            millis: self.millis(),
            paused: self.paused,
        });
    }

    /// Current position in milliseconds
    pub fn millis(&self) -> i64 {
        if self.paused {
            self.memory
        } else {
            self.wall() - self.memory
        }
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Reposition the clock and notify listeners
    pub fn set_millis(&mut self, millis: i64) {
        self.set_millis_silent(millis);
        self.emit_change();
    }

    /// Reposition the clock without notifying listeners
    pub fn set_millis_silent(&mut self, millis: i64) {
        self.memory = self.memory_for(millis);
    }

    /// Set position and running state, then notify listeners
    pub fn set_state(&mut self, millis: i64, paused: bool) {
        self.set_state_silent(millis, paused);
        self.emit_change();
    }

    /// Set position and running state without notifying listeners
    pub fn set_state_silent(&mut self, millis: i64, paused: bool) {
        self.paused = paused;
        self.memory = self.memory_for(millis);
    }

    /// Freeze the clock. Always emits [`TimeTrackEvent::Pause`].
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.memory = self.wall() - self.memory;
            self.emit_change();
        }
        self.emit(TimeTrackEvent::Pause);
    }

    /// Resume the clock. Always emits [`TimeTrackEvent::Play`].
    pub fn unpause(&mut self) {
        if self.paused {
            self.paused = false;
            self.memory = self.wall() - self.memory;
            self.emit_change();
        }
        self.emit(TimeTrackEvent::Play);
    }

    /// Register a listener
    pub fn on<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&TimeTrackEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Run `update` with notifications held back instead of delivered.
    ///
    /// A track shared behind a lock should be mutated this way, firing the
    /// returned [`Notifications`] after the lock is released, so listeners
    /// may read the track themselves.
    pub fn batch<R>(&mut self, update: impl FnOnce(&mut Self) -> R) -> (R, Notifications) {
        if self.held.is_some() {
            let result = update(self);
            return (result, Notifications::default());
        }

        self.held = Some(Vec::new());
        let result = update(self);
        let events = self.held.take().unwrap_or_default();
        let listeners = self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        (result, Notifications { events, listeners })
    }
}
