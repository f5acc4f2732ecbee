//! Hand-written fakes for orchestrator tests.
//!
//! Mocks (`Mock*` from the ports module) are used where a test only needs a
//! canned answer. The fakes here keep state across calls: counters, gates
//! that hold a pipeline stage until the test opens them, revocable access
//! and a transport that records every hand-off.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::watch;

use crate::infrastructure::ports::{
    AccessPolicy, AcquiredEnvironment, ClockPort, ContentError, ContentLoader, EnvironmentError,
    EnvironmentProvider, MarkerHint, PlayerNotice, PlayerTransport, TransportError,
};
use mapshard_domain::{Coordinate, EnvironmentHandle, InstanceId, MapName, PlayerId};

// =============================================================================
// Gate
// =============================================================================

/// Holds async callers until opened. Starts open unless created closed.
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        Self {
            open: watch::Sender::new(open),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub async fn pass(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

// =============================================================================
// Environments
// =============================================================================

/// Environment provider that counts acquisitions and records releases.
pub struct FakeEnvironments {
    pub gate: Gate,
    acquires: AtomicUsize,
    reused: AtomicBool,
    fail: AtomicBool,
    released: Mutex<Vec<String>>,
    purged: Mutex<Vec<String>>,
}

impl FakeEnvironments {
    pub fn new() -> Self {
        Self {
            gate: Gate::new(true),
            acquires: AtomicUsize::new(0),
            reused: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            released: Mutex::new(Vec::new()),
            purged: Mutex::new(Vec::new()),
        }
    }

    /// Acquisitions wait until `gate.open()`.
    pub fn gated() -> Self {
        Self {
            gate: Gate::new(false),
            ..Self::new()
        }
    }

    pub fn set_reused(&self, reused: bool) {
        self.reused.store(reused, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn purged(&self) -> Vec<String> {
        self.purged.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnvironmentProvider for FakeEnvironments {
    async fn acquire(&self, env_id: &str) -> Result<Option<AcquiredEnvironment>, EnvironmentError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(EnvironmentError::creation_failed(env_id, "disk full"));
        }
        Ok(Some(AcquiredEnvironment {
            handle: EnvironmentHandle::new(env_id),
            reused: self.reused.load(Ordering::SeqCst),
        }))
    }

    async fn release(&self, environment: &EnvironmentHandle) -> bool {
        self.released.lock().unwrap().push(environment.id().to_string());
        true
    }

    async fn purge(&self, env_id: &str) -> bool {
        self.purged.lock().unwrap().push(env_id.to_string());
        true
    }
}

// =============================================================================
// Content
// =============================================================================

/// Content loader with a configurable reported entry and marker.
pub struct FakeContent {
    pub gate: Gate,
    populates: AtomicUsize,
    reported_entry: Mutex<Option<Coordinate>>,
    marker: Mutex<Option<Coordinate>>,
    fail: AtomicBool,
}

impl FakeContent {
    /// Populates report `entry`.
    pub fn reporting(entry: Option<Coordinate>) -> Self {
        Self {
            gate: Gate::new(true),
            populates: AtomicUsize::new(0),
            reported_entry: Mutex::new(entry),
            marker: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    /// Population waits until `gate.open()`.
    pub fn gated(entry: Option<Coordinate>) -> Self {
        Self {
            gate: Gate::new(false),
            ..Self::reporting(entry)
        }
    }

    pub fn set_marker(&self, marker: Option<Coordinate>) {
        *self.marker.lock().unwrap() = marker;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn populates(&self) -> usize {
        self.populates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentLoader for FakeContent {
    async fn populate(
        &self,
        map: &MapName,
        _environment: &EnvironmentHandle,
        _origin: Coordinate,
    ) -> Result<Option<Coordinate>, ContentError> {
        self.populates.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContentError::UnknownMap(map.to_string()));
        }
        Ok(*self.reported_entry.lock().unwrap())
    }

    async fn locate_marker(
        &self,
        _environment: &EnvironmentHandle,
        _hint: &MarkerHint,
    ) -> Result<Option<Coordinate>, ContentError> {
        Ok(*self.marker.lock().unwrap())
    }

    fn package_for(&self, map: &MapName) -> Option<String> {
        Some(map.to_string())
    }

    fn available_maps(&self) -> Vec<MapName> {
        Vec::new()
    }

    async fn import_package(&self, _source: &str, _target: &str) -> Result<(), ContentError> {
        Ok(())
    }

    async fn remove_package(&self, _name: &str) -> Result<bool, ContentError> {
        Ok(false)
    }

    async fn reload_catalog(&self) -> Result<usize, ContentError> {
        Ok(0)
    }
}

// =============================================================================
// Access
// =============================================================================

/// Access policy with a fixed limit and a revocable deny list.
pub struct StaticPolicy {
    max: usize,
    denied: Mutex<HashSet<PlayerId>>,
}

impl StaticPolicy {
    pub fn allow_all(max: usize) -> Self {
        Self {
            max,
            denied: Mutex::new(HashSet::new()),
        }
    }

    pub fn deny(&self, player: PlayerId) {
        self.denied.lock().unwrap().insert(player);
    }
}

impl AccessPolicy for StaticPolicy {
    fn can_join(&self, player: PlayerId, _map: &MapName) -> bool {
        !self.denied.lock().unwrap().contains(&player)
    }

    fn max_occupants(&self) -> usize {
        self.max
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    SentToEntry {
        player: PlayerId,
        instance: InstanceId,
        entry: Coordinate,
    },
    ReturnedToLobby(PlayerId),
    Notified(PlayerId, PlayerNotice),
}

/// Transport that records every call.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    lobby_delay: Option<std::time::Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lobby return takes `delay` before it is recorded.
    pub fn with_lobby_delay(delay: std::time::Duration) -> Self {
        Self {
            lobby_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn notices_for(&self, player: PlayerId) -> Vec<PlayerNotice> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Notified(p, notice) if p == player => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn entries_for(&self, player: PlayerId) -> Vec<(InstanceId, Coordinate)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::SentToEntry {
                    player: p,
                    instance,
                    entry,
                } if p == player => Some((instance, entry)),
                _ => None,
            })
            .collect()
    }

    pub fn lobby_returns(&self, player: PlayerId) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == TransportCall::ReturnedToLobby(player))
            .count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlayerTransport for RecordingTransport {
    async fn send_to_entry(
        &self,
        player: PlayerId,
        instance: &InstanceId,
        entry: Coordinate,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SentToEntry {
            player,
            instance: instance.clone(),
            entry,
        });
        Ok(())
    }

    async fn return_to_lobby(&self, player: PlayerId) -> Result<(), TransportError> {
        if let Some(delay) = self.lobby_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(TransportCall::ReturnedToLobby(player));
        Ok(())
    }

    async fn notify(&self, player: PlayerId, notice: PlayerNotice) -> Result<(), TransportError> {
        self.record(TransportCall::Notified(player, notice));
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Clock that advances one second per reading.
pub struct SteppingClock {
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self {
            ticks: AtomicI64::new(0),
        }
    }
}

impl ClockPort for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(tick)
    }
}
