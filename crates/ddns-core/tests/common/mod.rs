//! Test doubles and common utilities for contract tests
//!
//! Every double is cheap to clone; clones share counters and scripts, so a
//! test keeps one copy while the engine owns another.

#![allow(dead_code)]

use async_trait::async_trait;
use ddns_core::error::{Error, Result};
use ddns_core::traits::{
    AddressResolver, DnsProvider, ProviderResponse, SettingsSnapshot, SettingsStore,
    UpdateRecord, UpdateRequest,
};
use ddns_core::{
    Configuration, EngineConfig, EngineEvent, MemorySettingsStore, ProviderConfig, UpdateEngine,
};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const HOSTNAME: &str = "home.example.net";

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// An AddressResolver whose answer the test controls
#[derive(Clone)]
pub struct ScriptedResolver {
    /// `None` makes resolution fail
    current: Arc<Mutex<Option<IpAddr>>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new(address: IpAddr) -> Self {
        Self {
            current: Arc::new(Mutex::new(Some(address))),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer with `address` from now on
    pub fn set(&self, address: IpAddr) {
        *self.current.lock().unwrap() = Some(address);
    }

    /// Fail every resolution from now on
    pub fn fail(&self) {
        *self.current.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let current = *self.current.lock().unwrap();
        current.ok_or_else(|| Error::resolution("discovery service unreachable"))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A DnsProvider that records every request
///
/// Replies are taken from a script; once it is empty every call succeeds.
#[derive(Clone)]
pub struct RecordingProvider {
    replies: Arc<Mutex<VecDeque<Result<ProviderResponse>>>>,
    requests: Arc<Mutex<Vec<UpdateRequest>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the reply for the next call
    pub fn reply(&self, reply: Result<ProviderResponse>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<UpdateRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of simultaneous calls observed
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    async fn update_record(&self, request: &UpdateRequest) -> Result<ProviderResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(good(request.address)))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Successful provider answer
pub fn good(address: IpAddr) -> ProviderResponse {
    ProviderResponse {
        status: 200,
        message: format!("success {}", address),
    }
}

/// A SettingsStore that counts flushes and can be made to fail
#[derive(Clone)]
pub struct TrackingStore {
    inner: MemorySettingsStore,
    flushes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl TrackingStore {
    pub fn new(inner: MemorySettingsStore) -> Self {
        Self {
            inner,
            flushes: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following read or write fail
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::settings("disk unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SettingsStore for TrackingStore {
    async fn snapshot(&self) -> Result<SettingsSnapshot> {
        self.check()?;
        self.inner.snapshot().await
    }

    async fn save_configuration(&self, configuration: &Configuration) -> Result<u64> {
        self.check()?;
        self.inner.save_configuration(configuration).await
    }

    async fn save_record(&self, record: &UpdateRecord) -> Result<()> {
        self.check()?;
        self.inner.save_record(record).await
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}

/// Enabled configuration for [`HOSTNAME`]
pub fn configuration(interval_secs: u64) -> Configuration {
    Configuration::new(
        ProviderConfig::new(
            "https://dns.example.net/update?host={hostname}&ip={address}",
            "api-key",
        )
        .with_username("me@example.net")
        .with_record_id("42"),
        HOSTNAME,
        Duration::from_secs(interval_secs),
    )
}

/// Engine settings with room for slow test providers
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        resolve_timeout_secs: 10,
        dispatch_timeout_secs: 120,
        ..EngineConfig::default()
    }
}

pub fn build_engine(
    resolver: &ScriptedResolver,
    provider: &RecordingProvider,
    store: Arc<dyn SettingsStore>,
) -> (Arc<UpdateEngine>, mpsc::Receiver<EngineEvent>) {
    let (engine, events) = UpdateEngine::new(
        Box::new(resolver.clone()),
        Box::new(provider.clone()),
        store,
        engine_config(),
    )
    .expect("engine construction succeeds");

    (Arc::new(engine), events)
}

/// Everything currently queued on the event channel
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
