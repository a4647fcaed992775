//! Source ownership and transport control.
//!
//! [`SourceManager`] owns the source set, the master chain, the engine
//! configuration, and the active device backend. The application drives it
//! from any thread; internally one mutex guards the slow-path state
//! (records, backend, transport) while everything the audio thread touches
//! goes through the lock-free structures in [`crate::source`].
//!
//! Transport state machine: `Uninit → Stopped → Playing ⇄ Paused → Stopped`.
//! `play()` from `Stopped` binds the backend with the current
//! [`EngineConfig`]; the config is immutable until the next `stop()`.
//! `reset()` returns to `Stopped`, drops every source, and resets the
//! master chain only.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventQueue};
use crate::file::{FileParts, FileWorker, spawn_decode_worker};
use crate::mixer::Mixer;
use crate::realtime::RealtimeSourceHandle;
use crate::source::{
    DURATION_INFINITE, SharedSource, SourceControl, SourceEntry, SourceId, SourceKind, SourceLane,
    SourceSet, SourceState,
};
use mezcla_core::{PipelineFormat, ProcessorChain, QueueProducer, SourcePipeline, source_queue};
use mezcla_io::{BackendStreamConfig, CpalBackend, DeviceBackend, StreamHandle, open_decoder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

/// Manager-level transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// No configuration applied yet (global convenience instance only).
    Uninit,
    /// Configured, backend idle.
    Stopped,
    /// Backend running, sources mixing.
    Playing,
    /// Backend running, output silent, positions frozen.
    Paused,
}

/// Producer-side state per source variant.
enum ProducerRole {
    File {
        path: PathBuf,
        worker: Option<FileWorker>,
        /// Decoder and producer preserved across `stop()`/`play()`.
        idle_parts: Option<FileParts>,
    },
    Input {
        producer: Arc<Mutex<QueueProducer>>,
        stream: Option<StreamHandle>,
    },
    Realtime,
}

struct SourceRecord {
    entry: Arc<SourceEntry>,
    role: ProducerRole,
}

struct ManagerInner {
    transport: Transport,
    config: EngineConfig,
    backend: Option<Box<dyn DeviceBackend>>,
    output_stream: Option<StreamHandle>,
    mixer: Option<Arc<Mutex<Mixer>>>,
    records: Vec<SourceRecord>,
    next_id: u64,
}

/// Owner of the source set, master chain, config, and device binding.
pub struct SourceManager {
    inner: Mutex<ManagerInner>,
    set: Arc<SourceSet>,
    master: Arc<Mutex<ProcessorChain>>,
    events: Arc<EventQueue>,
    paused: Arc<AtomicBool>,
    backend_failed: Arc<AtomicBool>,
}

impl SourceManager {
    fn build(config: EngineConfig, backend: Option<Box<dyn DeviceBackend>>, transport: Transport) -> Self {
        let sample_rate = config.sample_rate_hz as f32;
        Self {
            inner: Mutex::new(ManagerInner {
                transport,
                config,
                backend,
                output_stream: None,
                mixer: None,
                records: Vec::new(),
                next_id: 1,
            }),
            set: Arc::new(SourceSet::new()),
            master: Arc::new(Mutex::new(ProcessorChain::new(sample_rate))),
            events: Arc::new(EventQueue::new()),
            paused: Arc::new(AtomicBool::new(false)),
            backend_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a manager with the given configuration (state `Stopped`).
    ///
    /// The default cpal backend is bound lazily on the first `play()`.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None, Transport::Stopped)
    }

    /// Create a manager bound to an explicit backend.
    pub fn with_backend(config: EngineConfig, backend: Box<dyn DeviceBackend>) -> Self {
        Self::build(config, Some(backend), Transport::Stopped)
    }

    fn uninitialized() -> Self {
        Self::build(EngineConfig::default(), None, Transport::Uninit)
    }

    /// The process-wide manager.
    ///
    /// A thin convenience over an explicitly constructed instance: repeated
    /// retrievals return the same manager. It starts `Uninit`; call
    /// [`configure`](Self::configure) before `play()`.
    pub fn global() -> &'static SourceManager {
        static GLOBAL: LazyLock<SourceManager> = LazyLock::new(SourceManager::uninitialized);
        &GLOBAL
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current transport state.
    pub fn transport(&self) -> Transport {
        self.lock_inner().transport
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> EngineConfig {
        self.lock_inner().config.clone()
    }

    /// Apply a new configuration.
    ///
    /// Legal only while the backend is idle; existing sources are re-aimed
    /// at the new output format.
    pub fn configure(&self, config: EngineConfig) -> Result<()> {
        let mut inner = self.lock_inner();
        match inner.transport {
            Transport::Playing | Transport::Paused => Err(EngineError::IllegalState(
                "engine config is immutable between play() and stop()".into(),
            )),
            Transport::Uninit | Transport::Stopped => {
                let out_rate = config.sample_rate_hz;
                let out_channels = config.channels.count();
                for record in &inner.records {
                    let shared = &record.entry.shared;
                    let mut lane = record.entry.lane.lock().unwrap_or_else(|e| e.into_inner());
                    lane.pipeline = SourcePipeline::new(PipelineFormat {
                        src_rate: shared.src_rate,
                        src_channels: shared.src_channels,
                        out_rate,
                        out_channels,
                    });
                    lane.chain.set_sample_rate(out_rate as f32);
                }
                self.master
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .set_sample_rate(out_rate as f32);
                inner.config = config;
                inner.transport = Transport::Stopped;
                Ok(())
            }
        }
    }

    /// Replace the device backend (idle transport only).
    pub fn set_backend(&self, backend: Box<dyn DeviceBackend>) -> Result<()> {
        let mut inner = self.lock_inner();
        match inner.transport {
            Transport::Playing | Transport::Paused => Err(EngineError::IllegalState(
                "cannot swap the backend while it is running".into(),
            )),
            _ => {
                inner.backend = Some(backend);
                Ok(())
            }
        }
    }

    fn publish(&self, inner: &ManagerInner) {
        self.set
            .publish(inner.records.iter().map(|r| Arc::clone(&r.entry)).collect());
    }

    fn make_entry(
        &self,
        inner: &mut ManagerInner,
        name: Option<String>,
        kind: SourceKind,
        src_rate: u32,
        src_channels: u16,
        duration_frames: u64,
        volume: f32,
    ) -> (SourceId, Arc<SourceEntry>, QueueProducer) {
        let id = SourceId::new(inner.next_id);
        inner.next_id += 1;

        let capacity = queue_capacity(src_rate, src_channels, &inner.config);
        let (producer, consumer) = source_queue(capacity);

        let shared = Arc::new(SharedSource::new(
            id,
            name,
            kind,
            src_rate,
            src_channels,
            duration_frames,
            volume,
        ));
        if matches!(inner.transport, Transport::Playing | Transport::Paused) {
            shared.set_state(SourceState::Buffering);
        }

        let entry = Arc::new(SourceEntry {
            shared,
            lane: Mutex::new(SourceLane {
                consumer,
                pipeline: SourcePipeline::new(PipelineFormat {
                    src_rate,
                    src_channels,
                    out_rate: inner.config.sample_rate_hz,
                    out_channels: inner.config.channels.count(),
                }),
                chain: ProcessorChain::new(inner.config.sample_rate_hz as f32),
            }),
        });
        (id, entry, producer)
    }

    /// Add a file source; returns once the decoder has opened the file and
    /// delivered its metadata. The decode worker starts prefilling
    /// immediately.
    pub fn add_file_source<P: AsRef<Path>>(&self, path: P, name: Option<&str>) -> Result<SourceId> {
        let path = path.as_ref().to_path_buf();
        let decoder = open_decoder(&path).map_err(|source| EngineError::Decode {
            path: path.clone(),
            source,
        })?;

        let mut inner = self.lock_inner();
        let (id, entry, producer) = self.make_entry(
            &mut inner,
            name.map(str::to_owned),
            SourceKind::File,
            decoder.sample_rate(),
            decoder.channels(),
            decoder.duration_frames(),
            1.0,
        );

        let worker = spawn_decode_worker(
            decoder,
            producer,
            Arc::clone(&entry.shared),
            Arc::clone(&self.events),
            path.clone(),
        );

        inner.records.push(SourceRecord {
            entry,
            role: ProducerRole::File {
                path: path.clone(),
                worker: Some(worker),
                idle_parts: None,
            },
        });
        self.publish(&inner);
        tracing::info!(source = %id, path = %path.display(), "file source added");
        Ok(id)
    }

    /// Add a capture source fed by the input device.
    ///
    /// Captures at the engine rate in stereo; the stream is built when the
    /// transport runs.
    pub fn add_input_source(&self, initial_volume: f32) -> Result<SourceId> {
        let mut inner = self.lock_inner();
        let engine_rate = inner.config.sample_rate_hz;
        let (id, entry, producer) = self.make_entry(
            &mut inner,
            None,
            SourceKind::Input,
            engine_rate,
            2,
            0,
            initial_volume,
        );

        let producer = Arc::new(Mutex::new(producer));
        let mut stream = None;
        if matches!(inner.transport, Transport::Playing | Transport::Paused) {
            let inner_ref = &mut *inner;
            if let Some(backend) = inner_ref.backend.as_ref() {
                stream = Some(build_capture_stream(
                    backend.as_ref(),
                    &inner_ref.config,
                    &producer,
                    &entry.shared,
                )?);
            }
        }

        inner.records.push(SourceRecord {
            entry,
            role: ProducerRole::Input { producer, stream },
        });
        self.publish(&inner);
        tracing::info!(source = %id, "input source added");
        Ok(id)
    }

    /// Add an application-fed source; the returned handle is its producer.
    pub fn add_realtime_source(
        &self,
        initial_volume: f32,
        channels: u16,
        name: Option<&str>,
    ) -> Result<(SourceId, RealtimeSourceHandle)> {
        if channels == 0 {
            return Err(EngineError::InvalidArgument(
                "realtime source needs at least one channel".into(),
            ));
        }

        let mut inner = self.lock_inner();
        let engine_rate = inner.config.sample_rate_hz;
        let (id, entry, producer) = self.make_entry(
            &mut inner,
            name.map(str::to_owned),
            SourceKind::Realtime,
            engine_rate,
            channels,
            DURATION_INFINITE,
            initial_volume,
        );

        let handle = RealtimeSourceHandle::new(
            SourceControl {
                entry: Arc::clone(&entry),
            },
            producer,
        );
        inner.records.push(SourceRecord {
            entry,
            role: ProducerRole::Realtime,
        });
        self.publish(&inner);
        tracing::info!(source = %id, channels, "realtime source added");
        Ok((id, handle))
    }

    /// Detach and drop a source. Returns whether it existed.
    pub fn remove(&self, id: SourceId) -> bool {
        let mut inner = self.lock_inner();
        let Some(index) = inner.records.iter().position(|r| r.entry.shared.id == id) else {
            return false;
        };
        let record = inner.records.remove(index);
        self.publish(&inner);
        drop(inner);

        match record.role {
            ProducerRole::File { worker, .. } => {
                if let Some(worker) = worker {
                    worker.stop();
                }
            }
            ProducerRole::Input { stream, .. } => drop(stream),
            ProducerRole::Realtime => {}
        }
        tracing::info!(source = %id, "source removed");
        true
    }

    /// Start or resume playback.
    pub fn play(&self) -> Result<()> {
        self.reap_backend_failure();
        let mut inner = self.lock_inner();
        match inner.transport {
            Transport::Uninit => Err(EngineError::IllegalState(
                "configure() the engine before play()".into(),
            )),
            Transport::Playing => Ok(()),
            Transport::Paused => {
                self.paused.store(false, Ordering::Relaxed);
                for record in &inner.records {
                    let shared = &record.entry.shared;
                    if shared.state() == SourceState::Paused {
                        shared.set_state(SourceState::Playing);
                    }
                }
                inner.transport = Transport::Playing;
                tracing::info!("playback resumed");
                Ok(())
            }
            Transport::Stopped => self.start_backend(&mut inner),
        }
    }

    fn start_backend(&self, inner: &mut ManagerInner) -> Result<()> {
        if inner.backend.is_none() {
            inner.backend = Some(Box::new(CpalBackend::new()?));
        }

        let ManagerInner {
            backend,
            records,
            config,
            ..
        } = &mut *inner;
        let backend = backend
            .as_ref()
            .ok_or_else(|| EngineError::Init("no device backend bound".into()))?;

        // Respawn decode workers joined by the previous stop() and rebuild
        // capture streams.
        for record in records.iter_mut() {
            let shared = Arc::clone(&record.entry.shared);
            match &mut record.role {
                ProducerRole::File {
                    path,
                    worker,
                    idle_parts,
                } => {
                    if worker.is_none() {
                        match idle_parts.take() {
                            Some(parts) => {
                                *worker = Some(spawn_decode_worker(
                                    parts.decoder,
                                    parts.producer,
                                    Arc::clone(&shared),
                                    Arc::clone(&self.events),
                                    path.clone(),
                                ));
                            }
                            None => {
                                // A detached worker took the decoder with it.
                                tracing::warn!(source = %shared.id, "decoder lost; source errored");
                                shared.set_state(SourceState::Errored);
                            }
                        }
                    }
                }
                ProducerRole::Input { producer, stream } => {
                    if stream.is_none() {
                        *stream = Some(build_capture_stream(
                            backend.as_ref(),
                            config,
                            producer,
                            &shared,
                        )?);
                    }
                }
                ProducerRole::Realtime => {}
            }

            match shared.state() {
                SourceState::Idle => shared.set_state(SourceState::Buffering),
                SourceState::Paused => shared.set_state(SourceState::Playing),
                _ => {}
            }
        }

        let out_channels = config.channels.count();
        let mixer = Arc::new(Mutex::new(Mixer::new(
            out_channels as usize,
            Arc::clone(&self.set),
            Arc::clone(&self.master),
            Arc::clone(&self.events),
            Arc::clone(&self.paused),
        )));

        let cb_mixer = Arc::clone(&mixer);
        let events = Arc::clone(&self.events);
        let failed = Arc::clone(&self.backend_failed);
        let stream_config = BackendStreamConfig {
            sample_rate: config.sample_rate_hz,
            buffer_size: config.frames_per_buffer,
            channels: out_channels,
            device_index: config.output_device_id,
            latency_secs: config.output_latency_secs,
        };

        let output_stream = backend.build_output_stream(
            &stream_config,
            Box::new(move |data: &mut [f32]| {
                if let Ok(mut mixer) = cb_mixer.lock() {
                    mixer.render(data);
                } else {
                    data.fill(0.0);
                }
            }),
            Box::new(move |err: &str| {
                events.push(EngineEvent::DeviceError {
                    message: err.to_string(),
                });
                failed.store(true, Ordering::Relaxed);
            }),
        )?;

        inner.mixer = Some(mixer);
        inner.output_stream = Some(output_stream);
        self.paused.store(false, Ordering::Relaxed);
        inner.transport = Transport::Playing;
        tracing::info!(
            sample_rate = inner.config.sample_rate_hz,
            channels = inner.config.channels.count(),
            frames_per_buffer = inner.config.frames_per_buffer,
            "playback started"
        );
        Ok(())
    }

    /// Hold playback; the backend keeps running and renders silence.
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        match inner.transport {
            Transport::Playing => {
                self.paused.store(true, Ordering::Relaxed);
                for record in &inner.records {
                    let shared = &record.entry.shared;
                    if shared.state() == SourceState::Playing {
                        shared.set_state(SourceState::Paused);
                    }
                }
                inner.transport = Transport::Paused;
                tracing::info!("playback paused");
                Ok(())
            }
            Transport::Paused => Ok(()),
            _ => Err(EngineError::IllegalState(
                "pause() requires a running transport".into(),
            )),
        }
    }

    /// Halt the backend and join the decode workers; sources survive.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        if inner.transport == Transport::Uninit {
            return Ok(());
        }

        inner.output_stream = None;
        inner.mixer = None;
        self.paused.store(false, Ordering::Relaxed);

        for record in &mut inner.records {
            let shared = &record.entry.shared;
            match &mut record.role {
                ProducerRole::File {
                    worker, idle_parts, ..
                } => {
                    if let Some(running) = worker.take() {
                        *idle_parts = running.stop();
                    }
                }
                ProducerRole::Input { stream, .. } => {
                    *stream = None;
                }
                ProducerRole::Realtime => {}
            }
            match shared.state() {
                SourceState::Playing | SourceState::Paused | SourceState::Buffering => {
                    shared.set_state(SourceState::Idle);
                }
                _ => {}
            }
        }

        inner.transport = Transport::Stopped;
        tracing::info!("playback stopped");
        Ok(())
    }

    /// Stop, drop every source, and reset the master chain.
    pub fn reset(&self) -> Result<()> {
        self.stop()?;
        let mut inner = self.lock_inner();
        inner.records.clear();
        self.publish(&inner);
        drop(inner);
        self.master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        tracing::info!("engine reset");
        Ok(())
    }

    /// Seek every seekable (file) source to `secs`.
    pub fn seek(&self, secs: f64) -> Result<()> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "seek target {secs} is not a non-negative time"
            )));
        }
        let inner = self.lock_inner();
        for record in &inner.records {
            let shared = &record.entry.shared;
            if shared.kind == SourceKind::File && shared.state() != SourceState::Errored {
                shared.request_seek((secs * f64::from(shared.src_rate)) as u64);
            }
        }
        Ok(())
    }

    /// Control handle for a source id.
    pub fn source(&self, id: SourceId) -> Option<SourceControl> {
        self.lock_inner()
            .records
            .iter()
            .find(|r| r.entry.shared.id == id)
            .map(|r| SourceControl {
                entry: Arc::clone(&r.entry),
            })
    }

    /// Control handle for the first source with the given name.
    ///
    /// Name uniqueness is not enforced; with duplicates, insertion order
    /// wins.
    pub fn source_by_name(&self, name: &str) -> Option<SourceControl> {
        self.lock_inner()
            .records
            .iter()
            .find(|r| r.entry.shared.name.as_deref() == Some(name))
            .map(|r| SourceControl {
                entry: Arc::clone(&r.entry),
            })
    }

    /// Control handles for every source, in insertion order.
    pub fn sources(&self) -> Vec<SourceControl> {
        self.lock_inner()
            .records
            .iter()
            .map(|r| SourceControl {
                entry: Arc::clone(&r.entry),
            })
            .collect()
    }

    /// Longest file-source duration, in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.lock_inner()
            .records
            .iter()
            .filter(|r| r.entry.shared.kind == SourceKind::File)
            .map(|r| {
                r.entry.shared.duration_frames as f64 / f64::from(r.entry.shared.src_rate)
            })
            .fold(0.0, f64::max)
    }

    /// Earliest position among non-looping file sources, in seconds.
    pub fn position_secs(&self) -> f64 {
        self.lock_inner()
            .records
            .iter()
            .filter(|r| r.entry.shared.kind == SourceKind::File && !r.entry.shared.looping())
            .map(|r| {
                r.entry.shared.position_frames() as f64 / f64::from(r.entry.shared.src_rate)
            })
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Edit the master processor chain (between callbacks).
    pub fn with_master_chain<R>(&self, f: impl FnOnce(&mut ProcessorChain) -> R) -> R {
        let mut master = self.master.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut master)
    }

    /// Drain one pending engine event.
    pub fn poll_event(&self) -> Option<EngineEvent> {
        self.reap_backend_failure();
        self.events.pop()
    }

    /// Events dropped because the application fell behind draining.
    pub fn events_lost(&self) -> u64 {
        self.events.lost()
    }

    /// A fatal backend loss stops the transport on the next manager call.
    fn reap_backend_failure(&self) {
        if self.backend_failed.swap(false, Ordering::Relaxed) {
            tracing::error!("device backend failed; stopping transport");
            let _ = self.stop();
        }
    }
}

impl Drop for SourceManager {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Queue sizing: at least max(200 ms, 4 output buffers) of audio at the
/// source rate.
fn queue_capacity(src_rate: u32, channels: u16, config: &EngineConfig) -> usize {
    let fifth_second = u64::from(src_rate) / 5;
    let four_buffers = 4 * u64::from(config.frames_per_buffer) * u64::from(src_rate)
        / u64::from(config.sample_rate_hz.max(1));
    let frames = fifth_second.max(four_buffers).max(1);
    frames as usize * channels as usize
}

fn build_capture_stream(
    backend: &dyn DeviceBackend,
    config: &EngineConfig,
    producer: &Arc<Mutex<QueueProducer>>,
    shared: &Arc<SharedSource>,
) -> Result<StreamHandle> {
    let producer = Arc::clone(producer);
    let shared = Arc::clone(shared);
    let stream_config = BackendStreamConfig {
        sample_rate: config.sample_rate_hz,
        buffer_size: config.frames_per_buffer,
        channels: 2,
        device_index: config.input_device_id,
        latency_secs: config.input_latency_secs,
    };
    let handle = backend.build_input_stream(
        &stream_config,
        Box::new(move |data: &[f32]| {
            // Capture never blocks: overruns tail-drop and count.
            if let Ok(mut producer) = producer.lock() {
                let pushed = producer.push_lossy(data);
                if pushed < data.len() {
                    shared.add_overrun((data.len() - pushed) as u64);
                }
            }
        }),
        Box::new(|err: &str| {
            tracing::warn!(error = err, "input stream error");
        }),
    )?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelLayout;
    use mezcla_io::MockBackend;
    use tempfile::NamedTempFile;

    fn fixture(frames: usize, sample_rate: u32) -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for i in 0..frames {
            writer
                .write_sample((i as f32 * 0.001).sin() * 0.5)
                .unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn mock_manager() -> (SourceManager, mezcla_io::MockDriver) {
        let (backend, driver) = MockBackend::new();
        let manager = SourceManager::with_backend(
            EngineConfig {
                frames_per_buffer: 256,
                ..EngineConfig::default()
            },
            Box::new(backend),
        );
        (manager, driver)
    }

    #[test]
    fn transport_state_machine() {
        let (manager, driver) = mock_manager();
        assert_eq!(manager.transport(), Transport::Stopped);

        manager.play().unwrap();
        assert_eq!(manager.transport(), Transport::Playing);
        assert!(driver.output_active());

        manager.pause().unwrap();
        assert_eq!(manager.transport(), Transport::Paused);
        // Paused keeps the stream alive.
        assert!(driver.output_active());

        manager.play().unwrap();
        assert_eq!(manager.transport(), Transport::Playing);

        manager.stop().unwrap();
        assert_eq!(manager.transport(), Transport::Stopped);
        assert!(!driver.output_active());
    }

    #[test]
    fn pause_from_stopped_is_illegal() {
        let (manager, _driver) = mock_manager();
        assert!(matches!(
            manager.pause(),
            Err(EngineError::IllegalState(_))
        ));
    }

    #[test]
    fn config_is_frozen_while_running() {
        let (manager, _driver) = mock_manager();
        manager.play().unwrap();
        let err = manager.configure(EngineConfig::default());
        assert!(matches!(err, Err(EngineError::IllegalState(_))));
        manager.stop().unwrap();
        manager.configure(EngineConfig::default()).unwrap();
    }

    #[test]
    fn global_manager_is_a_singleton() {
        let first: *const SourceManager = SourceManager::global();
        let second: *const SourceManager = SourceManager::global();
        assert!(std::ptr::eq(first, second));
        assert_eq!(SourceManager::global().transport(), Transport::Uninit);
        assert!(matches!(
            SourceManager::global().play(),
            Err(EngineError::IllegalState(_))
        ));
    }

    #[test]
    fn duration_round_trip() {
        let (manager, _driver) = mock_manager();
        let file = fixture(48000, 48000);

        let first = manager.add_file_source(file.path(), Some("one")).unwrap();
        let duration = manager.duration_secs();
        assert!((duration - 1.0).abs() < 1e-6);

        // Adding the same file again leaves the max unchanged.
        let second = manager.add_file_source(file.path(), Some("two")).unwrap();
        assert!((manager.duration_secs() - duration).abs() < 1e-9);

        assert!(manager.remove(second));
        assert!((manager.duration_secs() - duration).abs() < 1e-9);

        assert!(manager.remove(first));
        assert_eq!(manager.duration_secs(), 0.0);
        assert!(!manager.remove(first));
    }

    #[test]
    fn lookup_by_name_and_id() {
        let (manager, _driver) = mock_manager();
        let file = fixture(4800, 48000);
        let id = manager.add_file_source(file.path(), Some("melody")).unwrap();

        assert_eq!(manager.source_by_name("melody").map(|c| c.id()), Some(id));
        assert_eq!(manager.source(id).and_then(|c| c.name().map(String::from)), Some("melody".into()));
        assert!(manager.source_by_name("absent").is_none());
    }

    #[test]
    fn reset_drops_sources_and_keeps_transport_stopped() {
        let (manager, _driver) = mock_manager();
        let file = fixture(4800, 48000);
        manager.add_file_source(file.path(), None).unwrap();
        manager.play().unwrap();

        manager.reset().unwrap();
        assert_eq!(manager.transport(), Transport::Stopped);
        assert!(manager.sources().is_empty());
        assert_eq!(manager.duration_secs(), 0.0);
    }

    #[test]
    fn realtime_source_rejects_zero_channels() {
        let (manager, _driver) = mock_manager();
        assert!(matches!(
            manager.add_realtime_source(1.0, 0, None),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn queue_capacity_meets_spec_floor() {
        let config = EngineConfig {
            frames_per_buffer: 512,
            ..EngineConfig::default()
        };
        // 200 ms dominates for small buffers.
        assert_eq!(queue_capacity(48000, 2, &config), 9600 * 2);
        // 4 buffers dominate for large ones.
        let big = EngineConfig {
            frames_per_buffer: 4096,
            ..EngineConfig::default()
        };
        assert_eq!(queue_capacity(48000, 1, &big), 4 * 4096);
    }
}
