//! File source decode worker.
//!
//! One worker thread per file source loops: read a packet from the decoder,
//! push it into the source queue (blocking with backoff when full), and
//! watch for seek requests and shutdown between steps. End of stream either
//! rewinds (looping) or parks the worker until a seek, a loop toggle, or
//! shutdown wakes it.
//!
//! The worker returns its decoder and queue producer through an exit
//! channel so `stop()` can preserve them and a later `play()` can respawn
//! without reopening the file.

use crate::events::{EngineEvent, EventQueue};
use crate::source::{SharedSource, SourceState};
use mezcla_core::QueueProducer;
use mezcla_io::FileDecoder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frames per decoder read.
const READ_FRAMES: usize = 1024;

/// Backoff while the queue is full or the stream is parked at EOF.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// How long a worker may take to drain, ack, or exit before it is detached.
pub(crate) const WORKER_GRACE: Duration = Duration::from_millis(250);

/// What a cleanly exited worker hands back.
pub(crate) struct FileParts {
    pub(crate) decoder: Box<dyn FileDecoder>,
    pub(crate) producer: QueueProducer,
}

/// Handle to a running decode worker.
pub(crate) struct FileWorker {
    join: JoinHandle<()>,
    exit_rx: Receiver<FileParts>,
    shutdown: Arc<AtomicBool>,
}

impl FileWorker {
    /// Signal shutdown and wait up to [`WORKER_GRACE`] for the worker to
    /// hand back its parts. An unresponsive worker is detached and logged.
    pub(crate) fn stop(self) -> Option<FileParts> {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.exit_rx.recv_timeout(WORKER_GRACE) {
            Ok(parts) => {
                let _ = self.join.join();
                Some(parts)
            }
            Err(_) => {
                tracing::warn!("decode worker did not exit in time; detaching");
                None
            }
        }
    }
}

/// Spawn the decode worker for one file source.
pub(crate) fn spawn_decode_worker(
    decoder: Box<dyn FileDecoder>,
    producer: QueueProducer,
    shared: Arc<SharedSource>,
    events: Arc<EventQueue>,
    path: PathBuf,
) -> FileWorker {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let (exit_tx, exit_rx) = sync_channel(1);

    let join = std::thread::spawn(move || {
        let mut decoder = decoder;
        let mut producer = producer;
        run_decode_loop(&mut decoder, &mut producer, &shared, &events, &path, &flag);
        tracing::debug!(source = %shared.id, "decode worker exiting");
        let _ = exit_tx.send(FileParts { decoder, producer });
    });

    FileWorker {
        join,
        exit_rx,
        shutdown,
    }
}

fn run_decode_loop(
    decoder: &mut Box<dyn FileDecoder>,
    producer: &mut QueueProducer,
    shared: &Arc<SharedSource>,
    events: &Arc<EventQueue>,
    path: &Path,
    shutdown: &Arc<AtomicBool>,
) {
    let channels = shared.src_channels as usize;
    let mut read_buf = vec![0.0f32; READ_FRAMES * channels];
    let mut leftover: Vec<f32> = Vec::with_capacity(READ_FRAMES * channels);
    let mut offset = 0usize;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        if let Some(target) = shared.take_seek_request() {
            if let Err(err) = decoder.seek(target) {
                fail(shared, events, path, &err);
                return;
            }
            leftover.clear();
            offset = 0;

            // The consumer owns queue draining; wait for its ack so
            // post-seek samples are not flushed along with the stale ones.
            producer.request_flush();
            let deadline = Instant::now() + WORKER_GRACE;
            while !producer.flush_acknowledged() {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                if Instant::now() >= deadline {
                    tracing::warn!(source = %shared.id, "flush ack timed out; resuming anyway");
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }

            shared.set_position(target.min(shared.duration_frames));
            if shared.state() == SourceState::EndOfStream {
                shared.set_state(SourceState::Buffering);
            }
            continue;
        }

        if offset == leftover.len() {
            match decoder.read(&mut read_buf) {
                Err(err) => {
                    fail(shared, events, path, &err);
                    return;
                }
                Ok(0) => {
                    if shared.looping() {
                        if let Err(err) = decoder.seek(0) {
                            fail(shared, events, path, &err);
                            return;
                        }
                        if shared.state() == SourceState::EndOfStream {
                            shared.set_state(SourceState::Buffering);
                        }
                        continue;
                    }
                    if shared.state() != SourceState::EndOfStream {
                        shared.set_state(SourceState::EndOfStream);
                        events.push(EngineEvent::EndOfStream { source: shared.id });
                        tracing::debug!(source = %shared.id, "end of stream");
                    }
                    // Parked; a seek or loop toggle resumes decoding.
                    std::thread::sleep(IDLE_SLEEP);
                    continue;
                }
                Ok(frames) => {
                    leftover.clear();
                    leftover.extend_from_slice(&read_buf[..frames * channels]);
                    offset = 0;
                }
            }
        }

        let pushed = producer.push(&leftover[offset..]);
        offset += pushed;
        if offset < leftover.len() {
            // Queue full: this producer blocks rather than dropping.
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}

fn fail(shared: &Arc<SharedSource>, events: &Arc<EventQueue>, path: &Path, err: &mezcla_io::Error) {
    shared.set_state(SourceState::Errored);
    events.push(EngineEvent::DecodeError {
        source: shared.id,
        path: path.to_path_buf(),
        message: err.to_string(),
    });
    tracing::error!(source = %shared.id, path = %path.display(), error = %err, "decode failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceId, SourceKind};
    use mezcla_core::source_queue;
    use mezcla_io::WavDecoder;
    use std::time::Instant;
    use tempfile::NamedTempFile;

    const FIXTURE_FRAMES: usize = 4800;

    fn fixture() -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for i in 0..FIXTURE_FRAMES {
            writer.write_sample(i as f32 / FIXTURE_FRAMES as f32).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn spawn_fixture_worker(
        file: &NamedTempFile,
        capacity: usize,
    ) -> (
        FileWorker,
        mezcla_core::QueueConsumer,
        Arc<SharedSource>,
        Arc<EventQueue>,
    ) {
        let decoder = Box::new(WavDecoder::open(file.path()).unwrap());
        let (prod, cons) = source_queue(capacity);
        let shared = Arc::new(SharedSource::new(
            SourceId::new(9),
            None,
            SourceKind::File,
            48000,
            1,
            FIXTURE_FRAMES as u64,
            1.0,
        ));
        let events = Arc::new(EventQueue::new());
        let worker = spawn_decode_worker(
            decoder,
            prod,
            Arc::clone(&shared),
            Arc::clone(&events),
            file.path().to_path_buf(),
        );
        (worker, cons, shared, events)
    }

    #[test]
    fn worker_prefills_and_reaches_end_of_stream() {
        let file = fixture();
        let (worker, mut cons, shared, events) = spawn_fixture_worker(&file, 16384);

        wait_for(|| cons.len() == FIXTURE_FRAMES);
        wait_for(|| shared.state() == SourceState::EndOfStream);

        let mut all = vec![0.0f32; FIXTURE_FRAMES];
        assert_eq!(cons.pop(&mut all), FIXTURE_FRAMES);
        assert_eq!(all[0], 0.0);
        assert!((all[2400] - 0.5).abs() < 1e-3);

        assert!(matches!(
            events.pop(),
            Some(EngineEvent::EndOfStream { .. })
        ));
        assert!(worker.stop().is_some());
    }

    #[test]
    fn looping_worker_keeps_producing_past_the_end() {
        let file = fixture();
        let (worker, mut cons, shared, _events) = spawn_fixture_worker(&file, 2048);
        shared.set_looping(true);

        // Drain more than two file lengths; only a looping worker can
        // supply that much.
        let mut drained = 0usize;
        let mut buf = vec![0.0f32; 512];
        let deadline = Instant::now() + Duration::from_secs(5);
        while drained < FIXTURE_FRAMES * 2 + 100 {
            assert!(Instant::now() < deadline, "loop refill timed out");
            drained += cons.pop(&mut buf);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_ne!(shared.state(), SourceState::EndOfStream);
        assert!(worker.stop().is_some());
    }

    #[test]
    fn seek_flushes_queue_and_repositions() {
        let file = fixture();
        let (worker, mut cons, shared, _events) = spawn_fixture_worker(&file, 2048);

        wait_for(|| cons.len() > 1024);

        shared.request_seek(2400);
        // Consumer side of the handshake, as the mixer would run it.
        wait_for(|| {
            cons.service_flush();
            shared.position_frames() == 2400
        });

        let mut buf = vec![0.0f32; 16];
        wait_for(|| cons.len() >= 16);
        assert_eq!(cons.pop(&mut buf), 16);
        // First post-seek sample comes from the 2400th frame.
        assert!((buf[0] - 0.5).abs() < 1e-3, "got {}", buf[0]);

        assert!(worker.stop().is_some());
    }

    #[test]
    fn worker_survives_stop_and_returns_parts() {
        let file = fixture();
        let (worker, _cons, _shared, _events) = spawn_fixture_worker(&file, 64);
        // The tiny queue keeps the worker in its full-queue backoff loop;
        // stop must still get the parts back within the grace period.
        let parts = worker.stop();
        assert!(parts.is_some());
    }
}
