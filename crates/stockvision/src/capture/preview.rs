use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{pipeline::{Pipeline, PreviewFrame}, traits::CaptureDevice};

/// Frames kept by a [`FrameBuffer`].
pub const FRAME_BUFFER_CAPACITY: usize = 2;
pub const DEFAULT_PREVIEW_INTERVAL: Duration = Duration::from_millis(33);
/// Pause after a failed read before trying again.
pub const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);
/// How long [`PreviewLoop::stop`] waits for the worker.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded slot buffer shared between the preview worker and readers.
///
/// Pushing into a full buffer drops the oldest entry.
#[derive(Debug)]
pub struct FrameBuffer<T> {
    slots: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> FrameBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, item: T) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while slots.len() >= self.capacity {
            slots.pop_front();
        }
        slots.push_back(item);
    }

    pub fn latest(&self) -> Option<T> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.clear();
    }
}

impl<T: Clone> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::new(FRAME_BUFFER_CAPACITY)
    }
}

/// Pipeline shared between the UI side, which replaces it, and the preview worker, which snapshots it.
pub type SharedPipeline = Arc<RwLock<Pipeline>>;

/// What a preview buffer slot holds.
#[derive(Debug, Clone)]
pub struct PreviewSlot {
    pub frame: Arc<image::RgbImage>,
    pub preview: Arc<PreviewFrame>,
}

/// Background thread that reads frames and renders previews at a fixed interval.
pub struct PreviewLoop<D: CaptureDevice + 'static> {
    handle: Option<JoinHandle<D>>,
    running: Arc<AtomicBool>,
    read_errors: Arc<AtomicU64>,
    buffer: Arc<FrameBuffer<PreviewSlot>>,
    pipeline: SharedPipeline,
    interval: Duration,
}

impl<D: CaptureDevice + 'static> PreviewLoop<D> {
    pub fn spawn(
        mut device: D,
        pipeline: SharedPipeline,
        buffer: Arc<FrameBuffer<PreviewSlot>>,
        interval: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let read_errors = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = Arc::clone(&running);
            let read_errors = Arc::clone(&read_errors);
            let pipeline = Arc::clone(&pipeline);
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    let started = Instant::now();
                    match device.read() {
                        Ok(frame) => {
                            // snapshot so a settings change never lands mid-frame
                            let snapshot = match pipeline.read() {
                                Ok(guard) => guard.clone(),
                                Err(poisoned) => poisoned.into_inner().clone(),
                            };
                            let preview = snapshot.preview(&frame);
                            buffer.push(PreviewSlot {
                                frame: Arc::new(frame),
                                preview: Arc::new(preview),
                            });
                        }
                        Err(err) => {
                            read_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(%err, "preview read failed");
                            thread::sleep(READ_ERROR_BACKOFF);
                            continue;
                        }
                    }
                    if let Some(rest) = interval.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                debug!("preview loop exited");
                device
            })
        };

        Self {
            handle: Some(handle),
            running,
            read_errors,
            buffer,
            pipeline,
            interval,
        }
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer<PreviewSlot>> {
        &self.buffer
    }

    pub fn pipeline(&self) -> &SharedPipeline {
        &self.pipeline
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the worker and wait up to [`STOP_TIMEOUT`] for it.
    ///
    /// Returns the device when the worker finished in time. Otherwise the
    /// thread is left to exit on its own and the device is released with it.
    pub fn stop(mut self) -> Option<D> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Option<D> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("preview loop did not stop within {:?}, detaching", STOP_TIMEOUT);
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
        match handle.join() {
            Ok(device) => Some(device),
            Err(_) => {
                warn!("preview loop panicked");
                None
            }
        }
    }

    /// Stop and spawn again on the same device, pipeline and buffer.
    pub fn restart(mut self) -> Option<Self> {
        let device = self.stop_inner()?;
        Some(Self::spawn(
            device,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.buffer),
            self.interval,
        ))
    }
}

impl<D: CaptureDevice + 'static> Drop for PreviewLoop<D> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_inner();
        }
    }
}
