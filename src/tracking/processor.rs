//! Reference scheduling strategies for driving a [`Tracker`].
//!
//! All three strategies feed the same captures through the pipeline and
//! count the same frames; they differ only in which thread enqueues and
//! which thread pops.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::record::Playback;
use crate::sensor::Capture;
use crate::time::{Microseconds, Timeout};
use crate::tracking::tracker::{Tracker, MAX_QUEUE_SIZE};
use crate::tracking::BodyFrame;

/// Poll interval of the background strategies.
const POLL: Timeout = Timeout::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessingStrategy {
    /// Enqueue and pop in lock-step on the calling thread.
    #[default]
    SingleThread,
    /// Enqueue on the calling thread, pop on a background thread.
    PopInBackground,
    /// Enqueue on a background thread, pop on the calling thread.
    EnqueueInBackground,
}

impl FromStr for ProcessingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "s" | "single-thread" => Ok(ProcessingStrategy::SingleThread),
            "p" | "pop-in-background" => Ok(ProcessingStrategy::PopInBackground),
            "e" | "enqueue-in-background" => Ok(ProcessingStrategy::EnqueueInBackground),
            other => Err(Error::InvalidArgument(format!(
                "unknown processing strategy {other:?}"
            ))),
        }
    }
}

/// Where captures come from.
pub trait CaptureSource: Send {
    /// Next capture, or `None` at the end.
    fn next_capture(&mut self) -> Result<Option<Capture>>;
}

impl CaptureSource for Playback {
    fn next_capture(&mut self) -> Result<Option<Capture>> {
        Playback::next_capture(self)
    }
}

/// Captures prepared in memory.
#[derive(Default)]
pub struct VecSource {
    captures: VecDeque<Capture>,
}

impl VecSource {
    pub fn new(captures: impl IntoIterator<Item = Capture>) -> Self {
        Self {
            captures: captures.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl CaptureSource for VecSource {
    fn next_capture(&mut self) -> Result<Option<Capture>> {
        Ok(self.captures.pop_front())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub total_frames: usize,
    pub frames_with_body: usize,
}

/// Optional `[start, end]` window on depth timestamps, measured from `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub start: Option<Microseconds>,
    pub end: Option<Microseconds>,
    pub origin: Microseconds,
}

enum Admit {
    Take(Capture),
    Skip,
    Stop,
}

impl Interval {
    fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    fn admit(&self, capture: Capture) -> Result<Admit> {
        if self.is_unbounded() {
            return Ok(Admit::Take(capture));
        }
        let Some(depth) = capture.depth_image()? else {
            return Ok(Admit::Stop);
        };
        let relative = depth.device_timestamp()? - self.origin;
        if self.end.is_some_and(|end| relative > end) {
            return Ok(Admit::Stop);
        }
        if self.start.is_some_and(|start| relative < start) {
            return Ok(Admit::Skip);
        }
        Ok(Admit::Take(capture))
    }
}

/// Cooperative stop flag shared with a running [`Processor`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct Counters {
    total: AtomicUsize,
    with_body: AtomicUsize,
}

impl Counters {
    fn record(&self, frame: &BodyFrame) -> Result<ProcessorStats> {
        let with_body = if frame.body_count()? > 0 {
            self.with_body.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.with_body.load(Ordering::Acquire)
        };
        let total = self.total.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(ProcessorStats {
            total_frames: total,
            frames_with_body: with_body,
        })
    }

    fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            total_frames: self.total.load(Ordering::Acquire),
            frames_with_body: self.with_body.load(Ordering::Acquire),
        }
    }
}

/// Drives captures from a source through a tracker and counts the results.
pub struct Processor<'t, S> {
    tracker: &'t Tracker,
    source: S,
    strategy: ProcessingStrategy,
    interval: Interval,
    stop: StopHandle,
    counters: Counters,
}

impl<'t, S: CaptureSource> Processor<'t, S> {
    pub fn new(tracker: &'t Tracker, source: S, strategy: ProcessingStrategy) -> Self {
        Self {
            tracker,
            source,
            strategy,
            interval: Interval::default(),
            stop: StopHandle::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Use an existing stop flag instead of a fresh one.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot()
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Process every capture of the source, then drain the pipeline.
    ///
    /// `progress` is called after each counted frame, possibly from a
    /// background thread.
    #[instrument(skip_all, fields(strategy = ?self.strategy))]
    pub fn run<F>(&mut self, progress: F) -> Result<ProcessorStats>
    where
        F: FnMut(ProcessorStats) + Send,
    {
        info!("processing started");
        match self.strategy {
            ProcessingStrategy::SingleThread => self.run_single_thread(progress)?,
            ProcessingStrategy::PopInBackground => self.run_pop_in_background(progress)?,
            ProcessingStrategy::EnqueueInBackground => self.run_enqueue_in_background(progress)?,
        }
        let stats = self.stats();
        info!(
            total = stats.total_frames,
            with_body = stats.frames_with_body,
            "processing finished"
        );
        Ok(stats)
    }

    fn run_single_thread<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(ProcessorStats),
    {
        let tracker = self.tracker;
        let mut pop = |timeout: Timeout, counters: &Counters| -> Result<()> {
            if let Some(frame) = tracker.try_pop_result(timeout)? {
                progress(counters.record(&frame)?);
            }
            Ok(())
        };

        while !self.stop.is_stopped() {
            if tracker.queue_size() >= MAX_QUEUE_SIZE {
                pop(Timeout::INFINITE, &self.counters)?;
                continue;
            }
            let Some(capture) = next_in_interval(&mut self.source, &self.interval)? else {
                break;
            };
            tracker.try_enqueue_capture(&capture, Timeout::INFINITE)?;
            drop(capture);
            pop(Timeout::NO_WAIT, &self.counters)?;
        }

        debug!(queue_size = tracker.queue_size(), "draining queue tail");
        while tracker.queue_size() > 0 {
            pop(Timeout::INFINITE, &self.counters)?;
        }
        Ok(())
    }

    fn run_pop_in_background<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(ProcessorStats) + Send,
    {
        let tracker = self.tracker;
        let counters = &self.counters;
        let fed = AtomicBool::new(false);

        thread::scope(|scope| {
            let popper = scope.spawn(|| -> Result<()> {
                while !(fed.load(Ordering::Acquire) && tracker.queue_size() == 0) {
                    match tracker.try_pop_result(POLL) {
                        Ok(Some(frame)) => progress(counters.record(&frame)?),
                        Ok(None) => {}
                        Err(err) => {
                            fed.store(true, Ordering::Release);
                            return Err(err);
                        }
                    }
                }
                Ok(())
            });

            let fed_result = (|| -> Result<()> {
                while !self.stop.is_stopped() && !fed.load(Ordering::Acquire) {
                    let Some(capture) = next_in_interval(&mut self.source, &self.interval)? else {
                        break;
                    };
                    while !tracker.try_enqueue_capture(&capture, POLL)? {
                        if fed.load(Ordering::Acquire) {
                            break;
                        }
                    }
                }
                Ok(())
            })();
            fed.store(true, Ordering::Release);

            let popped = popper
                .join()
                .unwrap_or_else(|_| Err(Error::pipeline("pop thread panicked")));
            fed_result.and(popped)
        })
    }

    fn run_enqueue_in_background<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(ProcessorStats),
    {
        let tracker = self.tracker;
        let source = &mut self.source;
        let interval = self.interval;
        let stop = &self.stop;
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            let feeder = scope.spawn(|| -> Result<()> {
                let result = (|| -> Result<()> {
                    while !stop.is_stopped() && !done.load(Ordering::Acquire) {
                        let Some(capture) = next_in_interval(&mut *source, &interval)? else {
                            break;
                        };
                        while !tracker.try_enqueue_capture(&capture, POLL)? {
                            if stop.is_stopped() || done.load(Ordering::Acquire) {
                                return Ok(());
                            }
                        }
                    }
                    Ok(())
                })();
                done.store(true, Ordering::Release);
                result
            });

            let popped = (|| -> Result<()> {
                while !(done.load(Ordering::Acquire) && tracker.queue_size() == 0) {
                    if let Some(frame) = tracker.try_pop_result(POLL)? {
                        progress(self.counters.record(&frame)?);
                    }
                }
                Ok(())
            })();
            // unblock the feeder if popping failed
            done.store(true, Ordering::Release);

            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(Error::pipeline("enqueue thread panicked")));
            fed.and(popped)
        })
    }
}

fn next_in_interval<S: CaptureSource + ?Sized>(
    source: &mut S,
    interval: &Interval,
) -> Result<Option<Capture>> {
    loop {
        let Some(capture) = source.next_capture()? else {
            return Ok(None);
        };
        match interval.admit(capture)? {
            Admit::Take(capture) => return Ok(Some(capture)),
            Admit::Skip => continue,
            Admit::Stop => return Ok(None),
        }
    }
}
