//! Trackbridge demo: record a synthetic session, play it back and track bodies

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use flume::bounded;
use tracing::{info, instrument, warn};

use trackbridge::record::{RecordConfiguration, Recorder, SeekOrigin, VideoSettings};
use trackbridge::tracking::{Interval, Processor, ProcessorStats, StopHandle};
use trackbridge::{
    Capture, Config, Float3, Image, ImageFormat, ImuSample, Microseconds, Playback,
    ProcessingConfig, Sdk, Tracker, TrackerConfiguration,
};

/// Depth of the synthetic background, beyond the segmentation range
const BACKGROUND_MM: u16 = 4_000;
/// Depth of the synthetic body
const BODY_MM: u16 = 1_500;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trackbridge=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Trackbridge launching...");

    // Load configuration
    let config_path = std::env::var_os("TRACKBRIDGE_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    trackbridge::CONFIG.store(Arc::new(config.clone()));

    let sdk = Sdk::software(&config.sdk);
    info!(backend = sdk.backend_name(), strategy = ?config.processing.strategy, "sdk ready");

    write_synthetic_recording(&sdk, &config.processing)?;

    let stop = StopHandle::default();
    let (tx, rx) = bounded::<ProcessorStats>(64);

    // Processing blocks on condition variables, keep it off the runtime threads
    let mut worker = tokio::task::spawn_blocking({
        let sdk = sdk.clone();
        let processing = config.processing.clone();
        let tracker_config = config.tracker.clone();
        let stop = stop.clone();
        move || process(&sdk, &processing, &tracker_config, stop, tx)
    });

    let report_every = config.processing.camera_fps as usize;
    let stats = loop {
        tokio::select! {
            joined = &mut worker => break joined??,
            Ok(progress) = rx.recv_async() => {
                if progress.total_frames % report_every == 0 {
                    info!(
                        frames = progress.total_frames,
                        with_body = progress.frames_with_body,
                        "progress"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping after the queued captures");
                stop.stop();
            }
        }
    };

    info!(
        total_frames = stats.total_frames,
        frames_with_body = stats.frames_with_body,
        "Trackbridge finished"
    );
    Ok(())
}

/// Body visible in every other second of the recording
#[instrument(skip_all, fields(path = %processing.recording_path))]
fn write_synthetic_recording(sdk: &Sdk, processing: &ProcessingConfig) -> trackbridge::Result<()> {
    let config = RecordConfiguration::new(processing.depth_mode, None, processing.camera_fps);
    let recorder = Recorder::create(sdk, &processing.recording_path, &config)?;
    recorder.add_tag("GENERATOR", env!("CARGO_PKG_NAME"))?;
    recorder.add_attachment("scene.txt", b"one body, alternating seconds")?;
    let frame_index = recorder.add_custom_track(
        "FRAME_INDEX",
        "S_TRACKBRIDGE/INDEX",
        &[],
        &VideoSettings::default(),
    )?;
    recorder.add_imu_track()?;
    recorder.write_header()?;

    let (width, height) = processing.depth_mode.resolution();
    let frame_usec = 1_000_000 / i64::from(processing.camera_fps);
    let fps = processing.camera_fps as usize;
    for i in 0..processing.frame_count {
        let timestamp = Microseconds(i as i64 * frame_usec);
        let depth = synthetic_depth(sdk, width, height, (i / fps) % 2 == 0)?;
        depth.set_device_timestamp(timestamp)?;
        let ir = Image::create(sdk, ImageFormat::Ir16, width, height, width * 2)?;
        ir.set_device_timestamp(timestamp)?;

        let capture = Capture::from_images(sdk, None, Some(&depth), Some(&ir))?;
        recorder.write_capture(&capture)?;
        frame_index.write_data(timestamp, &(i as u32).to_le_bytes())?;
        recorder.write_imu_sample(&ImuSample {
            temperature_c: 30.0,
            acc_sample: Float3::new(0.0, 0.0, -9.81),
            acc_timestamp: timestamp,
            gyro_sample: Float3::ZERO,
            gyro_timestamp: timestamp,
        })?;
    }
    recorder.flush()?;
    info!(frames = processing.frame_count, "synthetic recording written");
    Ok(())
}

fn synthetic_depth(
    sdk: &Sdk,
    width: usize,
    height: usize,
    with_body: bool,
) -> trackbridge::Result<Image> {
    let mut pixels = vec![BACKGROUND_MM; width * height];
    if with_body {
        for y in height / 4..height * 3 / 4 {
            pixels[y * width + width / 4..y * width + width * 3 / 4].fill(BODY_MM);
        }
    }
    let bytes: Vec<u8> = pixels.iter().flat_map(|mm| mm.to_le_bytes()).collect();
    Image::create_from_bytes(sdk, ImageFormat::Depth16, width, height, width * 2, &bytes)
}

fn process(
    sdk: &Sdk,
    processing: &ProcessingConfig,
    tracker_config: &TrackerConfiguration,
    stop: StopHandle,
    progress: flume::Sender<ProcessorStats>,
) -> trackbridge::Result<ProcessorStats> {
    let playback = Playback::open(sdk, &processing.recording_path)?;
    let origin = playback.record_configuration().start_time_offset;
    let start = processing.start_secs.map(Microseconds::from_secs_f64);
    if let Some(start) = start {
        playback.seek_timestamp(start, SeekOrigin::Begin)?;
    }

    let tracker = Tracker::create(sdk, &playback.calibration()?, tracker_config)?;
    let interval = Interval {
        start,
        end: processing.end_secs.map(Microseconds::from_secs_f64),
        origin,
    };
    let mut processor = Processor::new(&tracker, playback, processing.strategy)
        .with_interval(interval)
        .with_stop(stop);
    let stats = processor.run(|stats| {
        // receiver gone means the binary is exiting
        let _ = progress.send(stats);
    })?;
    Ok(stats)
}
