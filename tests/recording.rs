mod common;

use trackbridge::record::{
    RecordConfiguration, Recorder, SeekOrigin, VideoSettings, DEPTH_TRACK, IMU_TRACK, IR_TRACK,
};
use trackbridge::tracking::{Interval, VecSource};
use trackbridge::{
    Error, Float3, ImuSample, Microseconds, Playback, ProcessingStrategy, Processor, Sdk,
};

const FRAME_USEC: i64 = 33_333;

fn write_recording(sdk: &Sdk, path: &str, frames: i64) {
    let config = RecordConfiguration::new(common::MODE, None, 30);
    let recorder = Recorder::create(sdk, path, &config).unwrap();
    recorder.add_tag("K4A_DEPTH_MODE", "NFOV_2X2BINNED").unwrap();
    recorder.add_attachment("notes.txt", b"hello").unwrap();
    let settings = VideoSettings {
        width: 4,
        height: 1,
        frame_rate: 30,
    };
    let imu = recorder
        .add_custom_track("ACCEL", "S_TRACKBRIDGE/ACCEL", b"ctx", &settings)
        .unwrap();
    recorder.write_header().unwrap();
    assert!(recorder.add_tag("LATE", "x").is_err());

    // timestamps start at an offset to exercise start_time_offset
    for i in 0..frames {
        let ts = 1_000 + i * FRAME_USEC;
        let capture = common::capture(sdk, ts, i % 2 == 0);
        capture.set_temperature_c(30.0 + i as f32).unwrap();
        recorder.write_capture(&capture).unwrap();
        imu.write_data(Microseconds(ts), &(i as u32).to_le_bytes()).unwrap();
    }
    recorder.dispose();
}

fn depth_ts(capture: &trackbridge::Capture) -> i64 {
    capture
        .depth_image()
        .unwrap()
        .unwrap()
        .device_timestamp()
        .unwrap()
        .as_usec()
}

#[test]
fn test_round_trip_metadata() {
    let (api, sdk) = common::sdk();
    write_recording(&sdk, "meta.mkv", 10);

    let playback = Playback::open(&sdk, "meta.mkv").unwrap();
    let config = playback.record_configuration();
    assert_eq!(config.depth_mode, common::MODE);
    assert_eq!(config.camera_fps, 30);
    assert_eq!(config.start_time_offset, Microseconds(1_000));
    assert_eq!(playback.record_length(), Microseconds(9 * FRAME_USEC + 1));

    assert_eq!(playback.tag("K4A_DEPTH_MODE").unwrap().as_deref(), Some("NFOV_2X2BINNED"));
    assert_eq!(playback.tag("MISSING").unwrap(), None);
    assert_eq!(playback.attachment("notes.txt").unwrap().unwrap().as_ref(), b"hello");
    assert_eq!(playback.calibration().unwrap().depth_mode, common::MODE);

    let names: Vec<_> = playback.tracks().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec![DEPTH_TRACK, IR_TRACK, "ACCEL"]);
    let imu = playback.custom_track("ACCEL").unwrap();
    assert_eq!(imu.codec_id(), "S_TRACKBRIDGE/ACCEL");
    assert_eq!(imu.codec_context().as_ref(), b"ctx");
    assert_eq!(imu.video_settings().unwrap().width, 4);
    assert!(playback.custom_track(DEPTH_TRACK).is_err());

    drop(imu);
    drop(playback);
    assert_eq!(api.live_objects(), 0);
}

#[test]
fn test_capture_cursor_boundaries() {
    let (_api, sdk) = common::sdk();
    write_recording(&sdk, "cursor.mkv", 3);
    let playback = Playback::open(&sdk, "cursor.mkv").unwrap();

    assert!(playback.previous_capture().unwrap().is_none());
    let stamps: Vec<_> = std::iter::from_fn(|| playback.next_capture().unwrap())
        .map(|c| depth_ts(&c))
        .collect();
    assert_eq!(stamps, vec![1_000, 1_000 + FRAME_USEC, 1_000 + 2 * FRAME_USEC]);
    assert!(playback.next_capture().unwrap().is_none());

    // reversing at the end returns the last capture again
    let last = playback.previous_capture().unwrap().unwrap();
    assert_eq!(depth_ts(&last), 1_000 + 2 * FRAME_USEC);
    assert_eq!(last.temperature_c().unwrap(), 32.0);

    playback.seek_timestamp(Microseconds::ZERO, SeekOrigin::End).unwrap();
    assert_eq!(depth_ts(&playback.previous_capture().unwrap().unwrap()), 1_000 + 2 * FRAME_USEC);

    playback.seek_timestamp(Microseconds(1), SeekOrigin::Begin).unwrap();
    assert_eq!(depth_ts(&playback.next_capture().unwrap().unwrap()), 1_000 + FRAME_USEC);

    playback
        .seek_timestamp(Microseconds(1_000 + FRAME_USEC), SeekOrigin::DeviceTime)
        .unwrap();
    assert_eq!(depth_ts(&playback.previous_capture().unwrap().unwrap()), 1_000);

    let err = playback.seek_timestamp(Microseconds(-1), SeekOrigin::Begin).unwrap_err();
    assert!(matches!(err, Error::SeekFailed { .. }));
}

#[test]
fn test_track_cursor_is_independent() {
    let (_api, sdk) = common::sdk();
    write_recording(&sdk, "tracks.mkv", 5);
    let playback = Playback::open(&sdk, "tracks.mkv").unwrap();
    let imu = playback.custom_track("ACCEL").unwrap();

    let first = imu.next_data_block().unwrap().unwrap();
    assert_eq!(first.to_bytes().unwrap().as_ref(), &0u32.to_le_bytes()[..]);
    assert_eq!(first.device_timestamp().unwrap(), Microseconds(1_000));
    imu.next_data_block().unwrap().unwrap();

    // moving the capture cursor leaves the track cursor alone
    playback.seek_timestamp(Microseconds::ZERO, SeekOrigin::End).unwrap();
    let third = imu.next_data_block().unwrap().unwrap();
    assert_eq!(third.to_bytes().unwrap().as_ref(), &2u32.to_le_bytes()[..]);

    // a second reader of the same track shares the cursor of the playback
    let again = playback.custom_track("ACCEL").unwrap();
    let fourth = again.next_data_block().unwrap().unwrap();
    assert_eq!(fourth.to_bytes().unwrap().as_ref(), &3u32.to_le_bytes()[..]);

    imu.seek_timestamp(Microseconds::ZERO, SeekOrigin::End).unwrap();
    let last = imu.previous_data_block().unwrap().unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(last.copy_to(&mut buf).unwrap(), 4);
    assert_eq!(u32::from_le_bytes(buf), 4);
    assert!(last.copy_to(&mut [0u8; 2]).is_err());
    assert!(imu.next_data_block().unwrap().is_none());

    // the capture cursor still sits at the end
    assert!(playback.next_capture().unwrap().is_none());
}

#[test]
fn test_disposed_playback_rejects_reads() {
    let (_api, sdk) = common::sdk();
    write_recording(&sdk, "closed.mkv", 2);
    let playback = Playback::open(&sdk, "closed.mkv").unwrap();
    let imu = playback.custom_track("ACCEL").unwrap();
    playback.dispose();
    assert!(matches!(playback.next_capture(), Err(Error::ObjectDisposed(_))));
    assert!(matches!(imu.next_data_block(), Err(Error::ObjectDisposed(_))));
}

#[test]
fn test_processor_over_playback_interval() {
    let (api, sdk) = common::sdk();
    write_recording(&sdk, "interval.mkv", 12);
    let tracker = common::tracker(&sdk);

    let playback = Playback::open(&sdk, "interval.mkv").unwrap();
    let origin = playback.record_configuration().start_time_offset;
    // frames 2..=5 relative to the first capture
    let interval = Interval {
        start: Some(Microseconds(2 * FRAME_USEC)),
        end: Some(Microseconds(5 * FRAME_USEC)),
        origin,
    };
    let stats = Processor::new(&tracker, playback, ProcessingStrategy::PopInBackground)
        .with_interval(interval)
        .run(|_| {})
        .unwrap();
    assert_eq!(stats.total_frames, 4);
    assert_eq!(stats.frames_with_body, 2);

    // every strategy agrees on the same unbounded source
    let mut all = Vec::new();
    for strategy in [
        ProcessingStrategy::SingleThread,
        ProcessingStrategy::PopInBackground,
        ProcessingStrategy::EnqueueInBackground,
    ] {
        let playback = Playback::open(&sdk, "interval.mkv").unwrap();
        all.push(Processor::new(&tracker, playback, strategy).run(|_| {}).unwrap());
    }
    assert!(all.iter().all(|s| s.total_frames == 12 && s.frames_with_body == 6));

    drop(tracker);
    assert_eq!(api.live_objects(), 0);
}

#[test]
fn test_empty_vec_source() {
    let (_api, sdk) = common::sdk();
    let tracker = common::tracker(&sdk);
    let strategy = ProcessingStrategy::EnqueueInBackground;
    let stats = Processor::new(&tracker, VecSource::default(), strategy)
        .run(|_| {})
        .unwrap();
    assert_eq!(stats.total_frames, 0);
}

#[test]
fn test_open_missing_recording() {
    let (_api, sdk) = common::sdk();
    assert!(matches!(Playback::open(&sdk, "nope.mkv"), Err(Error::Recording { .. })));
}

fn imu_sample(ts: i64) -> ImuSample {
    ImuSample {
        temperature_c: 25.0,
        acc_sample: Float3::new(0.0, 0.0, -9.81),
        acc_timestamp: Microseconds(ts),
        gyro_sample: Float3::new(0.01 * ts as f32, 0.0, 0.0),
        gyro_timestamp: Microseconds(ts + 10),
    }
}

#[test]
fn test_imu_samples_round_trip() {
    let (api, sdk) = common::sdk();
    let config = RecordConfiguration::new(common::MODE, None, 30);
    let recorder = Recorder::create(&sdk, "imu.mkv", &config).unwrap();
    recorder.add_imu_track().unwrap();
    assert!(recorder.add_imu_track().is_err());
    recorder.write_header().unwrap();
    for i in 0..3 {
        recorder.write_capture(&common::capture(&sdk, i * FRAME_USEC, true)).unwrap();
    }
    for ts in [0, 5_000, 5_000, 10_000] {
        recorder.write_imu_sample(&imu_sample(ts)).unwrap();
    }
    let err = recorder.write_imu_sample(&imu_sample(1_000)).unwrap_err();
    assert!(matches!(err, Error::Recording { .. }));
    recorder.dispose();

    let playback = Playback::open(&sdk, "imu.mkv").unwrap();
    let names: Vec<_> = playback.tracks().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec![DEPTH_TRACK, IR_TRACK, IMU_TRACK]);
    assert!(playback.custom_track(IMU_TRACK).is_err());

    let stamps: Vec<_> = std::iter::from_fn(|| playback.next_imu_sample().unwrap())
        .map(|s| s.acc_timestamp.as_usec())
        .collect();
    assert_eq!(stamps, vec![0, 5_000, 5_000, 10_000]);
    let last = playback.previous_imu_sample().unwrap().unwrap();
    assert_eq!(last, imu_sample(10_000));

    // a capture seek moves the IMU cursor too
    playback.seek_timestamp(Microseconds(5_000), SeekOrigin::Begin).unwrap();
    assert_eq!(playback.next_imu_sample().unwrap().unwrap().acc_timestamp, Microseconds(5_000));
    assert_eq!(depth_ts(&playback.next_capture().unwrap().unwrap()), FRAME_USEC);

    drop(playback);
    assert_eq!(api.live_objects(), 0);
}

#[test]
fn test_imu_sample_requires_track() {
    let (_api, sdk) = common::sdk();
    let config = RecordConfiguration::new(common::MODE, None, 30);
    let recorder = Recorder::create(&sdk, "no-imu.mkv", &config).unwrap();
    recorder.write_header().unwrap();
    assert!(recorder.add_imu_track().is_err());
    assert!(recorder.write_imu_sample(&imu_sample(0)).is_err());
    recorder.dispose();

    let playback = Playback::open(&sdk, "no-imu.mkv").unwrap();
    assert!(playback.next_imu_sample().unwrap().is_none());
    assert!(playback.previous_imu_sample().unwrap().is_none());
}

#[test]
fn test_out_of_order_capture_is_rejected() {
    let (_api, sdk) = common::sdk();
    let config = RecordConfiguration::new(common::MODE, None, 30);
    let recorder = Recorder::create(&sdk, "order.mkv", &config).unwrap();
    recorder.write_header().unwrap();
    for ts in [100, 300] {
        recorder.write_capture(&common::capture(&sdk, ts, true)).unwrap();
    }
    let err = recorder.write_capture(&common::capture(&sdk, 200, true)).unwrap_err();
    assert!(matches!(err, Error::Recording { .. }));
    // equal timestamps are still accepted
    recorder.write_capture(&common::capture(&sdk, 300, false)).unwrap();
    recorder.dispose();

    let playback = Playback::open(&sdk, "order.mkv").unwrap();
    let stamps: Vec<_> = std::iter::from_fn(|| playback.next_capture().unwrap())
        .map(|c| depth_ts(&c))
        .collect();
    assert_eq!(stamps, vec![100, 300, 300]);
    assert_eq!(playback.record_length(), Microseconds(201));
}
