#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use trackbridge::native::software::SoftwareApi;
use trackbridge::{
    Calibration, Capture, DepthMode, Image, ImageFormat, Microseconds, Sdk, Tracker,
    TrackerConfiguration,
};

pub const MODE: DepthMode = DepthMode::Nfov2x2Binned;

pub fn sdk() -> (Arc<SoftwareApi>, Sdk) {
    let api = SoftwareApi::shared_default();
    let sdk = Sdk::new(api.clone());
    (api, sdk)
}

pub fn tracker(sdk: &Sdk) -> Tracker {
    let calibration = Calibration::new(MODE, Bytes::new());
    Tracker::create(sdk, &calibration, &TrackerConfiguration::default()).unwrap()
}

/// Depth and IR capture at `ts`; with a body every depth pixel is 1000 mm, otherwise 0.
pub fn capture(sdk: &Sdk, ts: i64, with_body: bool) -> Capture {
    let (w, h) = MODE.resolution();
    let depth = Image::create(sdk, ImageFormat::Depth16, w, h, w * 2).unwrap();
    if with_body {
        depth.fill_from(&[0xE8, 0x03].repeat(w * h)).unwrap();
    }
    depth.set_device_timestamp(Microseconds(ts)).unwrap();
    let ir = Image::create(sdk, ImageFormat::Ir16, w, h, w * 2).unwrap();
    ir.set_device_timestamp(Microseconds(ts)).unwrap();
    Capture::from_images(sdk, None, Some(&depth), Some(&ir)).unwrap()
}
