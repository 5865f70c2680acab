mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trackbridge::native::software::SoftwareApi;
use trackbridge::{DuplicateReference, Sdk, Error, Image, ImageFormat, Microseconds};

#[test]
fn test_duplicate_reference_is_independent() {
    let (api, sdk) = common::sdk();
    let image = Image::create(&sdk, ImageFormat::Custom8, 4, 4, 4).unwrap();
    image.set_device_timestamp(Microseconds(7)).unwrap();
    let alias = image.duplicate_reference().unwrap();
    assert_eq!(image, alias);

    image.dispose();
    assert!(image.is_disposed());
    assert!(matches!(image.device_timestamp(), Err(Error::ObjectDisposed(_))));
    assert_eq!(alias.device_timestamp().unwrap(), Microseconds(7));
    assert_eq!(api.live_objects(), 1);

    alias.dispose();
    assert_eq!(api.live_objects(), 0);
}

#[test]
fn test_duplicate_of_disposed_fails() {
    let (_api, sdk) = common::sdk();
    let image = Image::create(&sdk, ImageFormat::Custom8, 2, 2, 2).unwrap();
    image.dispose();
    assert!(matches!(image.duplicate_reference(), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_concurrent_dispose_releases_once() {
    let api = SoftwareApi::shared_with_release_stats();
    let sdk = Sdk::new(api.clone());
    let image = Image::create(&sdk, ImageFormat::Custom8, 8, 8, 8).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    image.on_disposed({
        let fired = fired.clone();
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    });

    crossbeam::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| image.dispose());
        }
    })
    .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(api.stats().total_freed(), 1);
    assert_eq!(api.live_objects(), 0);
    drop(image);
    assert_eq!(api.stats().total_freed(), 1);
}

#[test]
fn test_callback_after_dispose_runs_immediately() {
    let (_api, sdk) = common::sdk();
    let image = Image::create(&sdk, ImageFormat::Custom8, 2, 2, 2).unwrap();
    image.dispose();
    let fired = Arc::new(AtomicUsize::new(0));
    image.on_disposed({
        let fired = fired.clone();
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_capture_owns_getter_images() {
    let (api, sdk) = common::sdk();
    let capture = common::capture(&sdk, 5, true);
    let depth = capture.depth_image().unwrap().unwrap();
    let ir = capture.ir_image().unwrap().unwrap();
    assert!(capture.color_image().unwrap().is_none());

    ir.dispose();
    capture.dispose();
    assert!(depth.is_disposed());
    assert_eq!(api.live_objects(), 0);
}
