//! Saving transferred pages to image files.

use tempfile::TempDir;
use tracing_test::traced_test;
use twain_scan::binding::SimulatedDsm;
use twain_scan::protocol::{ConditionCode, DataArgType, HostMessage, Message, Triplet};
use twain_scan::session::ScanSettings;
use twain_scan::{ImageWriter, NativeBitmap, ScanConfig, ScannerSession, TwainError};

fn scan_pages(dsm: &SimulatedDsm, count: i16) -> Vec<NativeBitmap> {
    let mut config = ScanConfig::default();
    config.session.transfer_count = count;
    let mut session = ScannerSession::from_config(Box::new(dsm.clone()), &config, 0);
    session.scan().unwrap();
    session.process_message(&HostMessage::default()).unwrap();
    session.drain_transfers().unwrap()
}

#[test]
fn test_save_png_pages() {
    let dsm = SimulatedDsm::new(["Feeder"]).with_pages(2).with_page_size(20, 10);
    let pages = scan_pages(&dsm, -1);
    let dir = TempDir::new().unwrap();

    let results = ImageWriter::new().save_all(&pages, &dir.path().join("scan.png"));

    assert_eq!(results.len(), 2);
    for (i, (path, result)) in results.iter().enumerate() {
        assert!(result.is_ok(), "{}: {:?}", path.display(), result);
        assert_eq!(path, &dir.path().join(format!("scan{}.png", i)));
        let image = image::open(path).unwrap();
        assert_eq!((image.width(), image.height()), (20, 10));
    }
}

#[test]
fn test_save_jpeg_and_bmp() {
    let dsm = SimulatedDsm::new(["Flatbed"]);
    let pages = scan_pages(&dsm, 1);
    let dir = TempDir::new().unwrap();
    let writer = ImageWriter::new();

    let jpeg = dir.path().join("page.jpg");
    writer.save(&pages[0], &jpeg).unwrap();
    assert_eq!(image::open(&jpeg).unwrap().width(), 16);

    let bmp = dir.path().join("nested/page.BMP");
    writer.save(&pages[0], &bmp).unwrap();
    assert!(bmp.exists());
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dsm = SimulatedDsm::new(["Flatbed"]);
    let pages = scan_pages(&dsm, 1);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.xyz");

    let err = ImageWriter::new().save(&pages[0], &path).unwrap_err();

    assert!(matches!(err, TwainError::UnsupportedFormat(ref ext) if ext == "xyz"));
    assert!(!path.exists());
}

#[test]
fn test_page_metadata_survives_transfer() {
    let dsm = SimulatedDsm::new(["Flatbed"]).with_page_size(32, 24);
    let pages = scan_pages(&dsm, 1);

    let info = pages[0].info();
    assert_eq!((info.width, info.length), (32, 24));
    assert_eq!(info.bits_per_pixel, 24);
    assert_eq!(info.samples_per_pixel, 3);
    assert!((info.x_resolution - 300.0).abs() < f32::EPSILON);
}

#[test]
#[traced_test]
fn test_aborted_transfer_is_logged() {
    let dsm = SimulatedDsm::new(["Flatbed"]);
    dsm.fail_on(
        Triplet::image(DataArgType::ImageNativeXfer, Message::Get),
        ConditionCode::PaperJam,
    );

    let pages = scan_pages(&dsm, 1);

    assert!(pages.is_empty());
    assert!(logs_contain("transfer aborted"));
    assert_eq!(dsm.live_handles(), 0);
}
