//! Watch a camera stream and record motion-triggered clips

use clap::*;
use cv_capture::{CvClipWriter, CvFrameSource};
use log::info;
use smtp_notify::{NotifyConfig, SmtpNotifier};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vigil::prelude::v1::{Result, *};

const PREVIEW_WINDOW: &str = "Motion Detection";

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("motion-watch")
        .version(crate_version!())
        .about("Records fixed-duration clips whenever motion is detected")
        .arg(
            Arg::new("camera")
                .long("camera")
                .short('c')
                .takes_value(true)
                .default_value("0")
                .help("Camera device index"),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .help("Read from a video file or stream URL instead of a camera"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .takes_value(true)
                .default_value("recorded_videos")
                .help("Directory finished clips are written to"),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .short('t')
                .takes_value(true)
                .default_value("3")
                .help("Clip length in seconds"),
        )
        .arg(
            Arg::new("area")
                .long("area")
                .takes_value(true)
                .default_value("1500")
                .help("Minimum changed-pixel region area counted as motion"),
        )
        .arg(
            Arg::new("delta")
                .long("delta")
                .takes_value(true)
                .default_value("25")
                .help("Minimum per-pixel intensity change (0-255)"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .takes_value(true)
                .default_value("20")
                .help("Frame rate clips are encoded at"),
        )
        .arg(
            Arg::new("queue-size")
                .long("queue-size")
                .takes_value(true)
                .default_value("4")
                .help("Clips that may wait for notification delivery at once"),
        )
        .arg(
            Arg::new("notify")
                .long("notify")
                .short('n')
                .takes_value(true)
                .help("JSON file with SMTP notification settings"),
        )
        .arg(
            Arg::new("display")
                .long("display")
                .short('d')
                .help("Show a preview window (press q to stop)"),
        )
        .get_matches();

    let output_dir = PathBuf::from(matches.value_of("output-dir").unwrap());
    let duration: f64 = matches.value_of("duration").unwrap().parse()?;
    let area: usize = matches.value_of("area").unwrap().parse()?;
    let delta: u8 = matches.value_of("delta").unwrap().parse()?;
    let fps: f64 = matches.value_of("fps").unwrap().parse()?;
    let queue_size: usize = matches.value_of("queue-size").unwrap().parse()?;
    let display = matches.occurrences_of("display") > 0;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Unable to create {}", output_dir.display()))?;

    let mut source: Box<dyn FrameSource> = if let Some(input) = matches.value_of("input") {
        Box::new(CvFrameSource::try_new_file(input)?)
    } else {
        let camera: i32 = matches.value_of("camera").unwrap().parse()?;
        Box::new(CvFrameSource::try_new_camera(camera)?)
    };

    let notifier: Box<dyn Notifier> = match matches.value_of("notify") {
        Some(path) => Box::new(SmtpNotifier::new(NotifyConfig::load(Path::new(path))?)),
        None => Box::new(LogNotifier),
    };

    let classifier = MotionClassifier::default()
        .area_threshold(area)
        .delta_threshold(delta);

    let config = RecorderConfig {
        output_dir,
        record_duration: Duration::from_secs_f64(duration),
        frame_rate: fps,
    };
    let mut controller = RecordingController::new(
        config,
        Box::new(CvClipWriter::default()),
        NotifyQueue::new(notifier, queue_size),
    );

    let mut frame = Frame::new();
    let mut reference = GrayFrame::new();
    let mut current = GrayFrame::new();

    // Seed the rolling reference with the first frame.
    if !source.read_frame(&mut frame)? {
        return Err(anyhow!("Unable to read from the stream"));
    }
    classifier.prepare(&frame, &mut reference);

    let mut fatal = None;

    loop {
        match source.read_frame(&mut frame) {
            Ok(true) => {}
            Ok(false) => {
                info!("Stream ended");
                break;
            }
            Err(e) => {
                fatal = Some(e.context("Frame read failed"));
                break;
            }
        }

        classifier.prepare(&frame, &mut current);
        let motion = classifier.classify(&reference, &current);

        controller.on_frame(&frame, motion, Instant::now());

        // The reference always tracks the last frame seen, so sustained
        // motion is measured frame-to-frame.
        std::mem::swap(&mut reference, &mut current);

        if display {
            match cv_capture::show_frame(PREVIEW_WINDOW, &frame)
                .and_then(|()| cv_capture::quit_requested())
            {
                Ok(false) => {}
                Ok(true) => {
                    info!("Stopping on user request");
                    break;
                }
                Err(e) => {
                    fatal = Some(e.context("Preview failed"));
                    break;
                }
            }
        }
    }

    controller.finish();

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
