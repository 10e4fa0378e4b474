//! # OpenCV capture and clip writing
//!
//! [`FrameSource`] backed by `VideoCapture` (camera device or video file)
//! and [`RecordingSink`] backed by `VideoWriter`, plus the optional preview
//! window helpers.

use log::debug;
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use std::path::Path;
use vigil::prelude::v1::*;

/// Frame source reading from a camera device or a video file.
pub struct CvFrameSource {
    capture: VideoCapture,
    frame: Mat,
}

impl CvFrameSource {
    /// Open a camera device by index.
    pub fn try_new_camera(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY)?;

        if !capture.is_opened()? {
            return Err(anyhow!("Unable to open camera with index {index}"));
        }

        Ok(Self {
            capture,
            frame: Default::default(),
        })
    }

    /// Open a video file or stream URL.
    pub fn try_new_file(input: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(input, videoio::CAP_ANY)?;

        if !capture.is_opened()? {
            return Err(anyhow!("Unable to open video stream {input}"));
        }

        Ok(Self {
            capture,
            frame: Default::default(),
        })
    }
}

impl FrameSource for CvFrameSource {
    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool> {
        if !self.capture.read(&mut self.frame)? {
            return Ok(false);
        }

        let (width, height) = (self.frame.cols() as usize, self.frame.rows() as usize);
        if width == 0 || height == 0 {
            return Ok(false);
        }

        let data = self.frame.data_bytes()?;
        frame.resize(width, height, data.len() / (width * height));
        frame.data_mut().copy_from_slice(data);

        Ok(true)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.capture
            .get(videoio::CAP_PROP_FPS)
            .ok()
            .filter(|fps| *fps > 0.0)
    }
}

/// Clip writer producing `.mp4` files through `VideoWriter`.
#[derive(Default)]
pub struct CvClipWriter {
    writer: Option<VideoWriter>,
}

impl RecordingSink for CvClipWriter {
    fn open(&mut self, path: &Path, frame_rate: f64, width: usize, height: usize) -> Result<()> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("Clip path is not valid UTF-8"))?;

        let fourcc = VideoWriter::fourcc('m' as i8, 'p' as i8, '4' as i8, 'v' as i8)?;
        let writer = VideoWriter::new(
            path,
            fourcc,
            frame_rate,
            Size::new(width as i32, height as i32),
            true,
        )?;

        if !writer.is_opened()? {
            return Err(anyhow!("Unable to initialise clip writer for {path}"));
        }

        debug!("Opened clip writer {path} ({width}x{height} @ {frame_rate} fps)");

        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Clip writer is not open"))?;

        writer.write(&frame_to_mat(frame)?)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }
        Ok(())
    }
}

fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(frame.data())?;
    mat.reshape(frame.channels() as i32, frame.height() as i32)
        .map_err(Into::into)
}

/// Show a frame in the named preview window.
pub fn show_frame(window: &str, frame: &Frame) -> Result<()> {
    opencv::highgui::imshow(window, &frame_to_mat(frame)?)?;
    Ok(())
}

/// Pump the preview event loop, returning true once `q` was pressed.
pub fn quit_requested() -> Result<bool> {
    Ok(opencv::highgui::wait_key(1)? == 'q' as i32)
}
