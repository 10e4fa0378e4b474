//! # Motion-Triggered Clip Recording
//!
//! This library provides the frame-processing pipeline for a motion-activated
//! video recorder: frame differencing based motion classification, the
//! Idle/Recording state machine driving a clip writer, and an asynchronous
//! notification queue for finished clips.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use vigil::prelude::v1::*;
//! ```
//!
//! Capture devices, clip encoders and notification transports are plugged in
//! through the [`frame::FrameSource`], [`recorder::RecordingSink`] and
//! [`dispatch::Notifier`] traits.

pub mod detection;
pub mod dispatch;
pub mod frame;
pub mod recorder;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            detection::MotionClassifier,
            dispatch::{LogNotifier, Notifier, NotifyQueue},
            frame::{Frame, FrameSource, GrayFrame},
            recorder::{Mode, RecorderConfig, RecordingController, RecordingSink},
        };
        pub use anyhow::{anyhow, Context, Error, Result};
    }
}
