//! Motion detection module

use crate::frame::{Frame, GrayFrame};

/// Frame differencing based motion classifier.
///
/// Two consecutive frames are normalised to blurred grayscale, their
/// per-pixel absolute difference is binarised at `delta_threshold`, the
/// binary map is dilated to merge fragmented regions, and motion is reported
/// iff any connected region of changed pixels covers more than
/// `area_threshold` pixels.
pub struct MotionClassifier {
    delta_threshold: u8,
    area_threshold: usize,
    dilate_iterations: usize,
    kernel: Vec<f32>,
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self {
            delta_threshold: 25,
            area_threshold: 1500,
            dilate_iterations: 2,
            kernel: gaussian_kernel(21),
        }
    }
}

impl MotionClassifier {
    /// Minimum per-pixel intensity delta (of 255) counted as changed.
    pub fn delta_threshold(self, delta_threshold: u8) -> Self {
        Self {
            delta_threshold,
            ..self
        }
    }

    /// Minimum connected changed-pixel area counted as true motion.
    pub fn area_threshold(self, area_threshold: usize) -> Self {
        Self {
            area_threshold,
            ..self
        }
    }

    /// Number of 3x3 dilation passes applied to the difference map.
    pub fn dilate_iterations(self, dilate_iterations: usize) -> Self {
        Self {
            dilate_iterations,
            ..self
        }
    }

    /// Side length of the smoothing kernel. Forced odd.
    pub fn blur_kernel(self, size: usize) -> Self {
        Self {
            kernel: gaussian_kernel(size.max(1) | 1),
            ..self
        }
    }

    /// Normalise a frame for comparison.
    ///
    /// Converts to single-channel intensity and applies the smoothing kernel
    /// to suppress sensor and compression noise. Both frames of a compared
    /// pair must be prepared identically.
    pub fn prepare(&self, frame: &Frame, out: &mut GrayFrame) {
        let (width, height) = frame.dim();
        out.resize(width, height);

        let channels = frame.channels();
        if channels <= 1 {
            out.data_mut().copy_from_slice(frame.data());
        } else {
            for (dst, px) in out
                .data_mut()
                .iter_mut()
                .zip(frame.data().chunks_exact(channels))
            {
                let sum = px.iter().map(|&v| v as u32).sum::<u32>();
                *dst = (sum / channels as u32) as u8;
            }
        }

        self.blur(out);
    }

    /// Classify motion between two prepared frames.
    ///
    /// Returns true iff at least one connected region of changed pixels
    /// exceeds the area threshold. Frames of mismatched dimensions compare
    /// as no motion.
    pub fn classify(&self, previous: &GrayFrame, current: &GrayFrame) -> bool {
        let (width, height) = current.dim();
        if previous.dim() != (width, height) || width == 0 || height == 0 {
            return false;
        }

        let mut map = vec![false; width * height];
        for (m, (&a, &b)) in map
            .iter_mut()
            .zip(previous.data().iter().zip(current.data().iter()))
        {
            *m = a.abs_diff(b) > self.delta_threshold;
        }

        for _ in 0..self.dilate_iterations {
            map = dilate(&map, width, height);
        }

        self.any_region_exceeds(&mut map, width, height)
    }

    /// Separable smoothing blur with replicated borders.
    fn blur(&self, gray: &mut GrayFrame) {
        let (width, height) = gray.dim();
        if width == 0 || height == 0 {
            return;
        }

        let half = (self.kernel.len() / 2) as isize;
        let mut tmp = vec![0u8; width * height];

        for y in 0..height {
            let row = &gray.data()[y * width..(y + 1) * width];
            for x in 0..width {
                let mut acc = 0f32;
                for (k, w) in self.kernel.iter().enumerate() {
                    let sx = (x as isize + k as isize - half).clamp(0, width as isize - 1);
                    acc += row[sx as usize] as f32 * w;
                }
                tmp[y * width + x] = acc.round() as u8;
            }
        }

        let data = gray.data_mut();
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0f32;
                for (k, w) in self.kernel.iter().enumerate() {
                    let sy = (y as isize + k as isize - half).clamp(0, height as isize - 1);
                    acc += tmp[sy as usize * width + x] as f32 * w;
                }
                data[y * width + x] = acc.round() as u8;
            }
        }
    }

    /// Flood fill connected regions of the changed-pixel map, returning as
    /// soon as any region area passes the threshold.
    fn any_region_exceeds(&self, map: &mut [bool], width: usize, height: usize) -> bool {
        let mut to_fill = vec![];

        for start in 0..map.len() {
            if !map[start] {
                continue;
            }

            let mut area = 0;

            map[start] = false;
            to_fill.clear();
            to_fill.push(start);

            while let Some(idx) = to_fill.pop() {
                area += 1;

                if area > self.area_threshold {
                    return true;
                }

                let (x, y) = ((idx % width) as isize, (idx / width) as isize);
                let neighbor_offs = (-1..=1).flat_map(|x| (-1..=1).map(move |y| (x, y)));

                // Go through each neighbor and add any unvisited changed
                // entries.
                for neighbor in neighbor_offs
                    .map(|(ox, oy)| (x + ox, y + oy))
                    .filter(|&(x, y)| {
                        (0..width as isize).contains(&x) && (0..height as isize).contains(&y)
                    })
                    .map(|(x, y)| y as usize * width + x as usize)
                {
                    if map[neighbor] {
                        map[neighbor] = false;
                        to_fill.push(neighbor);
                    }
                }
            }
        }

        false
    }
}

/// Normalised 1-D smoothing kernel with sigma matched to the kernel size.
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size - 1) as f32 * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as isize;

    let mut kernel = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect::<Vec<_>>();

    let sum = kernel.iter().sum::<f32>();
    for k in &mut kernel {
        *k /= sum;
    }

    kernel
}

/// One 3x3 dilation pass over a binary map.
fn dilate(map: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut out = vec![false; map.len()];

    for y in 0..height as isize {
        for x in 0..width as isize {
            if !map[y as usize * width + x as usize] {
                continue;
            }

            let neighbor_offs = (-1..=1).flat_map(|x| (-1..=1).map(move |y| (x, y)));

            for (x, y) in neighbor_offs
                .map(|(ox, oy)| (x + ox, y + oy))
                .filter(|&(x, y)| {
                    (0..width as isize).contains(&x) && (0..height as isize).contains(&y)
                })
            {
                out[y as usize * width + x as usize] = true;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: usize, height: usize, value: u8) -> Frame {
        Frame::from_raw(width, height, 1, vec![value; width * height])
    }

    /// Paint a `bw x bh` block of `value` at `(x, y)`.
    fn paint_block(frame: &mut Frame, x: usize, y: usize, bw: usize, bh: usize, value: u8) {
        let (width, _) = frame.dim();
        for row in y..y + bh {
            for col in x..x + bw {
                frame.data_mut()[row * width + col] = value;
            }
        }
    }

    fn prepared(classifier: &MotionClassifier, frame: &Frame) -> GrayFrame {
        let mut out = GrayFrame::new();
        classifier.prepare(frame, &mut out);
        out
    }

    #[test]
    fn identical_frames_never_motion() {
        let classifier = MotionClassifier::default().area_threshold(0);
        let frame = solid_frame(120, 90, 80);
        let a = prepared(&classifier, &frame);
        let b = prepared(&classifier, &frame);
        assert!(!classifier.classify(&a, &b));
    }

    #[test]
    fn prepare_keeps_uniform_frames_uniform() {
        let classifier = MotionClassifier::default();
        let gray = prepared(&classifier, &solid_frame(64, 64, 137));
        assert!(gray.data().iter().all(|&v| v == 137));
    }

    #[test]
    fn prepare_averages_channels() {
        let classifier = MotionClassifier::default();
        let frame = Frame::from_raw(2, 2, 3, [[10u8, 20, 30]; 4].concat());
        let gray = prepared(&classifier, &frame);
        assert!(gray.data().iter().all(|&v| v == 20));
    }

    #[test]
    fn large_block_is_motion() {
        let classifier = MotionClassifier::default();
        let background = solid_frame(120, 90, 0);
        let mut moved = background.clone();
        paint_block(&mut moved, 30, 20, 50, 40, 255);

        let previous = prepared(&classifier, &background);
        let current = prepared(&classifier, &moved);
        assert!(classifier.classify(&previous, &current));
        // Symmetric: the object leaving the scene is motion too.
        assert!(classifier.classify(&current, &previous));
    }

    #[test]
    fn small_block_is_not_motion() {
        let classifier = MotionClassifier::default();
        let background = solid_frame(120, 90, 0);
        let mut moved = background.clone();
        paint_block(&mut moved, 30, 20, 10, 10, 255);

        let previous = prepared(&classifier, &background);
        let current = prepared(&classifier, &moved);
        assert!(!classifier.classify(&previous, &current));
    }

    #[test]
    fn point_noise_is_suppressed() {
        let classifier = MotionClassifier::default().area_threshold(0);
        let background = solid_frame(120, 90, 0);
        let mut noisy = background.clone();
        paint_block(&mut noisy, 60, 45, 1, 1, 255);

        // The smoothing pass spreads a lone hot pixel well below the
        // intensity delta.
        let previous = prepared(&classifier, &background);
        let current = prepared(&classifier, &noisy);
        assert!(!classifier.classify(&previous, &current));
    }

    #[test]
    fn fragmented_regions_merge() {
        let classifier = MotionClassifier::default();
        let background = solid_frame(160, 120, 0);
        let mut moved = background.clone();
        // Two fragments, 3px apart. Each is below the area threshold on its
        // own, together they bridge into one qualifying region.
        paint_block(&mut moved, 40, 40, 22, 22, 255);
        paint_block(&mut moved, 65, 40, 22, 22, 255);

        let previous = prepared(&classifier, &background);
        let current = prepared(&classifier, &moved);
        assert!(classifier.classify(&previous, &current));

        let mut lone = background.clone();
        paint_block(&mut lone, 40, 40, 22, 22, 255);
        let lone = prepared(&classifier, &lone);
        assert!(!classifier.classify(&previous, &lone));
    }

    #[test]
    fn below_delta_change_is_not_motion() {
        let classifier = MotionClassifier::default();
        let previous = prepared(&classifier, &solid_frame(120, 90, 100));
        let current = prepared(&classifier, &solid_frame(120, 90, 110));
        assert!(!classifier.classify(&previous, &current));
    }

    #[test]
    fn mismatched_dimensions_are_not_motion() {
        let classifier = MotionClassifier::default();
        let previous = prepared(&classifier, &solid_frame(120, 90, 0));
        let current = prepared(&classifier, &solid_frame(90, 120, 255));
        assert!(!classifier.classify(&previous, &current));
    }

    #[test]
    fn dilation_grows_regions() {
        let mut map = vec![false; 25];
        map[12] = true;
        let out = dilate(&map, 5, 5);
        assert_eq!(out.iter().filter(|&&v| v).count(), 9);
    }
}
