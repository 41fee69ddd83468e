//! Frame sequence decode/encode
//!
//! A "video" is either an animated GIF or a directory of still frames, sorted
//! by file name with digit runs compared numerically. Outputs ending in `.gif`
//! are written as a looping GIF; any other output path becomes a directory of
//! numbered PNG frames. Every write goes to a temporary sibling first and is
//! renamed into place, so a failed write leaves nothing behind.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, Delay, DynamicImage, Frame, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DreamError, Result};

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of an existing frame
    pub fn of(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resize a frame (bilinear); a no-op when the size already matches
pub fn resize_frame(image: &RgbImage, size: FrameSize) -> RgbImage {
    if FrameSize::of(image) == size {
        return image.clone();
    }
    imageops::resize(image, size.width, size.height, FilterType::Triangle)
}

/// Decode a video into frames.
///
/// Frame `i` is kept iff `i % skip_value == 0`, so an `M`-frame source yields
/// `ceil(M / skip_value)` frames. Kept frames are resized when `resize` is set.
pub fn read_frames(path: &Path, skip_value: usize, resize: Option<FrameSize>) -> Result<Vec<RgbImage>> {
    if skip_value == 0 {
        return Err(DreamError::InvalidArgument(
            "skip value must be at least 1".to_string(),
        ));
    }

    let frames = if path.is_dir() {
        read_frame_directory(path, skip_value)?
    } else if is_gif(path) {
        read_gif(path, skip_value)?
    } else if !path.exists() {
        return Err(DreamError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "video source not found"),
        ));
    } else {
        return Err(DreamError::InvalidArgument(format!(
            "unsupported video source {} (expected an animated .gif or a frame directory)",
            path.display()
        )));
    };

    info!(
        "Decoded {} frame(s) from {} (skip {})",
        frames.len(),
        path.display(),
        skip_value
    );

    Ok(match resize {
        Some(size) => frames.iter().map(|f| resize_frame(f, size)).collect(),
        None => frames,
    })
}

fn read_gif(path: &Path, skip_value: usize) -> Result<Vec<RgbImage>> {
    let file = File::open(path).map_err(|e| DreamError::io(path, e))?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| DreamError::codec(path, e))?;

    let mut frames = Vec::new();
    for (i, frame) in decoder.into_frames().enumerate() {
        let frame = frame.map_err(|e| DreamError::codec(path, e))?;
        if i % skip_value == 0 {
            frames.push(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8());
        }
    }
    Ok(frames)
}

fn read_frame_directory(dir: &Path, skip_value: usize) -> Result<Vec<RgbImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DreamError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
        .collect();
    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

    paths
        .iter()
        .step_by(skip_value)
        .map(|p| load_image(p))
        .collect()
}

fn file_name(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default()
}

/// Compare names with runs of ASCII digits ordered by value, so `2.png`
/// sorts before `10.png`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (digits_a, rest_a) = a.split_at(digit_run(a));
                let (digits_b, rest_b) = b.split_at(digit_run(b));
                let (value_a, value_b) = (
                    digits_a.trim_start_matches('0'),
                    digits_b.trim_start_matches('0'),
                );
                let ord = value_a
                    .len()
                    .cmp(&value_b.len())
                    .then_with(|| value_a.cmp(value_b))
                    .then_with(|| digits_a.len().cmp(&digits_b.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
                (a, b) = (rest_a, rest_b);
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                (a, b) = (&a[x.len_utf8()..], &b[y.len_utf8()..]);
            }
        }
    }
}

fn digit_run(s: &str) -> usize {
    s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len())
}

/// Check encode settings without touching any frames
pub fn check_encoding(size: Option<FrameSize>, framerate: u32) -> Result<()> {
    if framerate == 0 {
        return Err(DreamError::InvalidArgument(
            "frame rate must be at least 1".to_string(),
        ));
    }
    if let Some(size) = size.filter(|s| s.width == 0 || s.height == 0) {
        return Err(DreamError::InvalidArgument(format!(
            "cannot encode frames at {size}"
        )));
    }
    Ok(())
}

/// Encode frames as a video at `size` and `framerate` frames per second.
///
/// GIF stores frame delays in whole centiseconds, so `1000 / framerate` ms is
/// truncated: 30 fps becomes a 30 ms delay and plays back at about 33 fps.
/// Frame directories carry no timing at all.
pub fn write_frames(frames: &[RgbImage], path: &Path, size: FrameSize, framerate: u32) -> Result<()> {
    if frames.is_empty() {
        return Err(DreamError::InvalidArgument(
            "cannot encode an empty frame sequence".to_string(),
        ));
    }
    check_encoding(Some(size), framerate)?;

    if is_gif(path) {
        write_gif(frames, path, size, framerate)?;
    } else {
        write_frame_directory(frames, path, size)?;
    }

    info!(
        "Wrote {} frame(s) at {} / {} fps to {}",
        frames.len(),
        size,
        framerate,
        path.display()
    );
    Ok(())
}

fn write_gif(frames: &[RgbImage], path: &Path, size: FrameSize, framerate: u32) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".deepdream-")
        .suffix(".gif")
        .tempfile_in(parent_dir(path))
        .map_err(|e| DreamError::io(path, e))?;

    {
        let mut encoder = GifEncoder::new(tmp.as_file_mut());
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| DreamError::codec(path, e))?;
        let delay = Delay::from_numer_denom_ms(1000, framerate);
        for (i, frame) in frames.iter().enumerate() {
            let rgba = DynamicImage::ImageRgb8(resize_frame(frame, size)).to_rgba8();
            encoder
                .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
                .map_err(|e| DreamError::codec(path, e))?;
            debug!("Encoded frame {}/{}", i + 1, frames.len());
        }
    }

    tmp.persist(path).map_err(|e| DreamError::io(path, e.error))?;
    Ok(())
}

fn write_frame_directory(frames: &[RgbImage], path: &Path, size: FrameSize) -> Result<()> {
    if path.exists() {
        return Err(DreamError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "output frame directory already exists",
            ),
        ));
    }

    let tmp = tempfile::Builder::new()
        .prefix(".deepdream-")
        .tempdir_in(parent_dir(path))
        .map_err(|e| DreamError::io(path, e))?;

    for (i, frame) in frames.iter().enumerate() {
        let frame_path = tmp.path().join(frame_name(i));
        resize_frame(frame, size)
            .save_with_format(&frame_path, ImageFormat::Png)
            .map_err(|e| DreamError::codec(&frame_path, e))?;
    }

    let staged = tmp.into_path();
    if let Err(e) = std::fs::rename(&staged, path) {
        let _ = std::fs::remove_dir_all(&staged);
        return Err(DreamError::io(path, e));
    }
    Ok(())
}

/// File name of frame `index` inside an output directory
pub fn frame_name(index: usize) -> String {
    format!("frame_{index:05}.png")
}

/// Load a still image as 8-bit RGB
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).map_err(|e| DreamError::codec(path, e))?;
    Ok(image.to_rgb8())
}

/// Save a still image, format chosen by extension
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path).map_err(|e| DreamError::codec(path, e))?;
    let tmp = tempfile::Builder::new()
        .prefix(".deepdream-")
        .tempfile_in(parent_dir(path))
        .map_err(|e| DreamError::io(path, e))?;

    image
        .save_with_format(tmp.path(), format)
        .map_err(|e| DreamError::codec(path, e))?;
    tmp.persist(path).map_err(|e| DreamError::io(path, e.error))?;
    Ok(())
}

fn is_gif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
