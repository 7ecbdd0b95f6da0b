use std::path::{Path, PathBuf};

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::PixelFormat;
use crate::{Error, Result};

/// Turn a configured device selector into a node path.
///
/// A bare number is a `/dev/video<N>` index, anything else is a path, and an
/// empty selector means auto-detect.
pub fn resolve_device(selector: &str, format: PixelFormat) -> Result<PathBuf> {
    let selector = selector.trim();
    if selector.is_empty() {
        return auto_detect_device(format);
    }
    if selector.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(PathBuf::from(format!("/dev/video{}", selector)));
    }
    Ok(PathBuf::from(selector))
}

/// Auto-detect the first capture node that offers `format`
pub fn auto_detect_device(format: PixelFormat) -> Result<PathBuf> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        if let Ok(dev) = Device::with_path(&path) {
            if let Ok(caps) = dev.query_caps() {
                // Check for capture capability
                if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                    debug!("{} ({}) is not a capture node", path, caps.card);
                    continue;
                }
                if let Ok(formats) = dev.enum_formats() {
                    if formats.iter().any(|fmt| fmt.fourcc == format.fourcc()) {
                        info!("Found {} device: {} - {}", format.fourcc(), path, caps.card);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }
    }

    Err(Error::NoDevice)
}
