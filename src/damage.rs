//! Damage-rectangle extraction.
//!
//! Converts the dirty region the compositor reports at commit time into one
//! SHMIMAGE payload per surviving rectangle. Rectangles are processed in
//! the order the compositor's region representation supplies them:
//! re-sorting them, like clamping their origin against the output box
//! ("delta" coordinates), was tried and causes visible glitches, so damage
//! is forwarded exactly as reported.

use thiserror::Error;
use tracing::{error, warn};

use crate::proto::ShmImage;

/// A dirty rectangle in corner form, as stored by the compositor's region
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DamageError {
    /// Rectangle extents overflowed `i32`. The whole region is dropped for
    /// this commit; damage accumulates, so the next commit self-heals.
    #[error("arithmetic overflow in damage extents")]
    Overflow,
}

/// Extract the wire rectangles for one commit's damage region.
///
/// A rectangle with non-positive area is skipped on its own; one malformed
/// rectangle must not suppress its valid siblings.
pub fn extract(rects: &[DamageBox]) -> Result<Vec<ShmImage>, DamageError> {
    let mut out = Vec::with_capacity(rects.len());
    for rect in rects {
        let (width, height) = match (
            rect.x2.checked_sub(rect.x1),
            rect.y2.checked_sub(rect.y1),
        ) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                error!("overflow in damage calc, dropping region for this commit");
                return Err(DamageError::Overflow);
            }
        };
        if width <= 0 || height <= 0 {
            warn!(width, height, "non-positive damage rectangle, skipping");
            continue;
        }
        out.push(ShmImage {
            x: rect.x1,
            y: rect.y1,
            width: width as u32,
            height: height as u32,
        });
    }
    Ok(out)
}
