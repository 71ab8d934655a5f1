//! Pixel formats advertised to the compositor framework.
//!
//! Exactly two 32-bit formats are supported, with and without alpha, each
//! in implicit or strictly linear layout. Gamma correction and a dedicated
//! cursor plane are unsupported; cursors are ordinary composited surfaces.

/// 32-bit xRGB, no alpha ("XR24").
pub const DRM_FORMAT_XRGB8888: u32 = 0x34325258;
/// 32-bit ARGB ("AR24").
pub const DRM_FORMAT_ARGB8888: u32 = 0x34325241;

/// Layout left to the driver / undefined.
pub const DRM_FORMAT_MOD_INVALID: u64 = 0x00ff_ffff_ffff_ffff;
/// Strictly linear row-major layout.
pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmFormat {
    pub fourcc: u32,
    pub modifiers: [u64; 2],
}

const ADVERTISED: [DrmFormat; 2] = [
    DrmFormat {
        fourcc: DRM_FORMAT_XRGB8888,
        modifiers: [DRM_FORMAT_MOD_INVALID, DRM_FORMAT_MOD_LINEAR],
    },
    DrmFormat {
        fourcc: DRM_FORMAT_ARGB8888,
        modifiers: [DRM_FORMAT_MOD_INVALID, DRM_FORMAT_MOD_LINEAR],
    },
];

/// Formats offered for the primary plane.
pub fn primary_formats() -> &'static [DrmFormat] {
    &ADVERTISED
}

/// Gamma LUTs are unsupported.
pub fn gamma_lut_size() -> usize {
    0
}

/// No hardware cursor path.
pub fn cursor_formats() -> Option<&'static [DrmFormat]> {
    None
}
