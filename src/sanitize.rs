//! Sanitize-and-clamp helpers for untrusted numeric input.
//!
//! Parameter bundles come from a generative collaborator, so any field may be
//! absent, non-finite, or out of range. Consumers never propagate an error for
//! that; they substitute a documented fallback and clamp to a safe range.

use glam::Vec3;

/// Return `value` when present and finite, otherwise `fallback`.
#[inline]
pub fn finite_or(value: Option<f32>, fallback: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => fallback,
    }
}

/// `finite_or` followed by a clamp to `[min, max]`.
///
/// The fallback is clamped as well so a badly chosen fallback can never leak
/// out of range.
#[inline]
pub fn clamped_or(value: Option<f32>, fallback: f32, min: f32, max: f32) -> f32 {
    finite_or(value, fallback).clamp(min, max)
}

/// Replace a non-finite scalar with `fallback`.
#[inline]
pub fn finite_scalar(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Parse a `#rrggbb` (or `rrggbb`, or `#rgb`) color string into linear-ish RGB in [0,1].
///
/// Returns `None` for anything that is not a well-formed hex color.
pub fn parse_hex_color(text: &str) -> Option<Vec3> {
    let hex = text.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    let r = channel(0)?;
    let g = channel(2)?;
    let b = channel(4)?;

    Some(Vec3::new(r as f32, g as f32, b as f32) / 255.0)
}

/// Parse a hex color, substituting `fallback` (also a hex string) when invalid.
pub fn color_or(text: Option<&str>, fallback: &str) -> Vec3 {
    text.and_then(parse_hex_color)
        .or_else(|| parse_hex_color(fallback))
        .unwrap_or(Vec3::ONE)
}
