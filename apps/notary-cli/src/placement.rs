//! Parsing of `--text` / `--image` placement flags
//!
//! Both take `PAGE:X,Y,W,H:VALUE`, in PDF points from the bottom-left corner.
//! For `--text` the value is the text to draw; for `--image` it's a PNG path.

use anyhow::{anyhow, bail, Context, Result};
use shared_types::Placement;
use std::path::Path;

struct Spec<'a> {
    page: u32,
    rect: [f64; 4],
    value: &'a str,
}

fn split(spec: &str) -> Result<Spec<'_>> {
    let mut parts = spec.splitn(3, ':');
    let (Some(page), Some(rect), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("placement '{}' is not PAGE:X,Y,W,H:VALUE", spec);
    };

    let page: u32 = page
        .trim()
        .parse()
        .with_context(|| format!("bad page number in '{}'", spec))?;

    let numbers = rect
        .split(',')
        .map(|n| n.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("bad rectangle in '{}'", spec))?;
    let rect: [f64; 4] = numbers
        .try_into()
        .map_err(|_| anyhow!("rectangle in '{}' needs four numbers", spec))?;
    if !rect.iter().all(|n| n.is_finite()) {
        bail!("rectangle in '{}' must be finite", spec);
    }

    Ok(Spec { page, rect, value })
}

pub fn parse_text(spec: &str, font_size: f64) -> Result<Placement> {
    let Spec { page, rect, value } = split(spec)?;
    Ok(Placement::text(page, rect, value, font_size))
}

pub fn parse_image(spec: &str) -> Result<Placement> {
    let Spec { page, rect, value } = split(spec)?;
    let png = std::fs::read(Path::new(value))
        .with_context(|| format!("failed to read signature image {}", value))?;
    Ok(Placement::image(page, rect, png))
}
