//! Texture format negotiation.
//!
//! Half-float storage is probed per channel count. A format that fails the
//! render-to-texture check falls back to the next wider one
//! (R16F -> RG16F -> RGBA16F); when even RGBA16F fails the channel count is
//! reported as unavailable and the subsystems needing it are switched off.

use std::fmt;

use crate::backend::{FormatProbe, TextureFormat};
use crate::error::{FluidError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureChannels {
    R,
    Rg,
    Rgba,
}

impl TextureChannels {
    pub fn preferred_format(self) -> TextureFormat {
        match self {
            TextureChannels::R => TextureFormat::R16Float,
            TextureChannels::Rg => TextureFormat::Rg16Float,
            TextureChannels::Rgba => TextureFormat::Rgba16Float,
        }
    }
}

impl fmt::Display for TextureChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureChannels::R => write!(f, "single-channel"),
            TextureChannels::Rg => write!(f, "two-channel"),
            TextureChannels::Rgba => write!(f, "four-channel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExternalFormat {
    pub r: Option<TextureFormat>,
    pub rg: Option<TextureFormat>,
    pub rgba: Option<TextureFormat>,
}

impl ExternalFormat {
    pub fn get(&self, channels: TextureChannels) -> Option<TextureFormat> {
        match channels {
            TextureChannels::R => self.r,
            TextureChannels::Rg => self.rg,
            TextureChannels::Rgba => self.rgba,
        }
    }

    pub fn require(&self, channels: TextureChannels) -> Result<TextureFormat> {
        self.get(channels)
            .ok_or(FluidError::DisabledFeature(channels))
    }

    pub fn is_complete(&self) -> bool {
        self.r.is_some() && self.rg.is_some() && self.rgba.is_some()
    }
}

pub fn negotiate<P: FormatProbe + ?Sized>(probe: &mut P) -> ExternalFormat {
    let format = ExternalFormat {
        rgba: supported_format(probe, TextureChannels::Rgba.preferred_format()),
        rg: supported_format(probe, TextureChannels::Rg.preferred_format()),
        r: supported_format(probe, TextureChannels::R.preferred_format()),
    };
    log::debug!("negotiated texture formats: {:?}", format);
    format
}

fn supported_format<P: FormatProbe + ?Sized>(
    probe: &mut P,
    format: TextureFormat,
) -> Option<TextureFormat> {
    if probe.supports_render_format(format) {
        return Some(format);
    }

    log::debug!("{:?} is not renderable", format);
    format
        .fallback()
        .and_then(|next| supported_format(probe, next))
}
