//! Render configuration fingerprint.

use crate::text::Alignment;

/// Render and layout parameters a cache is built with.
///
/// Every field is part of the cache-validity key: a cache built under one
/// configuration is never served under another.
#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    /// Renderer font identifier.
    pub font_id: i32,
    /// Multiplier applied to the renderer's line height.
    pub line_compression: f32,
    /// First-line indent level for body paragraphs.
    pub indent_level: u8,
    /// Inter-paragraph spacing level.
    pub spacing_level: u8,
    /// Body paragraph alignment tag (see [`Alignment::to_u8`]).
    pub paragraph_alignment: u8,
    /// Whether overlong words may be hyphenated.
    pub hyphenation: bool,
    /// Whether image placeholders are kept.
    pub show_images: bool,
    /// Viewport width in pixels.
    pub viewport_width: u16,
    /// Viewport height in pixels.
    pub viewport_height: u16,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_id: 0,
            line_compression: 1.0,
            indent_level: 1,
            spacing_level: 1,
            paragraph_alignment: Alignment::Justify.to_u8(),
            hyphenation: false,
            show_images: true,
            viewport_width: 480,
            viewport_height: 800,
        }
    }
}

impl RenderConfig {
    /// Default configuration for a viewport size.
    pub fn for_viewport(width: u16, height: u16) -> Self {
        Self {
            viewport_width: width,
            viewport_height: height,
            ..Self::default()
        }
    }

    pub fn with_font_id(mut self, font_id: i32) -> Self {
        self.font_id = font_id;
        self
    }

    pub fn with_line_compression(mut self, line_compression: f32) -> Self {
        self.line_compression = line_compression;
        self
    }

    pub fn with_indent_level(mut self, indent_level: u8) -> Self {
        self.indent_level = indent_level;
        self
    }

    pub fn with_spacing_level(mut self, spacing_level: u8) -> Self {
        self.spacing_level = spacing_level;
        self
    }

    pub fn with_paragraph_alignment(mut self, alignment: Alignment) -> Self {
        self.paragraph_alignment = alignment.to_u8();
        self
    }

    pub fn with_hyphenation(mut self, hyphenation: bool) -> Self {
        self.hyphenation = hyphenation;
        self
    }

    pub fn with_show_images(mut self, show_images: bool) -> Self {
        self.show_images = show_images;
        self
    }

    /// Alignment used for body paragraphs.
    pub fn paragraph_alignment(&self) -> Alignment {
        Alignment::from_u8(self.paragraph_alignment)
    }

    /// Line advance in pixels for a renderer line height.
    ///
    /// The scaled value is truncated toward zero.
    pub fn scaled_line_height(&self, renderer_line_height: u16) -> u32 {
        let scaled = renderer_line_height as f32 * self.line_compression;
        if scaled.is_finite() && scaled > 0.0 {
            scaled as u32
        } else {
            0
        }
    }
}

/// Exact equality; `line_compression` is compared bit for bit.
impl PartialEq for RenderConfig {
    fn eq(&self, other: &Self) -> bool {
        self.font_id == other.font_id
            && self.line_compression.to_bits() == other.line_compression.to_bits()
            && self.indent_level == other.indent_level
            && self.spacing_level == other.spacing_level
            && self.paragraph_alignment == other.paragraph_alignment
            && self.hyphenation == other.hyphenation
            && self.show_images == other.show_images
            && self.viewport_width == other.viewport_width
            && self.viewport_height == other.viewport_height
    }
}

impl Eq for RenderConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_field_change_breaks_equality() {
        let base = RenderConfig::for_viewport(480, 800);
        assert_eq!(base, RenderConfig::for_viewport(480, 800));
        let variants = [
            base.with_font_id(7),
            base.with_line_compression(0.95),
            base.with_indent_level(0),
            base.with_spacing_level(3),
            base.with_paragraph_alignment(Alignment::Left),
            base.with_hyphenation(true),
            base.with_show_images(false),
            RenderConfig::for_viewport(481, 800),
            RenderConfig::for_viewport(480, 799),
        ];
        for variant in variants {
            assert_ne!(base, variant, "{:?} should not match base", variant);
        }
    }

    #[test]
    fn line_compression_compares_bitwise() {
        let nan = RenderConfig::default().with_line_compression(f32::NAN);
        assert_eq!(nan, nan);
        let pos = RenderConfig::default().with_line_compression(0.0);
        let neg = RenderConfig::default().with_line_compression(-0.0);
        assert_ne!(pos, neg);
    }

    #[test]
    fn scaled_line_height_truncates() {
        let config = RenderConfig::default().with_line_compression(0.95);
        assert_eq!(config.scaled_line_height(20), 19);
        assert_eq!(config.scaled_line_height(21), 19);
        let broken = RenderConfig::default().with_line_compression(f32::NAN);
        assert_eq!(broken.scaled_line_height(20), 0);
    }
}
