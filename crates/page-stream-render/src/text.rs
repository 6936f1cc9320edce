//! Styled words and text blocks.

/// Maximum bytes held by one word before it is force-split.
pub const MAX_WORD_BYTES: usize = 200;

/// Resident word count above which a block is laid out early.
pub const MAX_BLOCK_WORDS: usize = 750;

/// Resolved font style of a word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    /// Stable on-disk tag.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Bold => 1,
            Self::Italic => 2,
            Self::BoldItalic => 3,
        }
    }

    /// Decode an on-disk tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Regular),
            1 => Some(Self::Bold),
            2 => Some(Self::Italic),
            3 => Some(Self::BoldItalic),
            _ => None,
        }
    }

    /// Whether the style has bold weight.
    pub fn is_bold(self) -> bool {
        matches!(self, Self::Bold | Self::BoldItalic)
    }

    /// Whether the style is slanted.
    pub fn is_italic(self) -> bool {
        matches!(self, Self::Italic | Self::BoldItalic)
    }
}

/// Nested bold/italic depth counters.
///
/// Unmatched end events saturate at zero instead of underflowing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StyleState {
    bold_depth: u16,
    italic_depth: u16,
}

impl StyleState {
    pub fn enter_bold(&mut self) {
        self.bold_depth = self.bold_depth.saturating_add(1);
    }

    pub fn leave_bold(&mut self) {
        self.bold_depth = self.bold_depth.saturating_sub(1);
    }

    pub fn enter_italic(&mut self) {
        self.italic_depth = self.italic_depth.saturating_add(1);
    }

    pub fn leave_italic(&mut self) {
        self.italic_depth = self.italic_depth.saturating_sub(1);
    }

    pub fn bold_depth(&self) -> u16 {
        self.bold_depth
    }

    pub fn italic_depth(&self) -> u16 {
        self.italic_depth
    }

    /// Resolve the depths into one font style.
    pub fn resolve(&self) -> FontStyle {
        match (self.bold_depth > 0, self.italic_depth > 0) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Regular,
        }
    }
}

/// Horizontal alignment of a block's lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    #[default]
    Justify,
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Stable on-disk tag, also used by `RenderConfig::paragraph_alignment`.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Justify => 0,
            Self::Left => 1,
            Self::Center => 2,
            Self::Right => 3,
        }
    }

    /// Decode a tag; unknown values fall back to `Justify`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Left,
            2 => Self::Center,
            3 => Self::Right,
            _ => Self::Justify,
        }
    }
}

/// One word with its style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub style: FontStyle,
}

impl Word {
    pub fn new(text: impl Into<String>, style: FontStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Ordered words sharing one alignment, built incrementally.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    words: Vec<Word>,
    alignment: Alignment,
    indent_level: u8,
    hyphenation: bool,
    continued: bool,
}

impl TextBlock {
    pub fn new(alignment: Alignment, indent_level: u8, hyphenation: bool) -> Self {
        Self {
            words: Vec::with_capacity(32),
            alignment,
            indent_level,
            hyphenation,
            continued: false,
        }
    }

    pub fn push_word(&mut self, word: Word) {
        self.words.push(word);
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
    }

    pub fn indent_level(&self) -> u8 {
        self.indent_level
    }

    pub fn hyphenation(&self) -> bool {
        self.hyphenation
    }

    /// Whether earlier words of this block were already laid out.
    ///
    /// Renderers skip the first-line indent for continued blocks.
    pub fn is_continued(&self) -> bool {
        self.continued
    }

    /// Drop the first `count` words after they were placed on pages.
    pub(crate) fn consume_front(&mut self, count: usize) {
        let count = count.min(self.words.len());
        if count == 0 {
            return;
        }
        self.words.drain(..count);
        self.continued = true;
    }
}
