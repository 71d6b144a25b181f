pub mod annotator;
mod glyphs;
