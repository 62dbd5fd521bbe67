//! GC tag header
//!
//! Every managed allocation is prepended with a [`Tag`] that carries the
//! tri-color state and the owning type. Every live managed pointer points
//! just past its tag; the collector recovers the tag by pointer arithmetic.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Tag (24 bytes, 8-byte aligned)          │
//! │  - color: Color (1 byte + padding)      │
//! │  - ty: Option<TypeRef> (8 bytes)        │
//! │  - size: usize (8 bytes)                │
//! ├─────────────────────────────────────────┤  ← ObjectRef points here
//! │ Payload (size bytes)                    │
//! └─────────────────────────────────────────┘
//! ```

use crate::types::TypeRef;

/// Tri-color marking state
///
/// Within one cycle colors only move White → Gray → Black; the sweep resets
/// survivors Black → White for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    /// Not yet reached this cycle (dead if still white at sweep)
    White,
    /// Reached but not yet scanned (on the gray worklist)
    Gray,
    /// Reached and scanned
    Black,
}

/// GC header prepended to every managed allocation
#[repr(C, align(8))]
pub struct Tag {
    color: Color,
    ty: Option<TypeRef>,
    size: usize,
}

impl Tag {
    /// Create a white tag for a fresh allocation of `size` payload bytes.
    pub(crate) fn new(ty: Option<TypeRef>, size: usize) -> Self {
        Self {
            color: Color::White,
            ty,
            size,
        }
    }

    /// Current color.
    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Recolor.
    #[inline]
    pub(crate) fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Owning type. `None` exists only for the instant the bootstrap type
    /// node describes itself; every reachable tag has a type.
    #[inline]
    pub fn ty(&self) -> Option<TypeRef> {
        self.ty
    }

    /// Restamp the dynamic type.
    #[inline]
    pub(crate) fn set_ty(&mut self, ty: TypeRef) {
        self.ty = Some(ty);
    }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total allocation size: tag plus payload.
    #[inline]
    pub fn allocation_size(&self) -> usize {
        std::mem::size_of::<Tag>() + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_size() {
        // color (1 byte + 7 padding) + ty (8) + size (8)
        assert_eq!(std::mem::size_of::<Tag>(), 24);
    }

    #[test]
    fn test_tag_alignment() {
        assert_eq!(std::mem::align_of::<Tag>(), 8);
    }

    #[test]
    fn test_tag_starts_white() {
        let tag = Tag::new(None, 16);
        assert_eq!(tag.color(), Color::White);
        assert_eq!(tag.size(), 16);
        assert_eq!(tag.allocation_size(), 16 + std::mem::size_of::<Tag>());
        assert!(tag.ty().is_none());
    }

    #[test]
    fn test_tag_recolor() {
        let mut tag = Tag::new(None, 8);

        tag.set_color(Color::Gray);
        assert_eq!(tag.color(), Color::Gray);

        tag.set_color(Color::Black);
        assert_eq!(tag.color(), Color::Black);

        tag.set_color(Color::White);
        assert_eq!(tag.color(), Color::White);
    }
}
