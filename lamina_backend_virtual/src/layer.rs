// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Swapchain-backed output layer.

use kurbo::Rect;
use lamina_core::damage::DamageJournal;
use lamina_core::output::PixelSize;
use lamina_core::output_layer::{
    BeginFrameInfo, BufferHandle, FramePairing, OutputLayer, OutputLayerId, OutputLayerKind,
    RenderTarget,
};
use lamina_core::region::Region;

use crate::image::VirtualImage;

#[derive(Clone, Debug)]
struct Slot {
    image: VirtualImage,
    /// Commit counter value when this slot was last rendered.
    rendered_at: Option<u64>,
}

/// A plane rendering into a round-robin swapchain of [`VirtualImage`]s.
///
/// Buffer ages follow the usual convention: 1 means the buffer holds the
/// previous frame, 0 that its contents are unknown.
#[derive(Debug)]
pub struct VirtualOutputLayer {
    id: OutputLayerId,
    kind: OutputLayerKind,
    geometry: Rect,
    scale: f64,
    slots: Vec<Slot>,
    next_slot: usize,
    commits: u64,
    journal: DamageJournal,
    pairing: FramePairing,
    acquired: Option<usize>,
    pending: Option<usize>,
    front: Option<usize>,
    partial_update: bool,
    fail_allocation: bool,
    next_handle: u64,
}

impl VirtualOutputLayer {
    /// Creates a layer covering `geometry` (global space) with
    /// `swapchain_length` buffers (at least one).
    #[must_use]
    pub fn new(
        id: OutputLayerId,
        kind: OutputLayerKind,
        geometry: Rect,
        scale: f64,
        swapchain_length: usize,
    ) -> Self {
        let swapchain_length = swapchain_length.max(1);
        let mut journal = DamageJournal::with_capacity(swapchain_length);
        journal.set_geometry(geometry);
        let mut layer = Self {
            id,
            kind,
            geometry,
            scale,
            slots: Vec::with_capacity(swapchain_length),
            next_slot: 0,
            commits: 0,
            journal,
            pairing: FramePairing::default(),
            acquired: None,
            pending: None,
            front: None,
            partial_update: true,
            fail_allocation: false,
            next_handle: u64::from(id.0) << 32,
        };
        layer.allocate(swapchain_length);
        layer
    }

    /// Id of this layer.
    #[must_use]
    pub fn id(&self) -> OutputLayerId {
        self.id
    }

    /// Moves or resizes the plane. A size or scale change reallocates the
    /// swapchain; any geometry change resets the damage history.
    pub fn set_geometry(&mut self, geometry: Rect, scale: f64) {
        if geometry == self.geometry && scale == self.scale {
            return;
        }
        let resize = geometry.size() != self.geometry.size() || scale != self.scale;
        self.geometry = geometry;
        self.scale = scale;
        self.journal.set_geometry(geometry);
        if resize {
            let len = self.slots.len();
            self.allocate(len);
        } else {
            for slot in &mut self.slots {
                slot.rendered_at = None;
            }
        }
        tracing::debug!(output_layer = ?self.id, ?geometry, scale, "output layer reconfigured");
    }

    /// Makes every following `begin_frame` fail to acquire a buffer.
    pub fn set_allocation_failure(&mut self, fail: bool) {
        self.fail_allocation = fail;
    }

    /// Selects whether painting may be clipped to the damage.
    pub fn set_partial_update(&mut self, partial: bool) {
        self.partial_update = partial;
    }

    /// Number of swapchain slots.
    #[must_use]
    pub fn swapchain_length(&self) -> usize {
        self.slots.len()
    }

    /// Number of buffers committed so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// The damage history.
    #[must_use]
    pub fn journal(&self) -> &DamageJournal {
        &self.journal
    }

    /// Whether a frame is open.
    #[must_use]
    pub fn is_frame_open(&self) -> bool {
        self.pairing.is_open()
    }

    /// The image currently on screen.
    #[must_use]
    pub fn front_image(&self) -> Option<&VirtualImage> {
        self.front.map(|slot| &self.slots[slot].image)
    }

    /// Latches the committed buffer for scanout. Returns `false` if nothing
    /// was committed since the last flip.
    pub(crate) fn flip(&mut self) -> bool {
        match self.pending.take() {
            Some(slot) => {
                self.front = Some(slot);
                true
            }
            None => false,
        }
    }

    fn allocate(&mut self, len: usize) {
        let size = self.pixel_size();
        self.slots.clear();
        for _ in 0..len {
            self.next_handle += 1;
            self.slots.push(Slot {
                image: VirtualImage::new(BufferHandle(self.next_handle), size),
                rendered_at: None,
            });
        }
        self.next_slot = 0;
        self.pending = None;
        self.front = None;
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "buffer sizes are far below u32::MAX"
    )]
    fn pixel_size(&self) -> PixelSize {
        let size = self.geometry.size() * self.scale;
        PixelSize::new(
            size.width.round().max(0.0) as u32,
            size.height.round().max(0.0) as u32,
        )
    }

    fn age_of(&self, slot: usize) -> u32 {
        match self.slots[slot].rendered_at {
            Some(at) => u32::try_from(self.commits - at + 1).unwrap_or(0),
            None => 0,
        }
    }
}

impl OutputLayer for VirtualOutputLayer {
    fn kind(&self) -> OutputLayerKind {
        self.kind
    }

    fn geometry(&self) -> Rect {
        self.geometry
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn buffer_age(&self) -> u32 {
        self.age_of(self.next_slot)
    }

    fn supports_partial_update(&self) -> bool {
        self.partial_update
    }

    fn begin_frame(&mut self) -> Option<BeginFrameInfo> {
        let paired = self.pairing.begin();
        debug_assert!(paired.is_ok(), "{paired:?} on {:?}", self.id);
        if self.fail_allocation {
            tracing::debug!(output_layer = ?self.id, "buffer allocation failed");
            return None;
        }
        let slot = self.next_slot;
        self.next_slot = (slot + 1) % self.slots.len();
        self.acquired = Some(slot);

        // The journal holds one entry per commit; a buffer of age N missed
        // the last N - 1 of them.
        let repaint = match self.age_of(slot) {
            0 => Region::from_rect(self.geometry),
            1 => Region::new(),
            age => self.journal.accumulate(age - 1, self.geometry),
        };
        Some(BeginFrameInfo {
            buffer: self.slots[slot].image.buffer(),
            repaint,
        })
    }

    fn render_target(&mut self) -> Option<&mut dyn RenderTarget> {
        let slot = self.acquired?;
        Some(&mut self.slots[slot].image)
    }

    fn end_frame(&mut self, rendered: &Region, damaged: &Region) -> bool {
        let paired = self.pairing.end();
        debug_assert!(paired.is_ok(), "{paired:?} on {:?}", self.id);
        let Some(slot) = self.acquired.take() else {
            return false;
        };
        self.commits += 1;
        let entry = &mut self.slots[slot];
        entry.rendered_at = Some(self.commits);
        entry.image.set_clip(None);
        self.journal.add(damaged.clone());
        self.pending = Some(slot);
        tracing::trace!(
            output_layer = ?self.id,
            rendered = ?rendered.bounding_rect(),
            damaged = ?damaged.bounding_rect(),
            commit = self.commits,
            "buffer committed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::output_layer::Argb32;

    use super::*;

    const G: Rect = Rect::new(0.0, 0.0, 16.0, 16.0);

    fn layer(slots: usize) -> VirtualOutputLayer {
        VirtualOutputLayer::new(OutputLayerId(1), OutputLayerKind::Primary, G, 1.0, slots)
    }

    fn commit(layer: &mut VirtualOutputLayer, damage: Rect) -> Region {
        let info = layer.begin_frame().unwrap();
        let damage = Region::from_rect(damage);
        assert!(layer.end_frame(&damage.union(&info.repaint), &damage));
        info.repaint
    }

    #[test]
    fn fresh_buffers_need_full_repaint() {
        let mut layer = layer(2);
        assert_eq!(layer.buffer_age(), 0);
        assert_eq!(commit(&mut layer, G), Region::from_rect(G));
        assert_eq!(commit(&mut layer, G), Region::from_rect(G));
        assert_eq!(layer.buffer_age(), 2);
    }

    #[test]
    fn aged_buffer_repaints_missed_damage() {
        let mut layer = layer(3);
        for _ in 0..3 {
            commit(&mut layer, G);
        }
        let a = Rect::new(0.0, 0.0, 4.0, 4.0);
        let b = Rect::new(8.0, 8.0, 12.0, 12.0);
        // Slot 0 was rendered at commit 1; commits 2 and 3 were full.
        assert_eq!(layer.buffer_age(), 3);
        assert_eq!(commit(&mut layer, a), Region::from_rect(G));
        // Slot 1 missed commits 3 (full) and 4.
        assert_eq!(commit(&mut layer, b), Region::from_rect(G));
        // Slot 2 missed commits 4 and 5.
        let repaint = commit(&mut layer, G);
        assert_eq!(repaint, Region::from_rect(a).union(&Region::from_rect(b)));
    }

    #[test]
    fn single_buffer_needs_no_repaint() {
        let mut layer = layer(1);
        commit(&mut layer, G);
        assert_eq!(layer.buffer_age(), 1);
        assert!(commit(&mut layer, Rect::new(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn failed_allocation_still_pairs() {
        let mut layer = layer(2);
        layer.set_allocation_failure(true);
        assert!(layer.begin_frame().is_none());
        assert!(layer.is_frame_open());
        assert!(layer.render_target().is_none());
        assert!(!layer.end_frame(&Region::new(), &Region::new()));
        assert!(!layer.is_frame_open());
        assert_eq!(layer.commit_count(), 0);
    }

    #[test]
    fn resize_reallocates_and_forgets_history() {
        let mut layer = layer(2);
        commit(&mut layer, G);
        commit(&mut layer, G);
        let bigger = Rect::new(0.0, 0.0, 32.0, 16.0);
        layer.set_geometry(bigger, 2.0);
        assert_eq!(layer.buffer_age(), 0);
        assert!(layer.journal().is_empty());
        let info = layer.begin_frame().unwrap();
        assert_eq!(info.repaint, Region::from_rect(bigger));
        let target = layer.render_target().unwrap();
        assert_eq!(target.size(), kurbo::Size::new(64.0, 32.0));
        target.fill_rect(Rect::new(0.0, 0.0, 64.0, 32.0), Argb32::WHITE);
        assert!(layer.end_frame(&info.repaint, &info.repaint));
        assert!(layer.flip());
        assert_eq!(layer.front_image().unwrap().pixel(63, 31), Some(Argb32::WHITE));
    }

    #[test]
    fn frames_pair_across_commits() {
        let mut layer = layer(2);
        assert!(layer.begin_frame().is_some());
        assert!(layer.is_frame_open());
        assert!(layer.end_frame(&Region::from_rect(G), &Region::from_rect(G)));
        assert!(!layer.is_frame_open());
        assert!(layer.begin_frame().is_some());
        assert!(layer.end_frame(&Region::new(), &Region::new()));
        assert_eq!(layer.commit_count(), 2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "DoubleBegin")]
    fn second_begin_without_end_panics() {
        let mut layer = layer(2);
        let _ = layer.begin_frame();
        let _ = layer.begin_frame();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "EndWithoutBegin")]
    fn end_without_begin_panics() {
        let mut layer = layer(2);
        let _ = layer.end_frame(&Region::new(), &Region::new());
    }
}
