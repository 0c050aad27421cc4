//! River stones the rabbit hops across.
//!
//! Stone `0` is the home bank and stone `11` the bushes on the far side. Both
//! are sentinels: the rabbit visits them during a round but they never appear
//! in a sequence and taps on them are ignored. Stones `1..=10` are playable.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Identifier of a stone on the river.
pub type StoneId = u8;

/// Home bank, where the rabbit waits before a hop sequence.
pub const START_STONE: StoneId = 0;

/// Bushes on the far bank, where the rabbit disappears after a sequence.
pub const EXIT_STONE: StoneId = 11;

/// localStorage key the layout editor persists under.
pub const LAYOUT_STORAGE_KEY: &str = "rabbit-stones-config";

/// True for the start and exit stones.
pub fn is_sentinel(id: StoneId) -> bool {
    id == START_STONE || id == EXIT_STONE
}

/// One stone. Positions are percentages of the scene (x of width, y of
/// height); the radius is a percentage of the scene width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stone {
    pub id: StoneId,
    pub x_pct: f64,
    pub y_pct: f64,
    pub r_pct: f64,
    /// Rabbit sprite scale while standing here (perspective).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbit_scale: Option<f64>,
}

impl Stone {
    const fn new(id: StoneId, x_pct: f64, y_pct: f64, r_pct: f64, scale: f64) -> Self {
        Self {
            id,
            x_pct,
            y_pct,
            r_pct,
            rabbit_scale: Some(scale),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(self.id)
    }

    /// Whether a point in pixel space lies on this stone for a scene of the
    /// given pixel size.
    pub fn contains(&self, x_px: f64, y_px: f64, width: f64, height: f64) -> bool {
        let cx = self.x_pct / 100.0 * width;
        let cy = self.y_pct / 100.0 * height;
        let r = self.r_pct / 100.0 * width;
        let dx = x_px - cx;
        let dy = y_px - cy;
        dx * dx + dy * dy <= r * r
    }
}

const DEFAULT_RIVER: [Stone; 12] = [
    Stone::new(0, 21.4, 81.3, 4.0, 3.5),
    Stone::new(1, 47.1, 77.3, 4.8, 2.1),
    Stone::new(2, 36.2, 70.9, 4.0, 2.1),
    Stone::new(3, 53.3, 68.0, 4.4, 2.0),
    Stone::new(4, 43.9, 59.8, 4.0, 1.8),
    Stone::new(5, 69.0, 62.8, 3.5, 1.4),
    Stone::new(6, 58.5, 55.3, 3.9, 1.5),
    Stone::new(7, 76.3, 56.0, 3.1, 1.5),
    Stone::new(8, 67.8, 50.6, 3.1, 1.5),
    Stone::new(9, 82.5, 51.0, 2.3, 0.9),
    Stone::new(10, 74.7, 49.0, 2.0, 1.0),
    Stone::new(11, 81.6, 40.5, 4.0, 0.0),
];

/// The fixed set of stones for a session.
#[derive(Clone, Debug, PartialEq)]
pub struct StoneLayout {
    stones: Vec<Stone>,
}

impl Default for StoneLayout {
    fn default() -> Self {
        Self::default_river()
    }
}

impl StoneLayout {
    /// Layout matching the shipped river scene.
    pub fn default_river() -> Self {
        Self {
            stones: DEFAULT_RIVER.to_vec(),
        }
    }

    /// Build a layout from arbitrary stones. Missing start / exit stones are
    /// restored from the default river so older saved layouts keep working.
    pub fn from_stones(mut stones: Vec<Stone>) -> Self {
        if !stones.iter().any(|s| s.id == START_STONE) {
            stones.insert(0, DEFAULT_RIVER[START_STONE as usize]);
        }
        if !stones.iter().any(|s| s.id == EXIT_STONE) {
            stones.push(DEFAULT_RIVER[EXIT_STONE as usize]);
        }
        Self { stones }
    }

    /// Parse a layout saved by the layout editor.
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let stones: Vec<Stone> = serde_json::from_str(json)?;
        if stones.is_empty() {
            return Err(LayoutError::Empty);
        }
        let layout = Self::from_stones(stones);
        if layout.playable_ids().is_empty() {
            return Err(LayoutError::NoPlayable);
        }
        Ok(layout)
    }

    pub fn to_json(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string(&self.stones)?)
    }

    pub fn stones(&self) -> &[Stone] {
        &self.stones
    }

    pub fn get(&self, id: StoneId) -> Option<&Stone> {
        self.stones.iter().find(|s| s.id == id)
    }

    /// Distinct playable ids in ascending order.
    pub fn playable_ids(&self) -> Vec<StoneId> {
        let mut ids: Vec<StoneId> = self
            .stones
            .iter()
            .filter(|s| !s.is_sentinel())
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Stone under a click. When circles overlap the smallest one wins, since
    /// far stones are drawn smaller and sit on top visually.
    pub fn hit_test(&self, x_px: f64, y_px: f64, width: f64, height: f64) -> Option<StoneId> {
        self.stones
            .iter()
            .filter(|s| s.contains(x_px, y_px, width, height))
            .min_by(|a, b| a.r_pct.total_cmp(&b.r_pct))
            .map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_river_has_ten_playable_stones() {
        let layout = StoneLayout::default_river();
        assert_eq!(layout.stones().len(), 12);
        assert_eq!(layout.playable_ids(), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn sentinels_are_start_and_exit() {
        assert!(is_sentinel(0));
        assert!(is_sentinel(11));
        assert!((1..=10).all(|id| !is_sentinel(id)));
    }

    #[test]
    fn migration_restores_missing_sentinels() {
        let json = r#"[{"id":3,"xPct":50.0,"yPct":50.0,"rPct":4.0}]"#;
        let layout = StoneLayout::from_json(json).unwrap();
        let ids: Vec<StoneId> = layout.stones().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![START_STONE, 3, EXIT_STONE]);
        assert_eq!(layout.playable_ids(), vec![3]);
    }

    #[test]
    fn empty_layout_is_rejected() {
        assert!(matches!(
            StoneLayout::from_json("[]"),
            Err(LayoutError::Empty)
        ));
        assert!(matches!(
            StoneLayout::from_json("{"),
            Err(LayoutError::Json { .. })
        ));
    }

    #[test]
    fn sentinel_only_layout_is_rejected() {
        let json = r#"[{"id":0,"xPct":20.0,"yPct":80.0,"rPct":4.0},
                       {"id":11,"xPct":80.0,"yPct":40.0,"rPct":4.0}]"#;
        assert!(matches!(
            StoneLayout::from_json(json),
            Err(LayoutError::NoPlayable)
        ));
    }

    #[test]
    fn layout_json_uses_editor_field_names() {
        let json = StoneLayout::default_river().to_json().unwrap();
        assert!(json.contains("\"xPct\":21.4"));
        assert!(json.contains("\"rabbitScale\":3.5"));
        let back = StoneLayout::from_json(&json).unwrap();
        assert_eq!(back, StoneLayout::default_river());
    }

    #[test]
    fn hit_test_finds_stone_under_click() {
        let layout = StoneLayout::default_river();
        // Stone 5 centre on a 1000x1000 scene.
        assert_eq!(layout.hit_test(690.0, 628.0, 1000.0, 1000.0), Some(5));
        assert_eq!(layout.hit_test(5.0, 5.0, 1000.0, 1000.0), None);
    }
}
